use crate::indicators::IndicatorSnapshot;
use crate::models::{Signal, TradeAction};
use crate::strategy::SignalStrategy;

/// Tunable thresholds and weights for the rule evaluator
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub trend_weight: f64,
    pub momentum_weight: f64,
    pub macd_weight: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Inner RSI band edges where half momentum weight applies
    pub rsi_buy_shoulder: f64,
    pub rsi_sell_shoulder: f64,
    /// Minimum winning-side weight for an actionable signal
    pub action_threshold: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            trend_weight: 0.4,
            momentum_weight: 0.3,
            macd_weight: 0.3,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_buy_shoulder: 45.0,
            rsi_sell_shoulder: 55.0,
            action_threshold: 0.5,
        }
    }
}

/// Weighted rule evaluator over trend, momentum and MACD histogram.
///
/// Each rule contributes weight to the bullish or bearish side; the
/// dominant side's sum becomes the confidence. Weights sum to 1.0 per
/// side, so confidence is already normalized.
pub struct WeightedEvaluator {
    config: EvaluatorConfig,
}

impl WeightedEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }
}

impl Default for WeightedEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

impl SignalStrategy for WeightedEvaluator {
    fn evaluate(&self, snapshot: &IndicatorSnapshot) -> Signal {
        let cfg = &self.config;
        let mut bullish = 0.0;
        let mut bearish = 0.0;

        // Trend direction: short EMA vs long EMA
        if let (Some(ema7), Some(ema21)) = (snapshot.latest_ema7(), snapshot.latest_ema21()) {
            if ema7 > ema21 {
                bullish += cfg.trend_weight;
            } else if ema7 < ema21 {
                bearish += cfg.trend_weight;
            }
        }

        // Momentum band: full weight at the extremes, half on the shoulders
        if let Some(rsi) = snapshot.latest_rsi() {
            if rsi < cfg.rsi_oversold {
                bullish += cfg.momentum_weight;
            } else if rsi <= cfg.rsi_buy_shoulder {
                bullish += cfg.momentum_weight / 2.0;
            } else if rsi > cfg.rsi_overbought {
                bearish += cfg.momentum_weight;
            } else if rsi >= cfg.rsi_sell_shoulder {
                bearish += cfg.momentum_weight / 2.0;
            }
        }

        // MACD histogram: sign picks the side, slope agreement doubles it
        if let Some(hist) = snapshot.latest_histogram() {
            let slope = snapshot
                .previous_histogram()
                .map(|prev| hist - prev)
                .unwrap_or(0.0);

            if hist > 0.0 {
                bullish += if slope > 0.0 {
                    cfg.macd_weight
                } else {
                    cfg.macd_weight / 2.0
                };
            } else if hist < 0.0 {
                bearish += if slope < 0.0 {
                    cfg.macd_weight
                } else {
                    cfg.macd_weight / 2.0
                };
            }
        }

        let (action, confidence) = if bullish > bearish {
            (TradeAction::Buy, bullish)
        } else if bearish > bullish {
            (TradeAction::Sell, bearish)
        } else {
            (TradeAction::Hold, bullish)
        };

        tracing::debug!(
            "Evaluated snapshot: bullish={:.2} bearish={:.2} -> {:?}",
            bullish,
            bearish,
            action
        );

        if confidence < cfg.action_threshold {
            return Signal {
                action: TradeAction::Hold,
                confidence,
            };
        }

        Signal { action, confidence }
    }

    fn name(&self) -> &str {
        "weighted-rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::MacdSeries;

    fn snapshot(
        ema7: f64,
        ema21: f64,
        rsi: f64,
        hist_prev: f64,
        hist_last: f64,
    ) -> IndicatorSnapshot {
        IndicatorSnapshot {
            closes: vec![100.0],
            ema7: vec![ema7],
            ema21: vec![ema21],
            rsi: vec![rsi],
            macd: MacdSeries {
                macd: vec![0.0, 0.0],
                signal: vec![0.0, 0.0],
                histogram: vec![hist_prev, hist_last],
            },
        }
    }

    #[test]
    fn test_all_bullish_yields_full_confidence_buy() {
        let evaluator = WeightedEvaluator::default();
        // Uptrend, oversold, rising positive histogram
        let signal = evaluator.evaluate(&snapshot(105.0, 100.0, 25.0, 0.5, 1.0));

        assert_eq!(signal.action, TradeAction::Buy);
        assert!((signal.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_bearish_yields_sell() {
        let evaluator = WeightedEvaluator::default();
        let signal = evaluator.evaluate(&snapshot(95.0, 100.0, 80.0, -0.5, -1.0));

        assert_eq!(signal.action, TradeAction::Sell);
        assert!((signal.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sub_threshold_total_holds() {
        let evaluator = WeightedEvaluator::default();
        // Only the trend rule fires bullish: 0.4 < 0.5 threshold
        let signal = evaluator.evaluate(&snapshot(105.0, 100.0, 50.0, 0.0, 0.0));

        assert_eq!(signal.action, TradeAction::Hold);
        assert!((signal.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_signals_dominant_side_wins() {
        let evaluator = WeightedEvaluator::default();
        // Uptrend (bull 0.4) + oversold (bull 0.3) vs falling histogram
        // below zero (bear 0.3): buy at 0.7
        let signal = evaluator.evaluate(&snapshot(105.0, 100.0, 25.0, 0.0, -1.0));

        assert_eq!(signal.action, TradeAction::Buy);
        assert!((signal.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_tie_holds() {
        let evaluator = WeightedEvaluator::default();
        // Downtrend (bear 0.4) vs oversold (bull 0.3) + positive falling
        // histogram (bull 0.15): 0.45 vs 0.4 -> still under threshold
        let signal = evaluator.evaluate(&snapshot(95.0, 100.0, 25.0, 1.0, 0.5));
        assert_eq!(signal.action, TradeAction::Hold);
    }

    #[test]
    fn test_empty_snapshot_holds() {
        let evaluator = WeightedEvaluator::default();
        let signal = evaluator.evaluate(&IndicatorSnapshot::default());

        assert_eq!(signal.action, TradeAction::Hold);
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn test_rsi_shoulder_contributes_half_weight() {
        let evaluator = WeightedEvaluator::default();
        // Uptrend 0.4 + shoulder RSI 0.15 + rising positive hist 0.3 = 0.85
        let signal = evaluator.evaluate(&snapshot(105.0, 100.0, 40.0, 0.5, 1.0));

        assert_eq!(signal.action, TradeAction::Buy);
        assert!((signal.confidence - 0.85).abs() < 1e-9);
    }
}
