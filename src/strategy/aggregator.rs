use crate::models::{AggregatedSignal, Signal, TradeAction};

/// Fuse per-interval signals for one (user, symbol) into a single decision.
///
/// Signals that are Hold or below 0.5 confidence are discarded. Buy and
/// sell confidences are summed separately, then each sum is divided by the
/// number of CONFIGURED intervals rather than the number of contributors,
/// which deliberately dampens decisions not corroborated across timeframes.
/// The larger average wins only when it reaches 0.5 and strictly exceeds
/// the other side.
pub fn aggregate_signals(signals: &[Signal], configured_intervals: usize) -> AggregatedSignal {
    if configured_intervals == 0 {
        return AggregatedSignal {
            action: TradeAction::Hold,
            confidence: 0.0,
        };
    }

    let mut buy_sum = 0.0;
    let mut sell_sum = 0.0;

    for signal in signals.iter().filter(|s| s.is_actionable()) {
        match signal.action {
            TradeAction::Buy => buy_sum += signal.confidence,
            TradeAction::Sell => sell_sum += signal.confidence,
            TradeAction::Hold => {}
        }
    }

    let buy_avg = buy_sum / configured_intervals as f64;
    let sell_avg = sell_sum / configured_intervals as f64;

    if buy_avg >= 0.5 && buy_avg > sell_avg {
        AggregatedSignal {
            action: TradeAction::Buy,
            confidence: buy_avg,
        }
    } else if sell_avg >= 0.5 && sell_avg > buy_avg {
        AggregatedSignal {
            action: TradeAction::Sell,
            confidence: sell_avg,
        }
    } else {
        AggregatedSignal {
            action: TradeAction::Hold,
            confidence: buy_avg.max(sell_avg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(confidence: f64) -> Signal {
        Signal {
            action: TradeAction::Buy,
            confidence,
        }
    }

    fn sell(confidence: f64) -> Signal {
        Signal {
            action: TradeAction::Sell,
            confidence,
        }
    }

    #[test]
    fn test_uncorroborated_signal_is_dampened() {
        // One strong buy out of three configured intervals: 0.9 / 3 = 0.3
        let signals = vec![buy(0.9), Signal::hold(), Signal::hold()];
        let aggregated = aggregate_signals(&signals, 3);

        assert_eq!(aggregated.action, TradeAction::Hold);
        assert!((aggregated.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_corroborated_buy_fires() {
        let signals = vec![buy(0.9), buy(0.8), Signal::hold()];
        let aggregated = aggregate_signals(&signals, 3);

        assert_eq!(aggregated.action, TradeAction::Buy);
        assert!((aggregated.confidence - 1.7 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_entries_discarded() {
        // 0.49 signals are not actionable and must not contribute
        let signals = vec![buy(0.49), buy(0.49), buy(0.49)];
        let aggregated = aggregate_signals(&signals, 3);

        assert_eq!(aggregated.action, TradeAction::Hold);
        assert_eq!(aggregated.confidence, 0.0);
    }

    #[test]
    fn test_opposing_sides_require_strict_dominance() {
        let signals = vec![buy(0.8), buy(0.7), sell(0.8), sell(0.7)];
        let aggregated = aggregate_signals(&signals, 3);

        // 0.5 vs 0.5: tie yields no trade even though both clear threshold
        assert_eq!(aggregated.action, TradeAction::Hold);
    }

    #[test]
    fn test_sell_side_wins() {
        let signals = vec![sell(0.9), sell(0.9), buy(0.6)];
        let aggregated = aggregate_signals(&signals, 3);

        assert_eq!(aggregated.action, TradeAction::Sell);
        assert!((aggregated.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_no_configured_intervals() {
        let aggregated = aggregate_signals(&[], 0);
        assert_eq!(aggregated.action, TradeAction::Hold);
    }

    #[test]
    fn test_single_interval_passthrough() {
        let aggregated = aggregate_signals(&[buy(0.7)], 1);
        assert_eq!(aggregated.action, TradeAction::Buy);
        assert!((aggregated.confidence - 0.7).abs() < 1e-9);
    }
}
