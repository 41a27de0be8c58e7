// Technical indicator computation, pure and total over close prices
pub mod ema;
pub mod macd;
pub mod rsi;

pub use ema::ema_series;
pub use macd::{macd_series, MacdSeries};
pub use rsi::rsi_series;

pub const EMA_SHORT_PERIOD: usize = 7;
pub const EMA_LONG_PERIOD: usize = 21;
pub const RSI_PERIOD: usize = 14;

/// All indicator series for one (symbol, interval), recomputed per tick.
///
/// Every series is aligned to the tail of `closes` with its own warm-up;
/// short input produces shorter or empty arrays, never an error.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSnapshot {
    pub closes: Vec<f64>,
    pub ema7: Vec<f64>,
    pub ema21: Vec<f64>,
    pub rsi: Vec<f64>,
    pub macd: MacdSeries,
}

impl IndicatorSnapshot {
    pub fn compute(closes: &[f64]) -> Self {
        Self {
            closes: closes.to_vec(),
            ema7: ema_series(closes, EMA_SHORT_PERIOD),
            ema21: ema_series(closes, EMA_LONG_PERIOD),
            rsi: rsi_series(closes, RSI_PERIOD),
            macd: macd_series(closes),
        }
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }

    pub fn latest_ema7(&self) -> Option<f64> {
        self.ema7.last().copied()
    }

    pub fn latest_ema21(&self) -> Option<f64> {
        self.ema21.last().copied()
    }

    pub fn latest_rsi(&self) -> Option<f64> {
        self.rsi.last().copied()
    }

    pub fn latest_histogram(&self) -> Option<f64> {
        self.macd.histogram.last().copied()
    }

    /// Histogram value one bar before the latest, for slope checks
    pub fn previous_histogram(&self) -> Option<f64> {
        let len = self.macd.histogram.len();
        if len >= 2 {
            Some(self.macd.histogram[len - 2])
        } else {
            None
        }
    }
}
