use super::ema::ema_series;

const FAST_PERIOD: usize = 12;
const SLOW_PERIOD: usize = 26;
const SIGNAL_PERIOD: usize = 9;

/// MACD line, signal line and histogram, each aligned to the tail of the
/// input with its own warm-up. `signal` and `histogram` are shorter than
/// `macd` by `SIGNAL_PERIOD - 1` values.
#[derive(Debug, Clone, Default)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Calculate MACD(12, 26) with a 9-period signal line
///
/// macd = EMA(12) - EMA(26); signal = EMA(9) of macd;
/// histogram = macd - signal. Insufficient history yields shorter or empty
/// arrays, never an error.
pub fn macd_series(prices: &[f64]) -> MacdSeries {
    let fast = ema_series(prices, FAST_PERIOD);
    let slow = ema_series(prices, SLOW_PERIOD);

    if slow.is_empty() {
        return MacdSeries::default();
    }

    // Both series end at the latest close; subtract over the shared tail
    let overlap = fast.len().min(slow.len());
    let fast_tail = &fast[fast.len() - overlap..];
    let slow_tail = &slow[slow.len() - overlap..];
    let macd: Vec<f64> = fast_tail
        .iter()
        .zip(slow_tail)
        .map(|(f, s)| f - s)
        .collect();

    let signal = ema_series(&macd, SIGNAL_PERIOD);
    let histogram: Vec<f64> = macd[macd.len() - signal.len()..]
        .iter()
        .zip(&signal)
        .map(|(m, s)| m - s)
        .collect();

    MacdSeries {
        macd,
        signal,
        histogram,
    }
}
