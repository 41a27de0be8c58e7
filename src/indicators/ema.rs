/// Calculate an Exponential Moving Average series
///
/// Uses smoothing factor 2/(n+1), seeded with the simple average of the
/// first `period` values. The output is aligned to the tail of the input:
/// `prices.len() - period + 1` values, or empty when there is not enough
/// history.
pub fn ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = prices[..period].iter().sum::<f64>() / period as f64;

    let mut series = Vec::with_capacity(prices.len() - period + 1);
    let mut ema = seed;
    series.push(ema);

    for price in &prices[period..] {
        ema = (price - ema) * multiplier + ema;
        series.push(ema);
    }

    series
}
