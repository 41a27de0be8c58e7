use thiserror::Error;

/// Failure classes the engine distinguishes when processing a tick.
///
/// None of these are fatal to the scheduler: a `Network` or `Exchange`
/// failure skips the affected pair or order for the tick, `Credential`
/// skips the user, and `Persistence` after a filled order is logged as a
/// critical inconsistency while the exchange-side trade stands.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("exchange rejected request: {0}")]
    Exchange(String),

    #[error("invalid configuration or order: {0}")]
    Validation(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Exchange(format!("malformed response: {err}"))
    }
}

/// A buy or sell attempt turned down by a risk check.
///
/// Rejections are decision outcomes, not errors: the scheduler records
/// them and moves on without logging at error level.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskRejection {
    /// Symbol traded within the cooldown window.
    Cooldown { symbol: String, remaining_minutes: i64 },
    /// Current price is outside the configured [lower, upper] band.
    PriceBand { price: f64, lower: Option<f64>, upper: Option<f64> },
    /// Open bot exposure plus the candidate amount exceeds the cap;
    /// `open_value` is None when the exposure query failed and the check
    /// failed closed.
    MaxInvestment {
        open_value: Option<f64>,
        amount: f64,
        cap: f64,
    },
    /// An open position sits within ±0.4% of the current price.
    DuplicatePosition { entry_price: f64, price: f64 },
    /// Free balance cannot cover the intended trade.
    InsufficientBalance { required: f64, available: f64 },
    /// Quantized quantity fell below the exchange minimum or notional floor.
    BelowMinimum { quantity: f64, reason: String },
    /// Position no longer clears the profitability margin at current price.
    NotProfitable { entry_price: f64, price: f64 },
}

impl std::fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskRejection::Cooldown { symbol, remaining_minutes } => {
                write!(f, "{symbol} in cooldown for another {remaining_minutes}m")
            }
            RiskRejection::PriceBand { price, lower, upper } => {
                write!(f, "price {price} outside band [{lower:?}, {upper:?}]")
            }
            RiskRejection::MaxInvestment { open_value, amount, cap } => match open_value {
                Some(open) => {
                    write!(f, "open exposure {open} + {amount} exceeds cap {cap}")
                }
                None => write!(f, "exposure unknown, refusing {amount} against cap {cap}"),
            },
            RiskRejection::DuplicatePosition { entry_price, price } => {
                write!(f, "open position at {entry_price} within 0.4% of {price}")
            }
            RiskRejection::InsufficientBalance { required, available } => {
                write!(f, "balance {available} cannot cover {required}")
            }
            RiskRejection::BelowMinimum { quantity, reason } => {
                write!(f, "quantity {quantity} below exchange minimum: {reason}")
            }
            RiskRejection::NotProfitable { entry_price, price } => {
                write!(f, "price {price} under profit floor for entry {entry_price}")
            }
        }
    }
}
