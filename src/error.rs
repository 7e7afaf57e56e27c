use chrono::NaiveDate;
use thiserror::Error;

/// Errors surfaced by a single provider call.
///
/// Rate limiting is kept separate from other failures because it is a
/// provider-level condition: the resolver backs the provider off and moves on
/// to the next one instead of treating the ticker's fetch as failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 429 (or an equivalent in-band throttle response).
    #[error("rate limited by {provider}")]
    RateLimited { provider: &'static str },

    /// Timeout, connection failure, 5xx or any other non-2xx response.
    #[error("{provider} request failed: {message}")]
    Transient {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn transient(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transient {
            provider,
            message: err.to_string(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Errors from the time-series store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Any database failure. Fatal for the run: downstream aggregation must
    /// never compute over a half-written store.
    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Attempt to store a zero, negative or non-finite value. Zero is a
    /// forbidden sentinel; absence must stay explicit.
    #[error("rejected {field} value {value} for {symbol} on {date}: zero and non-finite values are never stored")]
    InvalidValue {
        symbol: String,
        field: &'static str,
        date: NaiveDate,
        value: f64,
    },

    /// Write against a ticker that was never registered via `ensure_tickers`.
    #[error("unknown ticker {0}: call ensure_tickers before writing")]
    UnknownTicker(String),
}

/// Top-level error for pipeline operations.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Single-flight violation: a run for this date is already in progress.
    #[error("a run for {0} is already in flight")]
    RunInFlight(NaiveDate),

    #[error("invalid ticker symbol {0:?}")]
    InvalidTicker(String),

    #[error("configuration error: {0}")]
    Config(String),
}
