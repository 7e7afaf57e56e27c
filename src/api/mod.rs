//! External data-provider clients.
//!
//! Each provider wraps one external source's quote + profile endpoints behind
//! the same trait. Providers answer with `Ok(None)` when they responded but
//! had no usable value for a field; zero is never a legitimate price or
//! market cap, so zero numeric payloads also map to `None`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::ProviderError;
use crate::models::Ticker;
use crate::rate_limiter::ProviderLimiter;

pub mod alpha_vantage;
pub mod finnhub;
pub mod yahoo;

pub use alpha_vantage::AlphaVantageClient;
pub use finnhub::FinnhubClient;
pub use yahoo::YahooClient;

/// One external market-data source.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable identifier recorded as the value source in the store.
    fn id(&self) -> &'static str;

    /// Latest price for the ticker, or `None` if the provider had no value.
    async fn fetch_price(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError>;

    /// Latest market cap for the ticker, or `None` if the provider had no
    /// value.
    async fn fetch_market_cap(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError>;

    /// Shares outstanding, used to derive market cap when no provider has
    /// one. Most providers don't expose this.
    async fn shares_outstanding(&self, _ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        Ok(None)
    }
}

/// A provider paired with its rate limiter, in cascade priority order.
#[derive(Clone)]
pub struct ProviderHandle {
    pub client: Arc<dyn ProviderClient>,
    pub limiter: Arc<ProviderLimiter>,
}

impl ProviderHandle {
    pub fn new(client: Arc<dyn ProviderClient>, limiter: Arc<ProviderLimiter>) -> Self {
        Self { client, limiter }
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("provider", &self.client.id())
            .finish_non_exhaustive()
    }
}

/// Build the provider cascade from configuration, in priority order:
/// Finnhub, then Yahoo, then Alpha Vantage. Providers without a required API
/// key are skipped with a log line rather than failing startup.
pub fn build_cascade(config: &Config) -> Vec<ProviderHandle> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let base = Duration::from_millis(config.backoff_base_ms);
    let max = Duration::from_millis(config.backoff_max_ms);
    let mut cascade = Vec::new();

    match &config.finnhub_api_key {
        Some(key) => {
            let client = Arc::new(FinnhubClient::new(key.clone(), timeout));
            let limiter = Arc::new(ProviderLimiter::new(
                finnhub::PROVIDER_ID,
                config.finnhub_rate_per_minute,
                base,
                max,
            ));
            cascade.push(ProviderHandle::new(client, limiter));
        }
        None => info!("FINNHUB_API_KEY not set, skipping Finnhub provider"),
    }

    let yahoo = Arc::new(YahooClient::new(timeout));
    let limiter = Arc::new(ProviderLimiter::new(
        yahoo::PROVIDER_ID,
        config.yahoo_rate_per_minute,
        base,
        max,
    ));
    cascade.push(ProviderHandle::new(yahoo, limiter));

    match &config.alpha_vantage_api_key {
        Some(key) => {
            let client = Arc::new(AlphaVantageClient::new(key.clone(), timeout));
            let limiter = Arc::new(ProviderLimiter::new(
                alpha_vantage::PROVIDER_ID,
                config.alpha_vantage_rate_per_minute,
                base,
                max,
            ));
            cascade.push(ProviderHandle::new(client, limiter));
        }
        None => info!("ALPHAVANTAGE_API_KEY not set, skipping Alpha Vantage provider"),
    }

    info!(
        providers = ?cascade.iter().map(|h| h.client.id()).collect::<Vec<_>>(),
        "provider cascade configured"
    );
    cascade
}

/// Treat zero, negative and non-finite numbers as absent. Zero is the
/// forbidden sentinel: a provider returning 0 answered but had nothing.
pub(crate) fn positive_or_absent(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Classify an HTTP-level failure for a provider.
pub(crate) fn classify_status(
    provider: &'static str,
    status: reqwest::StatusCode,
) -> ProviderError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited { provider }
    } else {
        ProviderError::transient(provider, format!("HTTP {status}"))
    }
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("market-pulse/0.1")
        .build()
        .expect("static client configuration is valid")
}
