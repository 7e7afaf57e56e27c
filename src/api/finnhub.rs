//! Finnhub client: `/quote` for prices, `/stock/profile2` for market caps.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{classify_status, http_client, positive_or_absent, ProviderClient};
use crate::error::ProviderError;
use crate::models::Ticker;

pub const PROVIDER_ID: &str = "finnhub";

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Quote response: `c` is the current price.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    c: Option<f64>,
}

/// Company profile response. Market capitalization is reported in millions
/// of USD.
#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(rename = "marketCapitalization")]
    market_capitalization: Option<f64>,
}

pub struct FinnhubClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FinnhubClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        ticker: &Ticker,
    ) -> Result<Option<T>, ProviderError> {
        let mut url = url::Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|e| ProviderError::transient(PROVIDER_ID, e))?;
        url.query_pairs_mut()
            .append_pair("symbol", ticker.as_str())
            .append_pair("token", &self.api_key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::transient(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(PROVIDER_ID, status));
        }

        // A 2xx body that doesn't parse means the provider answered but had
        // nothing usable; that's absence, not an error.
        match response.json::<T>().await {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                warn!(ticker = %ticker, "unparseable finnhub response: {e}");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ProviderClient for FinnhubClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_price(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        let quote: Option<QuoteResponse> = self.get("quote", ticker).await?;
        let price = positive_or_absent(quote.and_then(|q| q.c));
        debug!(ticker = %ticker, ?price, "finnhub quote");
        Ok(price)
    }

    async fn fetch_market_cap(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        let profile: Option<ProfileResponse> = self.get("stock/profile2", ticker).await?;
        // Reported in millions; scale to absolute dollars on ingest.
        let market_cap = positive_or_absent(
            profile
                .and_then(|p| p.market_capitalization)
                .map(|m| m * 1_000_000.0),
        );
        debug!(ticker = %ticker, ?market_cap, "finnhub profile");
        Ok(market_cap)
    }
}

impl std::fmt::Debug for FinnhubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
