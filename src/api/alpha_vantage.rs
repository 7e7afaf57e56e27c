//! Alpha Vantage client: `GLOBAL_QUOTE` for prices, `OVERVIEW` for market
//! caps. Numbers arrive as strings and the free tier signals throttling with
//! an in-band `Note` field on a 200 response, which is treated the same as a
//! 429.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{classify_status, http_client, positive_or_absent, ProviderClient};
use crate::error::ProviderError;
use crate::models::Ticker;

pub const PROVIDER_ID: &str = "alpha_vantage";

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

#[derive(Debug, Default, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price", default)]
    price: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OverviewResponse {
    #[serde(rename = "MarketCapitalization", default)]
    market_capitalization: Option<String>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
}

pub struct AlphaVantageClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageClient {
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

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        function: &str,
        ticker: &Ticker,
    ) -> Result<Option<T>, ProviderError> {
        let mut url = url::Url::parse(&format!("{}/query", self.base_url))
            .map_err(|e| ProviderError::transient(PROVIDER_ID, e))?;
        url.query_pairs_mut()
            .append_pair("function", function)
            .append_pair("symbol", ticker.as_str())
            .append_pair("apikey", &self.api_key);

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

        match response.json::<T>().await {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                warn!(ticker = %ticker, "unparseable alpha vantage response: {e}");
                Ok(None)
            }
        }
    }
}

fn parse_numeric(value: Option<String>) -> Option<f64> {
    positive_or_absent(value.and_then(|s| s.parse::<f64>().ok()))
}

#[async_trait]
impl ProviderClient for AlphaVantageClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_price(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        let body: Option<GlobalQuoteResponse> = self.query("GLOBAL_QUOTE", ticker).await?;
        if let Some(body) = &body {
            if body.note.is_some() {
                return Err(ProviderError::RateLimited { provider: PROVIDER_ID });
            }
        }
        let price = parse_numeric(body.and_then(|b| b.global_quote).and_then(|q| q.price));
        debug!(ticker = %ticker, ?price, "alpha vantage quote");
        Ok(price)
    }

    async fn fetch_market_cap(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        let body: Option<OverviewResponse> = self.query("OVERVIEW", ticker).await?;
        if let Some(body) = &body {
            if body.note.is_some() {
                return Err(ProviderError::RateLimited { provider: PROVIDER_ID });
            }
        }
        let market_cap = parse_numeric(body.and_then(|b| b.market_capitalization));
        debug!(ticker = %ticker, ?market_cap, "alpha vantage overview");
        Ok(market_cap)
    }
}

impl std::fmt::Debug for AlphaVantageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaVantageClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
