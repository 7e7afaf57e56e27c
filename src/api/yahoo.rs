//! Yahoo Finance client: `quoteSummary` with the `price` and
//! `defaultKeyStatistics` modules. Also the shares-outstanding lookup used to
//! derive market caps when no provider reports one directly.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{classify_status, http_client, positive_or_absent, ProviderClient};
use crate::error::ProviderError;
use crate::models::Ticker;

pub const PROVIDER_ID: &str = "yahoo";

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo wraps numeric fields as `{"raw": 123.4, "fmt": "123.40"}`.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceModule {
    #[serde(rename = "regularMarketPrice", default)]
    regular_market_price: RawValue,
    #[serde(rename = "marketCap", default)]
    market_cap: RawValue,
}

#[derive(Debug, Default, Deserialize)]
struct KeyStatisticsModule {
    #[serde(rename = "sharesOutstanding", default)]
    shares_outstanding: RawValue,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(rename = "defaultKeyStatistics", default)]
    key_statistics: Option<KeyStatisticsModule>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Vec<QuoteSummaryResult>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary", default)]
    quote_summary: QuoteSummaryBody,
}

pub struct YahooClient {
    client: reqwest::Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn quote_summary(
        &self,
        ticker: &Ticker,
    ) -> Result<Option<QuoteSummaryResult>, ProviderError> {
        let mut url = url::Url::parse(&format!(
            "{}/v10/finance/quoteSummary/{}",
            self.base_url,
            ticker.as_str()
        ))
        .map_err(|e| ProviderError::transient(PROVIDER_ID, e))?;
        url.query_pairs_mut()
            .append_pair("modules", "price,defaultKeyStatistics");

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

        match response.json::<QuoteSummaryResponse>().await {
            Ok(parsed) => Ok(parsed.quote_summary.result.into_iter().next()),
            Err(e) => {
                warn!(ticker = %ticker, "unparseable yahoo response: {e}");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ProviderClient for YahooClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_price(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        let summary = self.quote_summary(ticker).await?;
        let price = positive_or_absent(
            summary
                .and_then(|s| s.price)
                .and_then(|p| p.regular_market_price.raw),
        );
        debug!(ticker = %ticker, ?price, "yahoo price");
        Ok(price)
    }

    async fn fetch_market_cap(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        let summary = self.quote_summary(ticker).await?;
        let market_cap =
            positive_or_absent(summary.and_then(|s| s.price).and_then(|p| p.market_cap.raw));
        debug!(ticker = %ticker, ?market_cap, "yahoo market cap");
        Ok(market_cap)
    }

    async fn shares_outstanding(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        let summary = self.quote_summary(ticker).await?;
        let shares = positive_or_absent(
            summary
                .and_then(|s| s.key_statistics)
                .and_then(|k| k.shares_outstanding.raw),
        );
        debug!(ticker = %ticker, ?shares, "yahoo shares outstanding");
        Ok(shares)
    }
}

impl std::fmt::Debug for YahooClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
