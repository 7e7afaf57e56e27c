//! Per-field provider cascade.
//!
//! Price and market cap resolve independently: a ticker's price can come
//! from the first provider while its market cap comes from the third. A
//! provider that answers with no usable value, errors, or is rate limited
//! simply yields to the next provider in priority order. Exhausting the
//! cascade leaves the field absent; nothing here ever substitutes zero.

use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::ProviderHandle;
use crate::error::ProviderError;
use crate::models::{FieldKind, Observation, Ticker, ValueSource};

/// Memoizes resolved observations for the duration of one acquisition run,
/// so retries and overlapping sector membership never refetch a ticker.
/// Dropped with the run; nothing in here outlives it.
#[derive(Debug, Default)]
pub struct RunCache {
    observations: Mutex<HashMap<Ticker, Observation>>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, ticker: &Ticker) -> Option<Observation> {
        self.observations.lock().await.get(ticker).cloned()
    }

    async fn put(&self, observation: Observation) {
        self.observations
            .lock()
            .await
            .insert(observation.ticker.clone(), observation);
    }
}

pub struct Resolver {
    cascade: Vec<ProviderHandle>,
    cache: RunCache,
}

impl Resolver {
    pub fn new(cascade: Vec<ProviderHandle>) -> Self {
        Self {
            cascade,
            cache: RunCache::new(),
        }
    }

    pub fn provider_count(&self) -> usize {
        self.cascade.len()
    }

    /// Resolve both fields for one ticker, walking the cascade per field.
    ///
    /// When no provider has a market cap but a price resolved, tries to
    /// derive one as shares outstanding x price.
    pub async fn resolve(&self, ticker: &Ticker, date: NaiveDate) -> Observation {
        if let Some(cached) = self.cache.get(ticker).await {
            debug!(ticker = %ticker, "run cache hit");
            return cached;
        }

        let mut observation = Observation::empty(ticker.clone(), date);
        for field in FieldKind::ALL {
            if let Some((value, source)) = self.resolve_field(ticker, field).await {
                observation.set(field, value, source);
            }
        }

        if observation.market_cap.is_none() {
            if let Some(price) = observation.price {
                if let Some(market_cap) = self.derive_market_cap(ticker, price).await {
                    observation.set(FieldKind::MarketCap, market_cap, ValueSource::Calculated);
                }
            }
        }

        self.cache.put(observation.clone()).await;
        observation
    }

    async fn resolve_field(
        &self,
        ticker: &Ticker,
        field: FieldKind,
    ) -> Option<(f64, ValueSource)> {
        for handle in &self.cascade {
            let provider = handle.client.id();
            handle.limiter.acquire().await;
            let result = match field {
                FieldKind::Price => handle.client.fetch_price(ticker).await,
                FieldKind::MarketCap => handle.client.fetch_market_cap(ticker).await,
            };
            match result {
                Ok(Some(value)) => {
                    handle.limiter.note_success().await;
                    debug!(ticker = %ticker, %field, provider, value, "field resolved");
                    return Some((value, ValueSource::provider(provider)));
                }
                Ok(None) => {
                    handle.limiter.note_success().await;
                    debug!(ticker = %ticker, %field, provider, "provider had no value");
                }
                Err(ProviderError::RateLimited { .. }) => {
                    warn!(ticker = %ticker, %field, provider, "provider rate limited, cascading");
                    handle.limiter.note_rate_limited().await;
                }
                Err(err) => {
                    warn!(ticker = %ticker, %field, provider, error = %err, "provider failed, cascading");
                }
            }
        }
        None
    }

    async fn derive_market_cap(&self, ticker: &Ticker, price: f64) -> Option<f64> {
        for handle in &self.cascade {
            handle.limiter.acquire().await;
            match handle.client.shares_outstanding(ticker).await {
                Ok(Some(shares)) => {
                    handle.limiter.note_success().await;
                    let market_cap = shares * price;
                    if market_cap.is_finite() && market_cap > 0.0 {
                        debug!(
                            ticker = %ticker,
                            provider = handle.client.id(),
                            market_cap,
                            "market cap derived from shares outstanding"
                        );
                        return Some(market_cap);
                    }
                }
                Ok(None) => {
                    handle.limiter.note_success().await;
                }
                Err(ProviderError::RateLimited { .. }) => {
                    handle.limiter.note_rate_limited().await;
                }
                Err(err) => {
                    debug!(ticker = %ticker, error = %err, "shares lookup failed");
                }
            }
        }
        None
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("providers", &self.cascade.len())
            .finish_non_exhaustive()
    }
}
