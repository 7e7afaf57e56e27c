//! Scripted in-memory providers for cascade and pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use market_pulse::api::{ProviderClient, ProviderHandle};
use market_pulse::error::ProviderError;
use market_pulse::models::Ticker;
use market_pulse::rate_limiter::ProviderLimiter;

/// What a scripted provider answers for one field of one ticker. Tickers
/// with no entry answer `Absent`.
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Value(f64),
    Absent,
    RateLimited,
    Fail,
}

impl Answer {
    fn resolve(self, provider: &'static str) -> Result<Option<f64>, ProviderError> {
        match self {
            Answer::Value(v) => Ok(Some(v)),
            Answer::Absent => Ok(None),
            Answer::RateLimited => Err(ProviderError::RateLimited { provider }),
            Answer::Fail => Err(ProviderError::transient(provider, "scripted failure")),
        }
    }
}

/// A provider whose answers are fixed up front. Counts calls per field so
/// tests can assert which providers were actually consulted.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    id: &'static str,
    prices: HashMap<String, Answer>,
    market_caps: HashMap<String, Answer>,
    shares: HashMap<String, Answer>,
    pub price_calls: AtomicUsize,
    pub market_cap_calls: AtomicUsize,
    pub shares_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn price(mut self, symbol: &str, answer: Answer) -> Self {
        self.prices.insert(symbol.to_string(), answer);
        self
    }

    pub fn market_cap(mut self, symbol: &str, answer: Answer) -> Self {
        self.market_caps.insert(symbol.to_string(), answer);
        self
    }

    pub fn shares(mut self, symbol: &str, answer: Answer) -> Self {
        self.shares.insert(symbol.to_string(), answer);
        self
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn fetch_price(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.prices
            .get(ticker.as_str())
            .copied()
            .unwrap_or(Answer::Absent)
            .resolve(self.id)
    }

    async fn fetch_market_cap(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        self.market_cap_calls.fetch_add(1, Ordering::SeqCst);
        self.market_caps
            .get(ticker.as_str())
            .copied()
            .unwrap_or(Answer::Absent)
            .resolve(self.id)
    }

    async fn shares_outstanding(&self, ticker: &Ticker) -> Result<Option<f64>, ProviderError> {
        self.shares_calls.fetch_add(1, Ordering::SeqCst);
        self.shares
            .get(ticker.as_str())
            .copied()
            .unwrap_or(Answer::Absent)
            .resolve(self.id)
    }
}

/// Wrap a scripted provider with a limiter generous enough to never stall a
/// test.
pub fn handle(client: Arc<ScriptedProvider>) -> ProviderHandle {
    let limiter = Arc::new(ProviderLimiter::new(
        client.id(),
        6_000,
        Duration::from_millis(1),
        Duration::from_millis(10),
    ));
    ProviderHandle::new(client, limiter)
}
