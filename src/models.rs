use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// A stock symbol. Immutable identity; validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Validate and wrap a symbol. Symbols must be non-empty, upper-case
    /// ASCII; dots and dashes are allowed for share classes (e.g. BRK.B).
    pub fn new(symbol: &str) -> Result<Self, PulseError> {
        let valid = !symbol.is_empty()
            && symbol.chars().all(|c| {
                c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-'
            });
        if valid {
            Ok(Self(symbol.to_string()))
        } else {
            Err(PulseError::InvalidTicker(symbol.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two tracked observation fields. Every resolver, store and backfill
/// operation is parameterized by this instead of being duplicated per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Price,
    MarketCap,
}

impl FieldKind {
    pub const ALL: [FieldKind; 2] = [FieldKind::Price, FieldKind::MarketCap];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Price => "price",
            FieldKind::MarketCap => "market_cap",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stored value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Fetched from the named provider.
    Provider(String),
    /// Derived as price x shares outstanding.
    Calculated,
    /// Propagated forward from the most recent known value.
    Backfill,
}

impl ValueSource {
    pub fn provider(id: &str) -> Self {
        Self::Provider(id.to_string())
    }

    /// TEXT form stored in the database.
    pub fn as_str(&self) -> &str {
        match self {
            ValueSource::Provider(id) => id,
            ValueSource::Calculated => "calculated",
            ValueSource::Backfill => "backfill",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "calculated" => ValueSource::Calculated,
            "backfill" => ValueSource::Backfill,
            other => ValueSource::Provider(other.to_string()),
        }
    }

    /// Authentic values (provider-fetched or calculated) may overwrite
    /// backfilled ones; backfill never overwrites anything.
    pub fn is_authentic(&self) -> bool {
        !matches!(self, ValueSource::Backfill)
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ticker's resolved values for one day. Ephemeral: created per fetch
/// attempt, merged into the store, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub ticker: Ticker,
    pub date: NaiveDate,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub price_source: Option<ValueSource>,
    pub market_cap_source: Option<ValueSource>,
}

impl Observation {
    pub fn empty(ticker: Ticker, date: NaiveDate) -> Self {
        Self {
            ticker,
            date,
            price: None,
            market_cap: None,
            price_source: None,
            market_cap_source: None,
        }
    }

    pub fn value(&self, field: FieldKind) -> Option<f64> {
        match field {
            FieldKind::Price => self.price,
            FieldKind::MarketCap => self.market_cap,
        }
    }

    pub fn source(&self, field: FieldKind) -> Option<&ValueSource> {
        match field {
            FieldKind::Price => self.price_source.as_ref(),
            FieldKind::MarketCap => self.market_cap_source.as_ref(),
        }
    }

    pub fn set(&mut self, field: FieldKind, value: f64, source: ValueSource) {
        match field {
            FieldKind::Price => {
                self.price = Some(value);
                self.price_source = Some(source);
            }
            FieldKind::MarketCap => {
                self.market_cap = Some(value);
                self.market_cap_source = Some(source);
            }
        }
    }
}

/// Derived per-sector aggregate for one day. Recomputed on demand from the
/// store, never independently mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorSnapshot {
    pub sector: String,
    pub date: NaiveDate,
    /// Sum of member market caps with a value; absent members are excluded,
    /// not zero-filled.
    pub total_market_cap: f64,
    /// Market-cap-weighted (price - EMA) / EMA in percent. None when no
    /// member has enough history.
    pub momentum_pct: Option<f64>,
    pub tickers_with_data: usize,
    pub total_tickers: usize,
}

/// Score scope: one sector, or the cross-sector composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScope {
    Sector(String),
    Composite,
}

impl ScoreScope {
    pub fn as_str(&self) -> &str {
        match self {
            ScoreScope::Sector(name) => name,
            ScoreScope::Composite => "composite",
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s == "composite" {
            ScoreScope::Composite
        } else {
            ScoreScope::Sector(s.to_string())
        }
    }
}

/// Sentiment categories over the normalized 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreCategory {
    Bearish,
    Neutral,
    Bullish,
}

impl ScoreCategory {
    /// [0,30) Bearish, [30,60) Neutral, [60,100] Bullish.
    pub fn from_normalized(score: f64) -> Self {
        if score < 30.0 {
            ScoreCategory::Bearish
        } else if score < 60.0 {
            ScoreCategory::Neutral
        } else {
            ScoreCategory::Bullish
        }
    }
}

impl fmt::Display for ScoreCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoreCategory::Bearish => "Bearish",
            ScoreCategory::Neutral => "Neutral",
            ScoreCategory::Bullish => "Bullish",
        };
        f.write_str(s)
    }
}

/// A derived sentiment score, appended to the immutable score ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentScore {
    pub date: NaiveDate,
    pub scope: ScoreScope,
    /// Raw weighted-sum score in [-1, +1].
    pub raw_score: f64,
    /// ((raw + 1) / 2) * 100, clamped to [0, 100].
    pub normalized_score: f64,
    pub category: ScoreCategory,
}

impl SentimentScore {
    pub fn from_raw(date: NaiveDate, scope: ScoreScope, raw: f64) -> Self {
        let raw = raw.clamp(-1.0, 1.0);
        let normalized = (((raw + 1.0) / 2.0) * 100.0).clamp(0.0, 100.0);
        Self {
            date,
            scope,
            raw_score: raw,
            normalized_score: normalized,
            category: ScoreCategory::from_normalized(normalized),
        }
    }
}

/// Macro indicator values supplied by the external macro-data collaborator.
/// Indicators missing from the snapshot simply contribute nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroSnapshot {
    values: HashMap<String, f64>,
}

impl MacroSnapshot {
    pub fn new(values: HashMap<String, f64>) -> Self {
        Self { values }
    }

    pub fn get(&self, indicator: &str) -> Option<f64> {
        self.values.get(indicator).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
