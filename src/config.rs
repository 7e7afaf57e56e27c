use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::PulseError;
use crate::models::Ticker;
use crate::sentiment::{Band, BandDirection};

/// How the composite pulse score weights sector scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseWeighting {
    Equal,
    MarketCap,
}

/// One macro indicator's contribution to sentiment: its configured weight and
/// the favourability band that turns its value into a -1/0/+1 signal.
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub name: String,
    /// Percentage weight. The full set is rescaled to sum to exactly 100%
    /// at startup (see `SentimentWeights::normalized`).
    pub weight: f64,
    pub band: Band,
}

/// Configured macro indicator weights plus the momentum blend parameters.
#[derive(Debug, Clone)]
pub struct SentimentWeights {
    pub indicators: Vec<IndicatorConfig>,
    /// Weight of the sector-momentum factor added on top of the macro score.
    pub momentum_weight: f64,
    /// Momentum percent mapped to a [-1, +1] factor: +/- this many percent
    /// saturates the factor.
    pub momentum_normalization_pct: f64,
}

impl SentimentWeights {
    /// Indicator weights rescaled proportionally so they sum to exactly 1.0.
    ///
    /// A weight set that does not sum to 100% is a configuration
    /// inconsistency: it is auto-corrected here with a logged warning rather
    /// than silently combining with a drifted total.
    pub fn normalized(&self) -> Vec<(String, f64, Band)> {
        let total: f64 = self.indicators.iter().map(|i| i.weight).sum();
        if total <= 0.0 {
            warn!("indicator weights sum to {total}; sentiment will use macro signals equally");
            let n = self.indicators.len().max(1) as f64;
            return self
                .indicators
                .iter()
                .map(|i| (i.name.clone(), 1.0 / n, i.band.clone()))
                .collect();
        }
        if (total - 100.0).abs() > 0.01 {
            warn!(
                "indicator weights sum to {total:.2}%, rescaling proportionally to 100%"
            );
        }
        self.indicators
            .iter()
            .map(|i| (i.name.clone(), i.weight / total, i.band.clone()))
            .collect()
    }
}

impl Default for SentimentWeights {
    fn default() -> Self {
        // Default grid: the tracked macro series, their weights and
        // favourability bands. "lower" bands are favourable at or below the
        // first threshold and unfavourable at or above the second; "higher"
        // bands are the reverse.
        let lower = |fav: f64, unfav: f64| Band::new(BandDirection::Lower, fav, unfav);
        let higher = |fav: f64, unfav: f64| Band::new(BandDirection::Higher, fav, unfav);
        let indicators = vec![
            ind("10Y_Treasury_Yield_%", 9.09, lower(3.25, 4.00)),
            ind("VIX", 9.09, lower(18.0, 25.0)),
            ind("NASDAQ_20d_gap_%", 15.45, higher(4.0, -4.0)),
            ind("Fed_Funds_Rate_%", 6.36, lower(4.5, 5.25)),
            ind("CPI_YoY_%", 6.36, lower(3.0, 4.0)),
            ind("PCEPI_YoY_%", 6.36, lower(3.0, 4.0)),
            ind("Real_GDP_Growth_%_SAAR", 6.36, higher(2.5, 1.0)),
            ind("Real_PCE_YoY_%", 6.36, higher(2.5, 1.0)),
            ind("Unemployment_%", 6.36, lower(4.5, 5.5)),
            ind("Software_Dev_Job_Postings_YoY_%", 6.36, higher(5.0, 0.0)),
            ind("PPI_Data_Processing_YoY_%", 6.36, higher(5.0, 0.0)),
            ind("PPI_Software_Publishers_YoY_%", 6.36, higher(5.0, 0.0)),
            ind("Consumer_Sentiment", 9.09, higher(100.0, 90.0)),
        ];
        Self {
            indicators,
            momentum_weight: 0.2,
            momentum_normalization_pct: 5.0,
        }
    }
}

fn ind(name: &str, weight: f64, band: Band) -> IndicatorConfig {
    IndicatorConfig {
        name: name.to_string(),
        weight,
        band,
    }
}

/// Static sector -> member-ticker mapping. Read-only at run start; tickers
/// may belong to multiple sectors.
#[derive(Debug, Clone)]
pub struct SectorMap {
    sectors: BTreeMap<String, Vec<Ticker>>,
}

impl SectorMap {
    pub fn new(sectors: BTreeMap<String, Vec<Ticker>>) -> Self {
        Self { sectors }
    }

    /// Load from a JSON file mapping sector name to a list of symbols.
    pub fn from_json_file(path: &Path) -> Result<Self, PulseError> {
        let content = fs::read_to_string(path)
            .map_err(|e| PulseError::Config(format!("cannot read {}: {e}", path.display())))?;
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
            .map_err(|e| PulseError::Config(format!("invalid sector map {}: {e}", path.display())))?;
        let mut sectors = BTreeMap::new();
        for (sector, symbols) in raw {
            let mut members = Vec::with_capacity(symbols.len());
            for symbol in &symbols {
                members.push(Ticker::new(symbol)?);
            }
            sectors.insert(sector, members);
        }
        Ok(Self { sectors })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Ticker])> {
        self.sectors
            .iter()
            .map(|(name, members)| (name.as_str(), members.as_slice()))
    }

    pub fn sector_names(&self) -> impl Iterator<Item = &str> {
        self.sectors.keys().map(String::as_str)
    }

    pub fn members(&self, sector: &str) -> &[Ticker] {
        self.sectors.get(sector).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sectors_for(&self, ticker: &Ticker) -> Vec<&str> {
        self.sectors
            .iter()
            .filter(|(_, members)| members.contains(ticker))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// All unique tickers across sectors, sorted. This is the fetch universe.
    pub fn all_tickers(&self) -> Vec<Ticker> {
        let mut all: Vec<Ticker> = self.sectors.values().flatten().cloned().collect();
        all.sort();
        all.dedup();
        all
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }
}

impl Default for SectorMap {
    fn default() -> Self {
        // The tracked technology sector universe.
        let raw: &[(&str, &[&str])] = &[
            ("AdTech", &["APP", "APPS", "CRTO", "DV", "GOOGL", "META", "MGNI", "PUBM", "TTD"]),
            ("AI Infrastructure", &["AMZN", "GOOGL", "IBM", "META", "MSFT", "NVDA", "ORCL"]),
            ("Cloud Infrastructure", &["AMZN", "CRM", "CSCO", "GOOGL", "MSFT", "NET", "ORCL", "SNOW"]),
            ("Consumer Internet", &["ABNB", "BKNG", "GOOGL", "META", "NFLX", "PINS", "SNAP", "SPOT", "TRIP", "YELP"]),
            ("Cybersecurity", &["CHKP", "CRWD", "CYBR", "FTNT", "NET", "OKTA", "PANW", "S", "ZS"]),
            ("Dev Tools / Analytics", &["DDOG", "ESTC", "GTLB", "MDB", "TEAM"]),
            ("eCommerce", &["AMZN", "BABA", "BKNG", "CHWY", "EBAY", "ETSY", "PDD", "SE", "SHOP", "WMT"]),
            ("Enterprise SaaS", &["ADSK", "AMZN", "CRM", "IBM", "MSFT", "NOW", "ORCL", "SAP", "WDAY"]),
            ("Fintech", &["ADYEY", "AFRM", "BILL", "COIN", "FIS", "FISV", "GPN", "PYPL", "SQ", "SSNC"]),
            ("Hardware / Devices", &["AAPL", "DELL", "HPQ", "LOGI", "PSTG", "SMCI", "SSYS", "STX", "WDC"]),
            ("IT Services / Legacy Tech", &["ACN", "CTSH", "DXC", "HPQ", "IBM", "INFY", "PLTR", "WIT"]),
            ("Semiconductors", &["AMAT", "AMD", "ARM", "AVGO", "INTC", "NVDA", "QCOM", "TSM"]),
            ("SMB SaaS", &["ADBE", "BILL", "GOOGL", "HUBS", "INTU", "META"]),
            ("Vertical SaaS", &["CCCS", "CPRT", "CSGP", "GWRE", "ICE", "PCOR", "SSNC", "TTAN"]),
        ];
        let sectors = raw
            .iter()
            .map(|(name, symbols)| {
                let members = symbols
                    .iter()
                    .map(|s| Ticker::new(s).expect("static sector map symbols are valid"))
                    .collect();
                (name.to_string(), members)
            })
            .collect();
        Self { sectors }
    }
}

/// Application configuration, loaded from environment variables (with a .env
/// file if present) plus optional JSON files for the sector map and weights.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub finnhub_rate_per_minute: u32,
    pub yahoo_rate_per_minute: u32,
    pub alpha_vantage_rate_per_minute: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Concurrent ticker fetches. Keep below the most restrictive provider's
    /// rate limit.
    pub fetch_workers: usize,
    pub ema_span: usize,
    /// Business days of empty spine seeded before the first real fetch.
    pub seed_window_days: usize,
    pub pulse_weighting: PulseWeighting,
    pub run_deadline_secs: Option<u64>,
    pub sectors: SectorMap,
    pub sentiment: SentimentWeights,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, PulseError> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let sectors = match std::env::var("SECTOR_CONFIG_PATH") {
            Ok(path) => SectorMap::from_json_file(Path::new(&path))?,
            Err(_) => SectorMap::default(),
        };

        let mut sentiment = SentimentWeights::default();
        if let Ok(path) = std::env::var("SENTIMENT_WEIGHTS_PATH") {
            apply_weight_overrides(&mut sentiment, Path::new(&path))?;
        }

        let pulse_weighting = match std::env::var("PULSE_WEIGHTING").as_deref() {
            Ok("market_cap") => PulseWeighting::MarketCap,
            Ok("equal") | Err(_) => PulseWeighting::Equal,
            Ok(other) => {
                return Err(PulseError::Config(format!(
                    "PULSE_WEIGHTING must be 'equal' or 'market_cap', got {other:?}"
                )))
            }
        };

        let config = Config {
            database_path: env_or("DATABASE_PATH", "market_pulse.db"),
            finnhub_api_key: std::env::var("FINNHUB_API_KEY").ok().filter(|k| !k.is_empty()),
            alpha_vantage_api_key: std::env::var("ALPHAVANTAGE_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 30),
            finnhub_rate_per_minute: env_parse("FINNHUB_RATE_PER_MINUTE", 60),
            yahoo_rate_per_minute: env_parse("YAHOO_RATE_PER_MINUTE", 120),
            alpha_vantage_rate_per_minute: env_parse("ALPHAVANTAGE_RATE_PER_MINUTE", 5),
            backoff_base_ms: env_parse("BACKOFF_BASE_MS", 1_000),
            backoff_max_ms: env_parse("BACKOFF_MAX_MS", 60_000),
            fetch_workers: env_parse("FETCH_WORKERS", 4),
            ema_span: env_parse("EMA_SPAN", 20),
            seed_window_days: env_parse("SEED_WINDOW_DAYS", 30),
            pulse_weighting,
            run_deadline_secs: std::env::var("RUN_DEADLINE_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
            sectors,
            sentiment,
        };

        info!(
            "configuration loaded: {} sectors, {} tickers, {} fetch workers",
            config.sectors.sector_count(),
            config.sectors.all_tickers().len(),
            config.fetch_workers
        );
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct WeightOverrides {
    #[serde(default)]
    indicators: BTreeMap<String, f64>,
    #[serde(default)]
    momentum_weight: Option<f64>,
    #[serde(default)]
    momentum_normalization_pct: Option<f64>,
}

fn apply_weight_overrides(
    sentiment: &mut SentimentWeights,
    path: &Path,
) -> Result<(), PulseError> {
    let content = fs::read_to_string(path)
        .map_err(|e| PulseError::Config(format!("cannot read {}: {e}", path.display())))?;
    let overrides: WeightOverrides = serde_json::from_str(&content)
        .map_err(|e| PulseError::Config(format!("invalid weights {}: {e}", path.display())))?;
    for (name, weight) in &overrides.indicators {
        match sentiment.indicators.iter_mut().find(|i| &i.name == name) {
            Some(indicator) => indicator.weight = *weight,
            None => {
                return Err(PulseError::Config(format!(
                    "weight override for unknown indicator {name:?}"
                )))
            }
        }
    }
    if let Some(w) = overrides.momentum_weight {
        sentiment.momentum_weight = w;
    }
    if let Some(n) = overrides.momentum_normalization_pct {
        sentiment.momentum_normalization_pct = n;
    }
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
