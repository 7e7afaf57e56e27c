//! Shared test utilities: scripted providers, store fixtures and a small
//! two-ticker configuration.

pub mod api_mock;
pub mod database;

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use market_pulse::config::{Config, PulseWeighting, SectorMap, SentimentWeights};
use market_pulse::models::{MacroSnapshot, Ticker};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ticker(symbol: &str) -> Ticker {
    Ticker::new(symbol).unwrap()
}

/// A Friday, so weekend-redirect tests have the following Saturday handy.
pub fn friday() -> NaiveDate {
    date(2025, 5, 2)
}

/// Minimal configuration: one "Tech" sector holding AAPL and MSFT, a short
/// seed window and no run deadline.
pub fn test_config() -> Config {
    let mut sectors = BTreeMap::new();
    sectors.insert("Tech".to_string(), vec![ticker("AAPL"), ticker("MSFT")]);
    Config {
        database_path: ":memory:".to_string(),
        finnhub_api_key: None,
        alpha_vantage_api_key: None,
        request_timeout_secs: 5,
        finnhub_rate_per_minute: 600,
        yahoo_rate_per_minute: 600,
        alpha_vantage_rate_per_minute: 600,
        backoff_base_ms: 1,
        backoff_max_ms: 10,
        fetch_workers: 2,
        ema_span: 5,
        seed_window_days: 5,
        pulse_weighting: PulseWeighting::Equal,
        run_deadline_secs: None,
        sectors: SectorMap::new(sectors),
        sentiment: SentimentWeights::default(),
    }
}

/// A macro snapshot where every default indicator sits deep on its
/// favourable side, so the macro component contributes exactly +1.
pub fn all_favourable_macros() -> MacroSnapshot {
    let values: HashMap<String, f64> = [
        ("10Y_Treasury_Yield_%", 2.0),
        ("VIX", 12.0),
        ("NASDAQ_20d_gap_%", 8.0),
        ("Fed_Funds_Rate_%", 3.0),
        ("CPI_YoY_%", 2.0),
        ("PCEPI_YoY_%", 2.0),
        ("Real_GDP_Growth_%_SAAR", 4.0),
        ("Real_PCE_YoY_%", 3.5),
        ("Unemployment_%", 3.8),
        ("Software_Dev_Job_Postings_YoY_%", 9.0),
        ("PPI_Data_Processing_YoY_%", 8.0),
        ("PPI_Software_Publishers_YoY_%", 7.0),
        ("Consumer_Sentiment", 105.0),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect();
    MacroSnapshot::new(values)
}
