//! End-to-end acquisition runs over scripted providers.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use market_pulse::collector::Collector;
use market_pulse::models::{FieldKind, MacroSnapshot, ScoreCategory, ScoreScope, ValueSource};

use crate::common::api_mock::{handle, Answer, ScriptedProvider};
use crate::common::database::fresh_store;
use crate::common::{all_favourable_macros, date, friday, test_config, ticker};

/// Finnhub-first cascade: AAPL's market cap only exists at Yahoo, MSFT is
/// fully served by Finnhub.
fn split_cascade() -> Vec<market_pulse::api::ProviderHandle> {
    let finnhub = Arc::new(
        ScriptedProvider::new("finnhub")
            .price("AAPL", Answer::Value(150.0))
            .price("MSFT", Answer::Value(300.0))
            .market_cap("MSFT", Answer::Value(2.0e12)),
    );
    let yahoo = Arc::new(ScriptedProvider::new("yahoo").market_cap("AAPL", Answer::Value(2.4e12)));
    vec![handle(finnhub), handle(yahoo)]
}

#[tokio::test]
async fn run_resolves_each_field_from_the_first_provider_that_has_it() {
    let test_store = fresh_store().await;
    let collector = Collector::with_cascade(test_config(), test_store.store.clone(), split_cascade());

    let summary = collector.run(friday(), &MacroSnapshot::default()).await.unwrap();
    assert_eq!(summary.date, friday());
    assert_eq!(summary.universe, 2);
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.fields_written, 4);
    assert_eq!(summary.coverage.authentic, 4);
    assert_eq!(summary.coverage.missing, 0);
    assert!(summary.coverage.is_complete());

    let store = &test_store.store;
    let (_, source) = store
        .value_on(&ticker("AAPL"), FieldKind::Price, friday())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source, ValueSource::provider("finnhub"));
    let (cap, source) = store
        .value_on(&ticker("AAPL"), FieldKind::MarketCap, friday())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cap, 2.4e12);
    assert_eq!(source, ValueSource::provider("yahoo"));
}

#[tokio::test]
async fn run_seeds_the_spine_and_records_scores() {
    let test_store = fresh_store().await;
    let config = test_config();
    let seed_window = config.seed_window_days;
    let collector = Collector::with_cascade(config, test_store.store.clone(), split_cascade());

    let summary = collector.run(friday(), &all_favourable_macros()).await.unwrap();

    // First run seeds a business-day window plus the target day.
    let spine = test_store.store.trading_days_through(friday()).await.unwrap();
    assert!(spine.len() >= seed_window);
    assert_eq!(*spine.last().unwrap(), friday());

    // One sector score plus the composite pulse land in the ledger.
    assert_eq!(summary.sector_scores.len(), 1);
    let pulse = summary.pulse.expect("pulse for a scored run");
    assert_eq!(pulse.category, ScoreCategory::Bullish);

    let recorded = test_store.store.sentiment_on(friday()).await.unwrap();
    assert_eq!(recorded.len(), 2);
    assert!(recorded.iter().any(|s| s.scope == ScoreScope::Composite));
    assert!(recorded
        .iter()
        .any(|s| s.scope == ScoreScope::Sector("Tech".to_string())));
}

#[tokio::test]
async fn weekend_runs_use_the_prior_business_day() {
    let test_store = fresh_store().await;
    let collector = Collector::with_cascade(test_config(), test_store.store.clone(), split_cascade());

    let saturday = date(2025, 5, 3);
    let summary = collector.run(saturday, &MacroSnapshot::default()).await.unwrap();
    assert_eq!(summary.date, friday());

    // The Saturday read serves Friday's row.
    let row = test_store.store.daily_row(saturday).await.unwrap();
    assert!(row.iter().all(|o| o.date == friday()));
}

#[tokio::test]
async fn run_without_providers_still_scores_macro_sentiment() {
    let test_store = fresh_store().await;
    let collector = Collector::with_cascade(test_config(), test_store.store.clone(), Vec::new());

    let summary = collector.run(friday(), &all_favourable_macros()).await.unwrap();
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.coverage.missing, summary.coverage.total_fields);

    // No history means no momentum, but the macro component still scores.
    let (snapshot, score) = &summary.sector_scores[0];
    assert_eq!(snapshot.momentum_pct, None);
    assert_eq!(score.category, ScoreCategory::Bullish);
}

#[tokio::test]
async fn rerunning_a_completed_date_is_idempotent() {
    let test_store = fresh_store().await;
    let collector = Collector::with_cascade(test_config(), test_store.store.clone(), split_cascade());

    let first = collector.run(friday(), &MacroSnapshot::default()).await.unwrap();
    assert_eq!(first.fetched, 2);

    // The second run finds both tickers authentic and fetches nothing.
    let second = collector.run(friday(), &MacroSnapshot::default()).await.unwrap();
    assert_eq!(second.fetched, 0);
    assert_eq!(second.already_complete, 2);
    assert_eq!(first.coverage.authentic, second.coverage.authentic);

    let scores = test_store.store.sentiment_on(friday()).await.unwrap();
    assert_eq!(scores.len(), 2);
}

#[tokio::test]
async fn backfill_only_fills_without_fetching() {
    let test_store = fresh_store().await;
    let config = test_config();

    let collector = Collector::with_cascade(config.clone(), test_store.store.clone(), split_cascade());
    let thursday = date(2025, 5, 1);
    collector.run(thursday, &MacroSnapshot::default()).await.unwrap();

    // No providers at all: the backfill command still completes the day.
    let collector = Collector::with_cascade(config, test_store.store.clone(), Vec::new());
    let report = collector.backfill_only(friday(), None).await.unwrap();
    assert_eq!(report.filled, 4);

    let (price, source) = test_store
        .store
        .value_on(&ticker("MSFT"), FieldKind::Price, friday())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(price, 300.0);
    assert_eq!(source, ValueSource::Backfill);
}

#[tokio::test]
async fn later_runs_backfill_from_earlier_values() {
    let test_store = fresh_store().await;
    let config = test_config();

    // Day one: full data for both tickers.
    let collector = Collector::with_cascade(config.clone(), test_store.store.clone(), split_cascade());
    let thursday = date(2025, 5, 1);
    collector.run(thursday, &MacroSnapshot::default()).await.unwrap();

    // Day two: every provider comes up empty. Backfill carries Thursday's
    // values forward and coverage stays complete, just not authentic.
    let empty = Arc::new(ScriptedProvider::new("finnhub"));
    let collector = Collector::with_cascade(config, test_store.store.clone(), vec![handle(empty)]);
    let summary = collector.run(friday(), &MacroSnapshot::default()).await.unwrap();

    assert_eq!(summary.coverage.missing, 0);
    assert_eq!(summary.coverage.backfilled, 4);
    let (price, source) = test_store
        .store
        .value_on(&ticker("AAPL"), FieldKind::Price, friday())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(price, 150.0);
    assert_eq!(source, ValueSource::Backfill);
}
