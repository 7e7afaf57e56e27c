//! Provider-cascade resolution order and per-field independence.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use market_pulse::models::{FieldKind, ValueSource};
use market_pulse::resolver::Resolver;

use crate::common::api_mock::{handle, Answer, ScriptedProvider};
use crate::common::{friday, ticker};

#[tokio::test]
async fn first_provider_wins_and_later_ones_are_not_consulted() {
    let first = Arc::new(
        ScriptedProvider::new("first")
            .price("AAPL", Answer::Value(150.0))
            .market_cap("AAPL", Answer::Value(2.4e12)),
    );
    let second = Arc::new(
        ScriptedProvider::new("second")
            .price("AAPL", Answer::Value(999.0))
            .market_cap("AAPL", Answer::Value(9.9e12)),
    );
    let resolver = Resolver::new(vec![handle(first.clone()), handle(second.clone())]);

    let obs = resolver.resolve(&ticker("AAPL"), friday()).await;
    assert_eq!(obs.price, Some(150.0));
    assert_eq!(obs.price_source, Some(ValueSource::provider("first")));
    assert_eq!(second.price_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.market_cap_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fields_resolve_independently() {
    // First provider has the price but no market cap; second has the cap.
    let first = Arc::new(ScriptedProvider::new("first").price("AAPL", Answer::Value(150.0)));
    let second = Arc::new(ScriptedProvider::new("second").market_cap("AAPL", Answer::Value(2.4e12)));
    let resolver = Resolver::new(vec![handle(first), handle(second)]);

    let obs = resolver.resolve(&ticker("AAPL"), friday()).await;
    assert_eq!(obs.price_source, Some(ValueSource::provider("first")));
    assert_eq!(obs.market_cap_source, Some(ValueSource::provider("second")));
    assert_eq!(obs.market_cap, Some(2.4e12));
}

#[tokio::test]
async fn rate_limited_provider_yields_to_the_next() {
    let first = Arc::new(ScriptedProvider::new("first").price("AAPL", Answer::RateLimited));
    let second = Arc::new(ScriptedProvider::new("second").price("AAPL", Answer::Value(151.0)));
    let resolver = Resolver::new(vec![handle(first), handle(second)]);

    let obs = resolver.resolve(&ticker("AAPL"), friday()).await;
    assert_eq!(obs.price, Some(151.0));
    assert_eq!(obs.price_source, Some(ValueSource::provider("second")));
}

#[tokio::test]
async fn failing_provider_yields_to_the_next() {
    let first = Arc::new(ScriptedProvider::new("first").price("AAPL", Answer::Fail));
    let second = Arc::new(ScriptedProvider::new("second").price("AAPL", Answer::Value(152.0)));
    let resolver = Resolver::new(vec![handle(first), handle(second)]);

    let obs = resolver.resolve(&ticker("AAPL"), friday()).await;
    assert_eq!(obs.price, Some(152.0));
}

#[tokio::test]
async fn exhausted_cascade_leaves_fields_absent() {
    let first = Arc::new(ScriptedProvider::new("first"));
    let second = Arc::new(ScriptedProvider::new("second").price("AAPL", Answer::Fail));
    let resolver = Resolver::new(vec![handle(first), handle(second)]);

    let obs = resolver.resolve(&ticker("AAPL"), friday()).await;
    assert_eq!(obs.price, None);
    assert_eq!(obs.market_cap, None);
    assert_eq!(obs.value(FieldKind::Price), None);
    assert_eq!(obs.price_source, None);
}

#[tokio::test]
async fn market_cap_derived_from_shares_when_no_provider_has_one() {
    let first = Arc::new(
        ScriptedProvider::new("first")
            .price("AAPL", Answer::Value(100.0))
            .shares("AAPL", Answer::Value(1.0e9)),
    );
    let resolver = Resolver::new(vec![handle(first)]);

    let obs = resolver.resolve(&ticker("AAPL"), friday()).await;
    assert_eq!(obs.market_cap, Some(1.0e11));
    assert_eq!(obs.market_cap_source, Some(ValueSource::Calculated));
}

#[tokio::test]
async fn derivation_is_skipped_without_a_price() {
    let first = Arc::new(ScriptedProvider::new("first").shares("AAPL", Answer::Value(1.0e9)));
    let resolver = Resolver::new(vec![handle(first.clone())]);

    let obs = resolver.resolve(&ticker("AAPL"), friday()).await;
    assert_eq!(obs.market_cap, None);
    assert_eq!(first.shares_calls.load(Ordering::SeqCst), 0);
}

mockall::mock! {
    pub Provider {}

    #[async_trait::async_trait]
    impl market_pulse::api::ProviderClient for Provider {
        fn id(&self) -> &'static str;
        async fn fetch_price(
            &self,
            ticker: &market_pulse::models::Ticker,
        ) -> Result<Option<f64>, market_pulse::error::ProviderError>;
        async fn fetch_market_cap(
            &self,
            ticker: &market_pulse::models::Ticker,
        ) -> Result<Option<f64>, market_pulse::error::ProviderError>;
        async fn shares_outstanding(
            &self,
            ticker: &market_pulse::models::Ticker,
        ) -> Result<Option<f64>, market_pulse::error::ProviderError>;
    }
}

fn mock_handle(mock: MockProvider) -> market_pulse::api::ProviderHandle {
    use market_pulse::rate_limiter::ProviderLimiter;
    use std::time::Duration;
    let limiter = Arc::new(ProviderLimiter::new(
        "mock",
        6_000,
        Duration::from_millis(1),
        Duration::from_millis(10),
    ));
    market_pulse::api::ProviderHandle::new(Arc::new(mock), limiter)
}

#[tokio::test]
async fn each_provider_is_consulted_exactly_once_per_field() {
    let mut first = MockProvider::new();
    first.expect_id().return_const("first");
    first.expect_fetch_price().times(1).returning(|_| Ok(None));
    first.expect_fetch_market_cap().times(1).returning(|_| Ok(None));
    first.expect_shares_outstanding().times(1).returning(|_| Ok(None));

    let mut second = MockProvider::new();
    second.expect_id().return_const("second");
    second
        .expect_fetch_price()
        .times(1)
        .returning(|_| Ok(Some(150.0)));
    second
        .expect_fetch_market_cap()
        .times(1)
        .returning(|_| Ok(None));
    second
        .expect_shares_outstanding()
        .times(1)
        .returning(|_| Ok(None));

    let resolver = Resolver::new(vec![mock_handle(first), mock_handle(second)]);
    let obs = resolver.resolve(&ticker("AAPL"), friday()).await;
    assert_eq!(obs.price, Some(150.0));
    assert_eq!(obs.market_cap, None);
}

#[tokio::test]
async fn run_cache_prevents_refetching() {
    let first = Arc::new(
        ScriptedProvider::new("first")
            .price("AAPL", Answer::Value(150.0))
            .market_cap("AAPL", Answer::Value(2.4e12)),
    );
    let resolver = Resolver::new(vec![handle(first.clone())]);

    let aapl = ticker("AAPL");
    resolver.resolve(&aapl, friday()).await;
    let calls_after_first = first.price_calls.load(Ordering::SeqCst);
    resolver.resolve(&aapl, friday()).await;
    assert_eq!(first.price_calls.load(Ordering::SeqCst), calls_after_first);
}
