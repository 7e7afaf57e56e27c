//! Provider clients against wiremock servers: response parsing, the
//! zero-as-absent rule and rate-limit classification.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use market_pulse::api::{AlphaVantageClient, FinnhubClient, ProviderClient, YahooClient};

use crate::common::ticker;

const TIMEOUT: Duration = Duration::from_secs(5);

fn finnhub(server: &MockServer) -> FinnhubClient {
    FinnhubClient::new("test-key".to_string(), TIMEOUT).with_base_url(server.uri())
}

fn yahoo(server: &MockServer) -> YahooClient {
    YahooClient::new(TIMEOUT).with_base_url(server.uri())
}

fn alpha_vantage(server: &MockServer) -> AlphaVantageClient {
    AlphaVantageClient::new("test-key".to_string(), TIMEOUT).with_base_url(server.uri())
}

#[tokio::test]
async fn finnhub_parses_quote_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .and(query_param("symbol", "AAPL"))
        .and(query_param("token", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "c": 150.25, "h": 151.0, "l": 149.0, "o": 149.5, "pc": 148.9
        })))
        .mount(&server)
        .await;

    let price = finnhub(&server).fetch_price(&ticker("AAPL")).await.unwrap();
    assert_eq!(price, Some(150.25));
}

#[tokio::test]
async fn finnhub_zero_price_is_absent() {
    // Finnhub answers unknown symbols with a zeroed quote.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"c": 0.0})))
        .mount(&server)
        .await;

    let price = finnhub(&server).fetch_price(&ticker("WAT.X")).await.unwrap();
    assert_eq!(price, None);
}

#[tokio::test]
async fn finnhub_scales_market_cap_from_millions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stock/profile2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "marketCapitalization": 2_400_000.0, "name": "Apple Inc"
        })))
        .mount(&server)
        .await;

    let cap = finnhub(&server)
        .fetch_market_cap(&ticker("AAPL"))
        .await
        .unwrap();
    assert_eq!(cap, Some(2.4e12));
}

#[tokio::test]
async fn finnhub_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = finnhub(&server)
        .fetch_price(&ticker("AAPL"))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn finnhub_garbage_body_is_absent_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let price = finnhub(&server).fetch_price(&ticker("AAPL")).await.unwrap();
    assert_eq!(price, None);
}

#[tokio::test]
async fn yahoo_parses_quote_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/MSFT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteSummary": {
                "result": [{
                    "price": {
                        "regularMarketPrice": {"raw": 300.5, "fmt": "300.50"},
                        "marketCap": {"raw": 2.2e12, "fmt": "2.2T"}
                    },
                    "defaultKeyStatistics": {
                        "sharesOutstanding": {"raw": 7.4e9, "fmt": "7.4B"}
                    }
                }],
                "error": null
            }
        })))
        .mount(&server)
        .await;

    let client = yahoo(&server);
    let msft = ticker("MSFT");
    assert_eq!(client.fetch_price(&msft).await.unwrap(), Some(300.5));
    assert_eq!(client.fetch_market_cap(&msft).await.unwrap(), Some(2.2e12));
    assert_eq!(client.shares_outstanding(&msft).await.unwrap(), Some(7.4e9));
}

#[tokio::test]
async fn yahoo_empty_result_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/NOPE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteSummary": {"result": [], "error": null}
        })))
        .mount(&server)
        .await;

    let price = yahoo(&server).fetch_price(&ticker("NOPE")).await.unwrap();
    assert_eq!(price, None);
}

#[tokio::test]
async fn alpha_vantage_parses_string_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "GLOBAL_QUOTE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Global Quote": {"01. symbol": "AAPL", "05. price": "150.2500"}
        })))
        .mount(&server)
        .await;

    let price = alpha_vantage(&server)
        .fetch_price(&ticker("AAPL"))
        .await
        .unwrap();
    assert_eq!(price, Some(150.25));
}

#[tokio::test]
async fn alpha_vantage_note_is_rate_limited_despite_200() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."
        })))
        .mount(&server)
        .await;

    let err = alpha_vantage(&server)
        .fetch_price(&ticker("AAPL"))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn alpha_vantage_parses_overview_market_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "OVERVIEW"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Symbol": "AAPL", "MarketCapitalization": "2400000000000"
        })))
        .mount(&server)
        .await;

    let cap = alpha_vantage(&server)
        .fetch_market_cap(&ticker("AAPL"))
        .await
        .unwrap();
    assert_eq!(cap, Some(2.4e12));
}
