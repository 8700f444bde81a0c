use anyhow::Result;
use mfbridge::fx::FxClient;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn latest_rate_is_extracted_from_the_response() -> Result<()> {
    let server = MockServer::start().await;
    let client = FxClient::new().with_base_url(server.uri());

    let body = r#"{
        "amount": 1.0,
        "base": "MYR",
        "date": "2026-08-28",
        "rates": {
            "JPY": 33.25
        }
    }"#;

    Mock::given(method("GET"))
        .and(path("/latest"))
        .and(query_param("from", "MYR"))
        .and(query_param("to", "JPY"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let rate = client.rate("MYR", "JPY").await?;
    assert!((rate - 33.25).abs() < 1e-9);

    Ok(())
}

#[tokio::test]
async fn missing_quote_currency_is_an_error() -> Result<()> {
    let server = MockServer::start().await;
    let client = FxClient::new().with_base_url(server.uri());

    let body = r#"{
        "amount": 1.0,
        "base": "USD",
        "date": "2026-08-28",
        "rates": {
            "EUR": 0.91
        }
    }"#;

    Mock::given(method("GET"))
        .and(path("/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let err = client.rate("USD", "JPY").await.unwrap_err();
    assert!(err.to_string().contains("JPY"));

    Ok(())
}

#[tokio::test]
async fn server_errors_propagate() {
    let server = MockServer::start().await;
    let client = FxClient::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/latest"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(client.rate("USD", "JPY").await.is_err());
}
