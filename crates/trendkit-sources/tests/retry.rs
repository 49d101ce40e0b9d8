//! Retry bounds for `fetch_with_retry` against a local `wiremock` server.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trendkit_sources::{fetch_with_retry, RetryPolicy, SourceError};

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("test client")
}

#[tokio::test]
async fn always_503_makes_exactly_max_attempts_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = client();
    let url = format!("{}/flaky", server.uri());
    let result = fetch_with_retry(RetryPolicy::immediate(3), || client.get(&url)).await;

    assert!(
        matches!(result, Err(SourceError::UnexpectedStatus { status: 503, .. })),
        "expected terminal 503, got: {result:?}"
    );
    server.verify().await;
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let url = format!("{}/missing", server.uri());
    let result = fetch_with_retry(RetryPolicy::immediate(3), || client.get(&url)).await;

    assert!(matches!(
        result,
        Err(SourceError::UnexpectedStatus { status: 404, .. })
    ));
    server.verify().await;
}

#[tokio::test]
async fn rate_limit_is_classified_and_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client();
    let url = format!("{}/limited", server.uri());
    let result = fetch_with_retry(RetryPolicy::immediate(2), || client.get(&url)).await;

    match result {
        Err(SourceError::RateLimited {
            retry_after_secs, ..
        }) => assert_eq!(retry_after_secs, Some(30)),
        other => panic!("expected RateLimited, got: {other:?}"),
    }
    server.verify().await;
}

#[tokio::test]
async fn recovers_when_upstream_comes_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let client = client();
    let url = format!("{}/recovering", server.uri());
    let response = fetch_with_retry(RetryPolicy::immediate(3), || client.get(&url))
        .await
        .expect("second attempt succeeds");
    assert_eq!(response.text().await.unwrap(), "ok");
}
