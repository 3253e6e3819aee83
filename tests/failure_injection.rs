//! Failure injection tests for multi-endpoint fetching.

use confd::fetch::{ContentEncoding, FetchError, FetchRequest, Fetcher};
use confd::hash::ContentHash;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::{Method, StatusCode};
use std::io::Write;
use std::time::Duration;

mod common;
use common::{start_mock_endpoint, MockResponse};

fn request(timeout: Duration) -> FetchRequest {
    FetchRequest::new(Method::GET, "/v2/keys/app", timeout)
}

#[tokio::test]
async fn test_slow_endpoint_falls_back() {
    let slow = start_mock_endpoint(|_| {
        MockResponse::new(200, r#"{"from":"slow"}"#).delayed(Duration::from_secs(2))
    })
    .await;
    let fast = start_mock_endpoint(|_| MockResponse::new(200, r#"{"from":"fast"}"#)).await;

    let fetcher = Fetcher::new().unwrap();
    let endpoints = vec![slow.url.clone(), fast.url.clone()];

    // the order is shuffled; run enough times to see both orders
    for _ in 0..4 {
        let result = fetcher
            .fetch(&endpoints, &request(Duration::from_millis(300)))
            .await
            .unwrap();
        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(result.body, br#"{"from":"fast"}"#);
        assert_eq!(result.endpoint, fast.url);
    }
    assert_eq!(fast.hits(), 4);
}

#[tokio::test]
async fn test_server_errors_fall_back() {
    let broken = start_mock_endpoint(|_| MockResponse::new(503, "unavailable")).await;
    let healthy = start_mock_endpoint(|_| MockResponse::new(200, "{}")).await;

    let fetcher = Fetcher::new().unwrap();
    let endpoints = vec![broken.url.clone(), healthy.url.clone()];
    let result = fetcher.fetch(&endpoints, &request(Duration::from_secs(2))).await.unwrap();
    assert_eq!(result.endpoint, healthy.url);
}

#[tokio::test]
async fn test_client_errors_are_terminal() {
    let missing = start_mock_endpoint(|_| MockResponse::new(404, r#"{"errorCode":100}"#)).await;
    let fetcher = Fetcher::new().unwrap();

    let result = fetcher
        .fetch(&[missing.url.clone()], &request(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(result.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.hits(), 1);
}

#[tokio::test]
async fn test_all_endpoints_timing_out() {
    let slow = start_mock_endpoint(|_| MockResponse::new(200, "{}").delayed(Duration::from_secs(2))).await;
    let fetcher = Fetcher::new().unwrap();

    let err = fetcher
        .fetch(&[slow.url.clone(), slow.url.clone()], &request(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Timeout(_)));
}

#[tokio::test]
async fn test_all_endpoints_failing() {
    let broken = start_mock_endpoint(|_| MockResponse::new(500, "boom")).await;
    let fetcher = Fetcher::new().unwrap();

    let err = fetcher
        .fetch(&[broken.url.clone()], &request(Duration::from_secs(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Exhausted));
    assert_eq!(broken.hits(), 1);
}

#[tokio::test]
async fn test_gzip_body_is_decompressed_before_hashing() {
    let document = br#"{"host":"db1","port":5432}"#;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(document).unwrap();
    let compressed = encoder.finish().unwrap();

    let endpoint = start_mock_endpoint(move |_| {
        MockResponse::new(200, compressed.clone()).header("Content-Encoding", "gzip")
    })
    .await;

    let result = Fetcher::new()
        .unwrap()
        .fetch(&[endpoint.url.clone()], &request(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(result.status, StatusCode::OK);
    assert_eq!(result.body, document);
    assert_eq!(result.hash, ContentHash::of(document));

    let accepted = endpoint.requests()[0].header("accept-encoding").unwrap_or_default().to_string();
    assert!(accepted.contains("gzip"), "accept-encoding was {accepted:?}");
}

#[tokio::test]
async fn test_identity_encoding_is_requested() {
    let endpoint = start_mock_endpoint(|_| MockResponse::new(200, "{}")).await;
    let request = request(Duration::from_secs(2)).encoding(ContentEncoding::Identity);

    Fetcher::new().unwrap().fetch(&[endpoint.url.clone()], &request).await.unwrap();
    assert_eq!(endpoint.requests()[0].header("accept-encoding"), Some("identity"));
}
