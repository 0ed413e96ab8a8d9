mod common;

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use scrape_engine::{FailureKind, FetchRequest, FetchSettings, PageFetcher, ReqwestFetcher};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::init_logging;

fn request(url: String) -> FetchRequest {
    FetchRequest::new(url, Duration::from_secs(5))
}

#[tokio::test]
async fn fetcher_returns_decoded_html() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .and(header_exists("user-agent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><h1>Hello</h1></html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::default();
    let url = format!("{}/doc", server.uri());
    let page = fetcher.fetch(&request(url.clone())).await.expect("fetch ok");

    assert_eq!(page.final_url, url);
    assert_eq!(page.html, "<html><h1>Hello</h1></html>");
}

#[tokio::test]
async fn non_success_status_reports_code_and_reason() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::default();
    let err = fetcher
        .fetch(&request(format!("{}/missing", server.uri())))
        .await
        .expect_err("404 must fail");

    assert_eq!(err.kind, FailureKind::HttpStatus(404));
    assert_eq!(err.to_string(), "HTTP 404: Not Found");
}

#[tokio::test]
async fn slow_response_times_out_within_bound() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::default();
    let started = Instant::now();
    let err = fetcher
        .fetch(&FetchRequest::new(
            format!("{}/slow", server.uri()),
            Duration::from_millis(300),
        ))
        .await
        .expect_err("must time out");

    assert_eq!(err.kind, FailureKind::Timeout);
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings {
        max_bytes: 1024,
        ..FetchSettings::default()
    });
    let err = fetcher
        .fetch(&request(format!("{}/big", server.uri())))
        .await
        .expect_err("must be too large");

    assert!(
        matches!(err.kind, FailureKind::TooLarge { max_bytes: 1024, .. }),
        "unexpected kind: {:?}",
        err.kind
    );
}

#[tokio::test]
async fn redirect_loop_hits_limit() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::default();
    let err = fetcher
        .fetch(&request(format!("{}/loop", server.uri())))
        .await
        .expect_err("must stop redirecting");

    assert_eq!(err.kind, FailureKind::RedirectLimitExceeded);
}

#[tokio::test]
async fn malformed_url_is_invalid() {
    init_logging();
    let fetcher = ReqwestFetcher::default();
    let err = fetcher
        .fetch(&request("not a url".to_string()))
        .await
        .expect_err("must reject");

    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn unreachable_host_is_network_failure() {
    init_logging();
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("free port");

    let fetcher = ReqwestFetcher::default();
    let err = fetcher
        .fetch(&request(format!("http://127.0.0.1:{port}/")))
        .await
        .expect_err("must fail");

    assert_eq!(err.kind, FailureKind::Network);
    assert!(!err.message.is_empty());
}
