//! Tests for the worker client and proxy error mapping.

#![allow(clippy::unwrap_used)]

use axum::body::Bytes;
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::json;

use super::client::{ProxyRequest, WorkerClient, WorkerClientConfig, forwarded_headers};
use super::error::ProxyError;

fn request(method: Method, target: &str, body: &'static str) -> ProxyRequest {
    ProxyRequest {
        method,
        path_and_query: target.to_string(),
        headers: HeaderMap::new(),
        body: Bytes::from_static(body.as_bytes()),
    }
}

// =============================================================================
// Client construction
// =============================================================================

#[test]
fn empty_base_url_returns_config_error() {
    let err = WorkerClient::new(&WorkerClientConfig::new("  ")).unwrap_err();
    assert!(matches!(err, ProxyError::Config(_)));
}

#[test]
fn trailing_slash_stripped_from_base_url() {
    let client = WorkerClient::new(&WorkerClientConfig::new("http://localhost:5000/")).unwrap();
    assert_eq!(client.base_url(), "http://localhost:5000");
    assert_eq!(
        client.target_url("/api/health"),
        "http://localhost:5000/api/health"
    );
}

#[test]
fn target_url_keeps_path_and_query() {
    let client = WorkerClient::new(&WorkerClientConfig::new("http://localhost:5000")).unwrap();
    assert_eq!(
        client.target_url("/api/search?q=lofi%20beats&limit=5"),
        "http://localhost:5000/api/search?q=lofi%20beats&limit=5"
    );
    assert_eq!(
        client.target_url("api/status/42"),
        "http://localhost:5000/api/status/42"
    );
}

// =============================================================================
// Header policy
// =============================================================================

#[test]
fn forwarded_headers_force_json_content_type() {
    let mut inbound = HeaderMap::new();
    inbound.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    let headers = forwarded_headers(&inbound);
    assert_eq!(headers.get_all(CONTENT_TYPE).iter().count(), 1);
    assert_eq!(headers[CONTENT_TYPE], "application/json");
}

#[test]
fn forwarded_headers_drop_connection_specific_ones() {
    let mut inbound = HeaderMap::new();
    inbound.insert(HOST, HeaderValue::from_static("gateway:3000"));
    inbound.insert("content-length", HeaderValue::from_static("12"));
    inbound.insert("connection", HeaderValue::from_static("keep-alive"));
    inbound.insert("accept-encoding", HeaderValue::from_static("gzip"));
    inbound.insert("x-request-id", HeaderValue::from_static("abc"));
    inbound.append("accept-language", HeaderValue::from_static("tr"));
    inbound.append("accept-language", HeaderValue::from_static("en"));

    let headers = forwarded_headers(&inbound);
    assert!(headers.get(HOST).is_none());
    assert!(headers.get("content-length").is_none());
    assert!(headers.get("connection").is_none());
    assert!(headers.get("accept-encoding").is_none());
    assert_eq!(headers["x-request-id"], "abc");
    let languages: Vec<_> = headers.get_all("accept-language").iter().collect();
    assert_eq!(languages, vec!["tr", "en"]);
}

// =============================================================================
// Body policy
// =============================================================================

#[test]
fn get_and_head_send_no_body() {
    assert_eq!(request(Method::GET, "/api/x", r#"{"a":1}"#).json_body().unwrap(), None);
    assert_eq!(request(Method::HEAD, "/api/x", "").json_body().unwrap(), None);
}

#[test]
fn empty_body_becomes_empty_object() {
    let body = request(Method::POST, "/api/clear", " \n").json_body().unwrap();
    assert_eq!(body, Some(json!({})));
    let body = request(Method::DELETE, "/api/cancel/1", "").json_body().unwrap();
    assert_eq!(body, Some(json!({})));
}

#[test]
fn json_body_is_passed_through() {
    let body = request(
        Method::POST,
        "/api/download/mp3",
        r#"{"url":"https://youtu.be/x","quality":"best"}"#,
    )
    .json_body()
    .unwrap();
    assert_eq!(body, Some(json!({"url": "https://youtu.be/x", "quality": "best"})));
}

#[test]
fn invalid_json_body_is_rejected() {
    let err = request(Method::PUT, "/api/x", "url=foo").json_body().unwrap_err();
    assert!(matches!(err, ProxyError::InvalidRequestBody(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[test]
fn path_excludes_query() {
    assert_eq!(request(Method::GET, "/api/search?q=x", "").path(), "/api/search");
    assert_eq!(request(Method::GET, "/api/health", "").path(), "/api/health");
}

// =============================================================================
// Error envelope
// =============================================================================

#[test]
fn worker_side_errors_map_to_500() {
    let err = ProxyError::UpstreamStatus {
        status: 404,
        body: r#"{"error":"not found"}"#.into(),
    };
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = err.envelope();
    assert_eq!(envelope.error, "Worker API error response");
    assert_eq!(envelope.message, "Worker API responded with status 404");

    let err = ProxyError::InvalidResponse("expected value at line 1 column 1".into());
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.envelope().error, "Worker API invalid response");
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = WorkerClient::new(&WorkerClientConfig::new(format!("http://{addr}"))).unwrap();
    let err = client
        .forward(request(Method::GET, "/api/search?q=x", ""))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::Unreachable(_)), "got {err:?}");
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = err.envelope();
    assert_eq!(envelope.error, "Worker API connection error");
    assert!(!envelope.message.is_empty());
}

#[tokio::test]
async fn invalid_body_never_reaches_worker() {
    // Nothing listens here; the body check must fail first.
    let client = WorkerClient::new(&WorkerClientConfig::new("http://127.0.0.1:9")).unwrap();
    let err = client
        .forward(request(Method::POST, "/api/download", "{oops"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidRequestBody(_)));
}
