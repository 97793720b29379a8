//! HTTP client that re-issues inbound requests against the worker endpoint.
//!
//! Forwarding is strictly one-to-one: no retries, caching or coalescing.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::header::{CONTENT_TYPE, HeaderValue};
use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::Value;

use mediagate_core::Config;

use super::error::ProxyError;

/// Inbound headers that describe the gateway connection rather than the
/// request. `content-type` is replaced by the JSON policy.
const SKIPPED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "content-type",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "proxy-connection",
    "upgrade",
    "te",
    "trailer",
    "accept-encoding",
];

/// Settings for a [`WorkerClient`].
#[derive(Debug, Clone)]
pub struct WorkerClientConfig {
    /// Worker base URL (e.g. `http://localhost:5000`).
    pub base_url: String,
    /// Overall per-request timeout; `None` keeps the client default.
    pub timeout: Option<Duration>,
    /// Relay non-2xx worker responses with their own status code.
    pub preserve_status: bool,
}

impl WorkerClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
            preserve_status: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.worker.endpoint.clone(),
            timeout: config.gateway.request_timeout(),
            preserve_status: config.gateway.preserve_worker_status,
        }
    }
}

/// One inbound request, as received by the gateway.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Origin-form target: path plus optional `?query`.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn path(&self) -> &str {
        self.path_and_query
            .split_once('?')
            .map_or(self.path_and_query.as_str(), |(path, _)| path)
    }

    /// JSON body to send upstream. Bodiless methods send nothing; an empty
    /// body on any other method is sent as `{}`.
    pub fn json_body(&self) -> Result<Option<Value>, ProxyError> {
        if self.method == Method::GET || self.method == Method::HEAD {
            return Ok(None);
        }
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(Value::Object(serde_json::Map::new())));
        }
        serde_json::from_slice(&self.body)
            .map(Some)
            .map_err(|e| ProxyError::InvalidRequestBody(e.to_string()))
    }
}

/// The worker's answer, parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Client for the worker's HTTP API.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
    preserve_status: bool,
}

impl WorkerClient {
    /// Create a new worker API client.
    pub fn new(config: &WorkerClientConfig) -> Result<Self, ProxyError> {
        let base_url = config.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ProxyError::Config("worker base_url is empty".into()));
        }

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        // The worker is addressed directly; system proxy settings must not
        // reroute it.
        let mut builder = reqwest::Client::builder().no_proxy();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ProxyError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            preserve_status: config.preserve_status,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the worker URL for an origin-form request target.
    pub fn target_url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url, path_and_query)
        } else {
            format!("{}/{}", self.base_url, path_and_query)
        }
    }

    /// Forward `request` to the worker and parse its JSON response.
    ///
    /// Method, path and query reach the worker unchanged; only the host and
    /// port differ.
    pub async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let body = request.json_body()?;
        let url = self.target_url(&request.path_and_query);

        let mut builder = self
            .http
            .request(request.method, &url)
            .headers(forwarded_headers(&request.headers));
        if let Some(body) = body {
            let bytes = serde_json::to_vec(&body)
                .map_err(|e| ProxyError::InvalidRequestBody(e.to_string()))?;
            builder = builder.body(bytes);
        }

        let resp = builder.send().await.map_err(ProxyError::from_reqwest)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(ProxyError::from_reqwest)?;

        if !status.is_success() && !self.preserve_status {
            return Err(ProxyError::UpstreamStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let body = serde_json::from_slice(&bytes)
            .map_err(|e| ProxyError::InvalidResponse(e.to_string()))?;
        Ok(ProxyResponse { status, body })
    }
}

/// Copy every inbound header except connection-specific ones, then force
/// `content-type: application/json`.
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if SKIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}
