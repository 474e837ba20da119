//! Service middleware for metrics and request correlation.
//!
//! ## Metrics Emitted
//!
//! All metrics are structured `tracing` events on the
//! `provenance_search::metrics` target:
//!
//! - `metric_type = "request"`: path, method, status, latency
//! - `metric_type = "search"`: emitted by the search engine per session
//! - `metric_type = "bundle"`: emitted by the search engine per visited bundle

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;

/// Header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Correlation id of a request.
///
/// Reuses an incoming `X-Request-Id` or the trace id of
/// `X-Cloud-Trace-Context`; generates a UUID otherwise.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("X-Cloud-Trace-Context")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split('/').next())
                .map(str::to_string)
        })
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Attach a [`RequestId`] to every request and echo it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = correlation_id(request.headers());
    request.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Metrics middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "provenance_search::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_sources() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Cloud-Trace-Context", HeaderValue::from_static("abc123/456;o=1"));
        assert_eq!(correlation_id(&headers), "abc123");

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-7"));
        assert_eq!(correlation_id(&headers), "req-7");

        let generated = correlation_id(&HeaderMap::new());
        assert!(uuid::Uuid::parse_str(&generated).is_ok());
    }
}
