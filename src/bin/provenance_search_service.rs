//! Provenance Search Service Binary
//!
//! Runs federated provenance search as a REST API service, and serves the
//! bundles found in `BUNDLE_DIR` to other services of the federation.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT`: Service port (default: 8002)
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `BUNDLE_DIR`: Directory of JSON bundle documents served locally (optional)
//! - `FEDERATION_TABLE_PATH`: JSON map of bundle-id prefix to service URL (optional)
//! - `SEARCH_CONCURRENCY`, `SEARCH_DEADLINE_SECS`, `SEARCH_MAX_RESULTS`,
//!   `SEARCH_MAX_VISITED`, `SEARCH_OMIT_EMPTY_RESULTS`,
//!   `SEARCH_PREFER_CONNECTOR_SERVICE`, `SEARCH_REQUIRE_INTEGRITY`,
//!   `SEARCH_DELEGATE_VERSION_PICK`: search tuning
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! BUNDLE_DIR=./bundles FEDERATION_TABLE_PATH=./federation.json \
//!   cargo run --bin provenance_search_service --features service
//! ```

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use provenance_search::service::{correlation_id, create_router, AppState, REQUEST_ID_HEADER};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "provenance_search_service=info,provenance_search=info,tower_http=info,reqwest=warn".into()
    });

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE))
            .init();
    } else {
        // Cloud Logging compatible
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init();
    }
}

/// Access log with latency, under the request's correlation id.
async fn request_logging_middleware(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    let trace_id = correlation_id(request.headers());

    // Pin the id so inner handlers report the same one.
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        request.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let response = next.run(request).instrument(span.clone()).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    span.record("status", status);
    span.record("latency_ms", latency.as_millis() as u64);

    info!(
        target: "provenance_search_service::access",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request completed"
    );

    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");

    info!(version = version, build_sha = build_sha, "Starting Provenance Search Service");

    let port: u16 = std::env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8002);
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

    let state = match AppState::from_env() {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize service state");
            return Err(e.into());
        }
    };

    let search = &state.search;
    info!(
        hosted_bundles = state.bundles.bundle_count(),
        federation_routes = search.federation().len(),
        validity_checks = search.validity().len(),
        validity_fingerprint = %search.validity().fingerprint(),
        concurrency = search.config().concurrency,
        "Search engine initialized"
    );

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = create_router(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!(address = %addr, version = version, "Provenance Search Service listening");

    let listener = TcpListener::bind(addr).await?;

    info!("Ready to accept connections");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("Provenance Search Service shutdown complete");

    Ok(())
}
