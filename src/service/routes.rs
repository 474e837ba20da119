//! Axum routes for the provenance search service.

use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::condition::ConditionError;
use crate::query::{BundleQueryRequest, BundleQueryResponse, QueryType};
use crate::search::{SearchRequest, SearchResults};
use crate::store::{
    FetchBundleRequest, FetchedBundle, HttpProvenanceService, HttpTokenRegistry, InMemoryError, PickVersionRequest,
    PickVersionResponse, ProvenanceService, TokenRegistry,
};
use crate::types::ValidityCheckId;

use super::middleware::{metrics_middleware, request_id_middleware, RequestId};
use super::state::{ServiceState, LOCAL_SERVICE};

/// Type alias for the service state with HTTP collaborators.
pub type AppState = ServiceState<HttpProvenanceService, HttpTokenRegistry>;

type SharedState<S, R> = Arc<ServiceState<S, R>>;
type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Bundles hosted by this service.
    pub hosted_bundles: usize,
    /// Prefixes in the federation table.
    pub federation_routes: usize,
    /// Registered validity checks.
    pub validity_checks: Vec<ValidityCheckId>,
    /// Fingerprint of the registered check ids.
    pub validity_fingerprint: String,
    /// Signature verdict cache, when enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict_cache: Option<VerdictCacheHealth>,
}

/// Verdict cache occupancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictCacheHealth {
    pub len: usize,
    pub cap: usize,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// Readiness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub details: Option<String>,
}

/// Structured error response with correlation ID for tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Correlation ID for request tracing (matches X-Request-Id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            correlation_id: None,
            details: None,
        }
    }

    /// Add a correlation ID to the error.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn reply(self, status: StatusCode) -> (StatusCode, Json<ErrorResponse>) {
        tracing::warn!(
            code = %self.code,
            error = %self.error,
            correlation_id = ?self.correlation_id,
            "Request error"
        );
        (status, Json(self))
    }
}

fn condition_code(e: &ConditionError) -> &'static str {
    match e {
        ConditionError::UnsupportedConditionType(_) => "UNSUPPORTED_CONDITION_TYPE",
        ConditionError::Configuration(_) => "CONFIGURATION_ERROR",
        ConditionError::StartNodeNotFound { .. } => "START_NODE_NOT_FOUND",
    }
}

/// Map a failure of the locally hosted bundles to a response.
fn local_error(e: InMemoryError, request_id: &RequestId) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &e {
        InMemoryError::UnknownService(_) | InMemoryError::BundleNotFound { .. } => {
            (StatusCode::NOT_FOUND, "BUNDLE_NOT_FOUND")
        }
        InMemoryError::Query(inner @ ConditionError::StartNodeNotFound { .. }) => {
            (StatusCode::NOT_FOUND, condition_code(inner))
        }
        InMemoryError::Query(inner) => (StatusCode::BAD_REQUEST, condition_code(inner)),
        InMemoryError::Resolution(_) => (StatusCode::UNPROCESSABLE_ENTITY, "RESOLUTION_ERROR"),
        InMemoryError::Unreachable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
    };
    ErrorResponse::new(code, e.to_string())
        .with_correlation_id(request_id.0.clone())
        .reply(status)
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn run_search<S, R>(
    state: &ServiceState<S, R>,
    request: SearchRequest,
    request_id: &RequestId,
) -> ApiResult<SearchResults>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    state.search.search(&request).await.map(Json).map_err(|e| {
        ErrorResponse::new(e.code(), e.to_string())
            .with_correlation_id(request_id.0.clone())
            .with_details(request.bundle_id.uri())
            .reply(StatusCode::BAD_REQUEST)
    })
}

/// Search in the direction the request names.
async fn search_handler<S, R>(
    State(state): State<SharedState<S, R>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<SearchResults>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    run_search(&state, request, &request_id).await
}

/// Search forward, along derivations.
async fn successors_handler<S, R>(
    State(state): State<SharedState<S, R>>,
    Extension(request_id): Extension<RequestId>,
    Json(mut request): Json<SearchRequest>,
) -> ApiResult<SearchResults>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    request.backward = false;
    run_search(&state, request, &request_id).await
}

/// Search backward, towards sources.
async fn predecessors_handler<S, R>(
    State(state): State<SharedState<S, R>>,
    Extension(request_id): Extension<RequestId>,
    Json(mut request): Json<SearchRequest>,
) -> ApiResult<SearchResults>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    request.backward = true;
    run_search(&state, request, &request_id).await
}

/// Evaluate a query on a hosted bundle.
async fn bundle_query_handler<S, R>(
    State(state): State<SharedState<S, R>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<BundleQueryRequest>,
) -> ApiResult<BundleQueryResponse>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    state
        .bundles
        .bundle_query(LOCAL_SERVICE, &request)
        .await
        .map(Json)
        .map_err(|e| local_error(e, &request_id))
}

/// Pick the concrete version of a hosted bundle.
async fn pick_version_handler<S, R>(
    State(state): State<SharedState<S, R>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<PickVersionRequest>,
) -> ApiResult<PickVersionResponse>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    let bundle_id = state
        .bundles
        .pick_version(LOCAL_SERVICE, &request.bundle_id, request.version_preference)
        .await
        .map_err(|e| local_error(e, &request_id))?;
    Ok(Json(PickVersionResponse { bundle_id }))
}

/// Fetch a hosted bundle with its token.
async fn fetch_bundle_handler<S, R>(
    State(state): State<SharedState<S, R>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<FetchBundleRequest>,
) -> ApiResult<FetchedBundle>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    state
        .bundles
        .fetch_bundle(LOCAL_SERVICE, &request.bundle_id)
        .await
        .map(Json)
        .map_err(|e| local_error(e, &request_id))
}

/// List registered validity checks.
async fn validity_checks_handler<S, R>(State(state): State<SharedState<S, R>>) -> Json<Vec<ValidityCheckId>>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    Json(state.search.validity().ids())
}

/// List supported query types.
async fn query_types_handler() -> Json<Vec<QueryType>> {
    Json(QueryType::ALL.to_vec())
}

/// Health check endpoint (detailed).
async fn health_handler<S, R>(State(state): State<SharedState<S, R>>) -> Json<HealthResponse>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    let search = &state.search;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        hosted_bundles: state.bundles.bundle_count(),
        federation_routes: search.federation().len(),
        validity_checks: search.validity().ids(),
        validity_fingerprint: search.validity().fingerprint(),
        verdict_cache: search
            .integrity()
            .cache_stats()
            .map(|stats| VerdictCacheHealth {
                len: stats.len,
                cap: stats.cap,
            }),
    })
}

/// Liveness probe endpoint.
///
/// Returns 200 if the process is alive. Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Ready once the service can route or serve at least one bundle.
async fn readiness_handler<S, R>(
    State(state): State<SharedState<S, R>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)>
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    if state.search.federation().is_empty() && state.bundles.bundle_count() == 0 {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                details: Some("No federation routes and no hosted bundles".to_string()),
            }),
        ));
    }
    Ok(Json(ReadinessResponse {
        ready: true,
        details: None,
    }))
}

// ============================================================================
// Router
// ============================================================================

/// Create the Axum router with all routes.
pub fn create_router<S, R>(state: ServiceState<S, R>) -> Router
where
    S: ProvenanceService + 'static,
    R: TokenRegistry + 'static,
{
    let state = Arc::new(state);

    Router::new()
        // Search
        .route("/api/search", post(search_handler::<S, R>))
        .route("/api/searchSuccessors", post(successors_handler::<S, R>))
        .route("/api/searchPredecessors", post(predecessors_handler::<S, R>))
        // Hosted bundles
        .route("/api/bundle", post(fetch_bundle_handler::<S, R>))
        .route("/api/bundleQuery", post(bundle_query_handler::<S, R>))
        .route("/api/pickVersion", post(pick_version_handler::<S, R>))
        // Discovery
        .route("/api/getValidityChecks", get(validity_checks_handler::<S, R>))
        .route("/api/getQueryTypes", get(query_types_handler))
        // Health checks
        .route("/health", get(health_handler::<S, R>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S, R>))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}
