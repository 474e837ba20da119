//! Provenance Search REST Service
//!
//! Exposes federated search, and the bundles this service hosts, as a REST API.
//!
//! ## Endpoints
//!
//! - `POST /api/search` - Search in the direction the request names
//! - `POST /api/searchSuccessors` - Search forward
//! - `POST /api/searchPredecessors` - Search backward
//! - `POST /api/bundle` - Fetch a hosted bundle and its token
//! - `POST /api/bundleQuery` - Evaluate a query on a hosted bundle
//! - `POST /api/pickVersion` - Pick the concrete version of a hosted bundle
//! - `GET /api/getValidityChecks` - List registered validity checks
//! - `GET /api/getQueryTypes` - List supported query types
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{correlation_id, metrics_middleware, request_id_middleware, RequestId, REQUEST_ID_HEADER};
pub use routes::{create_router, AppState, ErrorResponse};
pub use state::{load_bundle_dir, BundleDirError, ServiceInitError, ServiceState, LOCAL_SERVICE};
