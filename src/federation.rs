//! Federation table: which provenance service hosts which bundles.
//!
//! Routing is by longest matching URI prefix, so a table can send a whole
//! organization to one service and carve out individual document spaces.

use std::collections::BTreeMap;
use std::path::Path;

use crate::types::QualifiedName;

/// No prefix of the table matches the bundle URI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No provenance service registered for bundle {bundle_id}")]
pub struct UnroutableBundleError {
    /// The bundle that could not be routed.
    pub bundle_id: QualifiedName,
}

/// Error loading a federation table.
#[derive(Debug, thiserror::Error)]
pub enum FederationTableError {
    /// The table file could not be read.
    #[error("Failed to read federation table: {0}")]
    Io(#[from] std::io::Error),
    /// The table is not a JSON object of strings.
    #[error("Invalid federation table: {0}")]
    Json(#[from] serde_json::Error),
}

/// Map of bundle URI prefix to service base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FederationTable {
    routes: BTreeMap<String, String>,
}

impl FederationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route (builder style).
    pub fn with_route(mut self, prefix: impl Into<String>, service_uri: impl Into<String>) -> Self {
        self.insert(prefix, service_uri);
        self
    }

    /// Add or replace a route.
    pub fn insert(&mut self, prefix: impl Into<String>, service_uri: impl Into<String>) {
        self.routes.insert(prefix.into(), service_uri.into());
    }

    /// Parse `{"<prefix>": "<service url>", ...}`.
    pub fn from_json(json: &str) -> Result<Self, FederationTableError> {
        Ok(Self {
            routes: serde_json::from_str(json)?,
        })
    }

    /// Load a JSON table from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FederationTableError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Load the table named by `FEDERATION_TABLE_PATH`; empty when unset.
    pub fn from_env() -> Result<Self, FederationTableError> {
        match std::env::var("FEDERATION_TABLE_PATH") {
            Ok(path) => Self::from_path(path),
            Err(_) => Ok(Self::new()),
        }
    }

    /// Service hosting a bundle.
    pub fn route(&self, bundle_id: &QualifiedName) -> Result<&str, UnroutableBundleError> {
        let uri = bundle_id.uri();
        self.routes
            .iter()
            .filter(|(prefix, _)| uri.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, service)| service.as_str())
            .ok_or_else(|| UnroutableBundleError {
                bundle_id: bundle_id.clone(),
            })
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(p, s)| (p.as_str(), s.as_str()))
    }
}
