//! In-memory provenance services and token registry, used by tests and for locally hosted bundles.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{FetchedBundle, ProvenanceService, TokenRegistry};
use crate::condition::ConditionError;
use crate::cpm;
use crate::query::{BundleQuery, BundleQueryRequest, BundleQueryResponse};
use crate::version::{latest_version, ResolutionError};
use crate::types::{Bundle, QualifiedName, Token, VersionPreference};

/// Error type for in-memory collaborators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InMemoryError {
    /// No service registered under the URI.
    #[error("Unknown service: {0}")]
    UnknownService(String),
    /// The service does not host the bundle.
    #[error("Bundle {bundle_id} not found at {service_uri}")]
    BundleNotFound {
        /// Service asked.
        service_uri: String,
        /// Missing bundle.
        bundle_id: QualifiedName,
    },
    /// The service was marked unreachable.
    #[error("Service unreachable: {0}")]
    Unreachable(String),
    /// The query could not be evaluated.
    #[error("Query failed: {0}")]
    Query(#[from] ConditionError),
    /// The version could not be picked.
    #[error("Version pick failed: {0}")]
    Resolution(#[from] ResolutionError),
}

/// Any number of provenance services held in memory, keyed by service URI.
///
/// Uses BTreeMap for deterministic iteration order. Fetches are counted per
/// bundle so tests can assert deduplication.
#[derive(Debug, Default)]
pub struct InMemoryProvenanceService {
    services: BTreeMap<String, BTreeMap<QualifiedName, FetchedBundle>>,
    unreachable: BTreeSet<String>,
    latency: Option<Duration>,
    fetches: Mutex<BTreeMap<QualifiedName, usize>>,
}

impl InMemoryProvenanceService {
    /// Create a new empty set of services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host a bundle at a service.
    pub fn add_bundle(&mut self, service_uri: impl Into<String>, bundle: Bundle, token: Option<Token>) {
        self.services
            .entry(service_uri.into())
            .or_default()
            .insert(bundle.id().clone(), FetchedBundle { bundle, token });
    }

    /// Host a bundle at a service (builder style).
    pub fn with_bundle(mut self, service_uri: impl Into<String>, bundle: Bundle, token: Option<Token>) -> Self {
        self.add_bundle(service_uri, bundle, token);
        self
    }

    /// Make every call to a service fail.
    pub fn with_unreachable(mut self, service_uri: impl Into<String>) -> Self {
        self.unreachable.insert(service_uri.into());
        self
    }

    /// Delay every fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// How often a bundle was fetched.
    pub fn fetch_count(&self, bundle_id: &QualifiedName) -> usize {
        self.fetches.lock().get(bundle_id).copied().unwrap_or(0)
    }

    /// Total number of fetches.
    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }

    /// Number of bundles hosted across all services.
    pub fn bundle_count(&self) -> usize {
        self.services.values().map(BTreeMap::len).sum()
    }

    fn lookup(&self, service_uri: &str, bundle_id: &QualifiedName) -> Result<&FetchedBundle, InMemoryError> {
        if self.unreachable.contains(service_uri) {
            return Err(InMemoryError::Unreachable(service_uri.to_string()));
        }
        self.services
            .get(service_uri)
            .ok_or_else(|| InMemoryError::UnknownService(service_uri.to_string()))?
            .get(bundle_id)
            .ok_or_else(|| InMemoryError::BundleNotFound {
                service_uri: service_uri.to_string(),
                bundle_id: bundle_id.clone(),
            })
    }
}

#[async_trait]
impl ProvenanceService for InMemoryProvenanceService {
    type Error = InMemoryError;

    async fn fetch_bundle(&self, service_uri: &str, bundle_id: &QualifiedName) -> Result<FetchedBundle, Self::Error> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        *self.fetches.lock().entry(bundle_id.clone()).or_default() += 1;
        self.lookup(service_uri, bundle_id).cloned()
    }

    async fn bundle_query(
        &self,
        service_uri: &str,
        request: &BundleQueryRequest,
    ) -> Result<BundleQueryResponse, Self::Error> {
        let stored = self.lookup(service_uri, &request.bundle_id)?;
        let query = BundleQuery::parse(request.query_type, &request.query_specification)?;
        let result = query.evaluate(&stored.bundle, request.start_node_id.as_ref())?;
        Ok(BundleQueryResponse {
            token: stored.token.clone(),
            result,
        })
    }

    async fn pick_version(
        &self,
        service_uri: &str,
        bundle_id: &QualifiedName,
        preference: VersionPreference,
    ) -> Result<QualifiedName, Self::Error> {
        let stored = self.lookup(service_uri, bundle_id)?;
        if preference == VersionPreference::Specified {
            return Ok(bundle_id.clone());
        }
        let meta_id = cpm::meta_bundle_id(&stored.bundle).ok_or_else(|| ResolutionError::MissingMetaBundle {
            bundle_id: bundle_id.clone(),
        })?;
        let meta = self.lookup(service_uri, meta_id)?;
        Ok(latest_version(&meta.bundle)?.unwrap_or_else(|| bundle_id.clone()))
    }
}

/// Token registries of any number of trusted parties.
#[derive(Debug, Default)]
pub struct InMemoryTokenRegistry {
    issued: BTreeMap<(String, String), Vec<Token>>,
    unreachable: bool,
}

impl InMemoryTokenRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token as issued by the trusted party it names.
    pub fn issue(&mut self, token: Token) {
        let key = (
            token.data.additional_data.trusted_party_uri.clone(),
            token.data.originator_id.clone(),
        );
        self.issued.entry(key).or_default().push(token);
    }

    /// Record a token (builder style).
    pub fn with_token(mut self, token: Token) -> Self {
        self.issue(token);
        self
    }

    /// Make every lookup fail.
    pub fn with_unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }
}

#[async_trait]
impl TokenRegistry for InMemoryTokenRegistry {
    type Error = InMemoryError;

    async fn issued_tokens(&self, trusted_party_uri: &str, originator_id: &str) -> Result<Vec<Token>, Self::Error> {
        if self.unreachable {
            return Err(InMemoryError::Unreachable(trusted_party_uri.to_string()));
        }
        Ok(self
            .issued
            .get(&(trusted_party_uri.to_string(), originator_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
