//! Remote collaborators of a search: provenance services and token registries.
//!
//! A search never talks to the network directly. It is generic over a
//! [`ProvenanceService`] that fetches and queries bundles, and a
//! [`TokenRegistry`] that lists the tokens a trusted party has issued.

pub mod memory;

#[cfg(feature = "http-client")]
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::query::{BundleQueryRequest, BundleQueryResponse};
use crate::types::{Bundle, QualifiedName, Token, VersionPreference};

/// Error of a delegated call to another service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Remote call to {service_uri} failed: {message}")]
pub struct RemoteCallError {
    /// Service that was called.
    pub service_uri: String,
    /// Failure description.
    pub message: String,
}

impl RemoteCallError {
    /// Wrap any collaborator error.
    pub fn from_source<E: std::error::Error>(service_uri: &str, e: E) -> Self {
        Self {
            service_uri: service_uri.to_string(),
            message: e.to_string(),
        }
    }
}

/// A bundle together with the token its storage issued for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedBundle {
    /// The bundle.
    pub bundle: Bundle,
    /// Integrity token; absent when the storage holds none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
}

/// Body of a bundle fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchBundleRequest {
    /// Bundle to fetch.
    pub bundle_id: QualifiedName,
}

/// Body of a version pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickVersionRequest {
    /// Referenced bundle.
    pub bundle_id: QualifiedName,
    /// Which version to pick.
    #[serde(default)]
    pub version_preference: VersionPreference,
}

/// Answer of a version pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickVersionResponse {
    /// The concrete bundle.
    pub bundle_id: QualifiedName,
}

/// A provenance service hosting bundles.
///
/// `service_uri` is the base URL chosen by routing; one implementation may
/// front many services.
#[async_trait]
pub trait ProvenanceService: Send + Sync {
    /// Error type for service calls.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a bundle and its token.
    async fn fetch_bundle(&self, service_uri: &str, bundle_id: &QualifiedName) -> Result<FetchedBundle, Self::Error>;

    /// Evaluate a query on one of the service's bundles.
    async fn bundle_query(
        &self,
        service_uri: &str,
        request: &BundleQueryRequest,
    ) -> Result<BundleQueryResponse, Self::Error>;

    /// Pick the concrete version a reference denotes.
    async fn pick_version(
        &self,
        service_uri: &str,
        bundle_id: &QualifiedName,
        preference: VersionPreference,
    ) -> Result<QualifiedName, Self::Error>;
}

/// Registry of tokens issued by trusted parties.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Error type for registry calls.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Every token `trusted_party_uri` has issued for `originator_id`.
    async fn issued_tokens(&self, trusted_party_uri: &str, originator_id: &str) -> Result<Vec<Token>, Self::Error>;
}

pub use memory::{InMemoryError, InMemoryProvenanceService, InMemoryTokenRegistry};

#[cfg(feature = "http-client")]
pub use http::{HttpError, HttpProvenanceService, HttpTokenRegistry};
