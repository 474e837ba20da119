//! # provenance-search
//!
//! Federated search over provenance bundles held by independent services.
//!
//! A provenance bundle is a small graph of entities, activities and agents.
//! Bundles reference each other through *connector* nodes, so the provenance
//! of a product is spread over many bundles hosted by many services. This
//! crate answers one question:
//!
//! > Starting from one bundle, which bundles lie upstream or downstream, what
//! > does a query find in each of them, and how far can each answer be trusted?
//!
//! ## Core Contract
//!
//! 1. Evaluate a recursive condition language on a single bundle
//! 2. Follow connectors from bundle to bundle, in one direction, across services
//! 3. Tag every answer with integrity (signed token, registered with its
//!    trusted party) and validity (named semantic checks) along its whole path
//!
//! ## Architecture
//!
//! ```text
//! SearchRequest → Frontier (integrity, then validity) → worker pool
//!                                  ↑                         ↓
//!                         child connectors  ← query ← gates ← fetch ← route ← resolve version
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Bundle ids, visited maps and registries iterate in BTreeMap order
//! - Token payloads are signed over canonical JSON
//! - Frontier ties are served in insertion order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod cpm;
pub mod canonical;
pub mod traversal;
pub mod subgraph;
pub mod condition;
pub mod query;
pub mod version;
pub mod integrity;
pub mod validity;
pub mod frontier;
pub mod federation;
pub mod store;
pub mod config;
pub mod search;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    AttributeValue, Bundle, BundleBuilder, BundleDocument, BundleError, CheckOutcome, Direction, Edge,
    ItemToSearch, Node, NodeKind, QualifiedName, RelationKind, Token, TokenData, AdditionalTokenData,
    ValidityCheckId, VersionPreference, VisitOutcome,
};
pub use condition::{
    BundlePredicate, BundleView, Condition, ConditionError, Countable, EdgePredicate, Evaluate, Findable,
    NodePredicate, StepPredicate,
};
pub use traversal::GraphTraverser;
pub use subgraph::SubgraphMatcher;
pub use query::{BundleQuery, BundleQueryRequest, BundleQueryResponse, QueryResult, QueryType};
pub use version::{Resolved, ResolutionError, VersionResolver};
pub use integrity::{
    sign_token, verify_signature, CacheConfig, CacheStats, IntegrityFailure, IntegrityResult,
    IntegrityVerificationError, IntegrityVerifier, VerificationMode,
};
pub use validity::{RemoteConditionCheck, UnknownValidityCheck, ValidityRegistry, ValidityVerifier};
pub use frontier::{Frontier, InvariantError};
pub use federation::{FederationTable, UnroutableBundleError};
pub use store::{
    FetchedBundle, InMemoryProvenanceService, InMemoryTokenRegistry, ProvenanceService, RemoteCallError,
    TokenRegistry,
};
#[cfg(feature = "http-client")]
pub use store::{HttpProvenanceService, HttpTokenRegistry};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use config::SearchConfig;
pub use search::{BranchError, DistributedSearch, FoundResult, SearchError, SearchRequest, SearchResults};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};
