//! Distributed search across federated provenance services.
//!
//! A search starts at one bundle and follows connectors from bundle to
//! bundle, in one direction, until no unvisited bundle is left. Every
//! visited bundle is:
//!
//! 1. claimed, so no two workers ever expand the same bundle
//! 2. resolved to a concrete version and routed to its owning service
//! 3. fetched and gated through integrity and the selected validity checks
//! 4. queried at the entry node the discovering connector names
//! 5. searched for further connectors, which become new frontier items
//!
//! A failure in any of these steps abandons that branch only; it is
//! recorded as [`VisitOutcome::Skipped`] and the session continues.
//!
//! ## Scheduling
//!
//! Up to `concurrency` bundles are in flight at once. The frontier is
//! ordered by credibility (see [`crate::frontier`]), and a popped item waits
//! while any in-flight item of strictly higher priority is still running,
//! since that item may enqueue better branches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::condition::{BundleView, ConditionError};
use crate::config::SearchConfig;
use crate::cpm::{self, Connector};
use crate::federation::{FederationTable, UnroutableBundleError};
use crate::frontier::{precedes, Frontier, InvariantError};
use crate::integrity::{IntegrityVerificationError, IntegrityVerifier};
use crate::query::{discover_connectors, BundleQuery, QueryResult, QueryType};
use crate::store::{ProvenanceService, RemoteCallError, TokenRegistry};
use crate::types::{
    combine_validity, CheckOutcome, Direction, ItemToSearch, QualifiedName, Token, ValidityCheckId,
    VersionPreference, VisitOutcome,
};
use crate::validity::{run_checks, UnknownValidityCheck, ValidityRegistry, ValidityTarget, ValidityVerifier};
use crate::version::{ResolutionError, VersionResolver};

/// A malformed search request, rejected before any I/O.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    /// The request names no start node.
    #[error("Search request names no start node")]
    MissingStartNode,
    /// The query specification does not parse.
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] ConditionError),
    /// A selected validity check is not registered.
    #[error(transparent)]
    UnknownValidityCheck(#[from] UnknownValidityCheck),
    /// The seed item does not fit the session's check layout.
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}

impl SearchError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingStartNode => "MISSING_START_NODE",
            Self::InvalidQuery(ConditionError::UnsupportedConditionType(_)) => "UNSUPPORTED_CONDITION_TYPE",
            Self::InvalidQuery(ConditionError::Configuration(_)) => "CONFIGURATION_ERROR",
            Self::InvalidQuery(ConditionError::StartNodeNotFound { .. }) => "START_NODE_NOT_FOUND",
            Self::UnknownValidityCheck(_) => "UNKNOWN_VALIDITY_CHECK",
            Self::Invariant(_) => "INVARIANT_ERROR",
        }
    }
}

/// Why a single branch of a search was abandoned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BranchError {
    /// No service hosts the bundle.
    #[error(transparent)]
    Unroutable(#[from] UnroutableBundleError),
    /// The version could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// Integrity could not be decided.
    #[error(transparent)]
    Integrity(#[from] IntegrityVerificationError),
    /// A fetch or delegated check failed.
    #[error(transparent)]
    Remote(#[from] RemoteCallError),
    /// The query failed on this bundle.
    #[error("Query evaluation failed: {0}")]
    Query(#[from] ConditionError),
    /// Child items broke the session's check layout.
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    /// The session claimed its maximum number of bundles.
    #[error("Visit limit of {limit} bundles reached")]
    VisitLimit {
        /// Configured limit.
        limit: usize,
    },
}

impl BranchError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unroutable(_) => "UNROUTABLE_BUNDLE",
            Self::Resolution(_) => "RESOLUTION_ERROR",
            Self::Integrity(_) => "INTEGRITY_ERROR",
            Self::Remote(_) => "REMOTE_CALL_ERROR",
            Self::Query(_) => "QUERY_ERROR",
            Self::Invariant(_) => "INVARIANT_ERROR",
            Self::VisitLimit { .. } => "MAX_VISITED",
        }
    }
}

/// Parameters of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Bundle the search starts in.
    pub bundle_id: QualifiedName,
    /// Node the start bundle is entered at.
    #[serde(default)]
    pub start_node_id: Option<QualifiedName>,
    /// Follow backward connectors (predecessors) instead of forward ones.
    #[serde(default)]
    pub backward: bool,
    /// Which version connectors denote.
    #[serde(default)]
    pub version_preference: VersionPreference,
    /// Validity checks to run, in priority order.
    #[serde(default)]
    pub validity_checks: Vec<ValidityCheckId>,
    /// Kind of answer collected from each bundle.
    pub query_type: QueryType,
    /// Query specification for `query_type`.
    #[serde(default)]
    pub query_specification: Value,
}

impl SearchRequest {
    /// Forward search with the specified version and no validity checks.
    pub fn new(
        bundle_id: QualifiedName,
        start_node_id: QualifiedName,
        query_type: QueryType,
        query_specification: Value,
    ) -> Self {
        Self {
            bundle_id,
            start_node_id: Some(start_node_id),
            backward: false,
            version_preference: VersionPreference::Specified,
            validity_checks: Vec::new(),
            query_type,
            query_specification,
        }
    }

    /// Set the direction.
    pub fn in_direction(mut self, direction: Direction) -> Self {
        self.backward = direction.is_backward();
        self
    }

    /// Set the version preference.
    pub fn with_version_preference(mut self, preference: VersionPreference) -> Self {
        self.version_preference = preference;
        self
    }

    /// Select validity checks, in priority order.
    pub fn with_validity_checks<I, T>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.validity_checks = checks.into_iter().map(ValidityCheckId::new).collect();
        self
    }

    /// Search direction.
    pub fn direction(&self) -> Direction {
        Direction::from_backward(self.backward)
    }
}

/// A query answer from one bundle with its credibility tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundResult {
    /// Bundle the answer came from.
    pub bundle_id: QualifiedName,
    /// Node the bundle was entered at.
    pub entry_node_id: QualifiedName,
    /// Token of the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    /// The answer.
    pub result: QueryResult,
    /// Whether the bundle itself passed integrity.
    pub integrity: bool,
    /// The bundle's own validity outcomes.
    pub validity_checks: Vec<CheckOutcome>,
    /// Whether every bundle on the path, this one included, passed integrity.
    pub path_integrity: bool,
    /// Validity outcomes accumulated along the path, this bundle included.
    pub path_validity_checks: Vec<CheckOutcome>,
}

/// Everything a search session produced.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Collected answers.
    pub results: Vec<FoundResult>,
    /// Terminal state of every bundle the session touched.
    #[serde(serialize_with = "serialize_visited")]
    pub visited: BTreeMap<QualifiedName, VisitOutcome>,
    /// Branch failures, human-readable.
    pub errors: Vec<String>,
    /// Whether the deadline stopped the search with work left.
    pub timed_out: bool,
}

impl SearchResults {
    /// Outcome recorded for a bundle.
    pub fn outcome(&self, bundle_id: &QualifiedName) -> Option<&VisitOutcome> {
        self.visited.get(bundle_id)
    }

    /// Answers collected from a bundle.
    pub fn results_from<'a>(&'a self, bundle_id: &QualifiedName) -> impl Iterator<Item = &'a FoundResult> + 'a {
        let bundle_id = bundle_id.clone();
        self.results.iter().filter(move |r| r.bundle_id == bundle_id)
    }
}

fn serialize_visited<Ser: serde::Serializer>(
    visited: &BTreeMap<QualifiedName, VisitOutcome>,
    serializer: Ser,
) -> Result<Ser::Ok, Ser::Error> {
    serializer.collect_map(visited.iter().map(|(id, outcome)| (id.uri(), outcome)))
}

/// Session-scoped search state.
///
/// A bundle id is in at most one of `in_flight` and `visited`.
struct Session {
    frontier: Frontier,
    in_flight: BTreeMap<QualifiedName, ItemToSearch>,
    visited: BTreeMap<QualifiedName, VisitOutcome>,
    results: Vec<FoundResult>,
    errors: Vec<String>,
    claimed: usize,
}

impl Session {
    fn new(frontier: Frontier) -> Self {
        Self {
            frontier,
            in_flight: BTreeMap::new(),
            visited: BTreeMap::new(),
            results: Vec::new(),
            errors: Vec::new(),
            claimed: 0,
        }
    }

    fn is_claimed(&self, bundle_id: &QualifiedName) -> bool {
        self.in_flight.contains_key(bundle_id) || self.visited.contains_key(bundle_id)
    }

    fn skip(&mut self, bundle_id: QualifiedName, error: &BranchError) {
        warn!(bundle = %bundle_id, code = error.code(), error = %error, "Skipping branch");
        self.errors.push(format!("Error while processing bundle {}: {}", bundle_id, error));
        self.visited.insert(
            bundle_id,
            VisitOutcome::Skipped {
                code: error.code().to_string(),
                message: error.to_string(),
            },
        );
    }
}

/// Request-scoped part of a session that never changes.
struct Plan<S: ProvenanceService> {
    query: BundleQuery,
    direction: Direction,
    preference: VersionPreference,
    checks: Vec<Arc<dyn ValidityVerifier<S>>>,
}

enum Processed {
    Redirected(QualifiedName),
    Visited {
        result: Option<FoundResult>,
        found: bool,
        children: Vec<ItemToSearch>,
    },
}

/// The federated search engine.
///
/// Built once at process start and shared by every request.
pub struct DistributedSearch<S: ProvenanceService, R: TokenRegistry> {
    service: S,
    federation: FederationTable,
    integrity: IntegrityVerifier<R>,
    validity: ValidityRegistry<S>,
    config: SearchConfig,
}

impl<S: ProvenanceService, R: TokenRegistry> DistributedSearch<S, R> {
    /// Create a search engine.
    pub fn new(
        service: S,
        federation: FederationTable,
        integrity: IntegrityVerifier<R>,
        validity: ValidityRegistry<S>,
        config: SearchConfig,
    ) -> Self {
        info!(
            concurrency = config.concurrency,
            routes = federation.len(),
            validity_checks = validity.len(),
            prefer_service_from_connectors = config.prefer_service_from_connectors,
            "Initialized distributed search"
        );
        Self {
            service,
            federation,
            integrity,
            validity,
            config,
        }
    }

    /// The provenance service collaborator.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// The federation table.
    pub fn federation(&self) -> &FederationTable {
        &self.federation
    }

    /// The integrity verifier.
    pub fn integrity(&self) -> &IntegrityVerifier<R> {
        &self.integrity
    }

    /// The validity check registry.
    pub fn validity(&self) -> &ValidityRegistry<S> {
        &self.validity
    }

    /// The configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run a search session to completion, or until its deadline.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults, SearchError> {
        let started = Instant::now();
        let start_node = request.start_node_id.clone().ok_or(SearchError::MissingStartNode)?;
        let query = BundleQuery::parse(request.query_type, &request.query_specification)?;
        let checks = self.validity.select(&request.validity_checks)?;
        let check_ids: Vec<ValidityCheckId> = checks.iter().map(|c| c.id().clone()).collect();

        let mut frontier = Frontier::new(check_ids.clone());
        frontier.push(ItemToSearch::seed(request.bundle_id.clone(), start_node, &check_ids))?;
        let session = Mutex::new(Session::new(frontier));
        let plan = Plan {
            query,
            direction: request.direction(),
            preference: request.version_preference,
            checks,
        };

        info!(
            bundle = %request.bundle_id,
            direction = ?plan.direction,
            query_type = ?request.query_type,
            version_preference = ?plan.preference,
            validity_checks = check_ids.len(),
            "Starting search"
        );

        let deadline = self.config.deadline.map(|d| started + d);
        let concurrency = self.config.concurrency.max(1);
        let mut deadline_passed = false;
        let mut workers = FuturesUnordered::new();

        loop {
            if !deadline_passed && deadline.is_some_and(|d| Instant::now() >= d) {
                deadline_passed = true;
                warn!(bundle = %request.bundle_id, "Search deadline reached, draining in-flight bundles");
            }
            if !deadline_passed && !self.has_enough_results(&session) {
                while workers.len() < concurrency {
                    let Some(item) = self.claim_next(&session) else {
                        break;
                    };
                    workers.push(self.visit(&session, &plan, item));
                }
            }
            if workers.next().await.is_none() {
                break;
            }
        }
        drop(workers);

        let session = session.into_inner();
        let mut results = session.results;
        if let Some(max) = self.config.max_results {
            results.truncate(max);
        }
        let report = SearchResults {
            results,
            visited: session.visited,
            errors: session.errors,
            timed_out: deadline_passed && !session.frontier.is_empty(),
        };

        record_search_metrics(&report, started.elapsed().as_millis() as u64);
        Ok(report)
    }

    fn has_enough_results(&self, session: &Mutex<Session>) -> bool {
        self.config
            .max_results
            .is_some_and(|max| session.lock().results.len() >= max)
    }

    /// Pop the next item and claim its bundle, atomically.
    fn claim_next(&self, session: &Mutex<Session>) -> Option<ItemToSearch> {
        let mut guard = session.lock();
        let state = &mut *guard;

        while let Some(item) = state.frontier.pop() {
            if state.is_claimed(&item.bundle_id) {
                debug!(bundle = %item.bundle_id, "Bundle already claimed");
                continue;
            }

            let outranked = state
                .in_flight
                .values()
                .any(|running| matches!(precedes(running, &item), Ok(true)));
            if outranked {
                if let Err(e) = state.frontier.push(item) {
                    state.errors.push(e.to_string());
                }
                return None;
            }

            if let Some(limit) = self.config.max_visited {
                if state.claimed >= limit {
                    state.skip(item.bundle_id, &BranchError::VisitLimit { limit });
                    continue;
                }
            }

            state.claimed += 1;
            state.in_flight.insert(item.bundle_id.clone(), item.clone());
            debug!(
                bundle = %item.bundle_id,
                entry = %item.entry_node_id,
                path_integrity = item.path_integrity,
                "Claimed bundle"
            );
            return Some(item);
        }
        None
    }

    /// Claim the resolved version of a bundle; `false` when already claimed.
    fn claim_alias(&self, session: &Mutex<Session>, resolved: &QualifiedName, item: &ItemToSearch) -> bool {
        let mut state = session.lock();
        if state.is_claimed(resolved) {
            return false;
        }
        state.in_flight.insert(resolved.clone(), item.clone());
        true
    }

    async fn visit(&self, session: &Mutex<Session>, plan: &Plan<S>, item: ItemToSearch) {
        let started = Instant::now();
        let referenced = item.bundle_id.clone();
        let mut alias = None;
        let processed = self.process(session, plan, &item, &mut alias).await;

        let mut guard = session.lock();
        let state = &mut *guard;
        state.in_flight.remove(&referenced);
        if let Some(alias) = &alias {
            state.in_flight.remove(alias);
        }

        let label = match processed {
            Ok(Processed::Redirected(to)) => {
                info!(bundle = %referenced, to = %to, "Version already claimed, redirected");
                state.visited.insert(referenced, VisitOutcome::Redirected { to });
                "redirected"
            }
            Ok(Processed::Visited { result, found, children }) => {
                let outcome = if found {
                    VisitOutcome::Found
                } else {
                    VisitOutcome::NotFound
                };
                let bundle_id = match alias {
                    Some(resolved) => {
                        state.visited.insert(referenced, VisitOutcome::Redirected { to: resolved.clone() });
                        resolved
                    }
                    None => referenced,
                };
                info!(bundle = %bundle_id, outcome = ?outcome, children = children.len(), "Visited bundle");
                state.visited.insert(bundle_id, outcome);
                if let Some(result) = result {
                    state.results.push(result);
                }
                for child in children {
                    if state.is_claimed(&child.bundle_id) {
                        continue;
                    }
                    if let Err(e) = state.frontier.push(child) {
                        state.errors.push(e.to_string());
                    }
                }
                if found {
                    "found"
                } else {
                    "not_found"
                }
            }
            Err(error) => {
                if let Some(resolved) = alias {
                    state.skip(resolved, &error);
                }
                state.skip(referenced, &error);
                "skipped"
            }
        };

        record_bundle_metrics(label, started.elapsed().as_millis() as u64);
    }

    async fn process(
        &self,
        session: &Mutex<Session>,
        plan: &Plan<S>,
        item: &ItemToSearch,
        alias: &mut Option<QualifiedName>,
    ) -> Result<Processed, BranchError> {
        let referenced_service = self.route(&item.bundle_id, item.service_hint.as_deref())?;

        let (resolved, prefetched) = VersionResolver::new(&self.service, &self.federation)
            .delegated(self.config.delegate_version_pick)
            .resolve(
                &referenced_service,
                &item.bundle_id,
                plan.preference,
                item.meta_bundle_id.as_ref(),
            )
            .await?
            .prefetched(&item.bundle_id);

        let service_uri = if resolved == item.bundle_id {
            referenced_service
        } else {
            if !self.claim_alias(session, &resolved, item) {
                return Ok(Processed::Redirected(resolved));
            }
            *alias = Some(resolved.clone());
            self.federation
                .route(&resolved)
                .map(str::to_string)
                .unwrap_or(referenced_service)
        };

        let fetched = match prefetched {
            Some(fetched) => fetched,
            None => self
                .service
                .fetch_bundle(&service_uri, &resolved)
                .await
                .map_err(|e| RemoteCallError::from_source(&service_uri, e))?,
        };
        let view = BundleView::new(&fetched.bundle, cpm::entry_node(&fetched.bundle, Some(&item.entry_node_id))?);

        let integrity = self
            .integrity
            .verify(&resolved, fetched.token.as_ref(), item.expected_digest.as_deref())
            .await?;
        if let Some(failure) = integrity.failure {
            debug!(bundle = %resolved, failure = ?failure, "Bundle failed integrity");
        }

        let target = ValidityTarget {
            service_uri: &service_uri,
            bundle_id: &resolved,
            entry_node_id: &item.entry_node_id,
        };
        let own_validity = run_checks(&plan.checks, &self.service, target).await?;
        let path_integrity = item.path_integrity && integrity.is_valid();
        let path_validity = combine_validity(&item.path_validity, &own_validity);

        let answer = plan.query.evaluate_view(&view)?;
        let found = !answer.is_empty();
        let result = (found || !self.config.omit_empty_results).then(|| FoundResult {
            bundle_id: resolved.clone(),
            entry_node_id: item.entry_node_id.clone(),
            token: fetched.token.clone(),
            result: answer,
            integrity: integrity.is_valid(),
            validity_checks: own_validity,
            path_integrity,
            path_validity_checks: path_validity.clone(),
        });

        let children = if self.config.require_integrity && !integrity.is_valid() {
            debug!(bundle = %resolved, "Not expanding untrusted bundle");
            Vec::new()
        } else {
            discover_connectors(&view, Some(plan.direction))?
                .into_iter()
                .filter_map(|connector| child_item(connector, path_integrity, &path_validity))
                .collect()
        };

        Ok(Processed::Visited {
            result,
            found,
            children,
        })
    }

    /// Service hosting a bundle: the federation table or the connector's hint,
    /// in configured preference order.
    fn route(&self, bundle_id: &QualifiedName, hint: Option<&str>) -> Result<String, UnroutableBundleError> {
        let from_table = self.federation.route(bundle_id).ok();
        let chosen = if self.config.prefer_service_from_connectors {
            hint.or(from_table)
        } else {
            from_table.or(hint)
        };
        chosen.map(str::to_string).ok_or_else(|| UnroutableBundleError {
            bundle_id: bundle_id.clone(),
        })
    }
}

fn child_item(connector: Connector, path_integrity: bool, path_validity: &[CheckOutcome]) -> Option<ItemToSearch> {
    let bundle_id = connector.referenced_bundle_id?;
    Some(ItemToSearch {
        bundle_id,
        entry_node_id: connector.referenced_connector_id,
        meta_bundle_id: connector.referenced_meta_bundle_id,
        service_hint: connector.provenance_service_uri,
        expected_digest: connector.referenced_bundle_hash_value,
        path_integrity,
        path_validity: path_validity.to_vec(),
    })
}

fn record_bundle_metrics(outcome: &str, latency_ms: u64) {
    info!(
        target: "provenance_search::metrics",
        metric_type = "bundle",
        outcome = outcome,
        latency_ms = latency_ms,
        "bundle_metric"
    );
}

fn record_search_metrics(report: &SearchResults, latency_ms: u64) {
    info!(
        target: "provenance_search::metrics",
        metric_type = "search",
        visited = report.visited.len(),
        results = report.results.len(),
        errors = report.errors.len(),
        timed_out = report.timed_out,
        latency_ms = latency_ms,
        "search_metric"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpm::{attr, kind, BLANK_URI};
    use crate::integrity::VerificationMode;
    use crate::store::{InMemoryProvenanceService, InMemoryTokenRegistry};
    use crate::types::{AttributeValue, Bundle, Node, NodeKind, RelationKind};
    use serde_json::json;

    const PROV: &str = "http://prov-a";

    fn qn(local: &str) -> QualifiedName {
        QualifiedName::new("http://storage-a/documents/", local)
    }

    fn blank(local: &str) -> QualifiedName {
        QualifiedName::new(BLANK_URI, local)
    }

    fn forward_connector(local: &str, target: &str) -> Node {
        Node::new(blank(local), NodeKind::Entity)
            .with_attribute(attr::PROV_TYPE, AttributeValue::qualified_name(QualifiedName::from_uri(kind::FORWARD_CONNECTOR)))
            .with_attribute(attr::REFERENCED_BUNDLE_ID, AttributeValue::qualified_name(qn(target)))
    }

    /// `name` holds one activity fed by an entry connector and feeding a
    /// forward connector per target.
    fn bundle(name: &str, entry: &str, targets: &[&str]) -> Bundle {
        let activity = format!("{}_act", name);
        let mut builder = Bundle::builder(qn(name))
            .node(Node::new(blank(entry), NodeKind::Entity))
            .node(Node::new(blank(&activity), NodeKind::Activity))
            .edge(blank(&activity), blank(entry), RelationKind::Usage);
        for target in targets {
            let connector = format!("{}_to_{}", name, target);
            builder = builder
                .node(forward_connector(&connector, target))
                .edge(blank(&connector), blank(&activity), RelationKind::Generation)
                .edge(blank(entry), blank(&connector), RelationKind::Derivation);
        }
        builder.build().unwrap()
    }

    fn engine(service: InMemoryProvenanceService, config: SearchConfig) -> DistributedSearch<InMemoryProvenanceService, InMemoryTokenRegistry> {
        DistributedSearch::new(
            service,
            FederationTable::new().with_route("http://storage-a/", PROV),
            IntegrityVerifier::new(InMemoryTokenRegistry::new(), VerificationMode::Direct),
            ValidityRegistry::new(),
            config,
        )
    }

    fn activities(start: &str) -> SearchRequest {
        SearchRequest::new(
            qn("A"),
            blank(start),
            QueryType::NodeIds,
            json!({"type": "IsKind", "kind": "Activity"}),
        )
    }

    #[tokio::test]
    async fn test_untrusted_chain_is_still_traversed_and_tagged() {
        let service = InMemoryProvenanceService::new()
            .with_bundle(PROV, bundle("A", "start", &["B"]), None)
            .with_bundle(PROV, bundle("B", "A_to_B", &[]), None);
        let results = engine(service, SearchConfig::default()).search(&activities("start")).await.unwrap();

        assert_eq!(results.results.len(), 2);
        assert!(results.results.iter().all(|r| !r.integrity && !r.path_integrity));
        assert_eq!(results.outcome(&qn("B")), Some(&VisitOutcome::Found));
        assert!(!results.timed_out);
    }

    #[tokio::test]
    async fn test_require_integrity_stops_expansion() {
        let service = InMemoryProvenanceService::new()
            .with_bundle(PROV, bundle("A", "start", &["B"]), None)
            .with_bundle(PROV, bundle("B", "A_to_B", &[]), None);
        let config = SearchConfig {
            require_integrity: true,
            ..SearchConfig::default()
        };
        let results = engine(service, config).search(&activities("start")).await.unwrap();

        assert_eq!(results.results.len(), 1);
        assert!(results.outcome(&qn("B")).is_none());
    }

    #[tokio::test]
    async fn test_max_visited_skips_the_rest() {
        let service = InMemoryProvenanceService::new()
            .with_bundle(PROV, bundle("A", "start", &["B"]), None)
            .with_bundle(PROV, bundle("B", "A_to_B", &[]), None);
        let results = engine(service, SearchConfig::default().with_max_visited(1))
            .search(&activities("start"))
            .await
            .unwrap();

        assert_eq!(results.results.len(), 1);
        assert!(results.outcome(&qn("B")).unwrap().is_skipped_with("MAX_VISITED"));
    }

    #[tokio::test]
    async fn test_omit_empty_results() {
        let service = InMemoryProvenanceService::new()
            .with_bundle(PROV, bundle("A", "start", &["B"]), None)
            .with_bundle(PROV, bundle("B", "A_to_B", &[]), None);
        let config = SearchConfig {
            omit_empty_results: true,
            ..SearchConfig::default()
        };
        let request = SearchRequest::new(
            qn("A"),
            blank("start"),
            QueryType::NodeIds,
            json!({"type": "HasId", "idUriRegex": ".*A_act"}),
        );
        let results = engine(service, config).search(&request).await.unwrap();

        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].bundle_id, qn("A"));
        assert_eq!(results.outcome(&qn("B")), Some(&VisitOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_malformed_requests_fail_before_io() {
        let service = InMemoryProvenanceService::new().with_unreachable(PROV);
        let search = engine(service, SearchConfig::default());

        let mut request = activities("start");
        request.start_node_id = None;
        assert_eq!(search.search(&request).await.unwrap_err(), SearchError::MissingStartNode);

        let request = SearchRequest::new(qn("A"), blank("start"), QueryType::NodeIds, json!({"type": "Nope"}));
        let err = search.search(&request).await.unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_CONDITION_TYPE");

        let request = activities("start").with_validity_checks(["NOT_REGISTERED"]);
        assert!(matches!(search.search(&request).await, Err(SearchError::UnknownValidityCheck(_))));
        assert_eq!(search.service().total_fetches(), 0);
    }

    #[test]
    fn test_request_wire_defaults() {
        let request: SearchRequest = serde_json::from_value(json!({
            "bundleId": {"nameSpaceUri": "http://storage-a/documents/", "localPart": "A"},
            "startNodeId": {"nameSpaceUri": BLANK_URI, "localPart": "start"},
            "queryType": "TEST_FITS",
            "querySpecification": {"type": "AllNodes", "condition": {"type": "IsKind", "kind": "Entity"}}
        }))
        .unwrap();
        assert_eq!(request.direction(), Direction::Forward);
        assert_eq!(request.version_preference, VersionPreference::Specified);
        assert!(request.validity_checks.is_empty());
    }
}
