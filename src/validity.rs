//! Validity checks: semantic trust delegated to the service owning a bundle.
//!
//! A check is identified by a [`ValidityCheckId`] and registered once at
//! process start in a [`ValidityRegistry`]. A session selects an ordered
//! subset; the order is the order in which outcomes are compared when
//! prioritizing the frontier.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::canonical::canonical_hash_hex;
use crate::condition::{parse_bundle_condition, ConditionError};
use crate::cpm::attr;
use crate::query::{BundleQueryRequest, QueryResult, QueryType};
use crate::store::{ProvenanceService, RemoteCallError};
use crate::types::{CheckOutcome, QualifiedName, ValidityCheckId};

/// Demo check: activities carry a start time and the bundle has one main activity.
pub const DEMO_SIMPLE_CONSTRAINTS: &str = "DEMO_SIMPLE_CONSTRAINTS";
/// Demo check: the bundle describes sampling.
pub const DEMO_IS_SAMPLING_BUNDLE: &str = "DEMO_IS_SAMPLING_BUNDLE";
/// Demo check: the bundle describes processing.
pub const DEMO_IS_PROCESSING_BUNDLE: &str = "DEMO_IS_PROCESSING_BUNDLE";

/// Error selecting checks for a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown validity check: {0}")]
pub struct UnknownValidityCheck(pub ValidityCheckId);

/// A bundle under validity checking.
#[derive(Debug, Clone, Copy)]
pub struct ValidityTarget<'a> {
    /// Service hosting the bundle.
    pub service_uri: &'a str,
    /// The bundle.
    pub bundle_id: &'a QualifiedName,
    /// Entry node of the search item.
    pub entry_node_id: &'a QualifiedName,
}

/// One named semantic check.
#[async_trait]
pub trait ValidityVerifier<S: ProvenanceService>: Send + Sync {
    /// Check id.
    fn id(&self) -> &ValidityCheckId;

    /// Whether the bundle passes. A failed delegated call is an error, not a fail.
    async fn verify(&self, service: &S, target: ValidityTarget<'_>) -> Result<bool, RemoteCallError>;
}

/// Check that asks the owning service to `TEST_FITS` a fixed bundle condition.
#[derive(Debug, Clone)]
pub struct RemoteConditionCheck {
    id: ValidityCheckId,
    condition: Value,
}

impl RemoteConditionCheck {
    /// Create a check; the condition is parsed once to reject malformed payloads.
    pub fn new(id: impl Into<String>, condition: Value) -> Result<Self, ConditionError> {
        parse_bundle_condition(&condition)?;
        Ok(Self {
            id: ValidityCheckId::new(id),
            condition,
        })
    }

    /// The condition sent to services.
    pub fn condition(&self) -> &Value {
        &self.condition
    }
}

#[async_trait]
impl<S: ProvenanceService> ValidityVerifier<S> for RemoteConditionCheck {
    fn id(&self) -> &ValidityCheckId {
        &self.id
    }

    async fn verify(&self, service: &S, target: ValidityTarget<'_>) -> Result<bool, RemoteCallError> {
        let request = BundleQueryRequest {
            bundle_id: target.bundle_id.clone(),
            start_node_id: Some(target.entry_node_id.clone()),
            query_type: QueryType::TestFits,
            query_specification: self.condition.clone(),
        };
        let response = service
            .bundle_query(target.service_uri, &request)
            .await
            .map_err(|e| RemoteCallError::from_source(target.service_uri, e))?;
        match response.result {
            QueryResult::TestFits(fits) => Ok(fits),
            other => Err(RemoteCallError {
                service_uri: target.service_uri.to_string(),
                message: format!("Expected TEST_FITS result for check {}, got {:?}", self.id, other),
            }),
        }
    }
}

/// Registered checks by id.
pub struct ValidityRegistry<S: ProvenanceService> {
    checks: BTreeMap<ValidityCheckId, Arc<dyn ValidityVerifier<S>>>,
}

impl<S: ProvenanceService> Default for ValidityRegistry<S> {
    fn default() -> Self {
        Self {
            checks: BTreeMap::new(),
        }
    }
}

impl<S: ProvenanceService> ValidityRegistry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three demo checks.
    pub fn with_demo_checks() -> Result<Self, ConditionError> {
        let mut registry = Self::new();
        for (id, condition) in demo_specifications() {
            registry.register(RemoteConditionCheck::new(id, condition)?);
        }
        Ok(registry)
    }

    /// Add or replace a check.
    pub fn register<V: ValidityVerifier<S> + 'static>(&mut self, check: V) {
        self.checks.insert(check.id().clone(), Arc::new(check));
    }

    /// Add a check (builder style).
    pub fn with_check<V: ValidityVerifier<S> + 'static>(mut self, check: V) -> Self {
        self.register(check);
        self
    }

    /// Registered ids in order.
    pub fn ids(&self) -> Vec<ValidityCheckId> {
        self.checks.keys().cloned().collect()
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether no check is registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Fingerprint of the registered ids.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&self.ids()).unwrap_or_default()
    }

    /// Resolve a session's ordered selection. Duplicates are dropped.
    pub fn select(&self, ids: &[ValidityCheckId]) -> Result<Vec<Arc<dyn ValidityVerifier<S>>>, UnknownValidityCheck> {
        let mut selected: Vec<Arc<dyn ValidityVerifier<S>>> = Vec::with_capacity(ids.len());
        for id in ids {
            if selected.iter().any(|c| c.id() == id) {
                continue;
            }
            let check = self.checks.get(id).ok_or_else(|| UnknownValidityCheck(id.clone()))?;
            selected.push(Arc::clone(check));
        }
        Ok(selected)
    }
}

/// Run selected checks in order.
pub async fn run_checks<S: ProvenanceService>(
    checks: &[Arc<dyn ValidityVerifier<S>>],
    service: &S,
    target: ValidityTarget<'_>,
) -> Result<Vec<CheckOutcome>, RemoteCallError> {
    let mut outcomes = Vec::with_capacity(checks.len());
    for check in checks {
        let satisfied = check.verify(service, target).await?;
        outcomes.push(CheckOutcome::new(check.id().clone(), satisfied));
    }
    Ok(outcomes)
}

fn demo_specifications() -> Vec<(&'static str, Value)> {
    let type_matching = |regex: &str| {
        json!({
            "type": "CountComparisonCondition",
            "first": {
                "type": "FittingNodes",
                "nodeCondition": {
                    "type": "HasAttrValue",
                    "attributeNameUri": attr::PROV_TYPE,
                    "kind": "QualifiedName",
                    "uriRegex": regex
                },
                "startsIn": {"type": "WholeGraph"}
            },
            "comparisonResult": "GE",
            "second": {"type": "CountConstant", "count": 1}
        })
    };

    vec![
        (
            DEMO_SIMPLE_CONSTRAINTS,
            json!({
                "type": "AllTrue",
                "conditions": [
                    {
                        "type": "AllNodes",
                        "condition": {
                            "type": "Implication",
                            "premise": {"type": "IsKind", "kind": "Activity"},
                            "consequence": {"type": "HasAttr", "attributeNameUri": attr::PROV_START_TIME}
                        }
                    },
                    type_matching(".*mainActivity")
                ]
            }),
        ),
        (DEMO_IS_SAMPLING_BUNDLE, type_matching(".*[Ss]ampl.*")),
        (DEMO_IS_PROCESSING_BUNDLE, type_matching(".*[Pp]rocess.*")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpm::{kind, BLANK_URI};
    use crate::store::InMemoryProvenanceService;
    use crate::types::{AttributeValue, Bundle, Node, NodeKind};

    fn qn(local: &str) -> QualifiedName {
        QualifiedName::new(BLANK_URI, local)
    }

    fn sampling_bundle() -> Bundle {
        Bundle::builder(qn("S"))
            .node(
                Node::new(qn("act"), NodeKind::Activity)
                    .with_attribute(attr::PROV_TYPE, AttributeValue::qualified_name(QualifiedName::from_uri(kind::MAIN_ACTIVITY)))
                    .with_attribute(
                        attr::PROV_TYPE,
                        AttributeValue::qualified_name(QualifiedName::from_uri("https://example.org/Sampling")),
                    ),
            )
            .build()
            .unwrap()
    }

    fn target<'a>(bundle_id: &'a QualifiedName, entry: &'a QualifiedName) -> ValidityTarget<'a> {
        ValidityTarget {
            service_uri: "http://prov-a",
            bundle_id,
            entry_node_id: entry,
        }
    }

    #[tokio::test]
    async fn test_demo_checks_in_selected_order() {
        let service = InMemoryProvenanceService::new().with_bundle("http://prov-a", sampling_bundle(), None);
        let registry = ValidityRegistry::<InMemoryProvenanceService>::with_demo_checks().unwrap();
        assert_eq!(registry.len(), 3);

        let selection = [
            ValidityCheckId::new(DEMO_IS_PROCESSING_BUNDLE),
            ValidityCheckId::new(DEMO_IS_SAMPLING_BUNDLE),
            ValidityCheckId::new(DEMO_SIMPLE_CONSTRAINTS),
        ];
        let checks = registry.select(&selection).unwrap();
        let (bundle_id, entry) = (qn("S"), qn("act"));
        let outcomes = run_checks(&checks, &service, target(&bundle_id, &entry)).await.unwrap();

        let satisfied: Vec<bool> = outcomes.iter().map(|o| o.satisfied).collect();
        assert_eq!(satisfied, vec![false, true, false]);
        assert_eq!(outcomes[0].check, selection[0]);
    }

    #[tokio::test]
    async fn test_remote_failure_is_an_error() {
        let service = InMemoryProvenanceService::new().with_unreachable("http://prov-a");
        let registry = ValidityRegistry::<InMemoryProvenanceService>::with_demo_checks().unwrap();
        let checks = registry.select(&[ValidityCheckId::new(DEMO_IS_SAMPLING_BUNDLE)]).unwrap();
        let (bundle_id, entry) = (qn("S"), qn("act"));
        let err = run_checks(&checks, &service, target(&bundle_id, &entry)).await.unwrap_err();
        assert_eq!(err.service_uri, "http://prov-a");
    }

    #[test]
    fn test_unknown_selection_and_malformed_condition() {
        let registry = ValidityRegistry::<InMemoryProvenanceService>::new();
        let missing = registry.select(&[ValidityCheckId::new("NOPE")]).err();
        assert_eq!(missing, Some(UnknownValidityCheck(ValidityCheckId::new("NOPE"))));

        let malformed = RemoteConditionCheck::new("BAD", json!({"type": "IsKind", "kind": "Activity"}));
        assert!(matches!(malformed, Err(ConditionError::UnsupportedConditionType(_))));
    }

    #[test]
    fn test_fingerprint_tracks_registered_ids() {
        let empty = ValidityRegistry::<InMemoryProvenanceService>::new();
        let demo = ValidityRegistry::<InMemoryProvenanceService>::with_demo_checks().unwrap();
        assert_ne!(empty.fingerprint(), demo.fingerprint());
        assert_eq!(demo.fingerprint(), ValidityRegistry::<InMemoryProvenanceService>::with_demo_checks().unwrap().fingerprint());
    }
}
