//! Search-session types: frontier items, validity outcomes and visit outcomes.

use serde::{Deserialize, Serialize};

use super::name::QualifiedName;

/// Identifier of a registered validity check.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidityCheckId(String);

impl ValidityCheckId {
    /// Create a check id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ValidityCheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one validity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Which check.
    pub check: ValidityCheckId,
    /// Whether it held.
    pub satisfied: bool,
}

impl CheckOutcome {
    /// Create an outcome.
    pub fn new(check: ValidityCheckId, satisfied: bool) -> Self {
        Self { check, satisfied }
    }
}

/// Direction of a federated search along derivation chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Towards predecessors (follow backward connectors).
    Backward,
    /// Towards successors (follow forward connectors).
    Forward,
}

impl Direction {
    /// `true` for [`Direction::Backward`].
    pub fn is_backward(self) -> bool {
        matches!(self, Self::Backward)
    }

    /// Direction from a `backward` flag.
    pub fn from_backward(backward: bool) -> Self {
        if backward {
            Self::Backward
        } else {
            Self::Forward
        }
    }
}

/// Which concrete version a bundle reference denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionPreference {
    /// Exactly the referenced bundle.
    #[default]
    Specified,
    /// The highest version listed in the bundle's meta-bundle.
    Latest,
}

/// One pending frontier entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemToSearch {
    /// Target bundle.
    pub bundle_id: QualifiedName,
    /// Node at which the bundle is entered.
    pub entry_node_id: QualifiedName,
    /// Meta-bundle declared by the discovering connector, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_bundle_id: Option<QualifiedName>,
    /// Service URI declared by the discovering connector, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_hint: Option<String>,
    /// Digest pinned by the discovering connector, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_digest: Option<String>,
    /// Whether every bundle on the path so far passed integrity.
    pub path_integrity: bool,
    /// Ordered validity outcomes accumulated along the path.
    pub path_validity: Vec<CheckOutcome>,
}

impl ItemToSearch {
    /// Seed item for a search: integrity and every selected check start out satisfied.
    pub fn seed(bundle_id: QualifiedName, entry_node_id: QualifiedName, checks: &[ValidityCheckId]) -> Self {
        Self {
            bundle_id,
            entry_node_id,
            meta_bundle_id: None,
            service_hint: None,
            expected_digest: None,
            path_integrity: true,
            path_validity: checks
                .iter()
                .map(|c| CheckOutcome::new(c.clone(), true))
                .collect(),
        }
    }
}

/// Combine inherited path outcomes with a bundle's own outcomes.
///
/// Outcomes are AND-ed per check id, so the list keeps the inherited length
/// and order. A check missing from `own` leaves the inherited value as is.
pub fn combine_validity(inherited: &[CheckOutcome], own: &[CheckOutcome]) -> Vec<CheckOutcome> {
    inherited
        .iter()
        .map(|parent| {
            let current = own
                .iter()
                .find(|o| o.check == parent.check)
                .map(|o| o.satisfied)
                .unwrap_or(true);
            CheckOutcome::new(parent.check.clone(), parent.satisfied && current)
        })
        .collect()
}

/// Terminal state of a bundle in a search session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum VisitOutcome {
    /// Processed and the query produced a non-empty result.
    Found,
    /// Processed and the query produced nothing.
    NotFound,
    /// Branch abandoned because of an error.
    Skipped {
        /// Machine-readable error code.
        code: String,
        /// Error description.
        message: String,
    },
    /// The reference resolved to a version already claimed by this session.
    Redirected {
        /// The resolved version.
        to: QualifiedName,
    },
}

impl VisitOutcome {
    /// Whether the outcome is [`VisitOutcome::Skipped`] with the given code.
    pub fn is_skipped_with(&self, expected: &str) -> bool {
        matches!(self, Self::Skipped { code, .. } if code == expected)
    }
}
