//! Edge types for bundle graphs.

use serde::{Deserialize, Serialize};

use super::bundle::NodeIdx;

/// Kind of a relation statement carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    /// `prov:wasDerivedFrom`
    #[serde(alias = "PROV_DERIVATION")]
    Derivation,
    /// `prov:specializationOf`
    #[serde(alias = "PROV_SPECIALIZATION")]
    Specialization,
    /// `prov:used`
    #[serde(alias = "PROV_USAGE")]
    Usage,
    /// `prov:wasGeneratedBy`
    #[serde(alias = "PROV_GENERATION")]
    Generation,
    /// `prov:wasAssociatedWith`
    #[serde(alias = "PROV_ASSOCIATION")]
    Association,
    /// `prov:wasAttributedTo`
    #[serde(alias = "PROV_ATTRIBUTION")]
    Attribution,
    /// `prov:actedOnBehalfOf`
    #[serde(alias = "PROV_DELEGATION")]
    Delegation,
    /// `prov:wasInformedBy`
    #[serde(alias = "PROV_COMMUNICATION")]
    Communication,
    /// `prov:hadMember`
    #[serde(alias = "PROV_MEMBERSHIP")]
    Membership,
    /// `prov:wasInvalidatedBy`
    #[serde(alias = "PROV_INVALIDATION")]
    Invalidation,
    /// `prov:wasStartedBy`
    #[serde(alias = "PROV_START")]
    Start,
    /// `prov:wasEndedBy`
    #[serde(alias = "PROV_END")]
    End,
    /// `prov:wasInfluencedBy`
    #[serde(alias = "PROV_INFLUENCE")]
    Influence,
    /// `prov:alternateOf`
    #[serde(alias = "PROV_ALTERNATE")]
    Alternate,
}

impl RelationKind {
    /// Parse a relation kind from `derivation`, `Derivation` or `PROV_DERIVATION`.
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.strip_prefix("PROV_").unwrap_or(s);
        match s.to_ascii_lowercase().as_str() {
            "derivation" => Some(Self::Derivation),
            "specialization" => Some(Self::Specialization),
            "usage" => Some(Self::Usage),
            "generation" => Some(Self::Generation),
            "association" => Some(Self::Association),
            "attribution" => Some(Self::Attribution),
            "delegation" => Some(Self::Delegation),
            "communication" => Some(Self::Communication),
            "membership" => Some(Self::Membership),
            "invalidation" => Some(Self::Invalidation),
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            "influence" => Some(Self::Influence),
            "alternate" => Some(Self::Alternate),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Derivation => "derivation",
            Self::Specialization => "specialization",
            Self::Usage => "usage",
            Self::Generation => "generation",
            Self::Association => "association",
            Self::Attribution => "attribution",
            Self::Delegation => "delegation",
            Self::Communication => "communication",
            Self::Membership => "membership",
            Self::Invalidation => "invalidation",
            Self::Start => "start",
            Self::End => "end",
            Self::Influence => "influence",
            Self::Alternate => "alternate",
        };
        write!(f, "{}", name)
    }
}

/// Edge in a bundle graph.
///
/// Connects exactly one cause node to one effect node and carries one or
/// more relation statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Cause endpoint.
    pub cause: NodeIdx,
    /// Effect endpoint.
    pub effect: NodeIdx,
    /// Relation statements on this edge.
    pub relations: Vec<RelationKind>,
}

impl Edge {
    /// Whether any relation statement on this edge has the given kind.
    pub fn has_relation(&self, kind: RelationKind) -> bool {
        self.relations.contains(&kind)
    }

    /// The endpoint opposite to `node`, if `node` is an endpoint.
    pub fn other(&self, node: NodeIdx) -> Option<NodeIdx> {
        if node == self.cause {
            Some(self.effect)
        } else if node == self.effect {
            Some(self.cause)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_kind_spellings() {
        assert_eq!(RelationKind::from_str("PROV_DERIVATION"), Some(RelationKind::Derivation));
        assert_eq!(RelationKind::from_str("Specialization"), Some(RelationKind::Specialization));
        assert_eq!(RelationKind::from_str("wasDerivedFrom"), None);

        let parsed: RelationKind = serde_json::from_str("\"PROV_USAGE\"").unwrap();
        assert_eq!(parsed, RelationKind::Usage);
    }
}
