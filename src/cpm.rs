//! Common Provenance Model vocabulary and bundle conventions.
//!
//! Connectors, main activities and meta-bundle references are ordinary nodes
//! and attributes; this module names them and implements the conventions
//! built on top of them.

use serde::{Deserialize, Serialize};

use crate::condition::ConditionError;
use crate::subgraph::SubgraphMatcher;
use crate::traversal::Step;
use crate::types::{Bundle, Direction, NodeIdx, QualifiedName, RelationKind};

/// CPM namespace.
pub const CPM_URI: &str = "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/";
/// PROV namespace.
pub const PROV_URI: &str = "http://www.w3.org/ns/prov#";
/// PAV namespace.
pub const PAV_URI: &str = "http://purl.org/pav/";
/// Blank-node namespace.
pub const BLANK_URI: &str = "https://openprovenance.org/blank/";
/// schema.org namespace.
pub const SCHEMA_URI: &str = "https://schema.org/";

/// Attribute-name URIs.
pub mod attr {
    /// `prov:type`
    pub const PROV_TYPE: &str = "http://www.w3.org/ns/prov#type";
    /// `prov:label`
    pub const PROV_LABEL: &str = "http://www.w3.org/ns/prov#label";
    /// `prov:location`
    pub const PROV_LOCATION: &str = "http://www.w3.org/ns/prov#location";
    /// `prov:startTime`
    pub const PROV_START_TIME: &str = "http://www.w3.org/ns/prov#startTime";
    /// `pav:version`
    pub const PAV_VERSION: &str = "http://purl.org/pav/version";
    /// `cpm:referencedBundleId`
    pub const REFERENCED_BUNDLE_ID: &str =
        "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/referencedBundleId";
    /// `cpm:referencedMetaBundleId`
    pub const REFERENCED_META_BUNDLE_ID: &str =
        "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/referencedMetaBundleId";
    /// `cpm:referencedBundleHashValue`
    pub const REFERENCED_BUNDLE_HASH_VALUE: &str =
        "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/referencedBundleHashValue";
    /// `cpm:hashAlg`
    pub const HASH_ALG: &str = "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/hashAlg";
    /// `cpm:provenanceServiceUri`
    pub const PROVENANCE_SERVICE_URI: &str =
        "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/provenanceServiceUri";
}

/// `prov:type` values.
pub mod kind {
    /// `cpm:mainActivity`
    pub const MAIN_ACTIVITY: &str = "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/mainActivity";
    /// `cpm:forwardConnector`
    pub const FORWARD_CONNECTOR: &str =
        "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/forwardConnector";
    /// `cpm:backwardConnector`
    pub const BACKWARD_CONNECTOR: &str =
        "https://www.commonprovenancemodel.org/cpm-namespace-v1-0/backwardConnector";
    /// `prov:bundle`
    pub const PROV_BUNDLE: &str = "http://www.w3.org/ns/prov#bundle";
}

/// `prov:type` URI of connectors in the given direction.
pub fn connector_type(direction: Direction) -> &'static str {
    match direction {
        Direction::Backward => kind::BACKWARD_CONNECTOR,
        Direction::Forward => kind::FORWARD_CONNECTOR,
    }
}

/// Whether a node is a connector, optionally of a given direction.
pub fn is_connector(bundle: &Bundle, idx: NodeIdx, direction: Option<Direction>) -> bool {
    let node = bundle.node(idx);
    match direction {
        Some(d) => node.has_qualified_name_value(attr::PROV_TYPE, connector_type(d)),
        None => {
            node.has_qualified_name_value(attr::PROV_TYPE, kind::FORWARD_CONNECTOR)
                || node.has_qualified_name_value(attr::PROV_TYPE, kind::BACKWARD_CONNECTOR)
        }
    }
}

/// The bundle's main activity, if declared.
pub fn main_activity(bundle: &Bundle) -> Option<NodeIdx> {
    bundle
        .node_indices()
        .find(|&idx| bundle.node(idx).has_qualified_name_value(attr::PROV_TYPE, kind::MAIN_ACTIVITY))
}

/// Meta-bundle referenced by the main activity.
pub fn meta_bundle_id(bundle: &Bundle) -> Option<&QualifiedName> {
    main_activity(bundle).and_then(|idx| bundle.node(idx).qualified_name_value(attr::REFERENCED_META_BUNDLE_ID))
}

/// Start node used when a query names none.
///
/// First forward connector, else first backward connector, else the main
/// activity, else the first node.
pub fn default_start_node(bundle: &Bundle) -> Option<NodeIdx> {
    let first_of = |direction| bundle.node_indices().find(|&idx| is_connector(bundle, idx, Some(direction)));
    first_of(Direction::Forward)
        .or_else(|| first_of(Direction::Backward))
        .or_else(|| main_activity(bundle))
        .or_else(|| bundle.node_indices().next())
}

/// Resolve the entry node for a query.
///
/// Only an absent request falls back to [`default_start_node`]; a named node
/// the bundle lacks is an error.
pub fn entry_node(bundle: &Bundle, requested: Option<&QualifiedName>) -> Result<Option<NodeIdx>, ConditionError> {
    match requested {
        None => Ok(default_start_node(bundle)),
        Some(id) => bundle
            .find(id)
            .map(Some)
            .ok_or_else(|| ConditionError::StartNodeNotFound {
                node_id: id.clone(),
                bundle_id: bundle.id().clone(),
            }),
    }
}

/// Id under which the other bundle knows this connector.
///
/// A backward connector keeps its own id. A specific forward connector is
/// mapped to the general forward connector it specializes; a forward
/// connector without one keeps its own id.
pub fn general_connector(bundle: &Bundle, idx: NodeIdx) -> NodeIdx {
    if !is_connector(bundle, idx, Some(Direction::Forward)) {
        return idx;
    }

    let is_start = |step: Step| step.node == idx;
    let is_general = |step: Step| {
        let Some(edge_idx) = step.edge else {
            return false;
        };
        let edge = bundle.edge(edge_idx);
        edge.has_relation(RelationKind::Specialization)
            && edge.cause == step.node
            && is_connector(bundle, step.node, Some(Direction::Forward))
    };
    let constraints: [&dyn Fn(Step) -> bool; 2] = [&is_start, &is_general];

    SubgraphMatcher::new(bundle)
        .find_linear_subgraphs(idx, &constraints)
        .first()
        .and_then(|path| path.last())
        .map(|step| step.node)
        .unwrap_or(idx)
}

/// Cross-bundle reference carried by a connector node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    /// Connector node id in this bundle.
    pub id: QualifiedName,
    /// Connector id in the referenced bundle.
    pub referenced_connector_id: QualifiedName,
    /// Referenced bundle.
    pub referenced_bundle_id: Option<QualifiedName>,
    /// Meta-bundle of the referenced bundle.
    pub referenced_meta_bundle_id: Option<QualifiedName>,
    /// Pinned digest of the referenced bundle.
    pub referenced_bundle_hash_value: Option<String>,
    /// Algorithm of the pinned digest.
    pub hash_alg: Option<String>,
    /// Service hosting the referenced bundle.
    pub provenance_service_uri: Option<String>,
}

impl Connector {
    /// Read the connector attributes of a node.
    pub fn from_node(bundle: &Bundle, idx: NodeIdx) -> Self {
        let node = bundle.node(idx);
        let general = general_connector(bundle, idx);
        Self {
            id: node.id.clone(),
            referenced_connector_id: bundle.node(general).id.clone(),
            referenced_bundle_id: node.qualified_name_value(attr::REFERENCED_BUNDLE_ID).cloned(),
            referenced_meta_bundle_id: node.qualified_name_value(attr::REFERENCED_META_BUNDLE_ID).cloned(),
            referenced_bundle_hash_value: node.text_value(attr::REFERENCED_BUNDLE_HASH_VALUE).map(str::to_string),
            hash_alg: node.text_value(attr::HASH_ALG).map(str::to_string),
            provenance_service_uri: node.text_value(attr::PROVENANCE_SERVICE_URI).map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeValue, Node, NodeKind};

    fn qn(local: &str) -> QualifiedName {
        QualifiedName::new(BLANK_URI, local)
    }

    fn typed(local: &str, kind: NodeKind, type_uri: &str) -> Node {
        Node::new(qn(local), kind)
            .with_attribute(attr::PROV_TYPE, AttributeValue::qualified_name(QualifiedName::from_uri(type_uri)))
    }

    #[test]
    fn test_specific_forward_connector_maps_to_general() {
        let bundle = Bundle::builder(qn("b"))
            .node(typed("general", NodeKind::Entity, kind::FORWARD_CONNECTOR))
            .node(
                typed("specific", NodeKind::Entity, kind::FORWARD_CONNECTOR)
                    .with_attribute(attr::REFERENCED_BUNDLE_ID, AttributeValue::qualified_name(qn("next")))
                    .with_attribute(attr::REFERENCED_BUNDLE_HASH_VALUE, AttributeValue::lang_string("ab12", None)),
            )
            .edge(qn("general"), qn("specific"), RelationKind::Specialization)
            .build()
            .unwrap();

        let specific = bundle.find(&qn("specific")).unwrap();
        let connector = Connector::from_node(&bundle, specific);
        assert_eq!(connector.referenced_connector_id, qn("general"));
        assert_eq!(connector.referenced_bundle_id, Some(qn("next")));
        assert_eq!(connector.referenced_bundle_hash_value.as_deref(), Some("ab12"));

        // the general connector has no further generalization
        let general = bundle.find(&qn("general")).unwrap();
        assert_eq!(general_connector(&bundle, general), general);
    }

    #[test]
    fn test_default_start_node_preference() {
        let with_backward = Bundle::builder(qn("b"))
            .node(typed("main", NodeKind::Activity, kind::MAIN_ACTIVITY))
            .node(typed("back", NodeKind::Entity, kind::BACKWARD_CONNECTOR))
            .build()
            .unwrap();
        assert_eq!(default_start_node(&with_backward), with_backward.find(&qn("back")));

        let only_main = Bundle::builder(qn("b"))
            .node(Node::new(qn("plain"), NodeKind::Entity))
            .node(typed("main", NodeKind::Activity, kind::MAIN_ACTIVITY))
            .build()
            .unwrap();
        assert_eq!(default_start_node(&only_main), only_main.find(&qn("main")));

        let empty = Bundle::builder(qn("b")).build().unwrap();
        assert_eq!(default_start_node(&empty), None);
    }

    #[test]
    fn test_named_entry_must_exist() {
        let bundle = Bundle::builder(qn("b"))
            .node(typed("main", NodeKind::Activity, kind::MAIN_ACTIVITY))
            .node(Node::new(qn("plain"), NodeKind::Entity))
            .build()
            .unwrap();

        assert_eq!(entry_node(&bundle, Some(&qn("plain"))), Ok(bundle.find(&qn("plain"))));
        assert_eq!(entry_node(&bundle, None), Ok(bundle.find(&qn("main"))));
        assert_eq!(
            entry_node(&bundle, Some(&qn("absent"))),
            Err(ConditionError::StartNodeNotFound {
                node_id: qn("absent"),
                bundle_id: qn("b"),
            })
        );
    }

    #[test]
    fn test_meta_bundle_read_from_main_activity() {
        let bundle = Bundle::builder(qn("b"))
            .node(
                typed("main", NodeKind::Activity, kind::MAIN_ACTIVITY)
                    .with_attribute(attr::REFERENCED_META_BUNDLE_ID, AttributeValue::qualified_name(qn("meta"))),
            )
            .build()
            .unwrap();
        assert_eq!(meta_bundle_id(&bundle), Some(&qn("meta")));
    }
}
