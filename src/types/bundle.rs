//! Bundle: one signed unit of a provenance graph.
//!
//! Nodes and edges live in arenas owned by the bundle and are addressed by
//! [`NodeIdx`] / [`EdgeIdx`]. Node identity within a loaded bundle is index
//! identity; the adjacency lists give O(1) access to the edges a node takes
//! part in as cause or as effect.
//!
//! On the wire a bundle is a flat document with edges referring to node ids;
//! conversion into the arena validates that every edge endpoint exists and
//! that node ids are unique.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::edge::{Edge, RelationKind};
use super::name::QualifiedName;
use super::node::Node;

/// Index of a node inside its bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIdx(pub(crate) usize);

impl NodeIdx {
    /// Raw arena position.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of an edge inside its bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeIdx(pub(crate) usize);

impl EdgeIdx {
    /// Raw arena position.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Error building a bundle from its document form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BundleError {
    /// Two nodes share an id.
    #[error("Duplicate node id in bundle {bundle}: {node}")]
    DuplicateNode {
        /// Bundle id.
        bundle: QualifiedName,
        /// Offending node id.
        node: QualifiedName,
    },
    /// An edge refers to a node that is not in the bundle.
    #[error("Edge endpoint not found in bundle {bundle}: {node}")]
    DanglingEdge {
        /// Bundle id.
        bundle: QualifiedName,
        /// Missing node id.
        node: QualifiedName,
    },
    /// An edge carries no relation statement.
    #[error("Edge {cause} -> {effect} carries no relation")]
    EmptyRelations {
        /// Cause node id.
        cause: QualifiedName,
        /// Effect node id.
        effect: QualifiedName,
    },
}

/// Wire form of an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDocument {
    /// Cause node id.
    pub cause: QualifiedName,
    /// Effect node id.
    pub effect: QualifiedName,
    /// Relation statements.
    pub relations: Vec<RelationKind>,
}

/// Wire form of a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDocument {
    /// Bundle id.
    pub id: QualifiedName,
    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Edges in declaration order.
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
}

/// A loaded, immutable bundle graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "BundleDocument", into = "BundleDocument")]
pub struct Bundle {
    id: QualifiedName,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    by_id: HashMap<QualifiedName, NodeIdx>,
    /// Edges in which the node is the cause.
    as_cause: Vec<Vec<EdgeIdx>>,
    /// Edges in which the node is the effect.
    as_effect: Vec<Vec<EdgeIdx>>,
}

impl Bundle {
    /// Start building a bundle.
    pub fn builder(id: QualifiedName) -> BundleBuilder {
        BundleBuilder {
            document: BundleDocument {
                id,
                nodes: Vec::new(),
                edges: Vec::new(),
            },
        }
    }

    /// Build a bundle from its wire document.
    pub fn from_document(document: BundleDocument) -> Result<Self, BundleError> {
        let BundleDocument { id, nodes, edges: edge_docs } = document;

        let mut by_id = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if by_id.insert(node.id.clone(), NodeIdx(i)).is_some() {
                return Err(BundleError::DuplicateNode {
                    bundle: id,
                    node: node.id.clone(),
                });
            }
        }

        let mut as_cause = vec![Vec::new(); nodes.len()];
        let mut as_effect = vec![Vec::new(); nodes.len()];
        let mut edges = Vec::with_capacity(edge_docs.len());

        for doc in edge_docs {
            if doc.relations.is_empty() {
                return Err(BundleError::EmptyRelations {
                    cause: doc.cause,
                    effect: doc.effect,
                });
            }
            let cause = *by_id.get(&doc.cause).ok_or_else(|| BundleError::DanglingEdge {
                bundle: id.clone(),
                node: doc.cause.clone(),
            })?;
            let effect = *by_id.get(&doc.effect).ok_or_else(|| BundleError::DanglingEdge {
                bundle: id.clone(),
                node: doc.effect.clone(),
            })?;

            let idx = EdgeIdx(edges.len());
            as_cause[cause.0].push(idx);
            as_effect[effect.0].push(idx);
            edges.push(Edge {
                cause,
                effect,
                relations: doc.relations,
            });
        }

        Ok(Self {
            id,
            nodes,
            edges,
            by_id,
            as_cause,
            as_effect,
        })
    }

    /// Bundle id.
    pub fn id(&self) -> &QualifiedName {
        &self.id
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the bundle has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges in declaration order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Indices of all nodes in declaration order.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        (0..self.nodes.len()).map(NodeIdx)
    }

    /// Node at an index.
    ///
    /// Indices are only produced by this bundle, so lookups cannot miss.
    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0]
    }

    /// Edge at an index.
    pub fn edge(&self, idx: EdgeIdx) -> &Edge {
        &self.edges[idx.0]
    }

    /// Look up a node by id.
    pub fn find(&self, id: &QualifiedName) -> Option<NodeIdx> {
        self.by_id.get(id).copied()
    }

    /// Edges in which the node is the cause.
    pub fn edges_as_cause(&self, idx: NodeIdx) -> &[EdgeIdx] {
        &self.as_cause[idx.0]
    }

    /// Edges in which the node is the effect.
    pub fn edges_as_effect(&self, idx: NodeIdx) -> &[EdgeIdx] {
        &self.as_effect[idx.0]
    }

    /// Every (edge, neighbour) step out of a node, ignoring direction.
    ///
    /// Steps along edges where the node is the cause come first, then steps
    /// along edges where it is the effect, each in declaration order.
    pub fn steps_from(&self, idx: NodeIdx) -> impl Iterator<Item = (EdgeIdx, NodeIdx)> + '_ {
        let forward = self.as_cause[idx.0]
            .iter()
            .map(move |&e| (e, self.edges[e.0].effect));
        let backward = self.as_effect[idx.0]
            .iter()
            .map(move |&e| (e, self.edges[e.0].cause));
        forward.chain(backward)
    }

    /// Convert back into the wire document.
    pub fn to_document(&self) -> BundleDocument {
        BundleDocument {
            id: self.id.clone(),
            nodes: self.nodes.clone(),
            edges: self
                .edges
                .iter()
                .map(|e| EdgeDocument {
                    cause: self.nodes[e.cause.0].id.clone(),
                    effect: self.nodes[e.effect.0].id.clone(),
                    relations: e.relations.clone(),
                })
                .collect(),
        }
    }
}

impl TryFrom<BundleDocument> for Bundle {
    type Error = BundleError;

    fn try_from(document: BundleDocument) -> Result<Self, Self::Error> {
        Self::from_document(document)
    }
}

impl From<Bundle> for BundleDocument {
    fn from(bundle: Bundle) -> Self {
        bundle.to_document()
    }
}

/// Incremental bundle construction.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    document: BundleDocument,
}

impl BundleBuilder {
    /// Add a node.
    pub fn node(mut self, node: Node) -> Self {
        self.document.nodes.push(node);
        self
    }

    /// Add an edge with a single relation.
    pub fn edge(self, cause: QualifiedName, effect: QualifiedName, kind: RelationKind) -> Self {
        self.edge_with(cause, effect, vec![kind])
    }

    /// Add an edge with several relations.
    pub fn edge_with(mut self, cause: QualifiedName, effect: QualifiedName, relations: Vec<RelationKind>) -> Self {
        self.document.edges.push(EdgeDocument { cause, effect, relations });
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<Bundle, BundleError> {
        Bundle::from_document(self.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKind;

    fn qn(local: &str) -> QualifiedName {
        QualifiedName::new("https://example.org/", local)
    }

    #[test]
    fn test_adjacency_is_built_both_ways() {
        let bundle = Bundle::builder(qn("b"))
            .node(Node::new(qn("a"), NodeKind::Activity))
            .node(Node::new(qn("e"), NodeKind::Entity))
            .edge(qn("a"), qn("e"), RelationKind::Generation)
            .build()
            .unwrap();

        let a = bundle.find(&qn("a")).unwrap();
        let e = bundle.find(&qn("e")).unwrap();
        assert_eq!(bundle.edges_as_cause(a).len(), 1);
        assert_eq!(bundle.edges_as_effect(e).len(), 1);

        let steps: Vec<_> = bundle.steps_from(e).map(|(_, n)| n).collect();
        assert_eq!(steps, vec![a]);
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let err = Bundle::builder(qn("b"))
            .node(Node::new(qn("a"), NodeKind::Activity))
            .edge(qn("a"), qn("missing"), RelationKind::Usage)
            .build()
            .unwrap_err();
        assert!(matches!(err, BundleError::DanglingEdge { .. }));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let err = Bundle::builder(qn("b"))
            .node(Node::new(qn("a"), NodeKind::Activity))
            .node(Node::new(qn("a"), NodeKind::Entity))
            .build()
            .unwrap_err();
        assert!(matches!(err, BundleError::DuplicateNode { .. }));
    }

    #[test]
    fn test_document_round_trip_preserves_edges() {
        let json = serde_json::json!({
            "id": {"nameSpaceUri": "https://example.org/", "localPart": "b"},
            "nodes": [
                {"id": {"nameSpaceUri": "https://example.org/", "localPart": "x"}, "kind": "Entity"},
                {"id": {"nameSpaceUri": "https://example.org/", "localPart": "y"}, "kind": "PROV_ENTITY"}
            ],
            "edges": [
                {
                    "cause": {"nameSpaceUri": "https://example.org/", "localPart": "x"},
                    "effect": {"nameSpaceUri": "https://example.org/", "localPart": "y"},
                    "relations": ["derivation"]
                }
            ]
        });
        let bundle: Bundle = serde_json::from_value(json).unwrap();
        assert_eq!(bundle.len(), 2);
        assert!(bundle.edges()[0].has_relation(RelationKind::Derivation));

        let back = serde_json::to_value(&bundle).unwrap();
        assert_eq!(back["edges"][0]["relations"][0], "derivation");
    }
}
