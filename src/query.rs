//! Bundle queries: what a search evaluates inside every visited bundle.
//!
//! A query is a [`QueryType`] plus a JSON specification. It is parsed once,
//! before any bundle is touched, and then evaluated against each bundle at
//! its entry node.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::parse::FINDABLE_TAGS;
use crate::condition::{
    parse_bundle_condition, parse_findable, parse_node_condition, BundlePredicate, BundleView, Condition,
    ConditionError, Findable, NodePredicate, Subgraph,
};
use crate::cpm::{self, attr, Connector, CPM_URI};
use crate::types::{Bundle, Direction, EdgeDocument, Node, NodeIdx, QualifiedName, Token};

/// Kind of answer a query produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    /// Ids of the nodes found.
    NodeIds,
    /// The nodes found.
    Nodes,
    /// Subgraphs found.
    Subgraphs,
    /// Connector records in a direction.
    Connectors,
    /// Whether the bundle satisfies a bundle condition.
    TestFits,
}

impl QueryType {
    /// Every supported query type.
    pub const ALL: [QueryType; 5] = [
        QueryType::NodeIds,
        QueryType::Nodes,
        QueryType::Subgraphs,
        QueryType::Connectors,
        QueryType::TestFits,
    ];
}

/// A parsed query.
#[derive(Debug, Clone)]
pub enum BundleQuery {
    /// Node ids found by the findable.
    NodeIds(Findable),
    /// Nodes found by the findable.
    Nodes(Findable),
    /// Subgraphs found by the findable.
    Subgraphs(Findable),
    /// Connectors in a direction; `None` means both.
    Connectors(Option<Direction>),
    /// Bundle condition.
    TestFits(Condition<BundlePredicate>),
}

impl BundleQuery {
    /// Parse a specification for a query type.
    ///
    /// `NODE_IDS` and `NODES` also accept a bare node condition, which is
    /// read as `FittingNodes` over everything reachable from the entry node.
    pub fn parse(query_type: QueryType, specification: &Value) -> Result<Self, ConditionError> {
        match query_type {
            QueryType::NodeIds => node_findable(specification).map(Self::NodeIds),
            QueryType::Nodes => node_findable(specification).map(Self::Nodes),
            QueryType::Subgraphs => parse_findable(specification).map(Self::Subgraphs),
            QueryType::Connectors => parse_direction(specification).map(Self::Connectors),
            QueryType::TestFits => parse_bundle_condition(specification).map(Self::TestFits),
        }
    }

    /// The query's type.
    pub fn query_type(&self) -> QueryType {
        match self {
            Self::NodeIds(_) => QueryType::NodeIds,
            Self::Nodes(_) => QueryType::Nodes,
            Self::Subgraphs(_) => QueryType::Subgraphs,
            Self::Connectors(_) => QueryType::Connectors,
            Self::TestFits(_) => QueryType::TestFits,
        }
    }

    /// Evaluate against a bundle entered at `entry`.
    ///
    /// No entry means the default start node; an entry the bundle lacks
    /// fails with [`ConditionError::StartNodeNotFound`].
    pub fn evaluate(&self, bundle: &Bundle, entry: Option<&QualifiedName>) -> Result<QueryResult, ConditionError> {
        self.evaluate_view(&BundleView::new(bundle, cpm::entry_node(bundle, entry)?))
    }

    /// Evaluate against an already resolved view.
    pub fn evaluate_view(&self, view: &BundleView<'_>) -> Result<QueryResult, ConditionError> {
        let bundle = view.bundle;
        let view = *view;
        let result = match self {
            Self::NodeIds(findable) => QueryResult::NodeIds(
                found_nodes(&view, findable)?
                    .into_iter()
                    .map(|idx| bundle.node(idx).id.clone())
                    .collect(),
            ),
            Self::Nodes(findable) => QueryResult::Nodes(
                found_nodes(&view, findable)?
                    .into_iter()
                    .map(|idx| bundle.node(idx).clone())
                    .collect(),
            ),
            Self::Subgraphs(findable) => QueryResult::Subgraphs(
                findable
                    .find(&view)?
                    .iter()
                    .map(|s| SubgraphDocument::from_subgraph(bundle, s))
                    .collect(),
            ),
            Self::Connectors(direction) => QueryResult::Connectors(discover_connectors(&view, *direction)?),
            Self::TestFits(condition) => QueryResult::TestFits(condition.test(&view)?),
        };
        Ok(result)
    }
}

fn node_findable(specification: &Value) -> Result<Findable, ConditionError> {
    let tag = specification.get("type").and_then(Value::as_str);
    if tag.is_some_and(|t| FINDABLE_TAGS.contains(&t)) {
        return parse_findable(specification);
    }
    Ok(Findable::FittingNodes {
        node_condition: Some(Box::new(parse_node_condition(specification)?)),
        starts_in: None,
    })
}

fn parse_direction(specification: &Value) -> Result<Option<Direction>, ConditionError> {
    let backward = match specification {
        Value::Null => return Ok(None),
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "backward" => Some(true),
            "forward" => Some(false),
            _ => None,
        },
        Value::Object(obj) => match obj.get("backward") {
            None | Some(Value::Null) => return Ok(None),
            Some(v) => v.as_bool(),
        },
        _ => None,
    };
    backward.map(|b| Some(Direction::from_backward(b))).ok_or_else(|| {
        ConditionError::Configuration(format!("Invalid connector direction: {}", specification))
    })
}

fn found_nodes(view: &BundleView<'_>, findable: &Findable) -> Result<Vec<NodeIdx>, ConditionError> {
    Ok(crate::condition::countable::distinct_nodes(&findable.find(view)?))
}

/// Connector nodes of a direction on the derivation path through the entry node.
pub fn discover_connectors(
    view: &BundleView<'_>,
    direction: Option<Direction>,
) -> Result<Vec<Connector>, ConditionError> {
    let kind = match direction {
        Some(Direction::Backward) => "backward",
        Some(Direction::Forward) => "forward",
        None => "(backward|forward)",
    };
    let type_regex = format!("{}{}Connector", regex_lite::escape(CPM_URI), kind);
    let findable = Findable::FittingNodes {
        node_condition: Some(Box::new(Condition::leaf(NodePredicate::has_qualified_name_value(
            attr::PROV_TYPE,
            &type_regex,
        )?))),
        starts_in: Some(Box::new(Findable::DerivationPathFromStartNode {
            backward: direction.map(Direction::is_backward),
        })),
    };
    Ok(found_nodes(view, &findable)?
        .into_iter()
        .map(|idx| Connector::from_node(view.bundle, idx))
        .collect())
}

/// Wire form of a found subgraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphDocument {
    /// Nodes in discovery order.
    pub nodes: Vec<Node>,
    /// Edges between them.
    pub edges: Vec<EdgeDocument>,
}

impl SubgraphDocument {
    fn from_subgraph(bundle: &Bundle, subgraph: &Subgraph) -> Self {
        Self {
            nodes: subgraph.nodes.iter().map(|&idx| bundle.node(idx).clone()).collect(),
            edges: subgraph
                .edges
                .iter()
                .map(|&idx| {
                    let edge = bundle.edge(idx);
                    EdgeDocument {
                        cause: bundle.node(edge.cause).id.clone(),
                        effect: bundle.node(edge.effect).id.clone(),
                        relations: edge.relations.clone(),
                    }
                })
                .collect(),
        }
    }
}

/// Answer of a query for one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryResult {
    /// Node ids.
    NodeIds(Vec<QualifiedName>),
    /// Nodes.
    Nodes(Vec<Node>),
    /// Subgraphs.
    Subgraphs(Vec<SubgraphDocument>),
    /// Connector records.
    Connectors(Vec<Connector>),
    /// Whether the bundle fits.
    TestFits(bool),
}

impl QueryResult {
    /// Whether the answer carries nothing; a failed fit test counts as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::NodeIds(v) => v.is_empty(),
            Self::Nodes(v) => v.is_empty(),
            Self::Subgraphs(v) => v.is_empty(),
            Self::Connectors(v) => v.is_empty(),
            Self::TestFits(fits) => !fits,
        }
    }
}

/// Query sent to a provenance service for one of its bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleQueryRequest {
    /// Bundle to query.
    pub bundle_id: QualifiedName,
    /// Entry node; the default start node when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node_id: Option<QualifiedName>,
    /// Query type.
    pub query_type: QueryType,
    /// Query specification.
    #[serde(default)]
    pub query_specification: Value,
}

/// Answer of a provenance service to a [`BundleQueryRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleQueryResponse {
    /// Integrity token of the queried bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    /// The answer.
    pub result: QueryResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpm::{kind, BLANK_URI};
    use crate::types::{AttributeValue, NodeKind, RelationKind};
    use serde_json::json;

    fn qn(local: &str) -> QualifiedName {
        QualifiedName::new(BLANK_URI, local)
    }

    fn connector(local: &str, type_uri: &str, target: &str) -> Node {
        Node::new(qn(local), NodeKind::Entity)
            .with_attribute(attr::PROV_TYPE, AttributeValue::qualified_name(QualifiedName::from_uri(type_uri)))
            .with_attribute(attr::REFERENCED_BUNDLE_ID, AttributeValue::qualified_name(qn(target)))
    }

    // prev -> sample -> next along derivations, plus an unrelated agent
    fn bundle() -> Bundle {
        Bundle::builder(qn("bundle"))
            .node(connector("prev", kind::BACKWARD_CONNECTOR, "upstream"))
            .node(Node::new(qn("sample"), NodeKind::Entity))
            .node(connector("next", kind::FORWARD_CONNECTOR, "downstream"))
            .node(Node::new(qn("lab"), NodeKind::Agent))
            .edge(qn("prev"), qn("sample"), RelationKind::Derivation)
            .edge(qn("sample"), qn("next"), RelationKind::Derivation)
            .edge(qn("lab"), qn("sample"), RelationKind::Attribution)
            .build()
            .unwrap()
    }

    #[test]
    fn test_connectors_follow_direction() {
        let b = bundle();
        let sample = qn("sample");

        let forward = BundleQuery::parse(QueryType::Connectors, &json!("forward")).unwrap();
        match forward.evaluate(&b, Some(&sample)).unwrap() {
            QueryResult::Connectors(found) => {
                assert_eq!(found.len(), 1);
                assert_eq!(found[0].id, qn("next"));
                assert_eq!(found[0].referenced_bundle_id, Some(qn("downstream")));
            }
            other => panic!("unexpected {:?}", other),
        }

        let both = BundleQuery::parse(QueryType::Connectors, &Value::Null).unwrap();
        let found = both.evaluate(&b, Some(&sample)).unwrap();
        assert!(matches!(found, QueryResult::Connectors(ref c) if c.len() == 2));

        let backward = BundleQuery::parse(QueryType::Connectors, &json!({"backward": true})).unwrap();
        let found = backward.evaluate(&b, Some(&sample)).unwrap();
        assert!(matches!(found, QueryResult::Connectors(ref c) if c.len() == 1 && c[0].id == qn("prev")));
    }

    #[test]
    fn test_bare_node_condition_accepted_for_node_ids() {
        let b = bundle();
        let query = BundleQuery::parse(QueryType::NodeIds, &json!({"type": "IsKind", "kind": "Agent"})).unwrap();
        let result = query.evaluate(&b, Some(&qn("sample"))).unwrap();
        assert_eq!(result, QueryResult::NodeIds(vec![qn("lab")]));
    }

    #[test]
    fn test_only_unnamed_entry_uses_default_start_node() {
        let b = bundle();
        let query = BundleQuery::parse(QueryType::NodeIds, &json!({"type": "StartNode"})).unwrap();
        // the first forward connector wins
        assert_eq!(query.evaluate(&b, None).unwrap(), QueryResult::NodeIds(vec![qn("next")]));
        assert!(matches!(
            query.evaluate(&b, Some(&qn("absent"))),
            Err(ConditionError::StartNodeNotFound { node_id, .. }) if node_id == qn("absent")
        ));
    }

    #[test]
    fn test_test_fits_and_emptiness() {
        let b = bundle();
        let query = BundleQuery::parse(
            QueryType::TestFits,
            &json!({
                "type": "CountComparisonCondition",
                "first": {"type": "WholeGraph"},
                "comparisonResult": "EQ",
                "second": {"type": "CountConstant", "count": 4}
            }),
        )
        .unwrap();
        let result = query.evaluate(&b, None).unwrap();
        assert_eq!(result, QueryResult::TestFits(true));
        assert!(!result.is_empty());
        assert!(QueryResult::TestFits(false).is_empty());
    }

    #[test]
    fn test_subgraph_result_wire_form() {
        let b = bundle();
        let query = BundleQuery::parse(
            QueryType::Subgraphs,
            &json!({"type": "DerivationPathFromStartNode", "backward": false}),
        )
        .unwrap();
        let result = query.evaluate(&b, Some(&qn("sample"))).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "SUBGRAPHS");
        assert_eq!(json["value"][0]["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["value"][0]["edges"][0]["relations"][0], "derivation");
    }

    #[test]
    fn test_invalid_direction_rejected() {
        assert!(BundleQuery::parse(QueryType::Connectors, &json!("sideways")).is_err());
    }
}
