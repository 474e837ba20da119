//! Findable subgraphs and the measures built on them.
//!
//! A [`Findable`] searches a bundle from its entry node and returns a list of
//! [`Subgraph`]s. Its count is the number of linear paths for
//! `FittingLinearSubgraphs` and the number of distinct nodes found for every
//! other variant, so `StartNode` counts 0 or 1 and `WholeGraph` counts the
//! bundle's nodes.

use std::collections::HashSet;

use super::{BundleView, Condition, ConditionError, NodePredicate, StepPredicate, StepRef};
use crate::subgraph::SubgraphMatcher;
use crate::traversal::GraphTraverser;
use crate::types::{EdgeIdx, NodeIdx};

/// Nodes and edges found by a search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subgraph {
    /// Nodes in discovery order.
    pub nodes: Vec<NodeIdx>,
    /// Edges between them.
    pub edges: Vec<EdgeIdx>,
}

impl Subgraph {
    /// A single node without edges.
    pub fn single(node: NodeIdx) -> Self {
        Self {
            nodes: vec![node],
            edges: Vec::new(),
        }
    }
}

/// Search producing subgraphs of a bundle.
#[derive(Debug, Clone)]
pub enum Findable {
    /// Nodes satisfying a condition, one single-node subgraph each.
    ///
    /// Candidates are the nodes reachable from the entry node, or the nodes
    /// of `starts_in` when given.
    FittingNodes {
        /// Node condition.
        node_condition: Option<Box<Condition<NodePredicate>>>,
        /// Restricts the candidate nodes.
        starts_in: Option<Box<Findable>>,
    },
    /// Simple paths whose steps satisfy `graph_parts` position by position.
    ///
    /// Paths start at every node reachable from the entry node, or at every
    /// node of `starts_in` when given.
    FittingLinearSubgraphs {
        /// One step condition per path position.
        graph_parts: Option<Vec<Condition<StepPredicate>>>,
        /// Restricts the path start nodes.
        starts_in: Option<Box<Findable>>,
    },
    /// Filtered reachability: one subgraph per start node.
    ///
    /// Start nodes are the entry node, or the nodes of `starts_in` when given.
    FilteredSubgraphs {
        /// Step filter; start nodes are not tested.
        filter: Option<Box<Condition<StepPredicate>>>,
        /// Restricts the start nodes.
        starts_in: Option<Box<Findable>>,
    },
    /// Nodes reachable from the entry node along a derivation path.
    DerivationPathFromStartNode {
        /// Walk towards causes.
        backward: Option<bool>,
    },
    /// The entry node alone.
    StartNode,
    /// The whole bundle.
    WholeGraph,
}

impl Findable {
    /// Run the search.
    pub fn find(&self, view: &BundleView<'_>) -> Result<Vec<Subgraph>, ConditionError> {
        match self {
            Self::FittingNodes { node_condition, starts_in } => {
                let condition = node_condition
                    .as_ref()
                    .ok_or_else(|| ConditionError::missing("FittingNodes", "nodeCondition"))?;
                let candidates = match starts_in {
                    Some(inner) => distinct_nodes(&inner.find(view)?),
                    None => reachable(view),
                };
                let mut found = Vec::new();
                for idx in candidates {
                    if condition.test(view.bundle.node(idx))? {
                        found.push(Subgraph::single(idx));
                    }
                }
                Ok(found)
            }
            Self::FittingLinearSubgraphs { graph_parts, starts_in } => {
                let parts = graph_parts
                    .as_ref()
                    .ok_or_else(|| ConditionError::missing("FittingLinearSubgraphs", "graphParts"))?;
                let starts = match starts_in {
                    Some(inner) => distinct_nodes(&inner.find(view)?),
                    None => reachable(view),
                };
                let matcher = SubgraphMatcher::new(view.bundle);
                let mut found = Vec::new();
                for start in starts {
                    let paths = matcher.try_find(start, parts.len(), |position, step| {
                        parts[position].test(&StepRef { bundle: view.bundle, step })
                    })?;
                    found.extend(paths.into_iter().map(|path| Subgraph {
                        nodes: path.iter().map(|s| s.node).collect(),
                        edges: path.iter().filter_map(|s| s.edge).collect(),
                    }));
                }
                Ok(found)
            }
            Self::FilteredSubgraphs { filter, starts_in } => {
                let filter = filter
                    .as_ref()
                    .ok_or_else(|| ConditionError::missing("FilteredSubgraphs", "filter"))?;
                let starts = match starts_in {
                    Some(inner) => distinct_nodes(&inner.find(view)?),
                    None => view.start.into_iter().collect(),
                };
                let traverser = GraphTraverser::new(view.bundle);
                let mut found = Vec::new();
                for start in starts {
                    let mut edges = Vec::new();
                    let nodes = traverser.try_reach_filtered(start, |step| {
                        let accepted = filter.test(&StepRef { bundle: view.bundle, step })?;
                        if let (true, Some(edge)) = (accepted, step.edge) {
                            edges.push(edge);
                        }
                        Ok(accepted)
                    })?;
                    found.push(Subgraph { nodes, edges });
                }
                Ok(found)
            }
            Self::DerivationPathFromStartNode { backward } => Self::FilteredSubgraphs {
                filter: Some(Box::new(Condition::leaf(StepPredicate::derivation_path(*backward)))),
                starts_in: Some(Box::new(Self::StartNode)),
            }
            .find(view),
            Self::StartNode => Ok(view.start.map(Subgraph::single).into_iter().collect()),
            Self::WholeGraph => Ok(vec![Subgraph {
                nodes: view.bundle.node_indices().collect(),
                edges: (0..view.bundle.edges().len()).map(EdgeIdx).collect(),
            }]),
        }
    }

    /// Size of the search result.
    pub fn count(&self, view: &BundleView<'_>) -> Result<usize, ConditionError> {
        let found = self.find(view)?;
        Ok(match self {
            Self::FittingLinearSubgraphs { .. } => found.len(),
            _ => distinct_nodes(&found).len(),
        })
    }
}

/// A measure of a bundle.
#[derive(Debug, Clone)]
pub enum Countable {
    /// A fixed number.
    CountConstant(Option<usize>),
    /// The size of a search result.
    Find(Findable),
}

impl Countable {
    /// Evaluate the measure.
    pub fn count(&self, view: &BundleView<'_>) -> Result<usize, ConditionError> {
        match self {
            Self::CountConstant(count) => count.ok_or_else(|| ConditionError::missing("CountConstant", "count")),
            Self::Find(findable) => findable.count(view),
        }
    }
}

fn reachable(view: &BundleView<'_>) -> Vec<NodeIdx> {
    match view.start {
        Some(start) => GraphTraverser::new(view.bundle).reachable_from(start),
        None => Vec::new(),
    }
}

/// Distinct nodes across subgraphs, in first-seen order.
pub(crate) fn distinct_nodes(subgraphs: &[Subgraph]) -> Vec<NodeIdx> {
    let mut seen = HashSet::new();
    subgraphs
        .iter()
        .flat_map(|s| s.nodes.iter().copied())
        .filter(|idx| seen.insert(*idx))
        .collect()
}
