//! Reachability search over one bundle's graph.
//!
//! The graph is treated as undirected: from any node the traverser follows
//! edges in which the node is the cause and edges in which it is the effect.
//! Every node is visited at most once, keyed by arena index, so cyclic
//! cause/effect structures terminate.

use std::collections::VecDeque;
use std::convert::Infallible;

use crate::types::{Bundle, EdgeIdx, Node, NodeIdx, QualifiedName};

/// One step of a walk: the edge taken (none for the start node) and the node reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Step {
    /// Edge traversed to reach `node`; `None` for the start of a walk.
    pub edge: Option<EdgeIdx>,
    /// Node reached.
    pub node: NodeIdx,
}

impl Step {
    /// The start of a walk.
    pub fn start(node: NodeIdx) -> Self {
        Self { edge: None, node }
    }

    /// A step along an edge.
    pub fn along(edge: EdgeIdx, node: NodeIdx) -> Self {
        Self { edge: Some(edge), node }
    }
}

/// Breadth-first reachability search over a single bundle.
#[derive(Debug, Clone, Copy)]
pub struct GraphTraverser<'a> {
    bundle: &'a Bundle,
}

impl<'a> GraphTraverser<'a> {
    /// Create a traverser for a bundle.
    pub fn new(bundle: &'a Bundle) -> Self {
        Self { bundle }
    }

    /// Collect every node reachable from `start_id` that satisfies `predicate`,
    /// in discovery order.
    ///
    /// A start node that is not in the bundle yields an empty result.
    pub fn traverse_and_find<F>(&self, start_id: &QualifiedName, mut predicate: F) -> Vec<&'a Node>
    where
        F: FnMut(&Node) -> bool,
    {
        let Some(start) = self.bundle.find(start_id) else {
            return Vec::new();
        };
        let bundle = self.bundle;
        let found: Result<Vec<NodeIdx>, Infallible> =
            self.try_find_from(start, |idx| Ok(predicate(bundle.node(idx))));
        match found {
            Ok(indices) => indices.into_iter().map(|idx| bundle.node(idx)).collect(),
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`traverse_and_find`](Self::traverse_and_find) over node indices.
    ///
    /// The first predicate error aborts the search.
    pub fn try_find_from<E, F>(&self, start: NodeIdx, mut predicate: F) -> Result<Vec<NodeIdx>, E>
    where
        F: FnMut(NodeIdx) -> Result<bool, E>,
    {
        let mut found = Vec::new();
        for idx in self.reachable_from(start) {
            if predicate(idx)? {
                found.push(idx);
            }
        }
        Ok(found)
    }

    /// Every node reachable from `start`, in breadth-first discovery order.
    pub fn reachable_from(&self, start: NodeIdx) -> Vec<NodeIdx> {
        let walked: Result<Vec<NodeIdx>, Infallible> = self.try_reach_filtered(start, |_| Ok(true));
        match walked {
            Ok(nodes) => nodes,
            Err(never) => match never {},
        }
    }

    /// Nodes reachable from `start` using only steps accepted by `filter`.
    ///
    /// The start node is always included and is not tested. A node rejected
    /// through one edge may still be reached through another.
    pub fn try_reach_filtered<E, F>(&self, start: NodeIdx, mut filter: F) -> Result<Vec<NodeIdx>, E>
    where
        F: FnMut(Step) -> Result<bool, E>,
    {
        let mut visited = vec![false; self.bundle.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        visited[start.index()] = true;
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            order.push(current);
            for (edge, next) in self.bundle.steps_from(current) {
                if visited[next.index()] {
                    continue;
                }
                if filter(Step::along(edge, next))? {
                    visited[next.index()] = true;
                    queue.push_back(next);
                }
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeKind, RelationKind};

    fn qn(local: &str) -> QualifiedName {
        QualifiedName::new("https://example.org/", local)
    }

    fn cyclic_bundle() -> Bundle {
        // a -> b -> c -> a, plus d hanging off c
        Bundle::builder(qn("bundle"))
            .node(Node::new(qn("a"), NodeKind::Entity))
            .node(Node::new(qn("b"), NodeKind::Activity))
            .node(Node::new(qn("c"), NodeKind::Entity))
            .node(Node::new(qn("d"), NodeKind::Agent))
            .node(Node::new(qn("island"), NodeKind::Entity))
            .edge(qn("a"), qn("b"), RelationKind::Usage)
            .edge(qn("b"), qn("c"), RelationKind::Generation)
            .edge(qn("c"), qn("a"), RelationKind::Derivation)
            .edge(qn("d"), qn("c"), RelationKind::Attribution)
            .build()
            .unwrap()
    }

    #[test]
    fn test_absent_start_node_returns_empty() {
        let bundle = cyclic_bundle();
        let found = GraphTraverser::new(&bundle).traverse_and_find(&qn("nope"), |_| true);
        assert!(found.is_empty());
    }

    #[test]
    fn test_cycle_visits_each_node_once() {
        let bundle = cyclic_bundle();
        let found = GraphTraverser::new(&bundle).traverse_and_find(&qn("a"), |_| true);
        let ids: Vec<_> = found.iter().map(|n| n.id.local_part.as_str()).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], "a");
        assert!(!ids.contains(&"island"));
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len(), "no node may be reported twice");
    }

    #[test]
    fn test_edges_are_followed_in_both_directions() {
        let bundle = cyclic_bundle();
        // d is only the cause of its single edge; starting at c must still reach it
        let found = GraphTraverser::new(&bundle).traverse_and_find(&qn("c"), |n| n.kind == NodeKind::Agent);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, qn("d"));
    }

    #[test]
    fn test_filtered_walk_keeps_start_and_respects_filter() {
        let bundle = cyclic_bundle();
        let traverser = GraphTraverser::new(&bundle);
        let a = bundle.find(&qn("a")).unwrap();

        let reached: Result<Vec<_>, Infallible> = traverser.try_reach_filtered(a, |step| {
            let edge = bundle.edge(step.edge.unwrap());
            Ok(edge.has_relation(RelationKind::Derivation))
        });
        let reached = reached.unwrap();
        assert_eq!(reached, vec![a, bundle.find(&qn("c")).unwrap()]);
    }

    #[test]
    fn test_predicate_error_aborts() {
        let bundle = cyclic_bundle();
        let a = bundle.find(&qn("a")).unwrap();
        let result: Result<Vec<_>, &str> = GraphTraverser::new(&bundle).try_find_from(a, |_| Err("boom"));
        assert_eq!(result, Err("boom"));
    }
}
