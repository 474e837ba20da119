//! Constrained linear path enumeration over one bundle's graph.

use std::convert::Infallible;

use crate::traversal::Step;
use crate::types::{Bundle, NodeIdx};

/// A matched path: one step per constraint, starting with the start node.
pub type LinearSubgraph = Vec<Step>;

/// Depth-first enumeration of simple paths that satisfy a list of step constraints.
///
/// Constraint 0 tests the start node itself (its step has no edge); constraint
/// `k` tests the `k`-th step. At each hop both cause and effect edges are
/// tried. A node already used earlier on the same path is never revisited,
/// which bounds the search even on cyclic graphs.
#[derive(Debug, Clone, Copy)]
pub struct SubgraphMatcher<'a> {
    bundle: &'a Bundle,
}

impl<'a> SubgraphMatcher<'a> {
    /// Create a matcher for a bundle.
    pub fn new(bundle: &'a Bundle) -> Self {
        Self { bundle }
    }

    /// Every simple path from `start` whose steps satisfy `constraints` position by position.
    pub fn find_linear_subgraphs(&self, start: NodeIdx, constraints: &[&dyn Fn(Step) -> bool]) -> Vec<LinearSubgraph> {
        let found: Result<_, Infallible> =
            self.try_find(start, constraints.len(), |position, step| Ok(constraints[position](step)));
        match found {
            Ok(paths) => paths,
            Err(never) => match never {},
        }
    }

    /// Fallible enumeration with `depth` constraints evaluated by `test(position, step)`.
    ///
    /// Only paths of exactly `depth` steps are returned; `depth == 0` yields nothing.
    pub fn try_find<E, F>(&self, start: NodeIdx, depth: usize, mut test: F) -> Result<Vec<LinearSubgraph>, E>
    where
        F: FnMut(usize, Step) -> Result<bool, E>,
    {
        let mut results = Vec::new();
        if depth == 0 {
            return Ok(results);
        }

        let mut on_path = vec![false; self.bundle.len()];
        let mut path = Vec::with_capacity(depth);
        self.extend(Step::start(start), depth, &mut test, &mut on_path, &mut path, &mut results)?;
        Ok(results)
    }

    fn extend<E, F>(
        &self,
        step: Step,
        depth: usize,
        test: &mut F,
        on_path: &mut [bool],
        path: &mut Vec<Step>,
        results: &mut Vec<LinearSubgraph>,
    ) -> Result<(), E>
    where
        F: FnMut(usize, Step) -> Result<bool, E>,
    {
        if on_path[step.node.index()] || !test(path.len(), step)? {
            return Ok(());
        }

        path.push(step);
        if path.len() == depth {
            results.push(path.clone());
        } else {
            on_path[step.node.index()] = true;
            for (edge, next) in self.bundle.steps_from(step.node) {
                self.extend(Step::along(edge, next), depth, test, on_path, path, results)?;
            }
            on_path[step.node.index()] = false;
        }
        path.pop();

        Ok(())
    }
}
