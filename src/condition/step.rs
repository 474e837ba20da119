//! Predicates over (edge, node) steps of a walk.

use super::{Condition, ConditionError, EdgePredicate, Evaluate, NodePredicate, StepRef};
use crate::types::RelationKind;

/// Predicate over a step of a walk.
#[derive(Debug, Clone)]
pub enum StepPredicate {
    /// Conjunction of whichever sub-checks are present.
    ///
    /// `node_is_effect` compares whether the reached node is the effect
    /// endpoint of the traversed edge; the start of a walk has no edge and
    /// fails both the edge check and the endpoint check.
    EdgeToNode {
        /// Check on the traversed edge.
        edge_condition: Option<Box<Condition<EdgePredicate>>>,
        /// Check on the reached node.
        node_condition: Option<Box<Condition<NodePredicate>>>,
        /// Required endpoint role of the reached node.
        node_is_effect: Option<bool>,
    },
    /// A derivation step in the requested direction, or a specialization step
    /// in either direction. With no direction, derivations in both directions pass.
    DerivationPath {
        /// Walk towards causes.
        backward: Option<bool>,
    },
}

impl StepPredicate {
    /// The derivation-path predicate for a direction.
    pub fn derivation_path(backward: Option<bool>) -> Self {
        Self::DerivationPath { backward }
    }

    /// Expanded form of [`StepPredicate::DerivationPath`].
    fn derivation_expansion(backward: Option<bool>) -> Condition<StepPredicate> {
        Condition::any_true(vec![
            Condition::leaf(Self::EdgeToNode {
                edge_condition: Some(Box::new(Condition::leaf(EdgePredicate::is_relation(RelationKind::Derivation)))),
                node_condition: None,
                node_is_effect: backward.map(|b| !b),
            }),
            Condition::leaf(Self::EdgeToNode {
                edge_condition: Some(Box::new(Condition::leaf(EdgePredicate::is_relation(
                    RelationKind::Specialization,
                )))),
                node_condition: None,
                node_is_effect: None,
            }),
        ])
    }
}

impl<'a> Evaluate<StepRef<'a>> for StepPredicate {
    fn evaluate(&self, target: &StepRef<'a>) -> Result<bool, ConditionError> {
        match self {
            Self::EdgeToNode { edge_condition, node_condition, node_is_effect } => {
                let edge = target.step.edge.map(|e| target.bundle.edge(e));

                if let Some(condition) = edge_condition {
                    match edge {
                        Some(edge) if condition.test(edge)? => {}
                        _ => return Ok(false),
                    }
                }

                if let Some(condition) = node_condition {
                    if !condition.test(target.bundle.node(target.step.node))? {
                        return Ok(false);
                    }
                }

                if let Some(expected) = node_is_effect {
                    let Some(edge) = edge else {
                        return Ok(false);
                    };
                    return Ok((edge.effect == target.step.node) == *expected);
                }

                Ok(true)
            }
            Self::DerivationPath { backward } => Self::derivation_expansion(*backward).test(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::Step;
    use crate::types::{Bundle, Node, NodeKind, QualifiedName};

    fn qn(local: &str) -> QualifiedName {
        QualifiedName::new("https://example.org/", local)
    }

    // older <-derivation- newer, general <-specialization- specific
    fn bundle() -> Bundle {
        Bundle::builder(qn("b"))
            .node(Node::new(qn("older"), NodeKind::Entity))
            .node(Node::new(qn("newer"), NodeKind::Entity))
            .node(Node::new(qn("general"), NodeKind::Entity))
            .node(Node::new(qn("specific"), NodeKind::Entity))
            .edge(qn("older"), qn("newer"), RelationKind::Derivation)
            .edge(qn("general"), qn("specific"), RelationKind::Specialization)
            .build()
            .unwrap()
    }

    fn step_to(bundle: &Bundle, edge: usize, node: &str) -> Step {
        Step::along(crate::types::EdgeIdx(edge), bundle.find(&qn(node)).unwrap())
    }

    #[test]
    fn test_derivation_path_direction() {
        let b = bundle();
        let backward = StepPredicate::derivation_path(Some(true));
        let forward = StepPredicate::derivation_path(Some(false));
        let any = StepPredicate::derivation_path(None);

        // stepping from newer onto older walks towards the cause
        let to_older = StepRef { bundle: &b, step: step_to(&b, 0, "older") };
        assert_eq!(backward.evaluate(&to_older), Ok(true));
        assert_eq!(forward.evaluate(&to_older), Ok(false));
        assert_eq!(any.evaluate(&to_older), Ok(true));

        let to_newer = StepRef { bundle: &b, step: step_to(&b, 0, "newer") };
        assert_eq!(backward.evaluate(&to_newer), Ok(false));
        assert_eq!(forward.evaluate(&to_newer), Ok(true));
    }

    #[test]
    fn test_specialization_passes_both_directions() {
        let b = bundle();
        let backward = StepPredicate::derivation_path(Some(true));
        for node in ["general", "specific"] {
            let step = StepRef { bundle: &b, step: step_to(&b, 1, node) };
            assert_eq!(backward.evaluate(&step), Ok(true));
        }
    }

    #[test]
    fn test_start_step_fails_edge_checks() {
        let b = bundle();
        let start = StepRef { bundle: &b, step: Step::start(b.find(&qn("older")).unwrap()) };
        let node_only = StepPredicate::EdgeToNode {
            edge_condition: None,
            node_condition: Some(Box::new(Condition::leaf(NodePredicate::is_kind(NodeKind::Entity)))),
            node_is_effect: None,
        };
        assert_eq!(node_only.evaluate(&start), Ok(true));
        assert_eq!(StepPredicate::derivation_path(None).evaluate(&start), Ok(false));
    }
}
