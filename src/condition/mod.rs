//! Recursive condition language evaluated against one bundle.
//!
//! A [`Condition<P>`] is a tree of logical connectives over leaf predicates
//! of type `P`. Four leaf families exist, one per target:
//!
//! | Leaf | Target |
//! |------|--------|
//! | [`NodePredicate`] | a single [`Node`](crate::types::Node) |
//! | [`EdgePredicate`] | a single [`Edge`](crate::types::Edge) |
//! | [`StepPredicate`] | an (edge, node) step of a walk |
//! | [`BundlePredicate`] | a bundle entered at a start node |
//!
//! [`Countable`] measures a bundle: either a constant or the size of a
//! [`Findable`] search result.
//!
//! ## Failure model
//!
//! Parsing rejects unknown discriminators with
//! [`ConditionError::UnsupportedConditionType`] and malformed regexes or
//! timestamps with [`ConditionError::Configuration`]. A known variant that
//! lacks a required field parses successfully and fails with
//! [`ConditionError::Configuration`] when it is evaluated.
//!
//! ## Empty connectives
//!
//! `AllTrue` with a missing or empty list is a configuration error, while
//! `AnyTrue` with a missing or empty list is vacuously true. Both behaviors
//! are relied upon by existing query payloads and are kept as they are.

pub mod node;
pub mod edge;
pub mod step;
pub mod bundle;
pub mod countable;
pub mod parse;

pub use node::{NodePredicate, AttrSpec};
pub use edge::EdgePredicate;
pub use step::StepPredicate;
pub use bundle::{BundlePredicate, Comparison};
pub use countable::{Countable, Findable, Subgraph};
pub use parse::{
    parse_node_condition, parse_edge_condition, parse_step_condition,
    parse_bundle_condition, parse_countable, parse_findable,
};

use crate::traversal::Step;
use crate::types::{Bundle, NodeIdx, QualifiedName};

/// Error raised while parsing or evaluating a condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    /// Malformed condition tree: missing required field or invalid value.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Unknown `type` discriminator.
    #[error("Unsupported condition type: {0}")]
    UnsupportedConditionType(String),
    /// The requested entry node is not part of the bundle.
    #[error("Start node {node_id} not found in bundle {bundle_id}")]
    StartNodeNotFound {
        /// Requested entry node.
        node_id: QualifiedName,
        /// Bundle searched for it.
        bundle_id: QualifiedName,
    },
}

impl ConditionError {
    /// Error for a required field that is absent.
    pub fn missing(variant: &str, field: &str) -> Self {
        Self::Configuration(format!("Value of {} cannot be null in {}", field, variant))
    }
}

/// Evaluation of a leaf predicate against a target.
pub trait Evaluate<T> {
    /// Whether the target satisfies the predicate.
    fn evaluate(&self, target: &T) -> Result<bool, ConditionError>;
}

/// A step of a walk, seen in the context of its bundle.
#[derive(Debug, Clone, Copy)]
pub struct StepRef<'a> {
    /// Bundle walked.
    pub bundle: &'a Bundle,
    /// Step under test.
    pub step: Step,
}

/// A bundle entered at a start node.
#[derive(Debug, Clone, Copy)]
pub struct BundleView<'a> {
    /// The bundle.
    pub bundle: &'a Bundle,
    /// Entry node; `None` only for an empty bundle.
    pub start: Option<NodeIdx>,
}

impl<'a> BundleView<'a> {
    /// View a bundle from an explicit start node.
    pub fn new(bundle: &'a Bundle, start: Option<NodeIdx>) -> Self {
        Self { bundle, start }
    }
}

/// Logical tree over leaf predicates.
///
/// Operands are optional so that an incomplete payload can be represented
/// and reported when evaluated.
#[derive(Debug, Clone)]
pub enum Condition<P> {
    /// A leaf predicate.
    Leaf(P),
    /// Logical negation.
    Not(Option<Box<Condition<P>>>),
    /// Every member holds. Missing or empty list is a configuration error.
    AllTrue(Option<Vec<Condition<P>>>),
    /// At least one member holds. Missing or empty list is true.
    AnyTrue(Option<Vec<Condition<P>>>),
    /// Exactly one of the two holds.
    Either(Option<Box<Condition<P>>>, Option<Box<Condition<P>>>),
    /// Premise implies consequence.
    Implication(Option<Box<Condition<P>>>, Option<Box<Condition<P>>>),
}

impl<P> Condition<P> {
    /// Wrap a leaf predicate.
    pub fn leaf(predicate: P) -> Self {
        Self::Leaf(predicate)
    }

    /// Negate a condition.
    pub fn not(condition: Condition<P>) -> Self {
        Self::Not(Some(Box::new(condition)))
    }

    /// Conjunction.
    pub fn all_true(conditions: Vec<Condition<P>>) -> Self {
        Self::AllTrue(Some(conditions))
    }

    /// Disjunction.
    pub fn any_true(conditions: Vec<Condition<P>>) -> Self {
        Self::AnyTrue(Some(conditions))
    }

    /// Exclusive or.
    pub fn either(first: Condition<P>, second: Condition<P>) -> Self {
        Self::Either(Some(Box::new(first)), Some(Box::new(second)))
    }

    /// Implication.
    pub fn implies(premise: Condition<P>, consequence: Condition<P>) -> Self {
        Self::Implication(Some(Box::new(premise)), Some(Box::new(consequence)))
    }

    /// Evaluate the tree against a target.
    pub fn test<T>(&self, target: &T) -> Result<bool, ConditionError>
    where
        P: Evaluate<T>,
    {
        match self {
            Self::Leaf(predicate) => predicate.evaluate(target),
            Self::Not(condition) => {
                let condition = required(condition, "Negation", "condition")?;
                Ok(!condition.test(target)?)
            }
            Self::AllTrue(conditions) => match conditions {
                Some(list) if !list.is_empty() => {
                    for condition in list {
                        if !condition.test(target)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                _ => Err(ConditionError::Configuration(
                    "AllTrue requires a non-empty list of conditions".to_string(),
                )),
            },
            Self::AnyTrue(conditions) => match conditions {
                Some(list) if !list.is_empty() => {
                    for condition in list {
                        if condition.test(target)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                _ => Ok(true),
            },
            Self::Either(first, second) => {
                let first = required(first, "Either", "first")?;
                let second = required(second, "Either", "second")?;
                Ok(first.test(target)? ^ second.test(target)?)
            }
            Self::Implication(premise, consequence) => {
                let premise = required(premise, "Implication", "premise")?;
                let consequence = required(consequence, "Implication", "consequence")?;
                if !premise.test(target)? {
                    return Ok(true);
                }
                consequence.test(target)
            }
        }
    }
}

fn required<'c, P>(
    operand: &'c Option<Box<Condition<P>>>,
    variant: &str,
    field: &str,
) -> Result<&'c Condition<P>, ConditionError> {
    operand
        .as_deref()
        .ok_or_else(|| ConditionError::missing(variant, field))
}

/// Full-match regular expression.
///
/// The source pattern must match the whole input, not a substring.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: regex_lite::Regex,
}

impl Pattern {
    /// Compile a full-match pattern.
    pub fn new(source: &str) -> Result<Self, ConditionError> {
        let regex = regex_lite::Regex::new(&format!("^(?:{})$", source))
            .map_err(|e| ConditionError::Configuration(format!("Invalid regex '{}': {}", source, e)))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Whether the whole input matches.
    pub fn matches(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }

    /// Pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}
