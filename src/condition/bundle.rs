//! Bundle-level predicates.

use serde::{Deserialize, Serialize};

use super::{BundleView, Condition, ConditionError, Countable, Evaluate, NodePredicate};

/// Comparison operator between two counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    /// `==`
    #[serde(rename = "EQ", alias = "EQUALS")]
    Eq,
    /// `<`
    #[serde(rename = "LT", alias = "LESS_THAN")]
    Lt,
    /// `<=`
    #[serde(rename = "LE", alias = "LESS_THAN_OR_EQUALS")]
    Le,
    /// `>`
    #[serde(rename = "GT", alias = "GREATER_THAN")]
    Gt,
    /// `>=`
    #[serde(rename = "GE", alias = "GREATER_THAN_OR_EQUALS")]
    Ge,
}

impl Comparison {
    /// Parse from the short or long spelling.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "EQ" | "EQUALS" => Some(Self::Eq),
            "LT" | "LESS_THAN" => Some(Self::Lt),
            "LE" | "LESS_THAN_OR_EQUALS" => Some(Self::Le),
            "GT" | "GREATER_THAN" => Some(Self::Gt),
            "GE" | "GREATER_THAN_OR_EQUALS" => Some(Self::Ge),
            _ => None,
        }
    }

    /// Apply the operator.
    pub fn apply(self, left: usize, right: usize) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
        }
    }
}

/// Predicate over a whole bundle entered at a start node.
#[derive(Debug, Clone)]
pub enum BundlePredicate {
    /// Every node satisfies the condition; vacuously true on an empty bundle.
    AllNodes {
        /// Node condition.
        condition: Option<Box<Condition<NodePredicate>>>,
    },
    /// Compares two measures of the bundle.
    CountComparison {
        /// Left operand.
        first: Option<Box<Countable>>,
        /// Operator.
        comparison: Option<Comparison>,
        /// Right operand.
        second: Option<Box<Countable>>,
    },
}

impl<'a> Evaluate<BundleView<'a>> for BundlePredicate {
    fn evaluate(&self, view: &BundleView<'a>) -> Result<bool, ConditionError> {
        match self {
            Self::AllNodes { condition } => {
                let condition = condition
                    .as_ref()
                    .ok_or_else(|| ConditionError::missing("AllNodes", "condition"))?;
                for node in view.bundle.nodes() {
                    if !condition.test(node)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::CountComparison { first, comparison, second } => {
                let first = first
                    .as_ref()
                    .ok_or_else(|| ConditionError::missing("CountComparisonCondition", "first"))?;
                let comparison =
                    comparison.ok_or_else(|| ConditionError::missing("CountComparisonCondition", "comparisonResult"))?;
                let second = second
                    .as_ref()
                    .ok_or_else(|| ConditionError::missing("CountComparisonCondition", "second"))?;
                Ok(comparison.apply(first.count(view)?, second.count(view)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bundle, NodeKind, QualifiedName};

    fn constant(n: usize) -> Option<Box<Countable>> {
        Some(Box::new(Countable::CountConstant(Some(n))))
    }

    #[test]
    fn test_comparison_spellings() {
        assert_eq!(Comparison::from_str("LESS_THAN"), Some(Comparison::Lt));
        assert_eq!(Comparison::from_str("GE"), Some(Comparison::Ge));
        assert_eq!(Comparison::from_str("ge"), None);
        assert!(Comparison::Le.apply(2, 2));
        assert!(!Comparison::Gt.apply(2, 2));
    }

    #[test]
    fn test_all_nodes_vacuous_on_empty_bundle() {
        let empty = Bundle::builder(QualifiedName::new("https://example.org/", "empty")).build().unwrap();
        let view = BundleView::new(&empty, None);
        let all_activities = BundlePredicate::AllNodes {
            condition: Some(Box::new(Condition::leaf(NodePredicate::is_kind(NodeKind::Activity)))),
        };
        assert!(all_activities.evaluate(&view).unwrap());
    }

    #[test]
    fn test_count_comparison_requires_operator() {
        let empty = Bundle::builder(QualifiedName::new("https://example.org/", "empty")).build().unwrap();
        let view = BundleView::new(&empty, None);

        let complete = BundlePredicate::CountComparison {
            first: constant(1),
            comparison: Some(Comparison::Lt),
            second: constant(2),
        };
        assert!(complete.evaluate(&view).unwrap());

        let missing = BundlePredicate::CountComparison {
            first: constant(1),
            comparison: None,
            second: constant(2),
        };
        assert!(matches!(missing.evaluate(&view), Err(ConditionError::Configuration(_))));
    }
}
