//! Edge-level predicates.

use super::{ConditionError, Evaluate};
use crate::types::{Edge, RelationKind};

/// Predicate over a single edge.
#[derive(Debug, Clone)]
pub enum EdgePredicate {
    /// Edge carries at least one relation of the kind.
    IsRelation(Option<RelationKind>),
    /// Edge carries no relation of the kind.
    IsNotRelation(Option<RelationKind>),
}

impl EdgePredicate {
    /// `IsRelation(kind)`.
    pub fn is_relation(kind: RelationKind) -> Self {
        Self::IsRelation(Some(kind))
    }
}

impl Evaluate<Edge> for EdgePredicate {
    fn evaluate(&self, edge: &Edge) -> Result<bool, ConditionError> {
        match self {
            Self::IsRelation(kind) => {
                let kind = kind.ok_or_else(|| ConditionError::missing("IsRelation", "relation"))?;
                Ok(edge.has_relation(kind))
            }
            Self::IsNotRelation(kind) => {
                let kind = kind.ok_or_else(|| ConditionError::missing("IsNotRelation", "relation"))?;
                Ok(!edge.has_relation(kind))
            }
        }
    }
}
