//! Frontier ordering: integrity first, then ordered validity.
//!
//! Item A precedes item B when A's path integrity holds and B's does not.
//! With equal integrity the two ordered validity lists are compared position
//! by position; at the first difference the satisfied item precedes. Items
//! that tie everywhere are served in insertion order.
//!
//! Every item of a session carries the same check ids in the same order.
//! Comparing items whose lists disagree is an [`InvariantError`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::{ItemToSearch, ValidityCheckId};

/// Two items of one session carry incompatible validity lists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    /// The lists differ in length.
    #[error("Validity lists differ in length: {left} vs {right}")]
    LengthMismatch {
        /// Length of the first list.
        left: usize,
        /// Length of the second list.
        right: usize,
    },
    /// The lists name different checks at a position.
    #[error("Validity checks differ at position {position}: {left} vs {right}")]
    CheckMismatch {
        /// Position of the first difference.
        position: usize,
        /// Check of the first list.
        left: ValidityCheckId,
        /// Check of the second list.
        right: ValidityCheckId,
    },
}

/// Compare two items; `Ordering::Less` means `a` is served before `b`.
pub fn compare(a: &ItemToSearch, b: &ItemToSearch) -> Result<Ordering, InvariantError> {
    if a.path_validity.len() != b.path_validity.len() {
        return Err(InvariantError::LengthMismatch {
            left: a.path_validity.len(),
            right: b.path_validity.len(),
        });
    }
    for (position, (left, right)) in a.path_validity.iter().zip(&b.path_validity).enumerate() {
        if left.check != right.check {
            return Err(InvariantError::CheckMismatch {
                position,
                left: left.check.clone(),
                right: right.check.clone(),
            });
        }
    }
    Ok(priority_order(a, b))
}

/// Whether `a` has strictly higher priority than `b`.
pub fn precedes(a: &ItemToSearch, b: &ItemToSearch) -> Result<bool, InvariantError> {
    Ok(compare(a, b)? == Ordering::Less)
}

// Assumes compatible lists.
fn priority_order(a: &ItemToSearch, b: &ItemToSearch) -> Ordering {
    b.path_integrity.cmp(&a.path_integrity).then_with(|| {
        a.path_validity
            .iter()
            .zip(&b.path_validity)
            .map(|(left, right)| right.satisfied.cmp(&left.satisfied))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

#[derive(Debug)]
struct Entry {
    item: ItemToSearch,
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Max-heap: greater pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        priority_order(&other.item, &self.item).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of pending items for one session.
///
/// Items are checked against the session's check layout on push, so the
/// heap itself never compares incompatible items.
#[derive(Debug)]
pub struct Frontier {
    checks: Vec<ValidityCheckId>,
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl Frontier {
    /// Create a frontier for a session selecting `checks`, in order.
    pub fn new(checks: Vec<ValidityCheckId>) -> Self {
        Self {
            checks,
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Check layout of the session.
    pub fn checks(&self) -> &[ValidityCheckId] {
        &self.checks
    }

    /// Enqueue an item.
    pub fn push(&mut self, item: ItemToSearch) -> Result<(), InvariantError> {
        if item.path_validity.len() != self.checks.len() {
            return Err(InvariantError::LengthMismatch {
                left: self.checks.len(),
                right: item.path_validity.len(),
            });
        }
        for (position, (expected, outcome)) in self.checks.iter().zip(&item.path_validity).enumerate() {
            if *expected != outcome.check {
                return Err(InvariantError::CheckMismatch {
                    position,
                    left: expected.clone(),
                    right: outcome.check.clone(),
                });
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { item, seq });
        Ok(())
    }

    /// Remove the highest-priority item.
    pub fn pop(&mut self) -> Option<ItemToSearch> {
        self.heap.pop().map(|entry| entry.item)
    }

    /// Highest-priority item.
    pub fn peek(&self) -> Option<&ItemToSearch> {
        self.heap.peek().map(|entry| &entry.item)
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
