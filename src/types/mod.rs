//! Core types for provenance search.

pub mod name;
pub mod node;
pub mod edge;
pub mod bundle;
pub mod token;
pub mod search;

pub use name::QualifiedName;
pub use node::{Node, NodeKind, AttributeValue};
pub use edge::{Edge, RelationKind};
pub use bundle::{Bundle, BundleBuilder, BundleDocument, BundleError, EdgeDocument, NodeIdx, EdgeIdx};
pub use token::{Token, TokenData, AdditionalTokenData};
pub use search::{
    ValidityCheckId, CheckOutcome, Direction, VersionPreference,
    ItemToSearch, VisitOutcome, combine_validity,
};
