pub mod leaf;
pub mod search;
pub mod tree;

use thiserror::Error;

pub use leaf::{Leaf, LeafKind};
pub use tree::{CompositeOp, FilterId, FilterKind, FilterTree};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid {kind} filter {text:?}: {reason}")]
    InvalidPredicate {
        kind: LeafKind,
        text: String,
        reason: String,
    },

    #[error("unknown filter {0}")]
    UnknownFilter(FilterId),

    #[error("filter {0} is not a composite")]
    NotComposite(FilterId),
}
