//! Immutable document tree addressed by integer positions.

mod fragment;
mod node;
mod resolved;

pub use fragment::Fragment;
pub use node::{Mark, Node, NodeKind};
pub use resolved::ResolvedPos;
