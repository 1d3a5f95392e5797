//! Transactional document engine for marginalia.
//!
//! Edits are [`Step`]s batched into a [`Transaction`]; applying one to an
//! [`EditorState`] yields a new immutable snapshot plus the [`Mapping`] that
//! carries old positions into the new document. Plugins keep their own state
//! in the snapshot and see every transaction through the same reducer
//! contract, which is how upload placeholders and suggestion sessions stay
//! anchored while the document changes underneath them.

pub mod decoration;
pub mod error;
pub mod markdown;
pub mod model;
pub mod plugins;
pub mod state;
pub mod transform;

// Re-export key types for easier usage
pub use decoration::{Decoration, DecorationId, DecorationSet, DecorationSpec};
pub use error::{PluginError, StateError, StepError, TransformError};
pub use model::{Fragment, Mark, Node, NodeKind, ResolvedPos};
pub use state::{Applied, ApplyContext, Editor, EditorState, Plugin, PluginKey, PluginSet, Selection};
pub use transform::{Bias, MapResult, Mapping, Step, StepMap, Transaction};
