use crate::model::Mark;
use crate::state::PluginKey;

/// Failure to address or edit the document tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("position {pos} is outside the document (content size {size})")]
    OutOfRange { pos: usize, size: usize },
    #[error("invalid range {from}..{to}")]
    InvalidRange { from: usize, to: usize },
    #[error("position {pos} points inside an atomic unit")]
    InsideAtom { pos: usize },
    #[error("range {from}..{to} does not start and end in the same parent")]
    CrossesParent { from: usize, to: usize },
    #[error("{child} is not allowed inside {parent}")]
    InvalidContent {
        parent: &'static str,
        child: &'static str,
    },
    #[error("no textblock at position {pos}")]
    NotTextblock { pos: usize },
    #[error("blocks around position {pos} cannot be joined")]
    IncompatibleJoin { pos: usize },
    /// Mark steps must cover uniform text so that their inverse is exact.
    #[error("{mark:?} is already present on part of {from}..{to}")]
    MarkPresent { from: usize, to: usize, mark: Mark },
    #[error("{mark:?} is missing from part of {from}..{to}")]
    MarkMissing { from: usize, to: usize, mark: Mark },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("step {index} rejected: {source}")]
    Step {
        index: usize,
        #[source]
        source: StepError,
    },
    #[error("selection {anchor}..{head} is outside the document (content size {size})")]
    Selection {
        anchor: usize,
        head: usize,
        size: usize,
    },
}

/// Raised by a plugin reducer whose invariants no longer hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("plugin state has an unexpected type")]
    StateType,
    #[error("{0}")]
    Invariant(String),
    /// A follow-up transaction could not be built.
    #[error(transparent)]
    Transform(#[from] TransformError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("transaction was built against a different document than the current state")]
    StaleBase,
    #[error("plugin `{key}` failed: {source}")]
    Plugin {
        key: PluginKey,
        #[source]
        source: PluginError,
    },
    #[error("plugin `{0}` is registered twice")]
    DuplicatePlugin(PluginKey),
    #[error("appended transactions did not settle after {rounds} rounds")]
    AppendLimit { rounds: usize },
    #[error(transparent)]
    Transform(#[from] TransformError),
}
