//! Editor snapshots and the plugin reducers that ride along with them.

mod editor_state;
mod plugin;
mod selection;

pub use editor_state::{Applied, Editor, EditorState, MAX_APPEND_ROUNDS};
pub use plugin::{ApplyContext, Plugin, PluginKey, PluginSet};
pub use selection::Selection;
