use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::{EditorState, Selection};
use crate::decoration::DecorationSet;
use crate::error::{PluginError, StateError};
use crate::model::Node;
use crate::transform::Transaction;

/// Name a plugin registers under. Also used as its transaction meta key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey(&'static str);

impl PluginKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginKey({})", self.0)
    }
}

impl AsRef<str> for PluginKey {
    fn as_ref(&self) -> &str {
        self.0
    }
}

/// What a reducer gets to look at: the transaction being applied and the
/// state it is applied to. The new values of other plugins are not visible.
pub struct ApplyContext<'a> {
    tr: &'a Transaction,
    old_state: &'a EditorState,
}

impl<'a> ApplyContext<'a> {
    pub(crate) fn new(tr: &'a Transaction, old_state: &'a EditorState) -> Self {
        Self { tr, old_state }
    }

    pub fn tr(&self) -> &'a Transaction {
        self.tr
    }

    pub fn old_state(&self) -> &'a EditorState {
        self.old_state
    }

    /// Document after the transaction.
    pub fn doc(&self) -> &'a Node {
        self.tr.doc()
    }

    /// Selection after the transaction.
    pub fn selection(&self) -> Selection {
        self.tr.selection()
    }
}

/// A state reducer hooked into every transaction.
///
/// `apply` must be pure: it derives the next value from the old one and the
/// transaction, and leaves side effects to whoever reads the new state.
pub trait Plugin: Send + Sync + 'static {
    type State: Clone + Send + Sync + 'static;

    fn key(&self) -> PluginKey;

    fn init(&self, doc: &Node, selection: Selection) -> Self::State;

    fn apply(&self, ctx: &ApplyContext<'_>, state: &Self::State) -> Result<Self::State, PluginError>;

    /// Follow-up transaction to run after `new_state` was produced, built
    /// from `new_state.tr()`. An error rejects the whole dispatch.
    fn append_transaction(
        &self,
        _state: &Self::State,
        _new_state: &EditorState,
    ) -> Result<Option<Transaction>, PluginError> {
        Ok(None)
    }

    fn decorations(&self, _state: &Self::State) -> Option<DecorationSet> {
        None
    }
}

pub(crate) type PluginValue = Arc<dyn Any + Send + Sync>;

/// Object-safe view of a [`Plugin`] with its state type erased.
pub(crate) trait ErasedPlugin: Send + Sync {
    fn key(&self) -> PluginKey;
    fn init(&self, doc: &Node, selection: Selection) -> PluginValue;
    fn apply(&self, ctx: &ApplyContext<'_>, value: &PluginValue) -> Result<PluginValue, PluginError>;
    fn append_transaction(
        &self,
        value: &PluginValue,
        new_state: &EditorState,
    ) -> Result<Option<Transaction>, PluginError>;
    fn decorations(&self, value: &PluginValue) -> Option<DecorationSet>;
}

fn downcast<S: Any>(value: &PluginValue) -> Result<&S, PluginError> {
    value.downcast_ref::<S>().ok_or(PluginError::StateType)
}

impl<P: Plugin> ErasedPlugin for P {
    fn key(&self) -> PluginKey {
        Plugin::key(self)
    }

    fn init(&self, doc: &Node, selection: Selection) -> PluginValue {
        Arc::new(Plugin::init(self, doc, selection))
    }

    fn apply(&self, ctx: &ApplyContext<'_>, value: &PluginValue) -> Result<PluginValue, PluginError> {
        let state = downcast::<P::State>(value)?;
        Ok(Arc::new(Plugin::apply(self, ctx, state)?))
    }

    fn append_transaction(
        &self,
        value: &PluginValue,
        new_state: &EditorState,
    ) -> Result<Option<Transaction>, PluginError> {
        let state = downcast::<P::State>(value)?;
        Plugin::append_transaction(self, state, new_state)
    }

    fn decorations(&self, value: &PluginValue) -> Option<DecorationSet> {
        let state = downcast::<P::State>(value).ok()?;
        Plugin::decorations(self, state)
    }
}

/// Plugins in registration order, which is also the order they run in.
#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: Vec<Arc<dyn ErasedPlugin>>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Plugin>(&mut self, plugin: P) -> Result<&mut Self, StateError> {
        let key = Plugin::key(&plugin);
        if self.index_of(key).is_some() {
            log::warn!("plugin {key} registered twice");
            return Err(StateError::DuplicatePlugin(key));
        }
        self.plugins.push(Arc::new(plugin));
        Ok(self)
    }

    /// Builder form of [`PluginSet::register`].
    pub fn with<P: Plugin>(mut self, plugin: P) -> Result<Self, StateError> {
        self.register(plugin)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = PluginKey> + '_ {
        self.plugins.iter().map(|plugin| plugin.key())
    }

    pub(crate) fn index_of(&self, key: PluginKey) -> Option<usize> {
        self.plugins.iter().position(|plugin| plugin.key() == key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn ErasedPlugin>> {
        self.plugins.iter()
    }
}

impl fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}
