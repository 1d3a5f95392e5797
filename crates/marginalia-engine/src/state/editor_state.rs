use std::any::Any;
use std::sync::Arc;

use super::plugin::{ApplyContext, ErasedPlugin, PluginSet, PluginValue};
use super::{PluginKey, Selection};
use crate::decoration::DecorationSet;
use crate::error::{StateError, TransformError};
use crate::model::Node;
use crate::transform::{APPENDED_META, Transaction};

/// Upper bound on rounds of `append_transaction` after one dispatched
/// transaction.
pub const MAX_APPEND_ROUNDS: usize = 8;

/// Immutable editor snapshot: document, selection and one value per plugin.
#[derive(Clone)]
pub struct EditorState {
    doc: Node,
    selection: Selection,
    plugins: Arc<PluginSet>,
    values: Arc<Vec<PluginValue>>,
    version: u64,
}

/// Result of applying a transaction, including any appended follow-ups.
#[derive(Debug, Clone)]
pub struct Applied {
    pub state: EditorState,
    /// The dispatched transaction followed by every appended one.
    pub transactions: Vec<Transaction>,
}

impl EditorState {
    pub fn create(doc: Node, selection: Selection, plugins: PluginSet) -> Result<Self, StateError> {
        let size = doc.content_size();
        if doc.resolve(selection.anchor).is_err() || doc.resolve(selection.head).is_err() {
            return Err(TransformError::Selection {
                anchor: selection.anchor,
                head: selection.head,
                size,
            }
            .into());
        }
        let values = plugins
            .iter()
            .map(|plugin| plugin.init(&doc, selection))
            .collect();
        Ok(Self {
            doc,
            selection,
            plugins: Arc::new(plugins),
            values: Arc::new(values),
            version: 0,
        })
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Number of transactions applied since `create`.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    /// Start a transaction against this state.
    pub fn tr(&self) -> Transaction {
        Transaction::new(self.doc.clone(), self.selection)
    }

    pub fn plugin_state<S: Any>(&self, key: PluginKey) -> Option<&S> {
        let index = self.plugins.index_of(key)?;
        self.values.get(index)?.downcast_ref::<S>()
    }

    /// Every plugin's decorations merged into one set.
    pub fn decorations(&self) -> DecorationSet {
        let sets: Vec<DecorationSet> = self
            .plugins
            .iter()
            .zip(self.values.iter())
            .filter_map(|(plugin, value)| plugin.decorations(value))
            .collect();
        DecorationSet::merge(&sets)
    }

    pub fn apply(&self, tr: Transaction) -> Result<EditorState, StateError> {
        Ok(self.apply_transaction(tr)?.state)
    }

    /// Apply `tr`, then let plugins append follow-up transactions until none
    /// is produced. Nothing is committed if any transaction in the chain fails.
    pub fn apply_transaction(&self, tr: Transaction) -> Result<Applied, StateError> {
        let mut state = self.apply_inner(&tr)?;
        let mut transactions = vec![tr];

        let mut rounds = 0;
        loop {
            let mut appended = false;
            for (index, plugin) in self.plugins.iter().enumerate() {
                let key = plugin.key();
                let extra = plugin
                    .append_transaction(&state.values[index], &state)
                    .map_err(|source| {
                        log::warn!("plugin {key} failed to append a transaction: {source}");
                        StateError::Plugin { key, source }
                    })?;
                let Some(mut extra) = extra else {
                    continue;
                };
                extra.set_meta(APPENDED_META, key);
                log::debug!("plugin {key} appended a transaction with {} steps", extra.steps().len());
                state = state.apply_inner(&extra)?;
                transactions.push(extra);
                appended = true;
            }
            if !appended {
                break;
            }
            rounds += 1;
            if rounds >= MAX_APPEND_ROUNDS {
                log::warn!("append_transaction still producing work after {rounds} rounds");
                return Err(StateError::AppendLimit { rounds });
            }
        }
        Ok(Applied {
            state,
            transactions,
        })
    }

    fn apply_inner(&self, tr: &Transaction) -> Result<EditorState, StateError> {
        if tr.before() != &self.doc {
            log::warn!("rejected transaction built against a stale document");
            return Err(StateError::StaleBase);
        }

        let ctx = ApplyContext::new(tr, self);
        let values = self
            .plugins
            .iter()
            .zip(self.values.iter())
            .map(|(plugin, value)| {
                plugin.apply(&ctx, value).map_err(|source| {
                    let key = plugin.key();
                    log::warn!("plugin {key} rejected transaction: {source}");
                    StateError::Plugin { key, source }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "applied transaction: {} steps, doc size {}, version {}",
            tr.steps().len(),
            tr.doc().content_size(),
            self.version + 1
        );
        Ok(EditorState {
            doc: tr.doc().clone(),
            selection: tr.selection(),
            plugins: Arc::clone(&self.plugins),
            values: Arc::new(values),
            version: self.version + 1,
        })
    }
}

impl std::fmt::Debug for EditorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorState")
            .field("doc", &self.doc)
            .field("selection", &self.selection)
            .field("plugins", &self.plugins)
            .field("version", &self.version)
            .finish()
    }
}

/// Holder of the current snapshot. A dispatch only replaces the snapshot when
/// the whole transaction chain applied cleanly.
#[derive(Debug, Clone)]
pub struct Editor {
    state: EditorState,
}

impl Editor {
    pub fn new(state: EditorState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn tr(&self) -> Transaction {
        self.state.tr()
    }

    pub fn dispatch(&mut self, tr: Transaction) -> Result<&EditorState, StateError> {
        let applied = self.state.apply_transaction(tr)?;
        self.state = applied.state;
        Ok(&self.state)
    }

    pub fn into_state(self) -> EditorState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoration::Decoration;
    use crate::error::PluginError;
    use crate::state::Plugin;
    use crate::transform::Bias;
    use pretty_assertions::assert_eq;

    /// Counts transactions; refuses any that carry the "boom" meta.
    struct Counter;

    const COUNTER: PluginKey = PluginKey::new("counter");

    impl Plugin for Counter {
        type State = usize;

        fn key(&self) -> PluginKey {
            COUNTER
        }

        fn init(&self, _doc: &Node, _selection: Selection) -> usize {
            0
        }

        fn apply(&self, ctx: &ApplyContext<'_>, state: &usize) -> Result<usize, PluginError> {
            if ctx.tr().has_meta("boom") {
                return Err(PluginError::Invariant("boom".into()));
            }
            Ok(state + 1)
        }

        fn decorations(&self, state: &usize) -> Option<DecorationSet> {
            Some(DecorationSet::create([Decoration::widget(*state, Bias::Left)]))
        }
    }

    /// Reads the counter's value from the old state only.
    struct Observer;

    const OBSERVER: PluginKey = PluginKey::new("observer");

    impl Plugin for Observer {
        type State = Option<usize>;

        fn key(&self) -> PluginKey {
            OBSERVER
        }

        fn init(&self, _doc: &Node, _selection: Selection) -> Option<usize> {
            None
        }

        fn apply(&self, ctx: &ApplyContext<'_>, _: &Option<usize>) -> Result<Option<usize>, PluginError> {
            Ok(ctx.old_state().plugin_state::<usize>(COUNTER).copied())
        }
    }

    /// Appends a "!" once after any transaction that typed a "?".
    struct Exclaimer;

    impl Plugin for Exclaimer {
        type State = bool;

        fn key(&self) -> PluginKey {
            PluginKey::new("exclaimer")
        }

        fn init(&self, _doc: &Node, _selection: Selection) -> bool {
            false
        }

        fn apply(&self, ctx: &ApplyContext<'_>, _: &bool) -> Result<bool, PluginError> {
            let text = ctx.doc().text_content();
            Ok(text.ends_with('?'))
        }

        fn append_transaction(
            &self,
            state: &bool,
            new_state: &EditorState,
        ) -> Result<Option<Transaction>, PluginError> {
            if !*state {
                return Ok(None);
            }
            let mut tr = new_state.tr();
            let end = new_state.doc().content_size() - 1;
            tr.insert_text(end, "!")?;
            Ok(Some(tr))
        }
    }

    /// Never settles.
    struct Runaway;

    impl Plugin for Runaway {
        type State = ();

        fn key(&self) -> PluginKey {
            PluginKey::new("runaway")
        }

        fn init(&self, _doc: &Node, _selection: Selection) {}

        fn apply(&self, _ctx: &ApplyContext<'_>, _: &()) -> Result<(), PluginError> {
            Ok(())
        }

        fn append_transaction(&self, _: &(), new_state: &EditorState) -> Result<Option<Transaction>, PluginError> {
            let mut tr = new_state.tr();
            tr.insert_text(1, "x")?;
            Ok(Some(tr))
        }
    }

    fn state_with(plugins: PluginSet) -> EditorState {
        EditorState::create(Node::text_doc(&["abc"]), Selection::cursor(4), plugins).unwrap()
    }

    #[test]
    fn reducers_run_in_registration_order_against_old_state() {
        let plugins = PluginSet::new().with(Counter).unwrap().with(Observer).unwrap();
        let state = state_with(plugins);
        let next = state.apply(state.tr()).unwrap();
        let next = next.apply(next.tr()).unwrap();
        assert_eq!(next.plugin_state::<usize>(COUNTER), Some(&2));
        assert_eq!(next.plugin_state::<Option<usize>>(OBSERVER), Some(&Some(1)));
        assert_eq!(next.version(), 2);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let err = PluginSet::new().with(Counter).unwrap().with(Counter).unwrap_err();
        assert_eq!(err, StateError::DuplicatePlugin(COUNTER));
    }

    #[test]
    fn reducer_error_aborts_and_names_the_plugin() {
        let mut editor = Editor::new(state_with(PluginSet::new().with(Counter).unwrap()));
        let mut tr = editor.tr();
        tr.insert_text(4, "d").unwrap();
        tr.set_meta("boom", ());

        let err = editor.dispatch(tr).unwrap_err();
        assert!(matches!(err, StateError::Plugin { key, .. } if key == COUNTER));
        assert_eq!(editor.state().doc(), &Node::text_doc(&["abc"]));
        assert_eq!(editor.state().plugin_state::<usize>(COUNTER), Some(&0));
    }

    #[test]
    fn stale_transaction_is_rejected() {
        let state = state_with(PluginSet::new());
        let mut stale = state.tr();
        stale.insert_text(1, "z").unwrap();

        let mut tr = state.tr();
        tr.insert_text(4, "d").unwrap();
        let next = state.apply(tr).unwrap();

        assert_eq!(next.apply(stale).unwrap_err(), StateError::StaleBase);
    }

    #[test]
    fn structurally_equal_base_is_accepted() {
        let state = state_with(PluginSet::new());
        let mut tr = Transaction::new(Node::text_doc(&["abc"]), Selection::cursor(1));
        tr.insert_text(1, ">").unwrap();
        assert_eq!(state.apply(tr).unwrap().doc(), &Node::text_doc(&[">abc"]));
    }

    #[test]
    fn appended_transactions_run_through_all_reducers() {
        let plugins = PluginSet::new().with(Counter).unwrap().with(Exclaimer).unwrap();
        let state = state_with(plugins);
        let mut tr = state.tr();
        tr.type_text("?").unwrap();

        let applied = state.apply_transaction(tr).unwrap();
        assert_eq!(applied.state.doc(), &Node::text_doc(&["abc?!"]));
        assert_eq!(applied.transactions.len(), 2);
        assert_eq!(
            applied.transactions[1].get_meta::<PluginKey>(APPENDED_META),
            Some(&PluginKey::new("exclaimer"))
        );
        assert_eq!(applied.state.plugin_state::<usize>(COUNTER), Some(&2));
    }

    #[test]
    fn runaway_appends_hit_the_round_limit() {
        let state = state_with(PluginSet::new().with(Runaway).unwrap());
        let err = state.apply(state.tr()).unwrap_err();
        assert_eq!(
            err,
            StateError::AppendLimit {
                rounds: MAX_APPEND_ROUNDS
            }
        );
    }

    #[test]
    fn decorations_merge_across_plugins() {
        let state = state_with(PluginSet::new().with(Counter).unwrap());
        assert_eq!(state.decorations().len(), 1);
    }
}
