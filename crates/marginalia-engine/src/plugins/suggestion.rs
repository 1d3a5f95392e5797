//! Trigger-character suggestion sessions (`/` commands, `@` mentions).
//!
//! Typing a configured trigger in a valid spot opens a session tracking the
//! range from the trigger to the end of the query typed after it. The range is
//! remapped through every transaction and the query re-read from the new
//! document. Anything that makes the range ambiguous (the trigger deleted, the
//! block split or joined, the cursor leaving the block) ends the session.
//! Commit and cancel arrive as [`SuggestionMeta`] and are handled before
//! anything else in a pass.

use std::ops::Range;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::decoration::{Decoration, DecorationSet};
use crate::error::{PluginError, TransformError};
use crate::model::{Fragment, Node};
use crate::state::{ApplyContext, EditorState, Plugin, PluginKey, Selection};
use crate::transform::{APPENDED_META, Bias, Mapping, Transaction};

pub const SUGGESTION_KEY: PluginKey = PluginKey::new("suggestion");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    pub triggers: Vec<char>,
    /// Characters allowed right before a trigger. A line start always is.
    pub allowed_prefixes: Vec<char>,
    pub allow_spaces: bool,
    /// Longest query, in characters, before the session gives up.
    pub max_query_len: usize,
    /// Names of block kinds where triggers are ignored, e.g. `code_block`.
    pub excluded_blocks: Vec<String>,
    /// Overrides the query pattern derived from `allow_spaces`.
    pub query_pattern: Option<String>,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            triggers: vec!['/', '@'],
            allowed_prefixes: vec![' '],
            allow_spaces: false,
            max_query_len: 64,
            excluded_blocks: vec!["code_block".to_string()],
            query_pattern: None,
        }
    }
}

/// Transaction meta understood by [`SuggestionPlugin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionMeta {
    Commit,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DismissReason {
    Requested,
    TriggerRemoved,
    /// The trigger's block was split, joined, moved or left.
    BlockChanged,
    CursorLeft,
    /// The range was edited while the cursor ended up outside it.
    EditedAway,
    /// An image or other non-text inline node ended up inside the range.
    NonTextContent,
    InvalidQuery,
    QueryTooLong,
}

/// What the menu UI gets to see of an active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionView {
    pub trigger: char,
    pub query: String,
    pub range: Range<usize>,
}

impl SuggestionView {
    /// Candidates containing the query, case-insensitively, prefix matches first.
    pub fn filter_candidates<'a, S: AsRef<str>>(&self, candidates: &'a [S]) -> Vec<&'a str> {
        let query = self.query.to_lowercase();
        let (mut prefixed, mut contained): (Vec<&str>, Vec<&str>) = (Vec::new(), Vec::new());
        for candidate in candidates.iter().map(AsRef::as_ref) {
            let lower = candidate.to_lowercase();
            if lower.starts_with(&query) {
                prefixed.push(candidate);
            } else if lower.contains(&query) {
                contained.push(candidate);
            }
        }
        prefixed.append(&mut contained);
        prefixed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionEvent {
    Started(SuggestionView),
    Updated(SuggestionView),
    Committed(SuggestionView),
    Cancelled {
        view: SuggestionView,
        reason: DismissReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    trigger: char,
    from: usize,
    to: usize,
    query: String,
}

impl Session {
    fn view(&self) -> SuggestionView {
        SuggestionView {
            trigger: self.trigger,
            query: self.query.clone(),
            range: self.from..self.to,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    Active(Session),
}

#[derive(Debug, Clone, Default)]
pub struct SuggestionState {
    phase: Phase,
    events: Vec<SuggestionEvent>,
    decorations: DecorationSet,
}

impl SuggestionState {
    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active(_))
    }

    pub fn view(&self) -> Option<SuggestionView> {
        match &self.phase {
            Phase::Active(session) => Some(session.view()),
            Phase::Idle => None,
        }
    }

    /// Events produced by the last dispatch, appended rounds included.
    pub fn events(&self) -> &[SuggestionEvent] {
        &self.events
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionPlugin {
    config: SuggestionConfig,
    query_pattern: Regex,
}

impl SuggestionPlugin {
    pub fn new(config: SuggestionConfig) -> Result<Self, regex::Error> {
        let pattern = match (&config.query_pattern, config.allow_spaces) {
            (Some(pattern), _) => pattern.clone(),
            (None, false) => r"^\S*$".to_string(),
            (None, true) => r"^[^\n]*$".to_string(),
        };
        Ok(Self {
            query_pattern: Regex::new(&pattern)?,
            config,
        })
    }

    pub fn config(&self) -> &SuggestionConfig {
        &self.config
    }

    pub fn state(state: &EditorState) -> Option<&SuggestionState> {
        state.plugin_state::<SuggestionState>(SUGGESTION_KEY)
    }

    pub fn view(state: &EditorState) -> Option<SuggestionView> {
        Self::state(state)?.view()
    }

    /// Range the trigger and query occupy right now.
    pub fn commit_range(state: &EditorState) -> Option<Range<usize>> {
        Self::view(state).map(|view| view.range)
    }

    /// Replace the trigger and query with `content`, cursor after it, and close
    /// the session. `None` when no session is active.
    pub fn commit_transaction(
        state: &EditorState,
        content: Fragment,
    ) -> Result<Option<Transaction>, TransformError> {
        let Some(range) = Self::commit_range(state) else {
            return Ok(None);
        };
        let size = content.size();
        let mut tr = state.tr();
        tr.replace_with(range.start, range.end, content)?;
        tr.set_selection(Selection::cursor(range.start + size))?;
        tr.set_meta(SUGGESTION_KEY, SuggestionMeta::Commit);
        Ok(Some(tr))
    }

    pub fn cancel_transaction(state: &EditorState) -> Transaction {
        let mut tr = state.tr();
        tr.set_meta(SUGGESTION_KEY, SuggestionMeta::Cancel);
        tr
    }

    fn excluded(&self, parent: &Node) -> bool {
        let name = parent.kind().name();
        self.config.excluded_blocks.iter().any(|excluded| excluded == name)
    }

    fn check_query(&self, query: &str) -> Result<(), DismissReason> {
        if query.chars().count() > self.config.max_query_len {
            return Err(DismissReason::QueryTooLong);
        }
        if !self.query_pattern.is_match(query) {
            return Err(DismissReason::InvalidQuery);
        }
        Ok(())
    }

    /// A session for a trigger this transaction just typed at the cursor.
    fn try_start(&self, ctx: &ApplyContext<'_>) -> Option<Session> {
        let tr = ctx.tr();
        let selection = ctx.selection();
        if !tr.doc_changed() || !selection.is_empty() {
            return None;
        }
        let doc = ctx.doc();
        let head = selection.head;
        let trigger = self.config.triggers.iter().copied().find(|trigger| {
            head.checked_sub(trigger.len_utf8())
                .is_some_and(|from| doc.text_between(from, head, "") == trigger.to_string())
        })?;
        let from = head - trigger.len_utf8();

        let typed = inserted_ranges(tr.mapping())
            .iter()
            .any(|range| range.start <= from && head <= range.end);
        if !typed {
            return None;
        }

        let rpos = doc.resolve(from).ok()?;
        let parent = rpos.parent();
        if !parent.is_textblock() || self.excluded(parent) {
            return None;
        }
        let before = doc.text_between(rpos.start(rpos.depth()), from, "");
        let prefix_ok = match before.chars().next_back() {
            None | Some('\n') => true,
            Some(c) => self.config.allowed_prefixes.contains(&c),
        };
        if !prefix_ok {
            return None;
        }
        Some(Session {
            trigger,
            from,
            to: head,
            query: String::new(),
        })
    }

    /// Carry an active session through the transaction.
    fn update(&self, session: &Session, ctx: &ApplyContext<'_>) -> Result<Session, DismissReason> {
        let tr = ctx.tr();
        let doc = ctx.doc();
        let mapping = tr.mapping();

        let start = mapping.map_result(session.from, Bias::Right);
        if start.deleted || start.deleted_after {
            return Err(DismissReason::TriggerRemoved);
        }
        let from = start.pos;
        let query_start = from + session.trigger.len_utf8();
        // Only typing at the cursor extends the query; anything else inserted
        // at the end of the range stays outside it.
        let kept = mapping.map(session.to, Bias::Left);
        let grown = mapping.map(session.to, Bias::Right);
        let selection = ctx.selection();
        let typed = grown > kept
            && selection.is_empty()
            && selection.head == grown
            && !has_inline_node(doc, kept, grown);
        let to = (if typed { grown } else { kept }).max(query_start);
        if to > doc.content_size() || doc.text_between(from, query_start, "") != session.trigger.to_string() {
            return Err(DismissReason::TriggerRemoved);
        }

        let (Ok(rfrom), Ok(rto)) = (doc.resolve(from), doc.resolve(to)) else {
            return Err(DismissReason::BlockChanged);
        };
        if !rfrom.same_parent(&rto) || !rfrom.parent().is_textblock() || self.excluded(rfrom.parent()) {
            return Err(DismissReason::BlockChanged);
        }
        let old_before = ctx
            .old_state()
            .doc()
            .resolve(session.from)
            .ok()
            .and_then(|rpos| rpos.before(rpos.depth()));
        let moved = old_before.map(|before| mapping.map_result(before, Bias::Right));
        let stayed = moved.is_some_and(|moved| !moved.deleted && Some(moved.pos) == rfrom.before(rfrom.depth()));
        if !stayed {
            return Err(DismissReason::BlockChanged);
        }

        let head = selection.head;
        let in_block = doc
            .resolve(head)
            .is_ok_and(|rhead| rhead.same_parent(&rfrom));
        if !in_block {
            return Err(DismissReason::CursorLeft);
        }

        if has_inline_node(doc, query_start, to) {
            return Err(DismissReason::NonTextContent);
        }
        let query = doc.text_between(query_start, to, "");
        let edited = query != session.query || to - from != session.to - session.from;
        if edited && !(query_start..=to).contains(&head) {
            return Err(DismissReason::EditedAway);
        }
        self.check_query(&query)?;
        Ok(Session {
            trigger: session.trigger,
            from,
            to,
            query,
        })
    }

    fn decorations_for(&self, phase: &Phase) -> DecorationSet {
        match phase {
            Phase::Active(session) => DecorationSet::create([Decoration::inline(session.from, session.to)
                .with_attr("class", "suggestion")
                .with_attr("data-trigger", session.trigger.to_string())]),
            Phase::Idle => DecorationSet::empty(),
        }
    }
}

impl Plugin for SuggestionPlugin {
    type State = SuggestionState;

    fn key(&self) -> PluginKey {
        SUGGESTION_KEY
    }

    fn init(&self, _doc: &Node, _selection: Selection) -> SuggestionState {
        SuggestionState::default()
    }

    fn apply(&self, ctx: &ApplyContext<'_>, old: &SuggestionState) -> Result<SuggestionState, PluginError> {
        let mut events = if ctx.tr().has_meta(APPENDED_META) {
            old.events.clone()
        } else {
            Vec::new()
        };

        if let Some(meta) = ctx.tr().get_meta::<SuggestionMeta>(SUGGESTION_KEY) {
            if let Phase::Active(session) = &old.phase {
                let view = session.view();
                log::info!("suggestion {:?} {meta:?} with query {:?}", view.trigger, view.query);
                events.push(match meta {
                    SuggestionMeta::Commit => SuggestionEvent::Committed(view),
                    SuggestionMeta::Cancel => SuggestionEvent::Cancelled {
                        view,
                        reason: DismissReason::Requested,
                    },
                });
            }
            return Ok(SuggestionState {
                phase: Phase::Idle,
                events,
                decorations: DecorationSet::empty(),
            });
        }

        let mut phase = Phase::Idle;
        if let Phase::Active(session) = &old.phase {
            match self.update(session, ctx) {
                Ok(next) => {
                    if next != *session {
                        events.push(SuggestionEvent::Updated(next.view()));
                    }
                    phase = Phase::Active(next);
                }
                Err(reason) => {
                    log::info!("suggestion {:?} cancelled: {reason:?}", session.trigger);
                    events.push(SuggestionEvent::Cancelled {
                        view: session.view(),
                        reason,
                    });
                }
            }
        }
        if phase == Phase::Idle
            && let Some(session) = self.try_start(ctx)
        {
            log::debug!("suggestion {:?} started at {}", session.trigger, session.from);
            events.push(SuggestionEvent::Started(session.view()));
            phase = Phase::Active(session);
        }

        // Rebuilt rather than mapped: the session range is the only anchor.
        let decorations = if phase == old.phase {
            old.decorations.clone()
        } else {
            self.decorations_for(&phase)
        };
        Ok(SuggestionState {
            phase,
            events,
            decorations,
        })
    }

    fn decorations(&self, state: &SuggestionState) -> Option<DecorationSet> {
        Some(state.decorations.clone())
    }
}

/// Ranges of the final document that this mapping's steps inserted.
fn has_inline_node(doc: &Node, from: usize, to: usize) -> bool {
    let mut found = false;
    doc.nodes_between(from, to, &mut |node, _, _| {
        found |= node.kind().is_inline() && !node.is_text();
        !found
    });
    found
}

fn inserted_ranges(mapping: &Mapping) -> Vec<Range<usize>> {
    let mut inserted: Vec<Range<usize>> = Vec::new();
    for map in mapping.maps() {
        inserted = inserted
            .into_iter()
            .filter_map(|range| {
                let start = map.map(range.start, Bias::Right);
                let end = map.map(range.end, Bias::Left);
                (start < end).then_some(start..end)
            })
            .collect();
        let mut diff: isize = 0;
        for range in map.ranges() {
            let start = range.start.saturating_add_signed(diff);
            if range.new_size > 0 {
                inserted.push(start..start + range.new_size);
            }
            diff += range.new_size as isize - range.old_size as isize;
        }
    }
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;
    use crate::state::{Editor, PluginSet};
    use crate::transform::StepMap;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn editor_with(doc: Node, cursor: usize) -> Editor {
        let plugin = SuggestionPlugin::new(SuggestionConfig::default()).unwrap();
        let plugins = PluginSet::new().with(plugin).unwrap();
        Editor::new(EditorState::create(doc, Selection::cursor(cursor), plugins).unwrap())
    }

    fn editor(text: &str) -> Editor {
        let cursor = 1 + text.len();
        editor_with(Node::text_doc(&[text]), cursor)
    }

    fn type_text(editor: &mut Editor, text: &str) {
        let mut tr = editor.tr();
        tr.type_text(text).unwrap();
        editor.dispatch(tr).unwrap();
    }

    fn move_to(editor: &mut Editor, pos: usize) {
        let mut tr = editor.tr();
        tr.set_selection(Selection::cursor(pos)).unwrap();
        editor.dispatch(tr).unwrap();
    }

    fn backspace(editor: &mut Editor) {
        let head = editor.state().selection().head;
        let mut tr = editor.tr();
        tr.delete(head - 1, head).unwrap();
        editor.dispatch(tr).unwrap();
    }

    fn events(editor: &Editor) -> Vec<SuggestionEvent> {
        SuggestionPlugin::state(editor.state()).unwrap().events().to_vec()
    }

    fn last_cancel(editor: &Editor) -> Option<DismissReason> {
        events(editor).into_iter().find_map(|event| match event {
            SuggestionEvent::Cancelled { reason, .. } => Some(reason),
            _ => None,
        })
    }

    #[test]
    fn typing_after_trigger_builds_query() {
        let mut editor = editor("");
        type_text(&mut editor, "/");
        assert_eq!(
            events(&editor),
            vec![SuggestionEvent::Started(SuggestionView {
                trigger: '/',
                query: String::new(),
                range: 1..2,
            })]
        );
        type_text(&mut editor, "h");
        type_text(&mut editor, "e");
        let view = SuggestionPlugin::view(editor.state()).unwrap();
        assert_eq!(view.query, "he");
        assert_eq!(view.range, 1..4);
        assert!(matches!(events(&editor).as_slice(), [SuggestionEvent::Updated(_)]));
    }

    #[test]
    fn deleting_back_past_the_trigger_cancels() {
        let mut editor = editor("");
        type_text(&mut editor, "/");
        type_text(&mut editor, "he");
        for _ in 0..2 {
            backspace(&mut editor);
        }
        assert_eq!(SuggestionPlugin::view(editor.state()).unwrap().query, "");
        backspace(&mut editor);
        assert_eq!(last_cancel(&editor), Some(DismissReason::TriggerRemoved));
        assert!(SuggestionPlugin::view(editor.state()).is_none());
    }

    #[test]
    fn commit_range_survives_cursor_moving_away_and_back() {
        let mut editor = editor("say ");
        type_text(&mut editor, "/");
        type_text(&mut editor, "he");
        move_to(&mut editor, 1);
        move_to(&mut editor, 8);
        assert_eq!(SuggestionPlugin::commit_range(editor.state()), Some(5..8));

        let tr = SuggestionPlugin::commit_transaction(
            editor.state(),
            Fragment::from_node(Node::text("hello")),
        )
        .unwrap()
        .unwrap();
        editor.dispatch(tr).unwrap();
        assert_eq!(editor.state().doc(), &Node::text_doc(&["say hello"]));
        assert!(matches!(events(&editor).as_slice(), [SuggestionEvent::Committed(view)] if view.query == "he"));
        assert!(editor.state().decorations().is_empty());
    }

    #[test]
    fn explicit_cancel_leaves_document_alone() {
        let mut editor = editor("");
        type_text(&mut editor, "@");
        type_text(&mut editor, "bo");
        let tr = SuggestionPlugin::cancel_transaction(editor.state());
        editor.dispatch(tr).unwrap();
        assert_eq!(last_cancel(&editor), Some(DismissReason::Requested));
        assert_eq!(editor.state().doc(), &Node::text_doc(&["@bo"]));
    }

    #[rstest]
    #[case::after_word("word", false)]
    #[case::after_space("word ", true)]
    #[case::line_start("", true)]
    fn trigger_needs_an_allowed_prefix(#[case] text: &str, #[case] starts: bool) {
        let mut editor = editor(text);
        type_text(&mut editor, "/");
        assert_eq!(SuggestionPlugin::view(editor.state()).is_some(), starts);
    }

    #[test]
    fn trigger_in_code_block_is_ignored() {
        let doc = Node::doc([Node::new(NodeKind::CodeBlock { language: None }, [Node::text("x ")]).unwrap()])
            .unwrap();
        let mut editor = editor_with(doc, 3);
        type_text(&mut editor, "/");
        assert!(SuggestionPlugin::view(editor.state()).is_none());
    }

    #[test]
    fn pasting_text_that_ends_in_a_trigger_starts_a_session() {
        let mut editor = editor("");
        type_text(&mut editor, "see /");
        assert_eq!(SuggestionPlugin::view(editor.state()).map(|v| v.range), Some(5..6));
    }

    #[test]
    fn moving_the_cursor_onto_an_existing_slash_does_not_start() {
        let mut editor = editor("a /");
        move_to(&mut editor, 2);
        move_to(&mut editor, 4);
        assert!(SuggestionPlugin::view(editor.state()).is_none());
    }

    #[test]
    fn whitespace_in_query_cancels() {
        let mut editor = editor("");
        type_text(&mut editor, "/");
        type_text(&mut editor, "he");
        type_text(&mut editor, " ");
        assert_eq!(last_cancel(&editor), Some(DismissReason::InvalidQuery));
    }

    #[test]
    fn long_query_cancels() {
        let config = SuggestionConfig {
            max_query_len: 3,
            ..SuggestionConfig::default()
        };
        let plugins = PluginSet::new().with(SuggestionPlugin::new(config).unwrap()).unwrap();
        let state = EditorState::create(Node::text_doc(&[""]), Selection::cursor(1), plugins).unwrap();
        let mut editor = Editor::new(state);
        type_text(&mut editor, "/");
        type_text(&mut editor, "abcd");
        assert_eq!(last_cancel(&editor), Some(DismissReason::QueryTooLong));
    }

    #[test]
    fn cursor_leaving_the_block_cancels() {
        let mut editor = editor_with(Node::text_doc(&["", "next"]), 1);
        type_text(&mut editor, "/");
        type_text(&mut editor, "x");
        move_to(&mut editor, 6);
        assert_eq!(last_cancel(&editor), Some(DismissReason::CursorLeft));
    }

    #[test]
    fn edit_inside_range_with_cursor_outside_cancels() {
        let mut editor = editor("");
        type_text(&mut editor, "/");
        type_text(&mut editor, "q");
        let mut tr = editor.tr();
        tr.insert_text(2, "z").unwrap();
        tr.set_selection(Selection::cursor(1)).unwrap();
        editor.dispatch(tr).unwrap();
        assert_eq!(last_cancel(&editor), Some(DismissReason::EditedAway));
    }

    #[test]
    fn text_inserted_at_the_end_away_from_the_cursor_stays_outside() {
        let mut editor = editor("");
        type_text(&mut editor, "/");
        type_text(&mut editor, "q");
        let mut tr = editor.tr();
        tr.insert_text(3, "z").unwrap();
        tr.set_selection(Selection::cursor(1)).unwrap();
        editor.dispatch(tr).unwrap();
        let view = SuggestionPlugin::view(editor.state()).unwrap();
        assert_eq!(view.query, "q");
        assert_eq!(view.range, 1..3);
    }

    #[test]
    fn image_pasted_into_the_query_cancels() {
        let mut editor = editor("");
        type_text(&mut editor, "/");
        type_text(&mut editor, "ab");
        let mut tr = editor.tr();
        tr.replace_with(3, 3, Fragment::from_node(Node::image("a.png", "a"))).unwrap();
        editor.dispatch(tr).unwrap();
        assert_eq!(last_cancel(&editor), Some(DismissReason::NonTextContent));
    }

    #[test]
    fn splitting_the_block_before_the_trigger_cancels() {
        let mut editor = editor("ab ");
        type_text(&mut editor, "/");
        type_text(&mut editor, "x");
        let mut tr = editor.tr();
        tr.split_block(2, None).unwrap();
        editor.dispatch(tr).unwrap();
        assert_eq!(last_cancel(&editor), Some(DismissReason::BlockChanged));
    }

    #[test]
    fn joining_the_block_into_the_previous_one_cancels() {
        let mut editor = editor_with(Node::text_doc(&["top", ""]), 6);
        type_text(&mut editor, "/");
        type_text(&mut editor, "x");
        let mut tr = editor.tr();
        tr.join(5).unwrap();
        editor.dispatch(tr).unwrap();
        assert_eq!(last_cancel(&editor), Some(DismissReason::BlockChanged));
    }

    #[test]
    fn edits_in_other_blocks_remap_the_range() {
        let mut editor = editor_with(Node::text_doc(&["top", ""]), 6);
        type_text(&mut editor, "/");
        type_text(&mut editor, "x");
        let mut tr = editor.tr();
        tr.insert_text(1, "the ").unwrap();
        editor.dispatch(tr).unwrap();
        assert_eq!(SuggestionPlugin::commit_range(editor.state()), Some(10..12));
    }

    #[test]
    fn decoration_marks_the_active_range() {
        let mut editor = editor("");
        type_text(&mut editor, "/");
        type_text(&mut editor, "ab");
        let found = editor.state().decorations().find(None, None, |_| true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].spec(), &crate::decoration::DecorationSpec::Inline { from: 1, to: 4 });
        assert_eq!(found[0].attr("class"), Some("suggestion"));
    }

    #[test]
    fn filter_candidates_prefers_prefix_matches() {
        let view = SuggestionView {
            trigger: '/',
            query: "he".into(),
            range: 1..4,
        };
        let candidates = ["theme", "Heading", "help", "table"];
        assert_eq!(view.filter_candidates(&candidates), vec!["Heading", "help", "theme"]);
    }

    #[test]
    fn inserted_ranges_track_later_steps() {
        let mapping = Mapping::from_maps([StepMap::replace(3, 0, 2), StepMap::replace(0, 0, 1)]);
        assert_eq!(inserted_ranges(&mapping), vec![4..6, 0..1]);
    }
}
