//! Placeholder correlation for asynchronous inserts such as image uploads.
//!
//! Starting an upload drops a widget at the insertion point and records a
//! pending operation under a fresh [`OperationId`]. While the upload runs the
//! widget is remapped through every transaction like any other decoration, so
//! when the result comes back the plugin knows where it belongs even if the
//! user kept typing. Every transition arrives as [`UploadMeta`] on a
//! transaction; the reducer stays pure and the network call lives with the
//! caller.
//!
//! Resolving through meta records a settlement that `append_transaction`
//! turns into the actual insert. Callers that prefer a single transaction can
//! use [`UploadPlugin::resolve_transaction`] instead.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decoration::{Decoration, DecorationId, DecorationSet};
use crate::error::{PluginError, TransformError};
use crate::model::{Fragment, Node};
use crate::state::{ApplyContext, EditorState, Plugin, PluginKey, Selection};
use crate::transform::{APPENDED_META, Bias, Mapping, Step, Transaction};

pub const UPLOAD_KEY: PluginKey = PluginKey::new("upload");

/// Correlates an async completion with its placeholder
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    fn decoration_id(&self) -> DecorationId {
        DecorationId::from_uuid(self.0)
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transaction meta understood by [`UploadPlugin`], set under [`UPLOAD_KEY`].
#[derive(Debug, Clone, PartialEq)]
pub enum UploadMeta {
    /// Place a placeholder at `pos`, in the coordinates of the document the
    /// transaction produces.
    Start {
        id: OperationId,
        pos: usize,
        label: String,
    },
    /// The upload finished; insert `content` where the placeholder now sits.
    Resolve { id: OperationId, content: Fragment },
    /// The transaction already inserted the result; only drop the placeholder.
    Complete { id: OperationId },
    Fail { id: OperationId, error: String },
    Cancel { id: OperationId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    Pending,
    Resolved,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    Requested,
    /// The content around the placeholder was deleted.
    AnchorDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The id is pending or already finished.
    DuplicateId,
    /// The start position is not inside inline content.
    InvalidPosition,
}

/// What happened to operations during one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    Started { id: OperationId, pos: usize },
    Resolved { id: OperationId, pos: usize },
    Failed { id: OperationId, error: String },
    Cancelled { id: OperationId, reason: CancelReason },
    Rejected { id: OperationId, reason: RejectReason },
    /// Meta for an unknown or already finished operation.
    Ignored { id: OperationId },
}

/// Snapshot of an in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub id: OperationId,
    pub anchor: usize,
    pub status: OperationStatus,
    pub label: String,
}

/// Resolved content waiting to be inserted by the follow-up transaction.
#[derive(Debug, Clone, PartialEq)]
struct Settlement {
    id: OperationId,
    anchor: usize,
    content: Fragment,
}

#[derive(Debug, Clone, Default)]
pub struct UploadState {
    decorations: DecorationSet,
    /// Label of every pending operation.
    pending: Arc<BTreeMap<OperationId, String>>,
    /// Most recently finished operations, oldest first in `finished`.
    terminal: Arc<BTreeMap<OperationId, OperationStatus>>,
    finished: Arc<VecDeque<OperationId>>,
    settlements: Vec<Settlement>,
    events: Vec<OperationEvent>,
}

impl UploadState {
    /// Current position of the placeholder for `id`.
    pub fn find_placeholder(&self, id: OperationId) -> Option<usize> {
        self.decorations
            .get(id.decoration_id())
            .map(Decoration::from)
    }

    pub fn pending(&self) -> Vec<PendingOperation> {
        self.pending
            .iter()
            .filter_map(|(id, label)| {
                Some(PendingOperation {
                    id: *id,
                    anchor: self.find_placeholder(*id)?,
                    status: OperationStatus::Pending,
                    label: label.clone(),
                })
            })
            .collect()
    }

    /// `None` for unknown ids and for finished ones that aged out of the
    /// configured history.
    pub fn status(&self, id: OperationId) -> Option<OperationStatus> {
        if self.pending.contains_key(&id) {
            return Some(OperationStatus::Pending);
        }
        self.terminal.get(&id).copied()
    }

    /// Events produced by the last dispatch, appended rounds included.
    pub fn events(&self) -> &[OperationEvent] {
        &self.events
    }

    pub fn decorations(&self) -> &DecorationSet {
        &self.decorations
    }

    fn settle(&mut self, id: OperationId, status: OperationStatus) {
        Arc::make_mut(&mut self.pending).remove(&id);
        if Arc::make_mut(&mut self.terminal).insert(id, status).is_none() {
            Arc::make_mut(&mut self.finished).push_back(id);
        }
        self.decorations = self.decorations.remove(&[id.decoration_id()]);
    }

    /// Forget the oldest finished operations beyond `limit`.
    fn trim_history(&mut self, limit: usize) {
        if self.finished.len() <= limit {
            return;
        }
        let finished = Arc::make_mut(&mut self.finished);
        let terminal = Arc::make_mut(&mut self.terminal);
        while finished.len() > limit {
            if let Some(id) = finished.pop_front() {
                terminal.remove(&id);
            }
        }
        log::trace!("upload history trimmed to {limit} entries");
    }
}

/// Why a file was refused before an upload started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("file of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("file type {0} is not accepted")]
    UnsupportedType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Class attribute on placeholder widgets.
    pub placeholder_class: String,
    pub max_size_bytes: u64,
    /// MIME types, `type/*` wildcards allowed. Empty accepts everything.
    pub accepted_types: Vec<String>,
    /// Finished operations whose status stays queryable.
    pub history_len: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            placeholder_class: "upload-placeholder".to_string(),
            max_size_bytes: 10 * 1024 * 1024,
            accepted_types: vec!["image/*".to_string()],
            history_len: 1024,
        }
    }
}

impl UploadConfig {
    pub fn validate(&self, mime: &str, size: u64) -> Result<(), UploadRejection> {
        if size > self.max_size_bytes {
            return Err(UploadRejection::TooLarge {
                size,
                max: self.max_size_bytes,
            });
        }
        let accepted = self.accepted_types.is_empty()
            || self.accepted_types.iter().any(|accepted| {
                match accepted.strip_suffix("/*") {
                    Some(family) => mime
                        .split_once('/')
                        .is_some_and(|(mime_family, _)| mime_family == family),
                    None => accepted == mime,
                }
            });
        if !accepted {
            return Err(UploadRejection::UnsupportedType(mime.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadPlugin {
    config: UploadConfig,
}

impl UploadPlugin {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn state(state: &EditorState) -> Option<&UploadState> {
        state.plugin_state::<UploadState>(UPLOAD_KEY)
    }

    pub fn find_placeholder(state: &EditorState, id: OperationId) -> Option<usize> {
        Self::state(state)?.find_placeholder(id)
    }

    pub fn pending(state: &EditorState) -> Vec<PendingOperation> {
        Self::state(state)
            .map(UploadState::pending)
            .unwrap_or_default()
    }

    /// Replace the selection with a placeholder for a new upload.
    pub fn start_upload(
        state: &EditorState,
        label: impl Into<String>,
    ) -> Result<(Transaction, OperationId), TransformError> {
        let id = OperationId::new();
        let mut tr = state.tr();
        tr.delete_selection()?;
        let pos = tr.selection().from();
        tr.set_selection(Selection::cursor(pos))?;
        tr.set_meta(
            UPLOAD_KEY,
            UploadMeta::Start {
                id,
                pos,
                label: label.into(),
            },
        );
        Ok((tr, id))
    }

    /// Transaction carrying only `meta`.
    pub fn meta_transaction(state: &EditorState, meta: UploadMeta) -> Transaction {
        let mut tr = state.tr();
        tr.set_meta(UPLOAD_KEY, meta);
        tr
    }

    /// One transaction that inserts `content` at the placeholder of `id` and
    /// completes the operation. `None` when `id` is not pending.
    pub fn resolve_transaction(
        state: &EditorState,
        id: OperationId,
        content: Fragment,
    ) -> Result<Option<Transaction>, TransformError> {
        let Some(pos) = Self::find_placeholder(state, id) else {
            return Ok(None);
        };
        let mut tr = state.tr();
        tr.replace_with(pos, pos, content)?;
        tr.set_meta(UPLOAD_KEY, UploadMeta::Complete { id });
        Ok(Some(tr))
    }

    fn placeholder(&self, id: OperationId, pos: usize, label: &str) -> Decoration {
        Decoration::widget(pos, Bias::Right)
            .with_id(id.decoration_id())
            .with_attr("class", self.config.placeholder_class.clone())
            .with_attr("data-upload-id", id.to_string())
            .with_attr("title", label)
    }

    fn start(&self, next: &mut UploadState, doc: &Node, id: OperationId, pos: usize, label: &str) {
        if next.pending.contains_key(&id) || next.terminal.contains_key(&id) {
            log::warn!("upload {id} started twice");
            next.events.push(OperationEvent::Rejected {
                id,
                reason: RejectReason::DuplicateId,
            });
            return;
        }
        let inline = doc
            .resolve(pos)
            .is_ok_and(|rpos| rpos.parent().is_textblock());
        if !inline {
            log::warn!("upload {id} cannot start at position {pos}");
            next.events.push(OperationEvent::Rejected {
                id,
                reason: RejectReason::InvalidPosition,
            });
            return;
        }
        next.decorations = next.decorations.add([self.placeholder(id, pos, label)]);
        Arc::make_mut(&mut next.pending).insert(id, label.to_string());
        log::debug!("upload {id} started at {pos}");
        next.events.push(OperationEvent::Started { id, pos });
    }

    fn resolve(&self, next: &mut UploadState, doc: &Node, id: OperationId, content: &Fragment) {
        let Some(anchor) = next.find_placeholder(id) else {
            next.events.push(OperationEvent::Ignored { id });
            return;
        };
        if let Err(err) = Step::insert(anchor, content.clone()).apply(doc) {
            log::info!("upload {id} failed: result does not fit at {anchor}: {err}");
            next.settle(id, OperationStatus::Failed);
            next.events.push(OperationEvent::Failed {
                id,
                error: err.to_string(),
            });
            return;
        }
        next.settle(id, OperationStatus::Resolved);
        next.settlements.push(Settlement {
            id,
            anchor,
            content: content.clone(),
        });
        log::info!("upload {id} resolved at {anchor}");
        next.events.push(OperationEvent::Resolved { id, pos: anchor });
    }

    fn finish(&self, next: &mut UploadState, id: OperationId, status: OperationStatus, event: OperationEvent) {
        if !next.pending.contains_key(&id) {
            next.events.push(OperationEvent::Ignored { id });
            return;
        }
        log::info!("upload {id} finished as {status:?}");
        next.settle(id, status);
        next.events.push(event);
    }
}

impl Plugin for UploadPlugin {
    type State = UploadState;

    fn key(&self) -> PluginKey {
        UPLOAD_KEY
    }

    fn init(&self, _doc: &Node, _selection: Selection) -> UploadState {
        UploadState::default()
    }

    fn apply(&self, ctx: &ApplyContext<'_>, old: &UploadState) -> Result<UploadState, PluginError> {
        let tr = ctx.tr();
        let doc = ctx.doc();
        let mapping = tr.mapping();

        let appended_by = tr.get_meta::<PluginKey>(APPENDED_META);
        let settlements = if appended_by == Some(&UPLOAD_KEY) {
            Vec::new()
        } else {
            map_settlements(&old.settlements, mapping)
        };
        let events = if appended_by.is_some() {
            old.events.clone()
        } else {
            Vec::new()
        };
        let mut next = UploadState {
            decorations: old.decorations.map(mapping, doc),
            pending: Arc::clone(&old.pending),
            terminal: Arc::clone(&old.terminal),
            finished: Arc::clone(&old.finished),
            settlements,
            events,
        };

        let vanished: Vec<OperationId> = next
            .pending
            .keys()
            .filter(|id| !next.decorations.contains(id.decoration_id()))
            .copied()
            .collect();
        for id in vanished {
            log::info!("upload {id} cancelled: placeholder content was deleted");
            next.settle(id, OperationStatus::Cancelled);
            next.events.push(OperationEvent::Cancelled {
                id,
                reason: CancelReason::AnchorDeleted,
            });
        }

        if let Some(meta) = tr.get_meta::<UploadMeta>(UPLOAD_KEY) {
            match meta {
                UploadMeta::Start { id, pos, label } => self.start(&mut next, doc, *id, *pos, label),
                UploadMeta::Resolve { id, content } => self.resolve(&mut next, doc, *id, content),
                UploadMeta::Complete { id } => {
                    let pos = old
                        .find_placeholder(*id)
                        .map(|pos| mapping.map(pos, Bias::Left))
                        .unwrap_or_default();
                    self.finish(
                        &mut next,
                        *id,
                        OperationStatus::Resolved,
                        OperationEvent::Resolved { id: *id, pos },
                    );
                }
                UploadMeta::Fail { id, error } => self.finish(
                    &mut next,
                    *id,
                    OperationStatus::Failed,
                    OperationEvent::Failed {
                        id: *id,
                        error: error.clone(),
                    },
                ),
                UploadMeta::Cancel { id } => self.finish(
                    &mut next,
                    *id,
                    OperationStatus::Cancelled,
                    OperationEvent::Cancelled {
                        id: *id,
                        reason: CancelReason::Requested,
                    },
                ),
            }
        }

        next.trim_history(self.config.history_len);
        Ok(next)
    }

    fn append_transaction(
        &self,
        state: &UploadState,
        new_state: &EditorState,
    ) -> Result<Option<Transaction>, PluginError> {
        if state.settlements.is_empty() {
            return Ok(None);
        }
        let mut tr = new_state.tr();
        for settlement in &state.settlements {
            let pos = tr.mapping().map(settlement.anchor, Bias::Right);
            tr.replace_with(pos, pos, settlement.content.clone())
                .inspect_err(|err| log::warn!("could not insert result of upload {}: {err}", settlement.id))?;
        }
        Ok(Some(tr))
    }

    fn decorations(&self, state: &UploadState) -> Option<DecorationSet> {
        Some(state.decorations.clone())
    }
}

fn map_settlements(settlements: &[Settlement], mapping: &Mapping) -> Vec<Settlement> {
    settlements
        .iter()
        .map(|settlement| Settlement {
            anchor: mapping.map(settlement.anchor, Bias::Right),
            ..settlement.clone()
        })
        .collect()
}
