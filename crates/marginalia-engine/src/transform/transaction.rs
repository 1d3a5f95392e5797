use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::mapping::{Mapping, StepMap};
use super::step::Step;
use crate::error::{StepError, TransformError};
use crate::model::{Fragment, Mark, Node, NodeKind};
use crate::state::Selection;

/// Meta key set on transactions produced by a plugin's `append_transaction`;
/// the value is the appending plugin's key.
pub const APPENDED_META: &str = "appended_transaction";

type MetaValue = Arc<dyn Any + Send + Sync>;

/// Ordered batch of steps plus selection and metadata.
///
/// Every builder method validates its steps against the current document
/// before recording anything, so a failed call leaves the transaction exactly
/// as it was.
#[derive(Clone)]
pub struct Transaction {
    before: Node,
    doc: Node,
    steps: Vec<Step>,
    docs: Vec<Node>,
    mapping: Mapping,
    selection_before: Selection,
    selection: Selection,
    selection_set: bool,
    meta: HashMap<String, MetaValue>,
}

impl Transaction {
    pub fn new(doc: Node, selection: Selection) -> Self {
        Self {
            before: doc.clone(),
            doc,
            steps: Vec::new(),
            docs: Vec::new(),
            mapping: Mapping::new(),
            selection_before: selection,
            selection,
            selection_set: false,
            meta: HashMap::new(),
        }
    }

    /// Document the transaction started from.
    pub fn before(&self) -> &Node {
        &self.before
    }

    /// Document after every step so far.
    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Document each step was applied to, parallel to `steps`.
    pub fn docs(&self) -> &[Node] {
        &self.docs
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn selection_before(&self) -> Selection {
        self.selection_before
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn selection_set(&self) -> bool {
        self.selection_set
    }

    pub fn step(&mut self, step: Step) -> Result<&mut Self, TransformError> {
        self.apply_all(vec![step])
    }

    pub fn insert_text(&mut self, pos: usize, text: &str) -> Result<&mut Self, TransformError> {
        if text.is_empty() {
            return Ok(self);
        }
        let marks = self.doc.marks_at(pos);
        self.step(Step::insert(
            pos,
            Fragment::from_node(Node::marked_text(text, marks)),
        ))
    }

    /// Replace the selection with `text` and put the cursor after it.
    pub fn type_text(&mut self, text: &str) -> Result<&mut Self, TransformError> {
        let range = self.selection.range();
        let marks = self.doc.marks_at(range.start);
        let mut steps = Vec::new();
        if !range.is_empty() {
            steps.push(Step::delete(range.start, range.end));
        }
        if !text.is_empty() {
            steps.push(Step::insert(
                range.start,
                Fragment::from_node(Node::marked_text(text, marks)),
            ));
        }
        self.apply_all(steps)?;
        let cursor = Selection::cursor(range.start + text.len());
        self.set_selection(cursor)
    }

    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self, TransformError> {
        if from == to {
            return Ok(self);
        }
        self.step(Step::delete(from, to))
    }

    pub fn delete_selection(&mut self) -> Result<&mut Self, TransformError> {
        let range = self.selection.range();
        self.delete(range.start, range.end)
    }

    pub fn replace_with(
        &mut self,
        from: usize,
        to: usize,
        content: Fragment,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::Replace { from, to, content })
    }

    /// Add `mark` to the text in range that lacks it. Only uncovered text gets a
    /// step, which keeps each step's inverse exact.
    pub fn add_mark(&mut self, from: usize, to: usize, mark: Mark) -> Result<&mut Self, TransformError> {
        self.check_bounds(from, to)?;
        let steps = self
            .doc
            .markable_segments(from, to)
            .into_iter()
            .filter(|(_, _, marks)| !marks.contains(&mark))
            .map(|(from, to, _)| Step::AddMark {
                from,
                to,
                mark: mark.clone(),
            })
            .collect();
        self.apply_all(steps)
    }

    pub fn remove_mark(
        &mut self,
        from: usize,
        to: usize,
        mark: Mark,
    ) -> Result<&mut Self, TransformError> {
        self.check_bounds(from, to)?;
        let steps = self
            .doc
            .markable_segments(from, to)
            .into_iter()
            .filter(|(_, _, marks)| marks.contains(&mark))
            .map(|(from, to, _)| Step::RemoveMark {
                from,
                to,
                mark: mark.clone(),
            })
            .collect();
        self.apply_all(steps)
    }

    pub fn set_node_kind(&mut self, pos: usize, kind: NodeKind) -> Result<&mut Self, TransformError> {
        if self.doc.node_at(pos).is_some_and(|node| node.kind() == &kind) {
            return Ok(self);
        }
        self.step(Step::SetNodeKind { pos, kind })
    }

    pub fn split_block(
        &mut self,
        pos: usize,
        kind: Option<NodeKind>,
    ) -> Result<&mut Self, TransformError> {
        self.step(Step::Split { pos, kind })
    }

    pub fn join(&mut self, pos: usize) -> Result<&mut Self, TransformError> {
        self.step(Step::Join { pos })
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<&mut Self, TransformError> {
        let size = self.doc.content_size();
        let valid = [selection.anchor, selection.head]
            .into_iter()
            .all(|pos| self.doc.resolve(pos).is_ok());
        if !valid {
            return Err(TransformError::Selection {
                anchor: selection.anchor,
                head: selection.head,
                size,
            });
        }
        self.selection = selection;
        self.selection_set = true;
        Ok(self)
    }

    pub fn set_meta<T>(&mut self, key: impl AsRef<str>, value: T) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        self.meta.insert(key.as_ref().to_owned(), Arc::new(value));
        self
    }

    pub fn get_meta<T: Any>(&self, key: impl AsRef<str>) -> Option<&T> {
        self.meta.get(key.as_ref())?.downcast_ref::<T>()
    }

    pub fn has_meta(&self, key: impl AsRef<str>) -> bool {
        self.meta.contains_key(key.as_ref())
    }

    /// Steps that undo this transaction, in the order they must be applied.
    pub fn inverted_steps(&self) -> Result<Vec<Step>, StepError> {
        self.steps
            .iter()
            .zip(&self.docs)
            .rev()
            .map(|(step, doc)| step.invert(doc))
            .collect()
    }

    fn check_bounds(&self, from: usize, to: usize) -> Result<(), TransformError> {
        let index = self.steps.len();
        if from > to {
            return Err(TransformError::Step {
                index,
                source: StepError::InvalidRange { from, to },
            });
        }
        for pos in [from, to] {
            self.doc
                .resolve(pos)
                .map_err(|source| TransformError::Step { index, source })?;
        }
        Ok(())
    }

    /// Apply `steps` against a scratch document and commit only if all succeed.
    fn apply_all(&mut self, steps: Vec<Step>) -> Result<&mut Self, TransformError> {
        let mut doc = self.doc.clone();
        let mut applied: Vec<(Step, Node, StepMap)> = Vec::with_capacity(steps.len());
        for step in steps {
            let index = self.steps.len() + applied.len();
            let result = step.apply(&doc).map_err(|source| {
                log::warn!("rejected step {index} ({step:?}): {source}");
                TransformError::Step { index, source }
            })?;
            applied.push((step, doc, result.map));
            doc = result.doc;
        }

        let mut added = Mapping::new();
        for (step, before, map) in applied {
            added.append_map(map.clone());
            self.mapping.append_map(map);
            self.docs.push(before);
            self.steps.push(step);
        }
        self.selection = self.selection.map(&added);
        self.doc = doc;
        Ok(self)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.meta.keys().collect();
        keys.sort();
        f.debug_struct("Transaction")
            .field("steps", &self.steps)
            .field("selection", &self.selection)
            .field("meta", &keys)
            .finish()
    }
}
