use super::Node;
use crate::error::StepError;

#[derive(Debug, Clone)]
struct Level {
    node: Node,
    /// Index of the child this level continues into (or sits before).
    index: usize,
    /// Absolute position where `node`'s content starts.
    start: usize,
}

/// A position together with the chain of ancestors that contain it.
#[derive(Debug, Clone)]
pub struct ResolvedPos {
    pos: usize,
    levels: Vec<Level>,
    parent_offset: usize,
    text_offset: usize,
}

impl ResolvedPos {
    pub(crate) fn resolve(doc: &Node, pos: usize) -> Result<ResolvedPos, StepError> {
        let size = doc.content_size();
        if pos > size {
            return Err(StepError::OutOfRange { pos, size });
        }

        let mut levels = Vec::new();
        let mut node = doc.clone();
        let mut start = 0;
        let mut offset = pos;
        let mut text_offset = 0;
        loop {
            let (index, child_start) = node.content().find_index(offset);
            let rem = offset - child_start;
            levels.push(Level {
                node: node.clone(),
                index,
                start,
            });
            if rem == 0 {
                break;
            }
            let Some(child) = node.child(index).cloned() else {
                break;
            };
            if child.is_text() {
                if !child.text_cow().is_char_boundary(rem) {
                    return Err(StepError::InsideAtom { pos });
                }
                text_offset = rem;
                break;
            }
            if child.is_atom() {
                return Err(StepError::InsideAtom { pos });
            }
            start += child_start + 1;
            offset = rem - 1;
            node = child;
        }

        Ok(ResolvedPos {
            pos,
            levels,
            parent_offset: offset,
            text_offset,
        })
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Depth of the innermost parent; the document itself is depth 0.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn parent(&self) -> &Node {
        &self.levels[self.depth()].node
    }

    pub fn node(&self, depth: usize) -> &Node {
        &self.levels[depth].node
    }

    /// Index into the parent of the child at (or containing) this position.
    pub fn index(&self) -> usize {
        self.levels[self.depth()].index
    }

    pub fn index_at(&self, depth: usize) -> usize {
        self.levels[depth].index
    }

    pub fn parent_offset(&self) -> usize {
        self.parent_offset
    }

    /// Offset into the text node the position falls inside, zero on a boundary.
    pub fn text_offset(&self) -> usize {
        self.text_offset
    }

    /// Absolute position where the content of the ancestor at `depth` starts.
    pub fn start(&self, depth: usize) -> usize {
        self.levels[depth].start
    }

    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content_size()
    }

    /// Position right before the ancestor at `depth`; undefined for the root.
    pub fn before(&self, depth: usize) -> Option<usize> {
        (depth > 0).then(|| self.start(depth) - 1)
    }

    pub fn after(&self, depth: usize) -> Option<usize> {
        (depth > 0).then(|| self.end(depth) + 1)
    }

    pub fn node_after(&self) -> Option<&Node> {
        if self.text_offset > 0 {
            return None;
        }
        self.parent().child(self.index())
    }

    pub fn node_before(&self) -> Option<&Node> {
        if self.text_offset > 0 {
            return None;
        }
        self.index()
            .checked_sub(1)
            .and_then(|index| self.parent().child(index))
    }

    pub fn same_parent(&self, other: &ResolvedPos) -> bool {
        self.depth() == other.depth() && self.start(self.depth()) == other.start(other.depth())
    }

    /// Deepest depth whose ancestor contains both positions.
    pub fn shared_depth(&self, other: &ResolvedPos) -> usize {
        let max = self.depth().min(other.depth());
        (0..=max)
            .rev()
            .find(|&depth| self.start(depth) == other.start(depth))
            .unwrap_or(0)
    }
}
