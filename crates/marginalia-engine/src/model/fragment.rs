use std::fmt;
use std::sync::Arc;

use super::Node;

/// Ordered, shared list of child nodes.
///
/// Fragments are normalised on construction: empty text nodes are dropped and
/// adjacent text nodes carrying the same marks are merged, so two documents
/// with the same content always have the same shape.
#[derive(Clone, Default)]
pub struct Fragment {
    nodes: Arc<Vec<Node>>,
    size: usize,
}

impl Fragment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut merged: Vec<Node> = Vec::new();
        for node in nodes {
            if node.is_text() && node.size() == 0 {
                continue;
            }
            if let Some(last) = merged.last_mut()
                && last.is_text()
                && node.is_text()
                && last.marks() == node.marks()
            {
                *last = last.join_text(&node);
                continue;
            }
            merged.push(node);
        }
        let size = merged.iter().map(Node::size).sum();
        Self {
            nodes: Arc::new(merged),
            size,
        }
    }

    pub fn from_node(node: Node) -> Self {
        Self::from_nodes([node])
    }

    /// Total number of position slots taken by the children.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn child_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn first(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn last(&self) -> Option<&Node> {
        self.nodes.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn ptr_eq(&self, other: &Fragment) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
    }

    /// Child index containing `offset` and the offset at which that child starts.
    ///
    /// An offset sitting exactly on a boundary returns the child after it.
    pub(crate) fn find_index(&self, offset: usize) -> (usize, usize) {
        let mut cur = 0;
        for (index, child) in self.nodes.iter().enumerate() {
            if offset == cur {
                return (index, cur);
            }
            let end = cur + child.size();
            if end > offset {
                return (index, cur);
            }
            cur = end;
        }
        (self.nodes.len(), cur)
    }

    /// Content between two offsets. Text nodes are split; other nodes are kept
    /// whole when they start inside the range.
    pub fn cut(&self, from: usize, to: usize) -> Fragment {
        if from == 0 && to >= self.size {
            return self.clone();
        }
        let mut out = Vec::new();
        let mut pos = 0;
        for child in self.nodes.iter() {
            if pos >= to {
                break;
            }
            let end = pos + child.size();
            if end > from {
                if child.is_text() {
                    let start = from.saturating_sub(pos);
                    let stop = child.size().min(to - pos);
                    out.push(child.cut_text(start, stop));
                } else {
                    out.push(child.clone());
                }
            }
            pos = end;
        }
        Fragment::from_nodes(out)
    }

    pub(crate) fn replace_range(&self, from: usize, to: usize, insert: &Fragment) -> Fragment {
        let before = self.cut(0, from);
        let after = self.cut(to, self.size);
        Fragment::from_nodes(
            before
                .iter()
                .chain(insert.iter())
                .chain(after.iter())
                .cloned(),
        )
    }

    pub(crate) fn replace_child(&self, index: usize, node: Node) -> Fragment {
        let mut nodes = self.nodes.as_ref().clone();
        if let Some(slot) = nodes.get_mut(index) {
            *slot = node;
        }
        Fragment::from_nodes(nodes)
    }

    pub fn append(&self, other: &Fragment) -> Fragment {
        Fragment::from_nodes(self.iter().chain(other.iter()).cloned())
    }
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.size == other.size && self.nodes == other.nodes)
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.nodes.iter()).finish()
    }
}

impl FromIterator<Node> for Fragment {
    fn from_iter<T: IntoIterator<Item = Node>>(iter: T) -> Self {
        Fragment::from_nodes(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mark;

    #[test]
    fn adjacent_text_with_same_marks_is_merged() {
        let frag = Fragment::from_nodes([Node::text("Hel"), Node::text("lo")]);
        assert_eq!(frag.child_count(), 1);
        assert_eq!(frag.size(), 5);
    }

    #[test]
    fn text_with_different_marks_stays_split() {
        let frag = Fragment::from_nodes([
            Node::text("plain"),
            Node::marked_text("bold", vec![Mark::Bold]),
        ]);
        assert_eq!(frag.child_count(), 2);
    }

    #[test]
    fn empty_text_is_dropped() {
        let frag = Fragment::from_nodes([Node::text(""), Node::hard_break()]);
        assert_eq!(frag.child_count(), 1);
        assert_eq!(frag.size(), 1);
    }

    #[test]
    fn find_index_on_boundaries_and_inside_text() {
        let frag = Fragment::from_nodes([Node::text("ab"), Node::hard_break(), Node::text("cd")]);
        assert_eq!(frag.find_index(0), (0, 0));
        assert_eq!(frag.find_index(1), (0, 0));
        assert_eq!(frag.find_index(2), (1, 2));
        assert_eq!(frag.find_index(3), (2, 3));
        assert_eq!(frag.find_index(5), (3, 5));
    }

    #[test]
    fn cut_splits_text_nodes() {
        let frag = Fragment::from_nodes([Node::text("Hello world")]);
        let cut = frag.cut(6, 11);
        assert_eq!(cut, Fragment::from_node(Node::text("world")));
    }

    #[test]
    fn replace_range_inserts_between_halves() {
        let frag = Fragment::from_nodes([Node::text("Helo")]);
        let out = frag.replace_range(3, 3, &Fragment::from_node(Node::text("l")));
        assert_eq!(out, Fragment::from_node(Node::text("Hello")));
    }
}
