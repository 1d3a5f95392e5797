use std::borrow::Cow;
use std::fmt;

use xi_rope::Rope;

use super::{Fragment, ResolvedPos};
use crate::error::StepError;

/// Inline formatting carried by text nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mark {
    Bold,
    Italic,
    Code,
    Link { href: String },
}

impl Mark {
    /// Inclusive marks extend to text typed at their edge.
    pub fn is_inclusive(&self) -> bool {
        !matches!(self, Mark::Link { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Doc,
    Paragraph,
    Heading { level: u8 },
    CodeBlock { language: Option<String> },
    Blockquote,
    Image { src: String, alt: String },
    HardBreak,
    Text,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Doc => "doc",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading { .. } => "heading",
            NodeKind::CodeBlock { .. } => "code_block",
            NodeKind::Blockquote => "blockquote",
            NodeKind::Image { .. } => "image",
            NodeKind::HardBreak => "hard_break",
            NodeKind::Text => "text",
        }
    }

    pub fn is_textblock(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading { .. } | NodeKind::CodeBlock { .. }
        )
    }

    pub fn is_block(&self) -> bool {
        self.is_textblock() || matches!(self, NodeKind::Blockquote)
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            NodeKind::Text | NodeKind::Image { .. } | NodeKind::HardBreak
        )
    }

    /// Leaves that occupy a single, indivisible position slot.
    pub fn is_atom(&self) -> bool {
        matches!(self, NodeKind::Image { .. } | NodeKind::HardBreak)
    }

    /// Whether text inside this kind may carry marks.
    pub fn allows_marks(&self) -> bool {
        matches!(self, NodeKind::Paragraph | NodeKind::Heading { .. })
    }

    pub fn allows(&self, child: &Node) -> bool {
        match self {
            NodeKind::Doc | NodeKind::Blockquote => child.kind().is_block(),
            NodeKind::Paragraph | NodeKind::Heading { .. } => child.kind().is_inline(),
            NodeKind::CodeBlock { .. } => child.is_text() && child.marks().is_empty(),
            _ => false,
        }
    }

    /// Text used for this leaf when flattening a document to plain text.
    pub fn leaf_text(&self) -> &'static str {
        match self {
            NodeKind::HardBreak => "\n",
            NodeKind::Image { .. } => "\u{fffc}",
            _ => "",
        }
    }
}

/// Immutable document tree node.
///
/// Position slots: text occupies its UTF-8 byte length, an atom occupies one
/// slot and every other node occupies its content size plus an opening and a
/// closing boundary.
#[derive(Clone)]
pub struct Node {
    kind: NodeKind,
    content: Fragment,
    text: Option<Rope>,
    marks: Vec<Mark>,
}

impl Node {
    /// Build a non-text node, checking that every child is allowed inside it.
    pub fn new(kind: NodeKind, content: impl IntoIterator<Item = Node>) -> Result<Node, StepError> {
        let content = Fragment::from_nodes(content);
        if kind == NodeKind::Text {
            return Err(StepError::InvalidContent {
                parent: "text",
                child: "node",
            });
        }
        for child in content.iter() {
            if !kind.allows(child) {
                return Err(StepError::InvalidContent {
                    parent: kind.name(),
                    child: child.kind().name(),
                });
            }
        }
        Ok(Node {
            kind,
            content,
            text: None,
            marks: Vec::new(),
        })
    }

    pub fn text(text: impl AsRef<str>) -> Node {
        Node::marked_text(text, Vec::new())
    }

    pub fn marked_text(text: impl AsRef<str>, mut marks: Vec<Mark>) -> Node {
        marks.sort();
        marks.dedup();
        Node {
            kind: NodeKind::Text,
            content: Fragment::empty(),
            text: Some(Rope::from(text.as_ref())),
            marks,
        }
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Node {
        Node::leaf(NodeKind::Image {
            src: src.into(),
            alt: alt.into(),
        })
    }

    pub fn hard_break() -> Node {
        Node::leaf(NodeKind::HardBreak)
    }

    fn leaf(kind: NodeKind) -> Node {
        Node {
            kind,
            content: Fragment::empty(),
            text: None,
            marks: Vec::new(),
        }
    }

    pub fn paragraph(content: impl IntoIterator<Item = Node>) -> Result<Node, StepError> {
        Node::new(NodeKind::Paragraph, content)
    }

    pub fn doc(blocks: impl IntoIterator<Item = Node>) -> Result<Node, StepError> {
        Node::new(NodeKind::Doc, blocks)
    }

    /// A document made of plain-text paragraphs.
    pub fn text_doc<S: AsRef<str>>(paragraphs: &[S]) -> Node {
        let blocks = paragraphs.iter().map(|text| Node {
            kind: NodeKind::Paragraph,
            content: Fragment::from_node(Node::text(text)),
            text: None,
            marks: Vec::new(),
        });
        Node {
            kind: NodeKind::Doc,
            content: Fragment::from_nodes(blocks),
            text: None,
            marks: Vec::new(),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn content(&self) -> &Fragment {
        &self.content
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    pub fn is_textblock(&self) -> bool {
        self.kind.is_textblock()
    }

    pub fn is_atom(&self) -> bool {
        self.kind.is_atom()
    }

    pub fn child_count(&self) -> usize {
        self.content.child_count()
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.content.child(index)
    }

    pub fn size(&self) -> usize {
        match &self.text {
            Some(text) => text.len(),
            None if self.kind.is_atom() => 1,
            None => self.content.size() + 2,
        }
    }

    pub fn content_size(&self) -> usize {
        self.content.size()
    }

    /// Text of a text node; empty for every other kind.
    pub fn text_cow(&self) -> Cow<'_, str> {
        match &self.text {
            Some(text) => text.slice_to_cow(0..text.len()),
            None => Cow::Borrowed(""),
        }
    }

    /// Concatenated text of every descendant, without separators.
    pub fn text_content(&self) -> String {
        if self.is_text() {
            return self.text_cow().into_owned();
        }
        self.text_between(0, self.content_size(), "")
    }

    pub(crate) fn cut_text(&self, from: usize, to: usize) -> Node {
        let text = self.text_cow();
        let slice = text.get(from..to).unwrap_or_default();
        Node::marked_text(slice, self.marks.clone())
    }

    pub(crate) fn join_text(&self, other: &Node) -> Node {
        let joined = format!("{}{}", self.text_cow(), other.text_cow());
        Node::marked_text(joined, self.marks.clone())
    }

    pub(crate) fn with_content(&self, content: Fragment) -> Node {
        Node {
            kind: self.kind.clone(),
            content,
            text: None,
            marks: self.marks.clone(),
        }
    }

    pub(crate) fn with_marks(&self, marks: Vec<Mark>) -> Node {
        match &self.text {
            Some(_) => Node::marked_text(self.text_cow(), marks),
            None => self.clone(),
        }
    }

    /// Same node with a different kind, provided the content still fits.
    pub fn with_kind(&self, kind: NodeKind) -> Result<Node, StepError> {
        Node::new(kind, self.content.iter().cloned())
    }

    /// Resolve a position into its ancestor path.
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos, StepError> {
        ResolvedPos::resolve(self, pos)
    }

    /// The node starting right at `pos`, if any.
    pub fn node_at(&self, pos: usize) -> Option<Node> {
        let rpos = self.resolve(pos).ok()?;
        rpos.node_after().cloned()
    }

    /// Visit every node overlapping `from..to`. The callback receives the node,
    /// the position before it and its parent; returning `false` skips the
    /// node's children.
    pub fn nodes_between<F>(&self, from: usize, to: usize, f: &mut F)
    where
        F: FnMut(&Node, usize, &Node) -> bool,
    {
        self.nodes_between_at(from, to, 0, f);
    }

    fn nodes_between_at<F>(&self, from: usize, to: usize, node_start: usize, f: &mut F)
    where
        F: FnMut(&Node, usize, &Node) -> bool,
    {
        let mut pos = 0;
        for child in self.content.iter() {
            if pos >= to {
                break;
            }
            let end = pos + child.size();
            if end > from && f(child, node_start + pos, self) && child.content_size() > 0 {
                let start = pos + 1;
                child.nodes_between_at(
                    from.saturating_sub(start),
                    child.content_size().min(to - start),
                    node_start + start,
                    f,
                );
            }
            pos = end;
        }
    }

    /// Text between two positions, with `block_separator` between blocks.
    pub fn text_between(&self, from: usize, to: usize, block_separator: &str) -> String {
        let mut text = String::new();
        let mut separated = true;
        self.nodes_between(from, to, &mut |node, pos, _| {
            if node.is_text() {
                let content = node.text_cow();
                let start = from.max(pos) - pos;
                let end = (to - pos).min(content.len());
                text.push_str(content.get(start..end).unwrap_or_default());
                separated = block_separator.is_empty();
            } else if node.is_atom() {
                text.push_str(node.kind().leaf_text());
                separated = block_separator.is_empty();
            } else if !separated && node.kind().is_block() {
                text.push_str(block_separator);
                separated = true;
            }
            true
        });
        text
    }

    /// Marks an insertion at `pos` inherits from the surrounding text.
    pub fn marks_at(&self, pos: usize) -> Vec<Mark> {
        let Ok(rpos) = self.resolve(pos) else {
            return Vec::new();
        };
        if !rpos.parent().kind().allows_marks() {
            return Vec::new();
        }
        let source = if rpos.text_offset() > 0 {
            rpos.parent().child(rpos.index())
        } else {
            rpos.node_before()
        };
        source
            .filter(|node| node.is_text())
            .map(|node| {
                node.marks()
                    .iter()
                    .filter(|mark| mark.is_inclusive())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Text segments inside `from..to` that can carry marks, as
    /// `(from, to, marks)` in absolute positions.
    pub(crate) fn markable_segments(&self, from: usize, to: usize) -> Vec<(usize, usize, Vec<Mark>)> {
        let mut segments = Vec::new();
        self.nodes_between(from, to, &mut |node, pos, parent| {
            if node.is_text() && parent.kind().allows_marks() {
                let start = from.max(pos);
                let end = to.min(pos + node.size());
                if start < end {
                    segments.push((start, end, node.marks().to_vec()));
                }
            }
            true
        });
        segments
    }

    /// Rewrite the marks of markable text inside `from..to`, positions relative
    /// to this node's content.
    pub(crate) fn map_marks<F>(&self, from: usize, to: usize, f: &F) -> Node
    where
        F: Fn(&[Mark]) -> Vec<Mark>,
    {
        let mut children = Vec::with_capacity(self.child_count());
        let mut pos = 0;
        for child in self.content.iter() {
            let end = pos + child.size();
            if end <= from || pos >= to {
                children.push(child.clone());
            } else if child.is_text() {
                if !self.kind.allows_marks() {
                    children.push(child.clone());
                } else {
                    let start = from.max(pos) - pos;
                    let stop = to.min(end) - pos;
                    children.push(child.cut_text(0, start));
                    let middle = child.cut_text(start, stop);
                    children.push(middle.with_marks(f(middle.marks())));
                    children.push(child.cut_text(stop, child.size()));
                }
            } else if child.content_size() > 0 {
                let inner = pos + 1;
                children.push(child.map_marks(
                    from.saturating_sub(inner),
                    child.content_size().min(to - inner),
                    f,
                ));
            } else {
                children.push(child.clone());
            }
            pos = end;
        }
        self.with_content(Fragment::from_nodes(children))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.marks == other.marks
            && self.text_cow() == other.text_cow()
            && self.content == other.content
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_text() {
            if !self.marks.is_empty() {
                write!(f, "{:?}", self.marks)?;
            }
            return write!(f, "{:?}", self.text_cow());
        }
        match &self.kind {
            NodeKind::Heading { level } => write!(f, "heading{level}")?,
            NodeKind::Image { src, .. } => return write!(f, "image({src})"),
            kind => write!(f, "{}", kind.name())?,
        }
        if self.kind.is_atom() {
            return Ok(());
        }
        write!(f, "(")?;
        for (i, child) in self.content.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{child:?}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Node {
        Node::doc([
            Node::paragraph([Node::text("Hello "), Node::image("cat.png", "cat")]).unwrap(),
            Node::new(
                NodeKind::Blockquote,
                [Node::paragraph([Node::text("quoted")]).unwrap()],
            )
            .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn sizes_count_boundaries_and_atoms() {
        let doc = sample();
        // paragraph: 1 + 6 + 1 + 1, blockquote: 1 + (1 + 6 + 1) + 1
        assert_eq!(doc.child(0).unwrap().size(), 9);
        assert_eq!(doc.child(1).unwrap().size(), 10);
        assert_eq!(doc.content_size(), 19);
    }

    #[test]
    fn new_rejects_inline_content_in_doc() {
        let err = Node::doc([Node::text("loose")]).unwrap_err();
        assert_eq!(
            err,
            StepError::InvalidContent {
                parent: "doc",
                child: "text"
            }
        );
    }

    #[test]
    fn code_block_rejects_marked_text() {
        let err = Node::new(
            NodeKind::CodeBlock { language: None },
            [Node::marked_text("x", vec![Mark::Bold])],
        )
        .unwrap_err();
        assert!(matches!(err, StepError::InvalidContent { .. }));
    }

    #[test]
    fn text_between_separates_blocks() {
        let doc = sample();
        assert_eq!(
            doc.text_between(0, doc.content_size(), "\n"),
            "Hello \u{fffc}\nquoted"
        );
        assert_eq!(doc.text_between(1, 6, "\n"), "Hello");
    }

    #[test]
    fn marks_at_inherits_inclusive_marks_only() {
        let doc = Node::doc([Node::paragraph([
            Node::marked_text("bold", vec![Mark::Bold]),
            Node::marked_text(
                "link",
                vec![Mark::Link {
                    href: "https://example.com".into(),
                }],
            ),
        ])
        .unwrap()])
        .unwrap();
        assert_eq!(doc.marks_at(3), vec![Mark::Bold]);
        assert_eq!(doc.marks_at(9), Vec::<Mark>::new());
    }

    #[test]
    fn map_marks_splits_text_at_range_edges() {
        let doc = Node::text_doc(&["Hello world"]);
        let para = doc.child(0).unwrap();
        let bolded = para.map_marks(6, 11, &|marks: &[Mark]| {
            let mut marks = marks.to_vec();
            marks.push(Mark::Bold);
            marks
        });
        assert_eq!(format!("{bolded:?}"), r#"paragraph("Hello ", [Bold]"world")"#);
    }

    #[test]
    fn debug_output_is_compact() {
        insta::assert_snapshot!(
            format!("{:?}", sample()),
            @r#"doc(paragraph("Hello ", image(cat.png)), blockquote(paragraph("quoted")))"#
        );
    }
}
