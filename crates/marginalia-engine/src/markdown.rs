//! Markdown import built on pulldown-cmark.
//!
//! Paragraphs, headings, code blocks and block quotes map onto their node
//! kinds; emphasis, strong, inline code and links become marks; images become
//! atomic leaves. Anything else (lists, HTML, rules) degrades to paragraphs of
//! its text.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag};

use crate::error::StepError;
use crate::model::{Mark, Node, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid document structure: {0}")]
    Structure(#[from] StepError),
}

enum Frame {
    Block {
        kind: NodeKind,
        children: Vec<Node>,
        /// Opened for loose inline content, closed by whatever ends next.
        implicit: bool,
    },
    Mark,
    Image {
        src: String,
        alt: String,
    },
    /// A construct without its own node kind; its content flows through.
    Passthrough,
}

struct Builder {
    frames: Vec<Frame>,
    marks: Vec<Mark>,
}

impl Builder {
    fn new() -> Self {
        Self {
            frames: vec![Frame::Block {
                kind: NodeKind::Doc,
                children: Vec::new(),
                implicit: false,
            }],
            marks: Vec::new(),
        }
    }

    fn open_block(&mut self, kind: NodeKind) -> Result<(), ParseError> {
        self.close_implicit()?;
        self.frames.push(Frame::Block {
            kind,
            children: Vec::new(),
            implicit: false,
        });
        Ok(())
    }

    fn open_passthrough(&mut self) -> Result<(), ParseError> {
        self.close_implicit()?;
        self.frames.push(Frame::Passthrough);
        Ok(())
    }

    fn open_mark(&mut self, mark: Mark) {
        self.marks.push(mark);
        self.frames.push(Frame::Mark);
    }

    fn close_implicit(&mut self) -> Result<(), ParseError> {
        while matches!(self.frames.last(), Some(Frame::Block { implicit: true, .. })) {
            self.end()?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), ParseError> {
        // The document frame is only closed by `finish`.
        if self.frames.len() <= 1 {
            return Ok(());
        }
        match self.frames.pop() {
            Some(Frame::Block { kind, children, .. }) => {
                let node = build_block(kind, children)?;
                self.push_block(node)
            }
            Some(Frame::Mark) => {
                self.marks.pop();
                Ok(())
            }
            Some(Frame::Image { src, alt }) => self.push_inline(Node::image(src, alt)),
            Some(Frame::Passthrough) | None => Ok(()),
        }
    }

    fn end_tag(&mut self) -> Result<(), ParseError> {
        self.close_implicit()?;
        self.end()
    }

    fn push_block(&mut self, node: Node) -> Result<(), ParseError> {
        let parent = self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Block { kind, children, .. } if !kind.is_textblock() => Some(children),
            _ => None,
        });
        if let Some(children) = parent {
            children.push(node);
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) -> Result<(), ParseError> {
        if text.is_empty() {
            return Ok(());
        }
        if let Some(Frame::Image { alt, .. }) = self.frames.last_mut() {
            alt.push_str(text);
            return Ok(());
        }
        let node = Node::marked_text(text, self.marks.clone());
        self.push_inline(node)
    }

    fn push_inline(&mut self, node: Node) -> Result<(), ParseError> {
        let index = self.textblock_index();
        if let Some(Frame::Block { children, .. }) = self.frames.get_mut(index) {
            children.push(node);
        }
        Ok(())
    }

    /// Index of the textblock receiving inline content, opening an implicit
    /// paragraph under any mark frames when there is none.
    fn textblock_index(&mut self) -> usize {
        let inline_depth = self
            .frames
            .iter()
            .rposition(|frame| !matches!(frame, Frame::Mark | Frame::Image { .. }))
            .unwrap_or(0);
        if let Some(Frame::Block { kind, .. }) = self.frames.get(inline_depth)
            && kind.is_textblock()
        {
            return inline_depth;
        }
        self.frames.insert(
            inline_depth + 1,
            Frame::Block {
                kind: NodeKind::Paragraph,
                children: Vec::new(),
                implicit: true,
            },
        );
        inline_depth + 1
    }

    fn finish(mut self) -> Result<Node, ParseError> {
        while self.frames.len() > 1 {
            self.end()?;
        }
        let Some(Frame::Block { mut children, .. }) = self.frames.pop() else {
            return Ok(Node::text_doc(&[""]));
        };
        if children.is_empty() {
            children.push(Node::paragraph([])?);
        }
        Ok(Node::doc(children)?)
    }
}

fn build_block(kind: NodeKind, mut children: Vec<Node>) -> Result<Node, ParseError> {
    if matches!(kind, NodeKind::CodeBlock { .. }) {
        let mut text: String = children.iter().map(Node::text_content).collect();
        if text.ends_with('\n') {
            text.pop();
        }
        children = vec![Node::text(text)];
    }
    if kind == NodeKind::Blockquote && children.is_empty() {
        children.push(Node::paragraph([])?);
    }
    Ok(Node::new(kind, children)?)
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Build a document from CommonMark text.
pub fn parse(markdown: &str) -> Result<Node, ParseError> {
    let mut builder = Builder::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph => builder.open_block(NodeKind::Paragraph)?,
                Tag::Heading { level, .. } => builder.open_block(NodeKind::Heading {
                    level: heading_level(level),
                })?,
                Tag::CodeBlock(code) => {
                    let language = match code {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    builder.open_block(NodeKind::CodeBlock { language })?;
                }
                Tag::BlockQuote(_) => builder.open_block(NodeKind::Blockquote)?,
                Tag::Emphasis => builder.open_mark(Mark::Italic),
                Tag::Strong => builder.open_mark(Mark::Bold),
                Tag::Link { dest_url, .. } => builder.open_mark(Mark::Link {
                    href: dest_url.to_string(),
                }),
                Tag::Image { dest_url, .. } => builder.frames.push(Frame::Image {
                    src: dest_url.to_string(),
                    alt: String::new(),
                }),
                _ => builder.open_passthrough()?,
            },
            Event::End(_) => builder.end_tag()?,
            Event::Text(text) => builder.push_text(&text)?,
            Event::Code(code) => {
                builder.marks.push(Mark::Code);
                let result = builder.push_text(&code);
                builder.marks.pop();
                result?;
            }
            Event::Html(html) | Event::InlineHtml(html) => builder.push_text(html.trim_end_matches('\n'))?,
            Event::SoftBreak => builder.push_text(" ")?,
            Event::HardBreak => builder.push_inline(Node::hard_break())?,
            _ => {}
        }
    }
    builder.finish()
}

/// Text of the document with a newline between blocks.
pub fn to_plain_text(doc: &Node) -> String {
    doc.text_between(0, doc.content_size(), "\n")
}
