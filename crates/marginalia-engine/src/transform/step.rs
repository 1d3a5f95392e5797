use super::mapping::{Bias, Mapping, StepMap};
use crate::error::StepError;
use crate::model::{Fragment, Mark, Node, NodeKind, ResolvedPos};

/// Atomic, invertible document edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Replace `from..to` with `content`. Both ends must share a parent and the
    /// content must be allowed inside it. Covers insertion and deletion.
    Replace {
        from: usize,
        to: usize,
        content: Fragment,
    },
    AddMark {
        from: usize,
        to: usize,
        mark: Mark,
    },
    RemoveMark {
        from: usize,
        to: usize,
        mark: Mark,
    },
    /// Change the kind of the textblock starting at `pos`.
    SetNodeKind { pos: usize, kind: NodeKind },
    /// Split the textblock at `pos`; the second half takes `kind` if given.
    Split { pos: usize, kind: Option<NodeKind> },
    /// Join the two textblocks meeting at `pos`.
    Join { pos: usize },
}

/// Document produced by a step and the map from the old document into it.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub doc: Node,
    pub map: StepMap,
}

impl Step {
    pub fn insert(pos: usize, content: Fragment) -> Step {
        Step::Replace {
            from: pos,
            to: pos,
            content,
        }
    }

    pub fn delete(from: usize, to: usize) -> Step {
        Step::Replace {
            from,
            to,
            content: Fragment::empty(),
        }
    }

    pub fn apply(&self, doc: &Node) -> Result<StepResult, StepError> {
        match self {
            Step::Replace { from, to, content } => {
                let (from, to) = (*from, *to);
                check_range(doc, from, to)?;
                let rfrom = doc.resolve(from)?;
                let rto = doc.resolve(to)?;
                if !rfrom.same_parent(&rto) {
                    return Err(StepError::CrossesParent { from, to });
                }
                let parent = rfrom.parent();
                if let Some(child) = content.iter().find(|child| !parent.kind().allows(child)) {
                    return Err(StepError::InvalidContent {
                        parent: parent.kind().name(),
                        child: child.kind().name(),
                    });
                }
                let replaced =
                    parent
                        .content()
                        .replace_range(rfrom.parent_offset(), rto.parent_offset(), content);
                Ok(StepResult {
                    doc: rebuild(&rfrom, rfrom.depth(), replaced),
                    map: StepMap::replace(from, to - from, content.size()),
                })
            }
            Step::AddMark { from, to, mark } => apply_marks(doc, *from, *to, mark, true),
            Step::RemoveMark { from, to, mark } => apply_marks(doc, *from, *to, mark, false),
            Step::SetNodeKind { pos, kind } => {
                let rpos = doc.resolve(*pos)?;
                let Some(target) = rpos.node_after().filter(|node| node.is_textblock()) else {
                    return Err(StepError::NotTextblock { pos: *pos });
                };
                if !kind.is_textblock() {
                    return Err(StepError::InvalidContent {
                        parent: rpos.parent().kind().name(),
                        child: kind.name(),
                    });
                }
                let changed = target.with_kind(kind.clone())?;
                let content = rpos.parent().content().replace_child(rpos.index(), changed);
                Ok(StepResult {
                    doc: rebuild(&rpos, rpos.depth(), content),
                    map: StepMap::empty(),
                })
            }
            Step::Split { pos, kind } => {
                let rpos = doc.resolve(*pos)?;
                let depth = rpos.depth();
                let parent = rpos.parent();
                if depth == 0 || !parent.is_textblock() {
                    return Err(StepError::NotTextblock { pos: *pos });
                }
                let offset = rpos.parent_offset();
                let left = parent.with_content(parent.content().cut(0, offset));
                let right_content = parent.content().cut(offset, parent.content_size());
                let right = match kind {
                    Some(kind) if kind.is_textblock() => {
                        Node::new(kind.clone(), right_content.iter().cloned())?
                    }
                    Some(kind) => {
                        return Err(StepError::InvalidContent {
                            parent: rpos.node(depth - 1).kind().name(),
                            child: kind.name(),
                        });
                    }
                    None => parent.with_content(right_content),
                };
                let grandparent = rpos.node(depth - 1);
                let at = rpos.index_at(depth - 1);
                let content = grandparent.content().replace_range(
                    offset_of_child(grandparent, at),
                    offset_of_child(grandparent, at + 1),
                    &Fragment::from_nodes([left, right]),
                );
                Ok(StepResult {
                    doc: rebuild(&rpos, depth - 1, content),
                    map: StepMap::replace(*pos, 0, 2),
                })
            }
            Step::Join { pos } => {
                let rpos = doc.resolve(*pos)?;
                let (Some(before), Some(after)) = (rpos.node_before(), rpos.node_after()) else {
                    return Err(StepError::IncompatibleJoin { pos: *pos });
                };
                if !before.is_textblock()
                    || !after.is_textblock()
                    || after.content().iter().any(|child| !before.kind().allows(child))
                {
                    return Err(StepError::IncompatibleJoin { pos: *pos });
                }
                let joined = before.with_content(before.content().append(after.content()));
                let parent = rpos.parent();
                let offset = rpos.parent_offset();
                let content = parent.content().replace_range(
                    offset - before.size(),
                    offset + after.size(),
                    &Fragment::from_node(joined),
                );
                Ok(StepResult {
                    doc: rebuild(&rpos, rpos.depth(), content),
                    map: StepMap::replace(pos - 1, 2, 0),
                })
            }
        }
    }

    /// The step that undoes this one when applied to the document this step
    /// produced. `doc` is the document before this step.
    pub fn invert(&self, doc: &Node) -> Result<Step, StepError> {
        Ok(match self {
            Step::Replace { from, to, content } => {
                let rfrom = doc.resolve(*from)?;
                let rto = doc.resolve(*to)?;
                let removed = rfrom
                    .parent()
                    .content()
                    .cut(rfrom.parent_offset(), rto.parent_offset());
                Step::Replace {
                    from: *from,
                    to: from + content.size(),
                    content: removed,
                }
            }
            Step::AddMark { from, to, mark } => Step::RemoveMark {
                from: *from,
                to: *to,
                mark: mark.clone(),
            },
            Step::RemoveMark { from, to, mark } => Step::AddMark {
                from: *from,
                to: *to,
                mark: mark.clone(),
            },
            Step::SetNodeKind { pos, .. } => {
                let previous = doc
                    .node_at(*pos)
                    .ok_or(StepError::NotTextblock { pos: *pos })?;
                Step::SetNodeKind {
                    pos: *pos,
                    kind: previous.kind().clone(),
                }
            }
            Step::Split { pos, .. } => Step::Join { pos: pos + 1 },
            Step::Join { pos } => {
                let after = doc
                    .node_at(*pos)
                    .ok_or(StepError::IncompatibleJoin { pos: *pos })?;
                Step::Split {
                    pos: pos - 1,
                    kind: Some(after.kind().clone()),
                }
            }
        })
    }

    /// Rebase this step over `mapping`. `None` when the content it touched was
    /// deleted.
    pub fn map(&self, mapping: &Mapping) -> Option<Step> {
        match self {
            Step::Replace { from, to, content } => {
                let start = mapping.map_result(*from, Bias::Right);
                let end = mapping.map_result(*to, Bias::Left);
                if start.deleted && end.deleted {
                    return None;
                }
                Some(Step::Replace {
                    from: start.pos,
                    to: end.pos.max(start.pos),
                    content: content.clone(),
                })
            }
            Step::AddMark { from, to, mark } | Step::RemoveMark { from, to, mark } => {
                let start = mapping.map(*from, Bias::Right);
                let end = mapping.map(*to, Bias::Left);
                if start >= end {
                    return None;
                }
                Some(match self {
                    Step::AddMark { .. } => Step::AddMark {
                        from: start,
                        to: end,
                        mark: mark.clone(),
                    },
                    _ => Step::RemoveMark {
                        from: start,
                        to: end,
                        mark: mark.clone(),
                    },
                })
            }
            Step::SetNodeKind { pos, kind } => {
                let result = mapping.map_result(*pos, Bias::Right);
                (!result.deleted_after).then(|| Step::SetNodeKind {
                    pos: result.pos,
                    kind: kind.clone(),
                })
            }
            Step::Split { pos, kind } => {
                let result = mapping.map_result(*pos, Bias::Left);
                (!result.deleted).then(|| Step::Split {
                    pos: result.pos,
                    kind: kind.clone(),
                })
            }
            Step::Join { pos } => {
                let result = mapping.map_result(*pos, Bias::Left);
                (!result.deleted).then_some(Step::Join { pos: result.pos })
            }
        }
    }
}

fn check_range(doc: &Node, from: usize, to: usize) -> Result<(), StepError> {
    if from > to {
        return Err(StepError::InvalidRange { from, to });
    }
    let size = doc.content_size();
    if to > size {
        return Err(StepError::OutOfRange { pos: to, size });
    }
    Ok(())
}

/// Add or remove `mark` over `from..to`. Every markable text node in range
/// must currently lack (when adding) or carry (when removing) the mark.
fn apply_marks(
    doc: &Node,
    from: usize,
    to: usize,
    mark: &Mark,
    adding: bool,
) -> Result<StepResult, StepError> {
    check_range(doc, from, to)?;
    // Both ends must be real boundaries, never the middle of a character.
    doc.resolve(from)?;
    doc.resolve(to)?;
    let mixed = doc
        .markable_segments(from, to)
        .iter()
        .any(|(_, _, marks)| marks.contains(mark) == adding);
    if mixed {
        let mark = mark.clone();
        return Err(if adding {
            StepError::MarkPresent { from, to, mark }
        } else {
            StepError::MarkMissing { from, to, mark }
        });
    }
    let f = |marks: &[Mark]| -> Vec<Mark> {
        if adding {
            let mut marks = marks.to_vec();
            marks.push(mark.clone());
            marks
        } else {
            marks.iter().filter(|m| *m != mark).cloned().collect()
        }
    };
    Ok(StepResult {
        doc: doc.map_marks(from, to, &f),
        map: StepMap::empty(),
    })
}

fn offset_of_child(parent: &Node, index: usize) -> usize {
    parent.content().iter().take(index).map(Node::size).sum()
}

/// Give the ancestor at `depth` new content and rebuild every ancestor above it.
fn rebuild(rpos: &ResolvedPos, depth: usize, content: Fragment) -> Node {
    let mut node = rpos.node(depth).with_content(content);
    for level in (0..depth).rev() {
        let ancestor = rpos.node(level);
        node = ancestor.with_content(
            ancestor
                .content()
                .replace_child(rpos.index_at(level), node),
        );
    }
    node
}
