//! Decorations: view-only annotations anchored to document positions.
//!
//! A [`DecorationSet`] is an immutable snapshot. Every operation returns a new
//! set sharing storage with the old one until it is modified. Decorations are
//! kept in a `BTreeMap` ordered by `(from, id)` next to an id index. A range
//! query scans starts in `from - WIDE_SPAN ..= to`; decorations wider than
//! `WIDE_SPAN` are also indexed by their end so they are found without
//! widening that scan.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::model::Node;
use crate::transform::{Bias, Mapping};

/// Spans above this go into the end-ordered index as well.
const WIDE_SPAN: usize = 256;

/// Unique identifier for a decoration
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug)]
pub struct DecorationId(Uuid);

impl DecorationId {
    const MIN: Self = Self(Uuid::nil());
    const MAX: Self = Self(Uuid::from_u128(u128::MAX));

    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DecorationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecorationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecorationSpec {
    /// Point decoration rendered between characters. `side` decides which
    /// side of content inserted at `pos` it ends up on.
    Widget { pos: usize, side: Bias },
    /// Styling over a run of inline content.
    Inline { from: usize, to: usize },
    /// Styling of a whole node; `from..to` covers the node including its
    /// boundary tokens.
    Node { from: usize, to: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    id: DecorationId,
    spec: DecorationSpec,
    attrs: BTreeMap<String, String>,
    sticky: bool,
}

impl Decoration {
    pub fn widget(pos: usize, side: Bias) -> Self {
        Self::with_spec(DecorationSpec::Widget { pos, side })
    }

    pub fn inline(from: usize, to: usize) -> Self {
        Self::with_spec(DecorationSpec::Inline { from, to })
    }

    pub fn node(from: usize, to: usize) -> Self {
        Self::with_spec(DecorationSpec::Node { from, to })
    }

    fn with_spec(spec: DecorationSpec) -> Self {
        Self {
            id: DecorationId::new(),
            spec,
            attrs: BTreeMap::new(),
            sticky: false,
        }
    }

    pub fn with_id(mut self, id: DecorationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Sticky decorations survive the deletion of the content they are
    /// anchored to. A widget keeps its mapped position; a range collapses to
    /// the point where its content used to be.
    pub fn sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    pub fn id(&self) -> DecorationId {
        self.id
    }

    pub fn spec(&self) -> &DecorationSpec {
        &self.spec
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn is_sticky(&self) -> bool {
        self.sticky
    }

    pub fn is_widget(&self) -> bool {
        matches!(self.spec, DecorationSpec::Widget { .. })
    }

    pub fn from(&self) -> usize {
        match self.spec {
            DecorationSpec::Widget { pos, .. } => pos,
            DecorationSpec::Inline { from, .. } | DecorationSpec::Node { from, .. } => from,
        }
    }

    pub fn to(&self) -> usize {
        match self.spec {
            DecorationSpec::Widget { pos, .. } => pos,
            DecorationSpec::Inline { to, .. } | DecorationSpec::Node { to, .. } => to,
        }
    }

    /// Carry the decoration into the document `mapping` leads to. `None` when
    /// the content it was anchored to is gone.
    pub fn map(&self, mapping: &Mapping, doc: &Node) -> Option<Decoration> {
        let spec = match self.spec {
            DecorationSpec::Widget { pos, side } => {
                let result = mapping.map_result(pos, side);
                if result.deleted && !self.sticky {
                    return None;
                }
                DecorationSpec::Widget {
                    pos: result.pos,
                    side,
                }
            }
            DecorationSpec::Inline { from, to } => {
                let from = mapping.map(from, Bias::Right);
                let to = mapping.map(to, Bias::Left);
                if from < to {
                    DecorationSpec::Inline { from, to }
                } else if self.sticky {
                    DecorationSpec::Inline { from, to: from }
                } else {
                    return None;
                }
            }
            DecorationSpec::Node { from, to } => {
                let start = mapping.map_result(from, Bias::Right);
                let end = mapping.map_result(to, Bias::Left);
                // The node itself must still span exactly the mapped range.
                let intact = !start.deleted
                    && !end.deleted
                    && end.pos > start.pos
                    && doc.node_at(start.pos).is_some_and(|node| start.pos + node.size() == end.pos);
                if intact {
                    DecorationSpec::Node {
                        from: start.pos,
                        to: end.pos,
                    }
                } else if self.sticky {
                    let at = start.pos.min(end.pos);
                    DecorationSpec::Node { from: at, to: at }
                } else {
                    return None;
                }
            }
        };
        Some(Decoration {
            spec,
            ..self.clone()
        })
    }

    fn span(&self) -> usize {
        self.to() - self.from()
    }

    fn is_wide(&self) -> bool {
        self.span() > WIDE_SPAN
    }
}

/// Immutable, position-ordered collection of decorations.
#[derive(Clone, Default)]
pub struct DecorationSet {
    by_start: Arc<BTreeMap<(usize, DecorationId), Decoration>>,
    by_id: Arc<BTreeMap<DecorationId, usize>>,
    /// `(to, id) -> from` for decorations wider than `WIDE_SPAN`.
    wide: Arc<BTreeMap<(usize, DecorationId), usize>>,
}

impl DecorationSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn create(decorations: impl IntoIterator<Item = Decoration>) -> Self {
        Self::empty().add(decorations)
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    /// Decorations in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Decoration> {
        self.by_start.values()
    }

    pub fn get(&self, id: DecorationId) -> Option<&Decoration> {
        let from = *self.by_id.get(&id)?;
        self.by_start.get(&(from, id))
    }

    pub fn contains(&self, id: DecorationId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Add decorations, replacing any existing decoration with the same id.
    pub fn add(&self, decorations: impl IntoIterator<Item = Decoration>) -> Self {
        let mut set = self.clone();
        let mut decorations = decorations.into_iter().peekable();
        if decorations.peek().is_none() {
            return set;
        }
        let by_start = Arc::make_mut(&mut set.by_start);
        let by_id = Arc::make_mut(&mut set.by_id);
        let wide = Arc::make_mut(&mut set.wide);
        for decoration in decorations {
            if let Some(old_from) = by_id.insert(decoration.id, decoration.from()) {
                if let Some(old) = by_start.remove(&(old_from, decoration.id)) {
                    wide.remove(&(old.to(), old.id));
                }
            }
            if decoration.is_wide() {
                wide.insert((decoration.to(), decoration.id), decoration.from());
            }
            by_start.insert((decoration.from(), decoration.id), decoration);
        }
        set
    }

    pub fn remove(&self, ids: &[DecorationId]) -> Self {
        if !ids.iter().any(|id| self.contains(*id)) {
            return self.clone();
        }
        let mut set = self.clone();
        let by_start = Arc::make_mut(&mut set.by_start);
        let by_id = Arc::make_mut(&mut set.by_id);
        let wide = Arc::make_mut(&mut set.wide);
        for id in ids {
            let Some(from) = by_id.remove(id) else {
                continue;
            };
            if let Some(old) = by_start.remove(&(from, *id)) {
                wide.remove(&(old.to(), *id));
            }
        }
        set
    }

    /// Decorations touching `from..=to`, in document order. Open bounds
    /// default to the whole document.
    pub fn find<P>(&self, from: Option<usize>, to: Option<usize>, predicate: P) -> Vec<Decoration>
    where
        P: Fn(&Decoration) -> bool,
    {
        let from = from.unwrap_or(0);
        let to = to.unwrap_or(usize::MAX);
        if from > to {
            return Vec::new();
        }
        self.candidates(from, to)
            .into_iter()
            .filter(|decoration| decoration.to() >= from)
            .filter(|decoration| predicate(decoration))
            .cloned()
            .collect()
    }

    /// Entries a lookup of `from..=to` has to look at, in document order.
    fn candidates(&self, from: usize, to: usize) -> Vec<&Decoration> {
        let window = from.saturating_sub(WIDE_SPAN);
        let mut found: Vec<&Decoration> = self
            .by_start
            .range((window, DecorationId::MIN)..=(to, DecorationId::MAX))
            .map(|(_, decoration)| decoration)
            .collect();
        let before_window: Vec<&Decoration> = self
            .wide
            .range((from, DecorationId::MIN)..)
            .filter(|(_, start)| **start < window)
            .filter_map(|((_, id), start)| self.by_start.get(&(*start, *id)))
            .collect();
        if !before_window.is_empty() {
            found.extend(before_window);
            found.sort_by_key(|decoration| (decoration.from(), decoration.id));
        }
        found
    }

    /// Map every decoration through `mapping`, dropping those whose anchor was
    /// deleted. `doc` is the document the mapping leads to.
    pub fn map(&self, mapping: &Mapping, doc: &Node) -> Self {
        if mapping.is_identity() || self.is_empty() {
            return self.clone();
        }
        let before = self.len();
        let mapped = Self::create(
            self.by_start
                .values()
                .filter_map(|decoration| decoration.map(mapping, doc)),
        );
        if mapped.len() != before {
            log::trace!("mapping dropped {} decorations", before - mapped.len());
        }
        mapped
    }

    /// Union of several sets; later sets win on id collisions.
    pub fn merge<'a>(sets: impl IntoIterator<Item = &'a DecorationSet>) -> Self {
        sets.into_iter().fold(Self::empty(), |acc, set| {
            if acc.is_empty() {
                set.clone()
            } else {
                acc.add(set.iter().cloned())
            }
        })
    }
}

impl PartialEq for DecorationSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.by_start, &other.by_start) || self.by_start == other.by_start
    }
}

impl fmt::Debug for DecorationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
