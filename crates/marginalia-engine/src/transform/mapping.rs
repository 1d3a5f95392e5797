//! Position mapping across edits.
//!
//! A [`StepMap`] records the ranges a single step replaced, in the coordinates
//! of the document the step was applied to. A [`Mapping`] is an ordered chain of
//! step maps; composing two mappings concatenates their chains, which is what
//! makes composition associative and lets an anchor be carried across any
//! number of steps or transactions.

/// Which side of an edit a position sticks to when the edit touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    /// Stay before content inserted at the position.
    Left,
    /// Move after content inserted at the position.
    Right,
}

/// Mapped position plus what the edits did around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResult {
    pub pos: usize,
    /// The position sat strictly inside a replaced range, so the content on
    /// both sides of it is gone.
    pub deleted: bool,
    /// Content directly before the position was removed.
    pub deleted_before: bool,
    /// Content directly after the position was removed.
    pub deleted_after: bool,
}

impl MapResult {
    fn kept(pos: usize) -> Self {
        Self {
            pos,
            deleted: false,
            deleted_before: false,
            deleted_after: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRange {
    pub start: usize,
    pub old_size: usize,
    pub new_size: usize,
}

impl MapRange {
    fn end(&self) -> usize {
        self.start + self.old_size
    }
}

/// Replaced ranges of a single step, sorted and non-overlapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMap {
    ranges: Vec<MapRange>,
}

impl StepMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(ranges: Vec<MapRange>) -> Self {
        let ranges = ranges
            .into_iter()
            .filter(|range| range.old_size > 0 || range.new_size > 0)
            .collect();
        Self { ranges }
    }

    /// Map for replacing `old_size` slots at `start` with `new_size` slots.
    pub fn replace(start: usize, old_size: usize, new_size: usize) -> Self {
        Self::new(vec![MapRange {
            start,
            old_size,
            new_size,
        }])
    }

    pub fn ranges(&self) -> &[MapRange] {
        &self.ranges
    }

    pub fn is_identity(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn map(&self, pos: usize, bias: Bias) -> usize {
        self.map_result(pos, bias).pos
    }

    pub fn map_result(&self, pos: usize, bias: Bias) -> MapResult {
        let mut diff: isize = 0;
        for range in &self.ranges {
            if range.start > pos {
                break;
            }
            let end = range.end();
            if pos <= end {
                // An insertion honours the bias; a replacement pins its edges
                // to the matching side of the new content.
                let side = if range.old_size == 0 {
                    bias
                } else if pos == range.start {
                    Bias::Left
                } else if pos == end {
                    Bias::Right
                } else {
                    bias
                };
                let base = range.start.saturating_add_signed(diff);
                let mapped = match side {
                    Bias::Left => base,
                    Bias::Right => base + range.new_size,
                };
                return MapResult {
                    pos: mapped,
                    deleted: pos > range.start && pos < end,
                    deleted_before: pos > range.start,
                    deleted_after: pos < end,
                };
            }
            diff += range.new_size as isize - range.old_size as isize;
        }
        MapResult::kept(pos.saturating_add_signed(diff))
    }

    /// Map from the new document back to the old one.
    pub fn invert(&self) -> StepMap {
        let mut diff: isize = 0;
        let ranges = self
            .ranges
            .iter()
            .map(|range| {
                let start = range.start.saturating_add_signed(diff);
                diff += range.new_size as isize - range.old_size as isize;
                MapRange {
                    start,
                    old_size: range.new_size,
                    new_size: range.old_size,
                }
            })
            .collect();
        StepMap { ranges }
    }
}

/// Ordered composition of step maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    maps: Vec<StepMap>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_maps(maps: impl IntoIterator<Item = StepMap>) -> Self {
        Self {
            maps: maps.into_iter().collect(),
        }
    }

    /// `compose(a, b)` maps like `a` followed by `b`.
    pub fn compose(first: &Mapping, second: &Mapping) -> Mapping {
        let mut out = first.clone();
        out.append_mapping(second);
        out
    }

    pub fn append_map(&mut self, map: StepMap) {
        self.maps.push(map);
    }

    pub fn append_mapping(&mut self, other: &Mapping) {
        self.maps.extend(other.maps.iter().cloned());
    }

    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.maps.iter().all(StepMap::is_identity)
    }

    /// The tail of the mapping starting at step `from`.
    pub fn slice(&self, from: usize) -> Mapping {
        Mapping {
            maps: self.maps.get(from..).unwrap_or_default().to_vec(),
        }
    }

    pub fn map(&self, pos: usize, bias: Bias) -> usize {
        self.map_result(pos, bias).pos
    }

    pub fn map_result(&self, pos: usize, bias: Bias) -> MapResult {
        let mut result = MapResult::kept(pos);
        for map in &self.maps {
            let step = map.map_result(result.pos, bias);
            result = MapResult {
                pos: step.pos,
                deleted: result.deleted || step.deleted,
                deleted_before: result.deleted_before || step.deleted_before,
                deleted_after: result.deleted_after || step.deleted_after,
            };
        }
        log::trace!("mapped {pos} -> {} ({bias:?})", result.pos);
        result
    }

    pub fn invert(&self) -> Mapping {
        Mapping {
            maps: self.maps.iter().rev().map(StepMap::invert).collect(),
        }
    }
}
