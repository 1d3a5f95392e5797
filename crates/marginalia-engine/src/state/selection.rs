use std::ops::Range;

use crate::transform::{Bias, Mapping};

/// Text selection; `anchor` stays put while `head` follows the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn cursor(pos: usize) -> Self {
        Self::new(pos, pos)
    }

    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn range(&self) -> Range<usize> {
        self.from()..self.to()
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }

    /// Typing at the cursor pushes it forward, so both ends map right.
    pub fn map(&self, mapping: &Mapping) -> Selection {
        Selection {
            anchor: mapping.map(self.anchor, Bias::Right),
            head: mapping.map(self.head, Bias::Right),
        }
    }
}
