//! Cyclic index over the item list.

/// Position within the rotating item list.
///
/// `current_index` stays within `0..item_count` whenever `item_count > 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationState {
    current_index: usize,
    item_count: usize,
}

impl RotationState {
    /// Start at the first item.
    pub fn new(item_count: usize) -> Self {
        Self {
            current_index: 0,
            item_count,
        }
    }

    /// Index of the item to show, or `None` when there is nothing to show.
    pub fn current_index(&self) -> Option<usize> {
        (self.item_count > 0).then_some(self.current_index)
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Move to the next item, wrapping to the first.
    pub fn advance(&mut self) {
        if self.item_count > 0 {
            self.current_index = (self.current_index + 1) % self.item_count;
        }
    }

    /// Follow a change in list length, clamping the index into range.
    pub fn resize(&mut self, item_count: usize) {
        self.item_count = item_count;
        self.current_index = self.current_index.min(item_count.saturating_sub(1));
    }
}
