//! Exchange display rotation.

/// Index of the next watched currency to show, taken modulo the current
/// result-set length. Lives in memory only and starts at 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationCursor {
    index: usize,
}

impl RotationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Position to display in a result set of `len` records, or `None` when
    /// the set is empty.
    pub fn select(&self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.index % len)
    }

    /// Move to the next record. No-op for an empty result set.
    pub fn advance(&mut self, len: usize) {
        if len > 0 {
            self.index = (self.index % len + 1) % len;
        }
    }
}
