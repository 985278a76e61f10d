//! Bounded undo/redo over full element-sequence snapshots.
//!
//! A snapshot is pushed before each user-initiated mutation; any new
//! mutation after an undo invalidates the redo stack. Undo and redo are
//! purely local and never emit network traffic — a caller that wants the
//! restored state persisted must re-synchronize explicitly.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use crate::consts;
use crate::doc::Element;

/// An immutable copy of the full element sequence in paint order.
pub type Snapshot = Vec<Element>;

/// Bounded undo/redo stacks.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the pre-mutation state, trim to the most recent
    /// [`consts::HISTORY_CAPACITY`] entries, and clear the redo stack.
    pub fn record_before_mutation(&mut self, snapshot: Snapshot) {
        self.undo.push(snapshot);
        if self.undo.len() > consts::HISTORY_CAPACITY {
            let excess = self.undo.len() - consts::HISTORY_CAPACITY;
            self.undo.drain(..excess);
        }
        self.redo.clear();
    }

    /// Pop the most recent snapshot, pushing `current` onto the redo stack.
    /// Returns `None` (and leaves `current` untouched) when there is nothing
    /// to undo.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let restored = self.undo.pop()?;
        self.redo.push(current);
        Some(restored)
    }

    /// Mirror of [`History::undo`].
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let restored = self.redo.pop()?;
        self.undo.push(current);
        Some(restored)
    }

    /// Drop both stacks, e.g. on page switch.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}
