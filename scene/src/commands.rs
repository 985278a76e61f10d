//! Keyboard command table.
//!
//! Shortcuts are an explicit table keyed by (modifier set, key) rather than
//! a branch ladder in an event listener, so bindings are inspectable and the
//! dispatch site carries no hidden state. The engine resolves a keystroke to
//! a [`Command`] and executes it against the current selection and history.

#[cfg(test)]
#[path = "commands_test.rs"]
mod commands_test;

use std::collections::HashMap;

use crate::consts;

/// A keyboard key name as reported by the host (e.g. `"Delete"`, `"z"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(pub String);

impl Key {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Modifier keys held during a keystroke.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModifierSet {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl ModifierSet {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shift() -> Self {
        Self { shift: true, ..Self::default() }
    }

    #[must_use]
    pub fn ctrl() -> Self {
        Self { ctrl: true, ..Self::default() }
    }

    #[must_use]
    pub fn ctrl_shift() -> Self {
        Self { ctrl: true, shift: true, ..Self::default() }
    }
}

/// An editing command resolvable from a keystroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Undo,
    Redo,
    DeleteSelection,
    SelectAll,
    ClearSelection,
    Duplicate,
    ArrangeGrid,
    /// Move the selection by a fixed scene-space delta.
    Nudge { dx: f64, dy: f64 },
}

/// Lookup table from (modifiers, key) to command.
#[derive(Debug)]
pub struct CommandTable {
    bindings: HashMap<(ModifierSet, Key), Command>,
}

impl CommandTable {
    /// An empty table with no bindings.
    #[must_use]
    pub fn empty() -> Self {
        Self { bindings: HashMap::new() }
    }

    /// The standard editor bindings.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        table.bind(ModifierSet::ctrl(), "z", Command::Undo);
        table.bind(ModifierSet::ctrl_shift(), "z", Command::Redo);
        table.bind(ModifierSet::ctrl(), "y", Command::Redo);
        table.bind(ModifierSet::none(), "Delete", Command::DeleteSelection);
        table.bind(ModifierSet::none(), "Backspace", Command::DeleteSelection);
        table.bind(ModifierSet::ctrl(), "a", Command::SelectAll);
        table.bind(ModifierSet::none(), "Escape", Command::ClearSelection);
        table.bind(ModifierSet::ctrl(), "d", Command::Duplicate);
        table.bind(ModifierSet::ctrl(), "g", Command::ArrangeGrid);

        let step = consts::NUDGE_STEP;
        let large = consts::NUDGE_STEP_LARGE;
        table.bind(ModifierSet::none(), "ArrowLeft", Command::Nudge { dx: -step, dy: 0.0 });
        table.bind(ModifierSet::none(), "ArrowRight", Command::Nudge { dx: step, dy: 0.0 });
        table.bind(ModifierSet::none(), "ArrowUp", Command::Nudge { dx: 0.0, dy: -step });
        table.bind(ModifierSet::none(), "ArrowDown", Command::Nudge { dx: 0.0, dy: step });
        table.bind(ModifierSet::shift(), "ArrowLeft", Command::Nudge { dx: -large, dy: 0.0 });
        table.bind(ModifierSet::shift(), "ArrowRight", Command::Nudge { dx: large, dy: 0.0 });
        table.bind(ModifierSet::shift(), "ArrowUp", Command::Nudge { dx: 0.0, dy: -large });
        table.bind(ModifierSet::shift(), "ArrowDown", Command::Nudge { dx: 0.0, dy: large });
        table
    }

    /// Add or replace a binding.
    pub fn bind(&mut self, modifiers: ModifierSet, key: impl Into<String>, command: Command) {
        self.bindings.insert((modifiers, Key::new(key)), command);
    }

    /// Resolve a keystroke to a command, if bound.
    #[must_use]
    pub fn lookup(&self, modifiers: ModifierSet, key: &str) -> Option<Command> {
        self.bindings
            .get(&(modifiers, Key::new(key)))
            .copied()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
