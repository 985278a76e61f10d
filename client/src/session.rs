//! Optimistic page session.
//!
//! DESIGN
//! ======
//! Each gesture runs the same three steps: snapshot history, apply the
//! mutation to the local store (instant redraw), return the frames that
//! persist it. The session never waits for acknowledgment — a slow or
//! failed request leaves the optimistic state as the only visible truth.
//!
//! Inbound frames go through [`PageSession::apply_frame`], which filters by
//! page and delegates to the engine's idempotent merge. The relay
//! rebroadcasts some operations to their origin; merge idempotence is what
//! makes swallowing that echo safe.
//!
//! Undo/redo restore locally and emit nothing. Re-broadcasting a restored
//! snapshot would turn every undo into a multi-element network mutation, so
//! re-synchronization is left to callers that explicitly want it.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use frames::Frame;
use scene::commands::ModifierSet;
use scene::doc::{Element, ElementId, ElementKind, PartialElement};
use scene::engine::{Action, EngineCore};
use tracing::debug;
use uuid::Uuid;

use crate::{emit, parse};

/// One client's view of one open page.
pub struct PageSession {
    pub engine: EngineCore,
}

impl Default for PageSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSession {
    #[must_use]
    pub fn new() -> Self {
        Self { engine: EngineCore::new() }
    }

    /// The page this session is scoped to.
    #[must_use]
    pub fn page_id(&self) -> Option<Uuid> {
        self.engine.store.page_id()
    }

    /// Replace the local collection from a page snapshot (join reply or
    /// reload). Resets selection and history.
    pub fn load(&mut self, page_id: Uuid, elements: Vec<Element>) {
        self.engine.load_page(page_id, elements);
    }

    // --- Gestures ---

    /// Request a new element with default geometry and payload.
    #[must_use]
    pub fn create_element(&mut self, kind: ElementKind, x: f64, y: f64) -> Vec<Frame> {
        let action = self.engine.request_create(kind, x, y);
        self.frames_for(vec![action])
    }

    /// Commit a finished drag; returns one move frame per affected element
    /// plus updates for re-anchored arrows.
    #[must_use]
    pub fn commit_drag(&mut self, dragged: ElementId, dx: f64, dy: f64) -> Vec<Frame> {
        let actions = self.engine.commit_drag(dragged, dx, dy);
        self.frames_for(actions)
    }

    /// Commit a transform-handle release.
    #[must_use]
    pub fn commit_resize(&mut self, id: ElementId) -> Vec<Frame> {
        let actions = self.engine.commit_resize(id);
        self.frames_for(actions)
    }

    /// Apply a style/content edit.
    #[must_use]
    pub fn update_fields(&mut self, id: ElementId, fields: PartialElement) -> Vec<Frame> {
        let actions = self.engine.update_fields(id, fields).into_iter().collect();
        self.frames_for(actions)
    }

    /// Delete the selection; one frame per deleted element.
    #[must_use]
    pub fn delete_selection(&mut self) -> Vec<Frame> {
        let actions = self.engine.delete_selection();
        self.frames_for(actions)
    }

    /// Replace the paint order.
    #[must_use]
    pub fn reorder(&mut self, order: &[ElementId]) -> Vec<Frame> {
        let action = self.engine.reorder(order);
        self.frames_for(vec![action])
    }

    /// Arrange the selection on a grid.
    #[must_use]
    pub fn arrange_grid(&mut self) -> Vec<Frame> {
        let actions = self.engine.arrange_grid();
        self.frames_for(actions)
    }

    /// Dispatch a keystroke through the engine's command table.
    #[must_use]
    pub fn handle_key(&mut self, modifiers: ModifierSet, key: &str) -> Vec<Frame> {
        let actions = self.engine.handle_key(modifiers, key);
        self.frames_for(actions)
    }

    /// Restore the previous snapshot. Local only; emits nothing.
    pub fn undo(&mut self) -> bool {
        self.engine.undo()
    }

    /// Reapply the last undone snapshot. Local only; emits nothing.
    pub fn redo(&mut self) -> bool {
        self.engine.redo()
    }

    // --- Inbound ---

    /// Merge a relay frame into the local model. Frames scoped to a
    /// different page, unknown syscalls, and unparseable payloads are all
    /// ignored.
    pub fn apply_frame(&mut self, frame: &Frame) {
        if let (Some(open), Some(scope)) = (self.page_id(), frame.page_id) {
            if open != scope {
                return;
            }
        }
        let Some(event) = parse::remote_event(frame) else {
            return;
        };
        debug!(syscall = %frame.syscall, "merging relay event");
        self.engine.merge_remote(&event);
    }

    // --- Internals ---

    /// Translate engine actions into request frames for the transport.
    fn frames_for(&self, actions: Vec<Action>) -> Vec<Frame> {
        let Some(page_id) = self.page_id() else {
            return Vec::new();
        };
        actions
            .into_iter()
            .filter_map(|action| match action {
                Action::CreateRequested(seed) => Some(emit::element_add(page_id, &seed)),
                Action::ElementUpdated { id, fields } => Some(emit::element_update(page_id, id, &fields)),
                Action::ElementMoved { id, x, y } => Some(emit::element_move(page_id, id, x, y)),
                Action::ElementDeleted { id } => Some(emit::element_delete(page_id, id)),
                Action::OrderChanged { order } => Some(emit::element_reorder(page_id, &order)),
                Action::RenderNeeded => None,
            })
            .collect()
    }
}
