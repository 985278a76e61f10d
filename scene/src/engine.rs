//! Engine façade: one mutable owner for store, selection, history, viewport.
//!
//! Gesture entry points apply the mutation to the local model first — the
//! optimistic half of the sync protocol — and return [`Action`]s describing
//! what a host must persist and broadcast. Remote events flow the other way
//! through [`EngineCore::merge_remote`] and produce no actions, which is what
//! keeps the relay loop from echoing forever.
//!
//! Mid-gesture positions live in a presentation overlay, not the model: the
//! renderer reads [`EngineCore::visual_position`] while the pointer is down
//! and the model is only touched when the gesture commits.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::collections::HashMap;

use serde_json::json;
use uuid::Uuid;

use crate::camera::{Camera, PageViewports};
use crate::commands::{Command, CommandTable, ModifierSet};
use crate::consts;
use crate::doc::{Element, ElementId, ElementKind, ElementSeed, ElementStore, PartialElement, RemoteEvent};
use crate::geometry;
use crate::history::History;
use crate::selection::SelectionController;

/// Actions returned from gesture handlers for the host to persist/broadcast.
#[derive(Debug, Clone)]
pub enum Action {
    /// Ask the relay to create an element; the canonical id comes back with
    /// the acknowledgment.
    CreateRequested(ElementSeed),
    /// An element's fields changed.
    ElementUpdated { id: ElementId, fields: PartialElement },
    /// An element's position changed (cheap high-frequency form).
    ElementMoved { id: ElementId, x: f64, y: f64 },
    /// An element was deleted. One action per id.
    ElementDeleted { id: ElementId },
    /// The paint order was replaced.
    OrderChanged { order: Vec<ElementId> },
    /// Purely local change; the host only needs to redraw.
    RenderNeeded,
}

/// Transient uncommitted visual positions for an in-flight drag.
///
/// Read by the renderer in preference to the model position; committed into
/// the model only on gesture end.
#[derive(Debug, Default)]
pub struct DragOverlay {
    positions: HashMap<ElementId, (f64, f64)>,
}

impl DragOverlay {
    pub fn set(&mut self, id: ElementId, x: f64, y: f64) {
        self.positions.insert(id, (x, y));
    }

    #[must_use]
    pub fn get(&self, id: &ElementId) -> Option<(f64, f64)> {
        self.positions.get(id).copied()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Core engine state for one open page.
pub struct EngineCore {
    pub store: ElementStore,
    pub selection: SelectionController,
    pub history: History,
    pub camera: Camera,
    pub viewports: PageViewports,
    pub overlay: DragOverlay,
    pub commands: CommandTable,
    /// When set, committed positions quantize to the snap grid.
    pub snap_enabled: bool,
}

impl Default for EngineCore {
    fn default() -> Self {
        Self {
            store: ElementStore::new(),
            selection: SelectionController::new(),
            history: History::new(),
            camera: Camera::default(),
            viewports: PageViewports::new(),
            overlay: DragOverlay::default(),
            commands: CommandTable::with_defaults(),
            snap_enabled: false,
        }
    }
}

impl EngineCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Page lifecycle ---

    /// Replace the local collection with another page's elements. Resets
    /// selection and history, and swaps the viewport to the page's
    /// remembered pan/zoom.
    pub fn load_page(&mut self, page_id: Uuid, elements: Vec<Element>) {
        if let Some(previous) = self.store.page_id() {
            self.viewports.save(previous, self.camera);
        }
        self.store.load(page_id, elements);
        self.selection.clear();
        self.history.clear();
        self.overlay.clear();
        self.camera = self.viewports.restore(page_id);
    }

    // --- Remote merge ---

    /// Apply an event received from the relay. Safe against echoes and
    /// duplicates; see [`ElementStore::merge_remote`].
    pub fn merge_remote(&mut self, event: &RemoteEvent) {
        if let RemoteEvent::Deleted { id } = event {
            self.selection.remove(id);
        }
        self.store.merge_remote(event);
    }

    // --- Queries ---

    /// Position the renderer should draw an element at: the uncommitted
    /// overlay position while a gesture is in flight, the model otherwise.
    #[must_use]
    pub fn visual_position(&self, id: &ElementId) -> Option<(f64, f64)> {
        self.overlay
            .get(id)
            .or_else(|| self.store.get(id).map(|el| (el.x, el.y)))
    }

    // --- Creation ---

    /// Request a new element with per-kind default geometry and payload.
    /// The element joins the store when the relay acknowledges with its
    /// canonical id.
    #[must_use]
    pub fn request_create(&self, kind: ElementKind, x: f64, y: f64) -> Action {
        Action::CreateRequested(ElementSeed::new(kind, x, y))
    }

    /// Request copies of the current selection, offset so they don't stack.
    #[must_use]
    pub fn duplicate_selection(&self) -> Vec<Action> {
        self.selection
            .ids()
            .iter()
            .filter_map(|id| self.store.get(id))
            .map(|el| {
                Action::CreateRequested(ElementSeed {
                    kind: el.kind,
                    x: el.x + consts::DUPLICATE_OFFSET,
                    y: el.y + consts::DUPLICATE_OFFSET,
                    width: el.width,
                    height: el.height,
                    group_id: el.group_id.clone(),
                    start_element_id: None,
                    end_element_id: None,
                    content: el.content.clone(),
                })
            })
            .collect()
    }

    // --- Dragging ---

    /// Update the presentation overlay for an in-flight drag of `dragged`
    /// by `(dx, dy)` from its model position, carrying companions along.
    pub fn drag_preview(&mut self, dragged: ElementId, dx: f64, dy: f64) {
        let mut targets = geometry::drag_companions(&self.store, self.selection.ids(), dragged);
        targets.push(dragged);
        for id in targets {
            if let Some(el) = self.store.get(&id) {
                self.overlay.set(id, el.x + dx, el.y + dy);
            }
        }
    }

    /// Commit a finished drag of `dragged` by `(dx, dy)`: moves the dragged
    /// element plus its selection or group companions, re-anchors affected
    /// smart-linked arrows, and clears the overlay.
    pub fn commit_drag(&mut self, dragged: ElementId, dx: f64, dy: f64) -> Vec<Action> {
        self.overlay.clear();
        if !self.store.contains(&dragged) {
            return Vec::new();
        }
        let mut targets = vec![dragged];
        targets.extend(geometry::drag_companions(&self.store, self.selection.ids(), dragged));

        self.history.record_before_mutation(self.store.snapshot());
        let mut actions = Vec::with_capacity(targets.len());
        for id in &targets {
            let Some(el) = self.store.get_mut(id) else {
                continue;
            };
            let mut x = el.x + dx;
            let mut y = el.y + dy;
            if self.snap_enabled {
                x = geometry::snap_to_grid(x);
                y = geometry::snap_to_grid(y);
            }
            el.x = x;
            el.y = y;
            actions.push(Action::ElementMoved { id: *id, x, y });
        }
        actions.extend(self.relink_and_report(&targets));
        actions
    }

    /// Move the whole selection by a fixed delta (keyboard nudge).
    pub fn nudge_selection(&mut self, dx: f64, dy: f64) -> Vec<Action> {
        let targets: Vec<ElementId> = self
            .selection
            .ids()
            .iter()
            .filter(|id| self.store.contains(id))
            .copied()
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }
        self.history.record_before_mutation(self.store.snapshot());
        let mut actions = Vec::with_capacity(targets.len());
        for id in &targets {
            if let Some(el) = self.store.get_mut(id) {
                el.x += dx;
                el.y += dy;
                actions.push(Action::ElementMoved { id: *id, x: el.x, y: el.y });
            }
        }
        actions.extend(self.relink_and_report(&targets));
        actions
    }

    // --- Transform ---

    /// Commit a transform-handle release on `id`: absorbs the accumulated
    /// scale factors into explicit size/fontSize/points, snaps the committed
    /// position when enabled, and re-anchors arrows linked to the element.
    pub fn commit_resize(&mut self, id: ElementId) -> Vec<Action> {
        if self.selection.handle.is_identity() {
            return Vec::new();
        }
        let (scale_x, scale_y) = self.selection.handle.take();
        if !self.store.contains(&id) {
            return Vec::new();
        }
        self.history.record_before_mutation(self.store.snapshot());

        let Some(el) = self.store.get_mut(&id) else {
            return Vec::new();
        };
        geometry::commit_resize(el, scale_x, scale_y);
        if self.snap_enabled {
            el.x = geometry::snap_to_grid(el.x);
            el.y = geometry::snap_to_grid(el.y);
        }

        let fields = match el.kind {
            ElementKind::Text => PartialElement {
                x: Some(el.x),
                y: Some(el.y),
                content: Some(json!({"fontSize": el.content().font_size()})),
                ..Default::default()
            },
            ElementKind::Arrow => PartialElement {
                x: Some(el.x),
                y: Some(el.y),
                content: Some(json!({"points": el.content().points()})),
                ..Default::default()
            },
            ElementKind::Rectangle | ElementKind::Image | ElementKind::Video => PartialElement {
                x: Some(el.x),
                y: Some(el.y),
                width: el.width,
                height: el.height,
                ..Default::default()
            },
        };

        let mut actions = vec![Action::ElementUpdated { id, fields }];
        actions.extend(self.relink_and_report(&[id]));
        actions
    }

    // --- Field updates ---

    /// Apply a style/content edit to one element.
    pub fn update_fields(&mut self, id: ElementId, fields: PartialElement) -> Option<Action> {
        if !self.store.contains(&id) {
            return None;
        }
        self.history.record_before_mutation(self.store.snapshot());
        self.store.apply_partial(&id, &fields);
        Some(Action::ElementUpdated { id, fields })
    }

    // --- Deletion ---

    /// Delete the current selection. One action per deleted id.
    pub fn delete_selection(&mut self) -> Vec<Action> {
        let targets: Vec<ElementId> = self
            .selection
            .ids()
            .iter()
            .filter(|id| self.store.contains(id))
            .copied()
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }
        self.history.record_before_mutation(self.store.snapshot());
        let mut actions = Vec::with_capacity(targets.len());
        for id in targets {
            self.store.remove(&id);
            actions.push(Action::ElementDeleted { id });
        }
        self.selection.clear();
        actions
    }

    // --- Ordering & layout ---

    /// Replace the paint order.
    pub fn reorder(&mut self, order: &[ElementId]) -> Action {
        self.history.record_before_mutation(self.store.snapshot());
        self.store.set_order(order);
        Action::OrderChanged { order: self.store.order().to_vec() }
    }

    /// Arrange the selection on a fixed-column grid.
    pub fn arrange_grid(&mut self) -> Vec<Action> {
        let placements = geometry::arrange_grid(&self.store, self.selection.ids());
        if placements.is_empty() {
            return Vec::new();
        }
        self.history.record_before_mutation(self.store.snapshot());
        let mut moved = Vec::with_capacity(placements.len());
        let mut actions = Vec::with_capacity(placements.len());
        for (id, x, y) in placements {
            if let Some(el) = self.store.get_mut(&id) {
                el.x = x;
                el.y = y;
                moved.push(id);
                actions.push(Action::ElementMoved { id, x, y });
            }
        }
        actions.extend(self.relink_and_report(&moved));
        actions
    }

    // --- History ---

    /// Restore the snapshot taken before the last mutation. Local only.
    pub fn undo(&mut self) -> bool {
        let Some(restored) = self.history.undo(self.store.snapshot()) else {
            return false;
        };
        self.store.restore(restored);
        self.selection.retain_loaded(&self.store);
        true
    }

    /// Reapply the last undone mutation. Local only.
    pub fn redo(&mut self) -> bool {
        let Some(restored) = self.history.redo(self.store.snapshot()) else {
            return false;
        };
        self.store.restore(restored);
        self.selection.retain_loaded(&self.store);
        true
    }

    // --- Keyboard ---

    /// Resolve and execute a keystroke through the command table.
    pub fn handle_key(&mut self, modifiers: ModifierSet, key: &str) -> Vec<Action> {
        match self.commands.lookup(modifiers, key) {
            Some(Command::Undo) => {
                if self.undo() { vec![Action::RenderNeeded] } else { Vec::new() }
            }
            Some(Command::Redo) => {
                if self.redo() { vec![Action::RenderNeeded] } else { Vec::new() }
            }
            Some(Command::DeleteSelection) => self.delete_selection(),
            Some(Command::SelectAll) => {
                self.selection.select_all(&self.store);
                vec![Action::RenderNeeded]
            }
            Some(Command::ClearSelection) => {
                self.selection.clear();
                vec![Action::RenderNeeded]
            }
            Some(Command::Duplicate) => self.duplicate_selection(),
            Some(Command::ArrangeGrid) => self.arrange_grid(),
            Some(Command::Nudge { dx, dy }) => self.nudge_selection(dx, dy),
            None => Vec::new(),
        }
    }

    // --- Internals ---

    /// Re-anchor arrows linked to `moved` and report their new geometry.
    fn relink_and_report(&mut self, moved: &[ElementId]) -> Vec<Action> {
        let relinked = geometry::relink_arrows(&mut self.store, moved);
        relinked
            .into_iter()
            .filter_map(|id| {
                let arrow = self.store.get(&id)?;
                let fields = PartialElement {
                    x: Some(arrow.x),
                    y: Some(arrow.y),
                    content: Some(json!({"points": arrow.content().points()})),
                    ..Default::default()
                };
                Some(Action::ElementUpdated { id, fields })
            })
            .collect()
    }
}
