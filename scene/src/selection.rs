//! Selection set, marquee state machine, and the transform handle.
//!
//! The controller tracks which elements the user is operating on. It owns
//! two pieces of transient state: the marquee rectangle while the user is
//! rubber-banding over empty canvas, and the scale factors accumulated by
//! the resize handle between grab and release. Neither is ever persisted,
//! and the whole controller resets on page switch.

#[cfg(test)]
#[path = "selection_test.rs"]
mod selection_test;

use crate::camera::Point;
use crate::doc::{ElementId, ElementStore};
use crate::geometry::{Bounds, elements_in_box};

/// Marquee gesture state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarqueeState {
    /// No marquee in progress.
    Idle,
    /// Rubber-band rectangle being dragged from `origin` to `current`.
    Dragging { origin: Point, current: Point },
}

/// Scale factors accumulated by the resize handle during a transform
/// gesture. Consumed (and reset to identity) when the transform commits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformHandle {
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Default for TransformHandle {
    fn default() -> Self {
        Self { scale_x: 1.0, scale_y: 1.0 }
    }
}

impl TransformHandle {
    /// Fold another incremental scale step into the accumulated factors.
    pub fn accumulate(&mut self, scale_x: f64, scale_y: f64) {
        self.scale_x *= scale_x;
        self.scale_y *= scale_y;
    }

    /// Read the accumulated factors and reset to identity, absorbing the
    /// scale into whatever the caller commits.
    pub fn take(&mut self) -> (f64, f64) {
        let scales = (self.scale_x, self.scale_y);
        *self = Self::default();
        scales
    }

    /// Whether any scale has accumulated since the last commit.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        (self.scale_x - 1.0).abs() < f64::EPSILON && (self.scale_y - 1.0).abs() < f64::EPSILON
    }
}

/// The active selection and its attached gesture state.
#[derive(Debug)]
pub struct SelectionController {
    ids: Vec<ElementId>,
    marquee: MarqueeState,
    /// Resize handle bound to the current selection.
    pub handle: TransformHandle,
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionController {
    #[must_use]
    pub fn new() -> Self {
        Self { ids: Vec::new(), marquee: MarqueeState::Idle, handle: TransformHandle::default() }
    }

    /// Selected ids in selection order.
    #[must_use]
    pub fn ids(&self) -> &[ElementId] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &ElementId) -> bool {
        self.ids.contains(id)
    }

    /// Drop the selection and any gesture state.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.marquee = MarqueeState::Idle;
        self.handle = TransformHandle::default();
    }

    /// Remove one id if selected, e.g. after a remote delete.
    pub fn remove(&mut self, id: &ElementId) {
        self.ids.retain(|existing| existing != id);
    }

    /// Keep only ids that are still loaded, e.g. after a history restore.
    pub fn retain_loaded(&mut self, store: &ElementStore) {
        self.ids.retain(|id| store.contains(id));
    }

    /// Select every loaded element in paint order.
    pub fn select_all(&mut self, store: &ElementStore) {
        self.ids = store.order().to_vec();
    }

    /// Replace the selection with exactly one element.
    pub fn replace_with(&mut self, id: ElementId) {
        self.ids = vec![id];
    }

    /// Click on an element: a modifier click toggles membership without
    /// clearing others; a plain click replaces the selection.
    pub fn click_element(&mut self, id: ElementId, additive: bool) {
        if !additive {
            self.replace_with(id);
            return;
        }
        if self.contains(&id) {
            self.remove(&id);
        } else {
            self.ids.push(id);
        }
    }

    /// Pointer-down on empty canvas background. A modifier-qualified press
    /// starts a marquee; a plain press clears the selection.
    pub fn pointer_down_background(&mut self, at: Point, additive: bool) {
        if additive {
            self.marquee = MarqueeState::Dragging { origin: at, current: at };
        } else {
            self.ids.clear();
            self.marquee = MarqueeState::Idle;
        }
    }

    /// Pointer moved while a marquee may be in progress.
    pub fn pointer_move(&mut self, at: Point) {
        if let MarqueeState::Dragging { origin, .. } = self.marquee {
            self.marquee = MarqueeState::Dragging { origin, current: at };
        }
    }

    /// Pointer released: a finished marquee selects every element whose
    /// bounding box overlaps the marquee rectangle.
    pub fn pointer_up(&mut self, store: &ElementStore) {
        if let MarqueeState::Dragging { origin, current } = self.marquee {
            let marquee = Bounds::from_corners(origin, current);
            self.ids = elements_in_box(store, &marquee);
            self.marquee = MarqueeState::Idle;
        }
    }

    /// Current marquee rectangle, if one is being dragged.
    #[must_use]
    pub fn marquee_bounds(&self) -> Option<Bounds> {
        match self.marquee {
            MarqueeState::Dragging { origin, current } => Some(Bounds::from_corners(origin, current)),
            MarqueeState::Idle => None,
        }
    }

    /// Current marquee gesture state.
    #[must_use]
    pub fn marquee(&self) -> MarqueeState {
        self.marquee
    }
}
