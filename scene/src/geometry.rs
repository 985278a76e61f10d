//! Pure geometry over element snapshots.
//!
//! Every function here is stateless: it reads or rewrites elements and
//! returns what changed, leaving history, selection, and network concerns to
//! the engine façade. The two ordering rules that matter live in this file:
//! selection-based dragging takes precedence over group-based dragging, and
//! an arrow's origin is re-anchored before its end point so the end is
//! expressed relative to the already-updated origin.

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use std::cmp::Ordering;

use serde_json::json;

use crate::camera::Point;
use crate::consts;
use crate::doc::{Element, ElementId, ElementKind, ElementStore};

/// Axis-aligned bounding box in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    /// Bounding box spanning two opposite corners in either order.
    #[must_use]
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    /// Overlap test: true unless the boxes are fully separated on either
    /// axis. Touching edges count as separated.
    #[must_use]
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Bounding box of an element.
///
/// Arrows derive their extent from the point sequence; everything else uses
/// the stored width/height (zero when absent, e.g. unmeasured text).
#[must_use]
pub fn element_bounds(element: &Element) -> Bounds {
    if element.kind == ElementKind::Arrow {
        let points = element.content().points();
        if points.len() >= 2 {
            let xs = points.iter().step_by(2);
            let ys = points.iter().skip(1).step_by(2);
            let min_x = xs.clone().fold(f64::INFINITY, |a, b| a.min(*b));
            let max_x = xs.fold(f64::NEG_INFINITY, |a, b| a.max(*b));
            let min_y = ys.clone().fold(f64::INFINITY, |a, b| a.min(*b));
            let max_y = ys.fold(f64::NEG_INFINITY, |a, b| a.max(*b));
            return Bounds {
                x: element.x + min_x,
                y: element.y + min_y,
                width: max_x - min_x,
                height: max_y - min_y,
            };
        }
    }
    Bounds {
        x: element.x,
        y: element.y,
        width: element.width.unwrap_or(0.0),
        height: element.height.unwrap_or(0.0),
    }
}

/// Ids of the elements that must move together with `dragged`.
///
/// When the dragged element is part of an active multi-selection, the
/// companions are the other selected elements. Otherwise, when it carries a
/// group tag, the companions are the other members of that group. Selection
/// always beats group.
#[must_use]
pub fn drag_companions(store: &ElementStore, selection: &[ElementId], dragged: ElementId) -> Vec<ElementId> {
    if selection.len() > 1 && selection.contains(&dragged) {
        return selection
            .iter()
            .filter(|id| **id != dragged && store.contains(id))
            .copied()
            .collect();
    }

    let Some(group) = store.get(&dragged).and_then(|el| el.group_id.clone()) else {
        return Vec::new();
    };
    store
        .ordered()
        .into_iter()
        .filter(|el| el.id != dragged && el.group_id.as_deref() == Some(group.as_str()))
        .map(|el| el.id)
        .collect()
}

/// Re-anchor every arrow whose smart link references one of `moved`.
///
/// The arrow's origin becomes the center of its start-linked element (when
/// present) with the first point pair pinned to (0,0); the last point pair
/// becomes the end-linked element's center relative to the updated origin.
/// Returns the ids of arrows that were rewritten, in paint order.
pub fn relink_arrows(store: &mut ElementStore, moved: &[ElementId]) -> Vec<ElementId> {
    // Read pass: collect affected arrows and the centers they track before
    // taking any mutable borrow.
    let mut plans: Vec<(ElementId, Option<(f64, f64)>, Option<(f64, f64)>)> = Vec::new();
    for element in store.ordered() {
        if element.kind != ElementKind::Arrow {
            continue;
        }
        let start_moved = element.start_element_id.is_some_and(|id| moved.contains(&id));
        let end_moved = element.end_element_id.is_some_and(|id| moved.contains(&id));
        if !start_moved && !end_moved {
            continue;
        }
        let start = element
            .start_element_id
            .and_then(|id| store.get(&id))
            .map(Element::center);
        let end = element
            .end_element_id
            .and_then(|id| store.get(&id))
            .map(Element::center);
        plans.push((element.id, start, end));
    }

    let mut changed = Vec::with_capacity(plans.len());
    for (arrow_id, start, end) in plans {
        let Some(arrow) = store.get_mut(&arrow_id) else {
            continue;
        };
        // Origin first: the end pair below must be relative to the new x/y.
        if let Some((cx, cy)) = start {
            arrow.x = cx;
            arrow.y = cy;
            let mut points = arrow.content().points();
            if points.len() >= 2 {
                points[0] = 0.0;
                points[1] = 0.0;
            } else {
                points = vec![0.0, 0.0];
            }
            arrow.set_points(&points);
        }
        if let Some((ex, ey)) = end {
            let mut points = arrow.content().points();
            if points.len() < 2 {
                points = vec![0.0, 0.0];
            }
            let n = points.len();
            if n >= 4 {
                points[n - 2] = ex - arrow.x;
                points[n - 1] = ey - arrow.y;
            } else {
                points.push(ex - arrow.x);
                points.push(ey - arrow.y);
            }
            arrow.set_points(&points);
        }
        changed.push(arrow_id);
    }
    changed
}

/// Absorb accumulated transform-handle scale into explicit element state.
///
/// Text scales its font size (rounded, floored); arrows scale each point
/// coordinate by the axis-appropriate factor; everything else scales its
/// width/height with a minimum committed size.
pub fn commit_resize(element: &mut Element, scale_x: f64, scale_y: f64) {
    match element.kind {
        ElementKind::Text => {
            let size = (element.content().font_size() * scale_x)
                .round()
                .max(consts::MIN_FONT_SIZE);
            element.set_content_key("fontSize", json!(size));
        }
        ElementKind::Arrow => {
            let points: Vec<f64> = element
                .content()
                .points()
                .iter()
                .enumerate()
                .map(|(i, v)| if i % 2 == 0 { v * scale_x } else { v * scale_y })
                .collect();
            element.set_points(&points);
        }
        ElementKind::Rectangle | ElementKind::Image | ElementKind::Video => {
            let width = element.width.unwrap_or(consts::DEFAULT_RECT_SIZE) * scale_x;
            let height = element.height.unwrap_or(consts::DEFAULT_RECT_SIZE) * scale_y;
            element.width = Some(width.max(consts::MIN_ELEMENT_SIZE));
            element.height = Some(height.max(consts::MIN_ELEMENT_SIZE));
        }
    }
}

/// Grid positions for a selection of at least two elements.
///
/// Elements are sorted by (y, then x) and laid out left-to-right,
/// top-to-bottom in [`consts::GRID_COLUMNS`] columns; each row is as tall as
/// its tallest element plus the gutter. The layout is anchored at the
/// top-left of the first element in sort order. Returns `(id, x, y)` pairs,
/// empty when fewer than two selected elements are loaded.
#[must_use]
pub fn arrange_grid(store: &ElementStore, selection: &[ElementId]) -> Vec<(ElementId, f64, f64)> {
    let mut items: Vec<&Element> = selection.iter().filter_map(|id| store.get(id)).collect();
    if items.len() < 2 {
        return Vec::new();
    }
    items.sort_by(|a, b| {
        a.y.partial_cmp(&b.y)
            .unwrap_or(Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
    });

    let anchor_x = items[0].x;
    let anchor_y = items[0].y;
    let mut out = Vec::with_capacity(items.len());
    let mut cursor_x = anchor_x;
    let mut cursor_y = anchor_y;
    let mut row_height = 0.0_f64;
    for (i, element) in items.iter().enumerate() {
        if i > 0 && i % consts::GRID_COLUMNS == 0 {
            cursor_x = anchor_x;
            cursor_y += row_height + consts::GRID_GUTTER;
            row_height = 0.0;
        }
        out.push((element.id, cursor_x, cursor_y));
        let bounds = element_bounds(element);
        cursor_x += bounds.width + consts::GRID_GUTTER;
        row_height = row_height.max(bounds.height);
    }
    out
}

/// Quantize a coordinate to the nearest snap-grid line.
#[must_use]
pub fn snap_to_grid(value: f64) -> f64 {
    (value / consts::GRID_CELL).round() * consts::GRID_CELL
}

/// Ids of the elements whose bounding box overlaps `marquee`, in paint order.
#[must_use]
pub fn elements_in_box(store: &ElementStore, marquee: &Bounds) -> Vec<ElementId> {
    store
        .ordered()
        .into_iter()
        .filter(|el| element_bounds(el).overlaps(marquee))
        .map(|el| el.id)
        .collect()
}
