#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consts;

/// A point in either screen or scene space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Viewport state for pan/zoom over the scene.
///
/// `pan_x` / `pan_y` are in screen pixels.
/// `zoom` is a scale factor (1.0 = no zoom).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { pan_x: 0.0, pan_y: 0.0, zoom: 1.0 }
    }
}

impl Camera {
    /// Convert a screen-space point (pixels) to scene coordinates.
    #[must_use]
    pub fn screen_to_scene(&self, screen: Point) -> Point {
        Point {
            x: (screen.x - self.pan_x) / self.zoom,
            y: (screen.y - self.pan_y) / self.zoom,
        }
    }

    /// Convert a scene-space point to screen coordinates (pixels).
    #[must_use]
    pub fn scene_to_screen(&self, scene: Point) -> Point {
        Point {
            x: scene.x * self.zoom + self.pan_x,
            y: scene.y * self.zoom + self.pan_y,
        }
    }

    /// Shift the viewport by a screen-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Set the zoom factor, clamped to the allowed range, keeping the given
    /// screen point fixed over the same scene point.
    pub fn zoom_to(&mut self, zoom: f64, pivot: Point) {
        let clamped = zoom.clamp(consts::MIN_ZOOM, consts::MAX_ZOOM);
        let before = self.screen_to_scene(pivot);
        self.zoom = clamped;
        let after = self.scene_to_screen(before);
        self.pan_x += pivot.x - after.x;
        self.pan_y += pivot.y - after.y;
    }
}

/// Per-page viewport memory: each page keeps its own pan/zoom across page
/// switches within a session.
#[derive(Debug, Default)]
pub struct PageViewports {
    saved: HashMap<Uuid, Camera>,
}

impl PageViewports {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the viewport for a page.
    pub fn save(&mut self, page_id: Uuid, camera: Camera) {
        self.saved.insert(page_id, camera);
    }

    /// Viewport last used on a page, or the default view.
    #[must_use]
    pub fn restore(&self, page_id: Uuid) -> Camera {
        self.saved.get(&page_id).copied().unwrap_or_default()
    }
}
