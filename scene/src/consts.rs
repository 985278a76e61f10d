//! Shared numeric constants for the scene crate.

// ── Snap & layout ───────────────────────────────────────────────

/// Cell size of the snap grid, in scene units.
pub const GRID_CELL: f64 = 20.0;

/// Column count for grid arrangement of a selection.
pub const GRID_COLUMNS: usize = 4;

/// Gutter between grid-arranged elements, in scene units.
pub const GRID_GUTTER: f64 = 20.0;

// ── Transform floors ────────────────────────────────────────────

/// Smallest committed width/height after a resize.
pub const MIN_ELEMENT_SIZE: f64 = 5.0;

/// Smallest committed font size after a text resize.
pub const MIN_FONT_SIZE: f64 = 8.0;

// ── History ─────────────────────────────────────────────────────

/// Maximum retained undo snapshots.
pub const HISTORY_CAPACITY: usize = 20;

// ── Viewport ────────────────────────────────────────────────────

/// Lower zoom clamp.
pub const MIN_ZOOM: f64 = 0.25;

/// Upper zoom clamp.
pub const MAX_ZOOM: f64 = 4.0;

// ── Creation defaults ───────────────────────────────────────────

/// Default side length for new rectangles.
pub const DEFAULT_RECT_SIZE: f64 = 100.0;

/// Default width for new image and video tiles.
pub const DEFAULT_MEDIA_WIDTH: f64 = 320.0;

/// Default height for new image and video tiles.
pub const DEFAULT_MEDIA_HEIGHT: f64 = 180.0;

/// Default font size for new text elements.
pub const DEFAULT_FONT_SIZE: f64 = 16.0;

/// Default fill for new shapes.
pub const DEFAULT_FILL: &str = "#d9d9d9";

/// Default stroke for new shapes and arrows.
pub const DEFAULT_STROKE: &str = "#333333";

// ── Keyboard ────────────────────────────────────────────────────

/// Arrow-key nudge distance, in scene units.
pub const NUDGE_STEP: f64 = 1.0;

/// Arrow-key nudge distance with shift held.
pub const NUDGE_STEP_LARGE: f64 = 10.0;

/// Offset applied to duplicated elements so copies don't stack exactly.
pub const DUPLICATE_OFFSET: f64 = 12.0;
