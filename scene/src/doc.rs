//! Element model: placed objects, their ordered store, and remote merges.
//!
//! This module defines the core data types describing what is on a page
//! (`Element`, `ElementKind`), a sparse-update type for incremental edits
//! (`PartialElement`), a typed accessor for the open-ended `content` JSON bag
//! (`Content`), creation seeds with per-kind defaults (`ElementSeed`), and
//! the runtime store that owns the live sequence (`ElementStore`).
//!
//! Paint order is implicit: the store keeps an explicit sequence and the
//! renderer draws it front to back. Reordering replaces the sequence.
//!
//! Data flows into this layer from two directions: local gestures mutate the
//! store directly, and relay broadcasts arrive through [`ElementStore::merge_remote`],
//! which is deliberately idempotent and order-tolerant so that echoes and
//! stale events are harmless.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::consts;

/// Unique identifier for a placed element.
pub type ElementId = Uuid;

/// The kind of a placed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Filled axis-aligned rectangle.
    Rectangle,
    /// Text block; size is derived from its content.
    Text,
    /// Polyline arrow; endpoints may smart-link to other elements.
    Arrow,
    /// Bitmap tile referencing an uploaded asset by URL.
    Image,
    /// Video tile with playback state.
    Video,
}

/// A placed element as stored in the scene and on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    /// Unique identifier, assigned by the relay on creation. Clients never
    /// invent canonical ids.
    pub id: ElementId,
    /// The page this element belongs to. Exactly one at a time.
    pub page_id: Uuid,
    /// Shape kind.
    pub kind: ElementKind,
    /// Left edge in scene coordinates.
    pub x: f64,
    /// Top edge in scene coordinates.
    pub y: f64,
    /// Width; text and arrows treat this as derived/optional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Height; text and arrows treat this as derived/optional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Weak group tag; members move together when one is dragged without an
    /// active multi-selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Smart-link source (arrows only): the arrow's origin tracks this
    /// element's center.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_element_id: Option<ElementId>,
    /// Smart-link target (arrows only): the arrow's last point tracks this
    /// element's center.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_element_id: Option<ElementId>,
    /// Open per-kind payload (fill, stroke, text, url, points, ...).
    pub content: Value,
    /// Monotonically increasing edit counter, stamped by the relay.
    pub version: i64,
}

impl Element {
    /// Typed read access to the content bag.
    #[must_use]
    pub fn content(&self) -> Content<'_> {
        Content::new(&self.content)
    }

    /// Insert or replace one key in the content bag.
    pub fn set_content_key(&mut self, key: &str, value: Value) {
        if !self.content.is_object() {
            self.content = json!({});
        }
        if let Some(map) = self.content.as_object_mut() {
            map.insert(key.to_owned(), value);
        }
    }

    /// Replace the arrow's point sequence. Length is kept even by dropping a
    /// trailing unpaired coordinate.
    pub fn set_points(&mut self, points: &[f64]) {
        let even = &points[..points.len() - points.len() % 2];
        self.set_content_key("points", json!(even));
    }

    /// Center of the element's bounding box in scene coordinates.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            self.x + self.width.unwrap_or(0.0) / 2.0,
            self.y + self.height.unwrap_or(0.0) / 2.0,
        )
    }
}

/// Deserialize a present field into the outer `Some`, so a JSON `null`
/// becomes `Some(None)` ("clear") instead of collapsing into `None`
/// ("leave unchanged").
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Sparse update for an element. Only present fields are applied.
///
/// `group_id` and the smart-link ids are double-`Option`: the outer level
/// distinguishes "leave unchanged" from "set", the inner level carries the
/// new value where `None` clears the field (JSON `null` on the wire).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialElement {
    /// New x position, if being updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// New y position, if being updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// New width, if being updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// New height, if being updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Group tag to set or clear.
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Option<String>>,
    /// Smart-link source to set or clear.
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub start_element_id: Option<Option<ElementId>>,
    /// Smart-link target to set or clear.
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub end_element_id: Option<Option<ElementId>>,
    /// Content keys to merge or remove (null values delete keys).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// New version counter, if being updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

/// Typed access to common content fields from an `Element.content` value.
pub struct Content<'a> {
    value: &'a Value,
}

impl<'a> Content<'a> {
    /// Wrap a reference to a `content` JSON value for typed access.
    #[must_use]
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    fn str_or(&self, key: &str, default: &'a str) -> &'a str {
        self.value.get(key).and_then(|v| v.as_str()).unwrap_or(default)
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.value.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    /// Fill color as a CSS color string.
    #[must_use]
    pub fn fill(&self) -> &str {
        self.str_or("fill", consts::DEFAULT_FILL)
    }

    /// Stroke color as a CSS color string.
    #[must_use]
    pub fn stroke(&self) -> &str {
        self.str_or("stroke", consts::DEFAULT_STROKE)
    }

    /// Stroke width in scene units.
    #[must_use]
    pub fn stroke_width(&self) -> f64 {
        self.f64_or("strokeWidth", 1.0)
    }

    /// Text body. Empty string when absent.
    #[must_use]
    pub fn text(&self) -> &str {
        self.str_or("text", "")
    }

    /// Font size in pixels.
    #[must_use]
    pub fn font_size(&self) -> f64 {
        self.f64_or("fontSize", consts::DEFAULT_FONT_SIZE)
    }

    /// Font style keyword (`"normal"`, `"bold"`, `"italic"`).
    #[must_use]
    pub fn font_style(&self) -> &str {
        self.str_or("fontStyle", "normal")
    }

    /// Media source URL. Empty string when absent.
    #[must_use]
    pub fn url(&self) -> &str {
        self.str_or("url", "")
    }

    /// Whether a video tile is currently playing.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.value
            .get("isPlaying")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether a video tile is muted.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.value
            .get("isMuted")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Star rating attached to a media tile.
    #[must_use]
    pub fn rating(&self) -> i64 {
        self.value.get("rating").and_then(Value::as_i64).unwrap_or(0)
    }

    /// Arrow point sequence as flat coordinate pairs relative to `(x, y)`.
    ///
    /// A trailing unpaired coordinate is dropped so the result length is
    /// always even.
    #[must_use]
    pub fn points(&self) -> Vec<f64> {
        let Some(raw) = self.value.get("points").and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut pts: Vec<f64> = raw.iter().filter_map(Value::as_f64).collect();
        pts.truncate(pts.len() - pts.len() % 2);
        pts
    }
}

/// Payload for a creation request: an element minus the relay-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSeed {
    pub kind: ElementKind,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_element_id: Option<ElementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_element_id: Option<ElementId>,
    pub content: Value,
}

impl ElementSeed {
    /// Creation defaults for a new element of `kind` at `(x, y)`.
    #[must_use]
    pub fn new(kind: ElementKind, x: f64, y: f64) -> Self {
        let (width, height) = default_size(kind);
        Self {
            kind,
            x,
            y,
            width,
            height,
            group_id: None,
            start_element_id: None,
            end_element_id: None,
            content: default_content(kind),
        }
    }

    /// Materialize the seed into a full element once the relay has assigned
    /// an id.
    #[must_use]
    pub fn into_element(self, id: ElementId, page_id: Uuid, version: i64) -> Element {
        Element {
            id,
            page_id,
            kind: self.kind,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            group_id: self.group_id,
            start_element_id: self.start_element_id,
            end_element_id: self.end_element_id,
            content: self.content,
            version,
        }
    }
}

/// Default bounding box for a freshly created element.
#[must_use]
pub fn default_size(kind: ElementKind) -> (Option<f64>, Option<f64>) {
    match kind {
        ElementKind::Rectangle => (Some(consts::DEFAULT_RECT_SIZE), Some(consts::DEFAULT_RECT_SIZE)),
        ElementKind::Image | ElementKind::Video => {
            (Some(consts::DEFAULT_MEDIA_WIDTH), Some(consts::DEFAULT_MEDIA_HEIGHT))
        }
        ElementKind::Text | ElementKind::Arrow => (None, None),
    }
}

/// Default content bag for a freshly created element.
#[must_use]
pub fn default_content(kind: ElementKind) -> Value {
    match kind {
        ElementKind::Rectangle => json!({
            "fill": consts::DEFAULT_FILL,
            "stroke": consts::DEFAULT_STROKE,
            "strokeWidth": 1.0,
        }),
        ElementKind::Text => json!({
            "text": "",
            "fontSize": consts::DEFAULT_FONT_SIZE,
            "fontStyle": "normal",
            "fill": consts::DEFAULT_STROKE,
        }),
        ElementKind::Arrow => json!({
            "stroke": consts::DEFAULT_STROKE,
            "strokeWidth": 2.0,
            "points": [0.0, 0.0, 100.0, 0.0],
        }),
        ElementKind::Image => json!({
            "url": "",
            "rating": 0,
        }),
        ElementKind::Video => json!({
            "url": "",
            "isPlaying": false,
            "isMuted": true,
            "rating": 0,
        }),
    }
}

/// A mutation event received from the relay.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// A peer created an element.
    Added(Element),
    /// A peer updated fields of an element.
    Updated { id: ElementId, fields: PartialElement },
    /// A peer moved an element (cheap high-frequency position update).
    Moved { id: ElementId, x: f64, y: f64 },
    /// A peer deleted an element.
    Deleted { id: ElementId },
    /// A peer replaced the paint order of a page.
    Reordered { page_id: Uuid, order: Vec<ElementId> },
}

/// In-memory store for the elements of the currently open page.
///
/// The store is always scoped to exactly one page; events for other pages
/// are ignored by the merge path.
pub struct ElementStore {
    page_id: Option<Uuid>,
    elements: HashMap<ElementId, Element>,
    order: Vec<ElementId>,
}

impl ElementStore {
    /// Create an empty, unscoped store.
    #[must_use]
    pub fn new() -> Self {
        Self { page_id: None, elements: HashMap::new(), order: Vec::new() }
    }

    /// Replace the entire collection with the elements of one page.
    pub fn load(&mut self, page_id: Uuid, elements: Vec<Element>) {
        self.page_id = Some(page_id);
        self.elements.clear();
        self.order.clear();
        for element in elements {
            self.order.push(element.id);
            self.elements.insert(element.id, element);
        }
    }

    /// The page this store is scoped to, if any page has been loaded.
    #[must_use]
    pub fn page_id(&self) -> Option<Uuid> {
        self.page_id
    }

    /// Append an element. Replaces in place if the id is already present.
    pub fn insert(&mut self, element: Element) {
        if !self.elements.contains_key(&element.id) {
            self.order.push(element.id);
        }
        self.elements.insert(element.id, element);
    }

    /// Remove an element by id, returning it if it was present.
    pub fn remove(&mut self, id: &ElementId) -> Option<Element> {
        let removed = self.elements.remove(id);
        if removed.is_some() {
            self.order.retain(|existing| existing != id);
        }
        removed
    }

    /// Return a reference to an element by id.
    #[must_use]
    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    /// Return a mutable reference to an element by id.
    pub fn get_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        self.elements.get_mut(id)
    }

    /// Whether an element with this id is loaded.
    #[must_use]
    pub fn contains(&self, id: &ElementId) -> bool {
        self.elements.contains_key(id)
    }

    /// Paint order, back to front.
    #[must_use]
    pub fn order(&self) -> &[ElementId] {
        &self.order
    }

    /// Elements in paint order.
    #[must_use]
    pub fn ordered(&self) -> Vec<&Element> {
        self.order.iter().filter_map(|id| self.elements.get(id)).collect()
    }

    /// Replace the paint order.
    ///
    /// Incoming ids that are not loaded are dropped; loaded elements missing
    /// from the incoming order keep their relative position at the end, so a
    /// locally created element a stale reorder does not know about is never
    /// destroyed.
    pub fn set_order(&mut self, incoming: &[ElementId]) {
        let mut next: Vec<ElementId> = incoming
            .iter()
            .filter(|id| self.elements.contains_key(id))
            .copied()
            .collect();
        for id in &self.order {
            if !next.contains(id) {
                next.push(*id);
            }
        }
        self.order = next;
    }

    /// Apply a sparse update to an existing element.
    ///
    /// The content bundle merges first, then top-level fields, so a
    /// top-level field always wins over a stale content value carried in
    /// the same event. Returns false if the element doesn't exist or the
    /// bundle is not an object.
    pub fn apply_partial(&mut self, id: &ElementId, partial: &PartialElement) -> bool {
        let Some(element) = self.elements.get_mut(id) else {
            return false;
        };
        if let Some(ref bundle) = partial.content {
            let Some(incoming) = bundle.as_object() else {
                return false;
            };

            if !element.content.is_object() {
                element.content = json!({});
            }

            if let Some(existing) = element.content.as_object_mut() {
                for (k, v) in incoming {
                    if v.is_null() {
                        existing.remove(k);
                    } else {
                        existing.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        if let Some(x) = partial.x {
            element.x = x;
        }
        if let Some(y) = partial.y {
            element.y = y;
        }
        if let Some(w) = partial.width {
            element.width = Some(w);
        }
        if let Some(h) = partial.height {
            element.height = Some(h);
        }
        if let Some(ref group) = partial.group_id {
            element.group_id = group.clone();
        }
        if let Some(start) = partial.start_element_id {
            element.start_element_id = start;
        }
        if let Some(end) = partial.end_element_id {
            element.end_element_id = end;
        }
        if let Some(v) = partial.version {
            element.version = v;
        }
        true
    }

    /// Merge a relay event. Idempotent and order-tolerant: adds for present
    /// ids, updates/moves/deletes for unknown ids, and events scoped to a
    /// different page are all silent no-ops.
    pub fn merge_remote(&mut self, event: &RemoteEvent) {
        match event {
            RemoteEvent::Added(element) => {
                if self.page_id != Some(element.page_id) || self.elements.contains_key(&element.id) {
                    return;
                }
                self.insert(element.clone());
            }
            RemoteEvent::Updated { id, fields } => {
                self.apply_partial(id, fields);
            }
            RemoteEvent::Moved { id, x, y } => {
                if let Some(element) = self.elements.get_mut(id) {
                    element.x = *x;
                    element.y = *y;
                }
            }
            RemoteEvent::Deleted { id } => {
                self.remove(id);
            }
            RemoteEvent::Reordered { page_id, order } => {
                if self.page_id != Some(*page_id) {
                    return;
                }
                self.set_order(order);
            }
        }
    }

    /// Clone the full sequence in paint order, e.g. for a history snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Element> {
        self.ordered().into_iter().cloned().collect()
    }

    /// Replace the sequence from a snapshot, keeping the page scope.
    pub fn restore(&mut self, snapshot: Vec<Element>) {
        self.elements.clear();
        self.order.clear();
        for element in snapshot {
            self.order.push(element.id);
            self.elements.insert(element.id, element);
        }
    }

    /// Number of loaded elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if no elements are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl Default for ElementStore {
    fn default() -> Self {
        Self::new()
    }
}
