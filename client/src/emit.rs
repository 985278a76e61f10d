//! Outbound frame builders.
//!
//! Every mutation the client sends is a request frame, one per affected
//! element — a ten-element group drag leaves as ten `element:move` frames,
//! not one batch. Payloads are deliberately narrow: move frames carry only
//! the position so they can't stomp a concurrent size or content edit, and
//! update frames carry exactly the fields that changed.

#[cfg(test)]
#[path = "emit_test.rs"]
mod emit_test;

use frames::{Data, Frame};
use scene::doc::{ElementId, ElementSeed, PartialElement};
use serde_json::Value;
use uuid::Uuid;

/// Build an `element:add` request carrying a creation seed. The relay
/// assigns the canonical id and echoes the full record back.
#[must_use]
pub fn element_add(page_id: Uuid, seed: &ElementSeed) -> Frame {
    let mut data = Data::new();
    if let Ok(Value::Object(map)) = serde_json::to_value(seed) {
        data.extend(map);
    }
    Frame::request("element:add", data).with_page_id(page_id)
}

/// Build an `element:update` request from a sparse field set.
#[must_use]
pub fn element_update(page_id: Uuid, id: ElementId, fields: &PartialElement) -> Frame {
    let mut data = Data::new();
    if let Ok(Value::Object(map)) = serde_json::to_value(fields) {
        data.extend(map);
    }
    data.insert("id".into(), Value::String(id.to_string()));
    Frame::request("element:update", data).with_page_id(page_id)
}

/// Build an `element:move` request: the cheap high-frequency position-only
/// form, separate from `element:update`.
#[must_use]
pub fn element_move(page_id: Uuid, id: ElementId, x: f64, y: f64) -> Frame {
    Frame::request("element:move", Data::new())
        .with_page_id(page_id)
        .with_data("id", id.to_string())
        .with_data("x", x)
        .with_data("y", y)
}

/// Build an `element:delete` request for one id.
#[must_use]
pub fn element_delete(page_id: Uuid, id: ElementId) -> Frame {
    Frame::request("element:delete", Data::new())
        .with_page_id(page_id)
        .with_data("id", id.to_string())
}

/// Build an `element:reorder` request replacing the page's paint order.
#[must_use]
pub fn element_reorder(page_id: Uuid, order: &[ElementId]) -> Frame {
    let ids: Vec<Value> = order.iter().map(|id| Value::String(id.to_string())).collect();
    Frame::request("element:reorder", Data::new())
        .with_page_id(page_id)
        .with_data("order", ids)
}

/// Build a `page:join` request; the done reply carries the element snapshot.
#[must_use]
pub fn page_join(page_id: Uuid) -> Frame {
    Frame::request("page:join", Data::new()).with_page_id(page_id)
}
