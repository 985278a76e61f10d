//! Inbound frame parsing.
//!
//! Malformed or unexpected payloads are logged and discarded — there is no
//! retry and no user-facing error surface for a broadcast that doesn't
//! parse; the element list converges again on the next page reload.

#[cfg(test)]
#[path = "parse_test.rs"]
mod parse_test;

use frames::Frame;
use scene::doc::{Element, ElementId, PartialElement, RemoteEvent};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

/// Interpret a relay frame as an element mutation event.
///
/// Returns `None` for frames that are not element mutations and for
/// mutation frames whose payload doesn't parse.
#[must_use]
pub fn remote_event(frame: &Frame) -> Option<RemoteEvent> {
    match frame.syscall.as_str() {
        "element:add" => parse_add(frame),
        "element:update" => parse_update(frame),
        "element:move" => parse_move(frame),
        "element:delete" => parse_delete(frame),
        "element:reorder" => parse_reorder(frame),
        _ => None,
    }
}

fn data_value(frame: &Frame) -> Value {
    Value::Object(frame.data.clone().into_iter().collect::<Map<String, Value>>())
}

fn data_id(frame: &Frame) -> Option<ElementId> {
    frame
        .data
        .get("id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

fn parse_add(frame: &Frame) -> Option<RemoteEvent> {
    match serde_json::from_value::<Element>(data_value(frame)) {
        Ok(element) => Some(RemoteEvent::Added(element)),
        Err(e) => {
            warn!(id = %frame.id, error = %e, "discarding malformed element:add");
            None
        }
    }
}

fn parse_update(frame: &Frame) -> Option<RemoteEvent> {
    let Some(id) = data_id(frame) else {
        warn!(id = %frame.id, "discarding element:update without id");
        return None;
    };
    // Unknown keys (including the id itself) are ignored by the sparse type.
    match serde_json::from_value::<PartialElement>(data_value(frame)) {
        Ok(fields) => Some(RemoteEvent::Updated { id, fields }),
        Err(e) => {
            warn!(id = %frame.id, error = %e, "discarding malformed element:update");
            None
        }
    }
}

fn parse_move(frame: &Frame) -> Option<RemoteEvent> {
    let id = data_id(frame)?;
    let x = frame.data.get("x").and_then(Value::as_f64)?;
    let y = frame.data.get("y").and_then(Value::as_f64)?;
    Some(RemoteEvent::Moved { id, x, y })
}

fn parse_delete(frame: &Frame) -> Option<RemoteEvent> {
    let id = data_id(frame)?;
    Some(RemoteEvent::Deleted { id })
}

fn parse_reorder(frame: &Frame) -> Option<RemoteEvent> {
    let page_id = frame.page_id.or_else(|| {
        frame
            .data
            .get("page_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    })?;
    let order: Vec<ElementId> = frame
        .data
        .get("order")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|v| v.as_str().and_then(|s| s.parse().ok()))
        .collect();
    Some(RemoteEvent::Reordered { page_id, order })
}

/// Extract the element snapshot from a `page:join` done reply.
#[must_use]
pub fn join_snapshot(frame: &Frame) -> Option<(Uuid, Vec<Element>)> {
    let page_id = frame.page_id?;
    let elements = frame
        .data
        .get("elements")
        .cloned()
        .and_then(|v| serde_json::from_value::<Vec<Element>>(v).ok())?;
    Some((page_id, elements))
}
