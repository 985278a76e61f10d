//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client id, registers the connection in the
//! global client registry, and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Broadcast frames from peers → forward to this client
//!
//! Handler functions are pure business logic — they validate, mutate state,
//! and return an `Outcome`. The dispatch layer owns all outbound concerns:
//! reply to sender and broadcast to peers. A connection is implicitly
//! subscribed to every page; receivers filter by `page_id`.
//!
//! Batch operations (multi-delete, batch move, cross-page move) broadcast
//! one event per affected element directly, to everyone including the
//! origin — merge idempotence on the client makes the echo safe.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `client_id`
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast / both)
//! 4. Close → part joined pages → cleanup

use std::collections::HashSet;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use frames::{Data, Frame};
use scene::doc::{Element, ElementId, ElementSeed, PartialElement};
use serde_json::{Map, Value};

use crate::services;
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what — handlers never send frames directly, except
/// for the per-element broadcasts of batch operations.
enum Outcome {
    /// Reply done+data to the sender and rebroadcast a request-shaped copy
    /// to every other client.
    Broadcast(Data),
    /// Send done+data to the sender only.
    Reply(Data),
    /// Send an empty done to the sender only.
    Done,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcast frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);
    state.clients.write().await.insert(client_id, client_tx);

    let welcome = Frame::request("session:connected", Data::new()).with_data("client_id", client_id.to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        state.clients.write().await.remove(&client_id);
        return;
    }
    info!(%client_id, "ws: client connected");

    // Pages this connection joined, for hydration/eviction bookkeeping.
    let mut joined: HashSet<Uuid> = HashSet::new();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut joined, client_id, &text).await;
                        for frame in replies {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Binary(bytes) => {
                        let replies = match frames::decode_frame(&bytes) {
                            Ok(req) => process_frame(&state, &mut joined, client_id, req).await,
                            Err(e) => {
                                warn!(%client_id, error = %e, "ws: invalid binary frame");
                                vec![Frame::request("gateway:error", Data::new())
                                    .with_data("message", format!("invalid frame: {e}"))]
                            }
                        };
                        for frame in replies {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    state.clients.write().await.remove(&client_id);
    for page_id in joined {
        services::page::part_page(&state, page_id, client_id).await;
    }
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse one inbound text frame and return frames for the sender.
///
/// Separated from the socket loop so tests can exercise dispatch and
/// broadcast behavior end-to-end without a live connection.
async fn process_inbound_text(
    state: &AppState,
    joined: &mut HashSet<Uuid>,
    client_id: Uuid,
    text: &str,
) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };
    process_frame(state, joined, client_id, req).await
}

async fn process_frame(state: &AppState, joined: &mut HashSet<Uuid>, client_id: Uuid, mut req: Frame) -> Vec<Frame> {
    // Stamp the sending connection as `from`.
    req.from = Some(client_id.to_string());
    info!(%client_id, id = %req.id, syscall = %req.syscall, status = ?req.status, "ws: recv frame");

    let result = match req.prefix() {
        "page" => handle_page(state, joined, client_id, &req).await,
        "element" => handle_element(state, client_id, &req).await,
        _ => Err(req.error(format!("unknown prefix: {}", req.prefix()))),
    };

    match result {
        Ok(Outcome::Broadcast(data)) => {
            let sender_frame = req.done_with(data);
            // Peers get a request-shaped copy without parent_id (they didn't
            // originate the exchange).
            let mut peer_frame = Frame::request(&req.syscall, sender_frame.data.clone());
            peer_frame.page_id = req.page_id;
            services::page::broadcast(state, &peer_frame, Some(client_id)).await;
            vec![sender_frame]
        }
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// PAGE HANDLERS
// =============================================================================

async fn handle_page(
    state: &AppState,
    joined: &mut HashSet<Uuid>,
    client_id: Uuid,
    req: &Frame,
) -> Result<Outcome, Frame> {
    let Some(page_id) = frame_page_id(req) else {
        return Err(req.error("page_id required"));
    };

    match req.op() {
        "join" => match services::page::join_page(state, page_id, client_id).await {
            Ok(elements) => {
                joined.insert(page_id);
                let mut reply = Data::new();
                reply.insert("elements".into(), serde_json::to_value(&elements).unwrap_or_default());
                Ok(Outcome::Reply(reply))
            }
            Err(e) => Err(req.error_from(&e)),
        },
        "part" => {
            services::page::part_page(state, page_id, client_id).await;
            joined.remove(&page_id);
            Ok(Outcome::Done)
        }
        op => Err(req.error(format!("unknown page op: {op}"))),
    }
}

// =============================================================================
// ELEMENT HANDLERS
// =============================================================================

async fn handle_element(state: &AppState, client_id: Uuid, req: &Frame) -> Result<Outcome, Frame> {
    let Some(page_id) = frame_page_id(req) else {
        return Err(req.error("page_id required"));
    };

    match req.op() {
        "add" => {
            let seed: ElementSeed = match serde_json::from_value(data_value(req)) {
                Ok(seed) => seed,
                Err(e) => return Err(req.error(format!("invalid element seed: {e}"))),
            };
            match services::element::create_element(state, page_id, seed).await {
                Ok(element) => Ok(Outcome::Broadcast(element_to_data(&element))),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "update" => {
            let Some(element_id) = data_id(req) else {
                return Err(req.error("id required"));
            };
            let fields: PartialElement = match serde_json::from_value(data_value(req)) {
                Ok(fields) => fields,
                Err(e) => return Err(req.error(format!("invalid update fields: {e}"))),
            };
            match services::element::update_element(state, page_id, element_id, &fields).await {
                // The element is gone; a peer deleted it first. Benign.
                Ok(None) => Ok(Outcome::Done),
                Ok(Some(element)) => {
                    let mut data = Data::new();
                    if let Ok(Value::Object(map)) = serde_json::to_value(&fields) {
                        data.extend(map);
                    }
                    data.insert("id".into(), Value::String(element_id.to_string()));
                    data.insert("version".into(), serde_json::json!(element.version));
                    Ok(Outcome::Broadcast(data))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "move" => {
            let Some(element_id) = data_id(req) else {
                return Err(req.error("id required"));
            };
            let (Some(x), Some(y)) = (data_f64(req, "x"), data_f64(req, "y")) else {
                return Err(req.error("x and y required"));
            };
            match services::element::move_element(state, page_id, element_id, x, y).await {
                Ok(None) => Ok(Outcome::Done),
                Ok(Some(_)) => {
                    let mut data = Data::new();
                    data.insert("id".into(), Value::String(element_id.to_string()));
                    data.insert("x".into(), serde_json::json!(x));
                    data.insert("y".into(), serde_json::json!(y));
                    Ok(Outcome::Broadcast(data))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "move_batch" => {
            let moves = parse_moves(req);
            if moves.is_empty() {
                return Err(req.error("moves required"));
            }
            match services::element::batch_move(state, page_id, &moves).await {
                Ok(updated) => {
                    // One event per element, origin included; idempotent
                    // merges absorb the echo.
                    for element in &updated {
                        let frame = Frame::request("element:move", Data::new())
                            .with_page_id(page_id)
                            .with_data("id", element.id.to_string())
                            .with_data("x", element.x)
                            .with_data("y", element.y);
                        services::page::broadcast(state, &frame, None).await;
                    }
                    let mut reply = Data::new();
                    reply.insert("moved".into(), serde_json::json!(updated.len()));
                    Ok(Outcome::Reply(reply))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "delete" => {
            let ids = delete_targets(req);
            if ids.is_empty() {
                return Err(req.error("id required"));
            }
            match services::element::delete_elements(state, page_id, &ids).await {
                Ok(removed) => {
                    // Delete emits one event per deleted id.
                    for element_id in &removed {
                        let frame = Frame::request("element:delete", Data::new())
                            .with_page_id(page_id)
                            .with_data("id", element_id.to_string());
                        services::page::broadcast(state, &frame, Some(client_id)).await;
                    }
                    let mut reply = Data::new();
                    reply.insert("deleted".into(), serde_json::json!(removed.len()));
                    Ok(Outcome::Reply(reply))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "reorder" => {
            let order = parse_id_list(req, "order");
            match services::element::reorder_elements(state, page_id, &order).await {
                Ok(applied) => {
                    let ids: Vec<Value> = applied.iter().map(|id| Value::String(id.to_string())).collect();
                    let mut data = Data::new();
                    data.insert("page_id".into(), Value::String(page_id.to_string()));
                    data.insert("order".into(), Value::Array(ids));
                    Ok(Outcome::Broadcast(data))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "move_page" => {
            let ids = parse_id_list(req, "ids");
            let Some(to_page) = req
                .data
                .get("to_page_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
            else {
                return Err(req.error("to_page_id required"));
            };
            if ids.is_empty() {
                return Err(req.error("ids required"));
            }
            match services::element::move_to_page(state, page_id, to_page, &ids).await {
                Ok(page_move) => {
                    // Source viewers see deletes, target viewers see adds.
                    for element in &page_move.moved {
                        let delete = Frame::request("element:delete", Data::new())
                            .with_page_id(page_id)
                            .with_data("id", element.id.to_string());
                        services::page::broadcast(state, &delete, None).await;

                        let add = Frame::request("element:add", element_to_data(element)).with_page_id(to_page);
                        services::page::broadcast(state, &add, None).await;
                    }
                    // Arrows left behind lost their cross-page links.
                    for element in &page_move.unlinked {
                        let update = Frame::request("element:update", link_fields_data(element))
                            .with_page_id(page_id)
                            .with_data("id", element.id.to_string());
                        services::page::broadcast(state, &update, None).await;
                    }
                    let mut reply = Data::new();
                    reply.insert("moved".into(), serde_json::json!(page_move.moved.len()));
                    Ok(Outcome::Reply(reply))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown element op: {op}"))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == frames::Status::Error {
        let message = frame.data.get("message").and_then(|v| v.as_str()).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

fn frame_page_id(req: &Frame) -> Option<Uuid> {
    req.page_id.or_else(|| {
        req.data
            .get("page_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    })
}

fn data_value(req: &Frame) -> Value {
    Value::Object(req.data.clone().into_iter().collect::<Map<String, Value>>())
}

fn data_id(req: &Frame) -> Option<ElementId> {
    req.data
        .get("id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

fn data_f64(req: &Frame, key: &str) -> Option<f64> {
    req.data.get(key).and_then(Value::as_f64)
}

fn parse_id_list(req: &Frame, key: &str) -> Vec<ElementId> {
    req.data
        .get(key)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().and_then(|s| s.parse().ok()))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_moves(req: &Frame) -> Vec<(ElementId, f64, f64)> {
    req.data
        .get("moves")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let id = entry.get("id")?.as_str()?.parse().ok()?;
                    let x = entry.get("x").and_then(Value::as_f64)?;
                    let y = entry.get("y").and_then(Value::as_f64)?;
                    Some((id, x, y))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn delete_targets(req: &Frame) -> Vec<ElementId> {
    if let Some(id) = data_id(req) {
        return vec![id];
    }
    parse_id_list(req, "ids")
}

fn element_to_data(element: &Element) -> Data {
    match serde_json::to_value(element) {
        Ok(Value::Object(map)) => map.into_iter().collect(),
        _ => Data::new(),
    }
}

/// Sparse update payload carrying only the smart-link fields; `null`
/// clears on receivers.
fn link_fields_data(element: &Element) -> Data {
    let mut data = Data::new();
    data.insert(
        "start_element_id".into(),
        element
            .start_element_id
            .map_or(Value::Null, |id| Value::String(id.to_string())),
    );
    data.insert(
        "end_element_id".into(),
        element
            .end_element_id
            .map_or(Value::Null, |id| Value::String(id.to_string())),
    );
    data.insert("version".into(), serde_json::json!(element.version));
    data
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
