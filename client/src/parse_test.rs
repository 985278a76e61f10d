use frames::{Data, Frame};
use scene::doc::{Element, ElementKind, ElementSeed, RemoteEvent};
use serde_json::json;
use uuid::Uuid;

use super::*;

fn page() -> Uuid {
    Uuid::from_u128(0x11)
}

fn sample_element() -> Element {
    ElementSeed::new(ElementKind::Rectangle, 5.0, 6.0).into_element(Uuid::new_v4(), page(), 1)
}

fn frame_with(syscall: &str, data: serde_json::Value) -> Frame {
    let mut map = Data::new();
    if let serde_json::Value::Object(object) = data {
        map.extend(object);
    }
    Frame::request(syscall, map).with_page_id(page())
}

#[test]
fn add_round_trips_through_emit() {
    let element = sample_element();
    let mut frame = crate::emit::element_add(page(), &ElementSeed::new(ElementKind::Rectangle, 5.0, 6.0));
    // The relay's broadcast carries the full record, id and version included.
    frame.data.insert("id".into(), json!(element.id.to_string()));
    frame.data.insert("page_id".into(), json!(page().to_string()));
    frame.data.insert("version".into(), json!(1));

    let Some(RemoteEvent::Added(parsed)) = remote_event(&frame) else {
        panic!("expected an add event");
    };
    assert_eq!(parsed.id, element.id);
    assert_eq!(parsed.kind, ElementKind::Rectangle);
    assert_eq!(parsed.page_id, page());
}

#[test]
fn add_without_id_is_discarded() {
    let frame = frame_with("element:add", json!({"kind": "rectangle", "x": 1.0, "y": 2.0}));
    assert!(remote_event(&frame).is_none());
}

#[test]
fn update_parses_sparse_fields() {
    let id = Uuid::new_v4();
    let frame = frame_with(
        "element:update",
        json!({"id": id.to_string(), "x": 9.0, "content": {"fill": "#fff"}, "group_id": null}),
    );
    let Some(RemoteEvent::Updated { id: parsed_id, fields }) = remote_event(&frame) else {
        panic!("expected an update event");
    };
    assert_eq!(parsed_id, id);
    assert_eq!(fields.x, Some(9.0));
    assert!(fields.y.is_none());
    assert_eq!(fields.content, Some(json!({"fill": "#fff"})));
    assert_eq!(fields.group_id, Some(None));
}

#[test]
fn update_without_id_is_discarded() {
    let frame = frame_with("element:update", json!({"x": 9.0}));
    assert!(remote_event(&frame).is_none());
}

#[test]
fn move_parses_position() {
    let id = Uuid::new_v4();
    let frame = frame_with("element:move", json!({"id": id.to_string(), "x": 3.0, "y": 4.0}));
    let Some(RemoteEvent::Moved { id: parsed_id, x, y }) = remote_event(&frame) else {
        panic!("expected a move event");
    };
    assert_eq!(parsed_id, id);
    assert!((x - 3.0).abs() < f64::EPSILON);
    assert!((y - 4.0).abs() < f64::EPSILON);
}

#[test]
fn move_with_missing_coordinate_is_discarded() {
    let id = Uuid::new_v4();
    let frame = frame_with("element:move", json!({"id": id.to_string(), "x": 3.0}));
    assert!(remote_event(&frame).is_none());
}

#[test]
fn delete_parses_id() {
    let id = Uuid::new_v4();
    let frame = frame_with("element:delete", json!({"id": id.to_string()}));
    assert!(matches!(remote_event(&frame), Some(RemoteEvent::Deleted { id: parsed }) if parsed == id));
}

#[test]
fn reorder_takes_page_from_frame_scope() {
    let ids = [Uuid::new_v4(), Uuid::new_v4()];
    let frame = frame_with(
        "element:reorder",
        json!({"order": [ids[0].to_string(), ids[1].to_string()]}),
    );
    let Some(RemoteEvent::Reordered { page_id, order }) = remote_event(&frame) else {
        panic!("expected a reorder event");
    };
    assert_eq!(page_id, page());
    assert_eq!(order, ids);
}

#[test]
fn reorder_skips_malformed_ids() {
    let good = Uuid::new_v4();
    let frame = frame_with(
        "element:reorder",
        json!({"order": [good.to_string(), "not-a-uuid", 42]}),
    );
    let Some(RemoteEvent::Reordered { order, .. }) = remote_event(&frame) else {
        panic!("expected a reorder event");
    };
    assert_eq!(order, vec![good]);
}

#[test]
fn unrelated_syscalls_are_ignored() {
    let frame = frame_with("page:join", json!({}));
    assert!(remote_event(&frame).is_none());
    let frame = frame_with("cursor:move", json!({"x": 1.0}));
    assert!(remote_event(&frame).is_none());
}

#[test]
fn join_snapshot_parses_elements() {
    let element = sample_element();
    let element_id = element.id;
    let frame = frame_with("page:join", json!({"elements": [element]}));
    let (page_id, elements) = join_snapshot(&frame).unwrap();
    assert_eq!(page_id, page());
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].id, element_id);
}

#[test]
fn join_snapshot_requires_elements_array() {
    let frame = frame_with("page:join", json!({"elements": "oops"}));
    assert!(join_snapshot(&frame).is_none());
}
