#![allow(clippy::float_cmp)]

use serde_json::json;
use uuid::Uuid;

use super::*;

fn page() -> Uuid {
    Uuid::from_u128(0x11)
}

fn make_element(kind: ElementKind) -> Element {
    Element {
        id: Uuid::new_v4(),
        page_id: page(),
        kind,
        x: 0.0,
        y: 0.0,
        width: Some(100.0),
        height: Some(80.0),
        group_id: None,
        start_element_id: None,
        end_element_id: None,
        content: json!({}),
        version: 1,
    }
}

fn loaded_store(elements: Vec<Element>) -> ElementStore {
    let mut store = ElementStore::new();
    store.load(page(), elements);
    store
}

// =============================================================
// ElementKind serde
// =============================================================

#[test]
fn kind_serde_all_variants() {
    let cases = [
        (ElementKind::Rectangle, "\"rectangle\""),
        (ElementKind::Text, "\"text\""),
        (ElementKind::Arrow, "\"arrow\""),
        (ElementKind::Image, "\"image\""),
        (ElementKind::Video, "\"video\""),
    ];
    for (kind, expected) in cases {
        assert_eq!(serde_json::to_string(&kind).unwrap(), expected);
        let back: ElementKind = serde_json::from_str(expected).unwrap();
        assert_eq!(back, kind);
    }
}

#[test]
fn kind_deserialize_invalid_rejects() {
    assert!(serde_json::from_str::<ElementKind>("\"hexagon\"").is_err());
}

// =============================================================
// Element serde & helpers
// =============================================================

#[test]
fn element_serde_round_trip() {
    let mut el = make_element(ElementKind::Rectangle);
    el.group_id = Some("g1".into());
    el.content = json!({"fill": "#ff0000"});
    let serialized = serde_json::to_string(&el).unwrap();
    let back: Element = serde_json::from_str(&serialized).unwrap();
    assert_eq!(back.id, el.id);
    assert_eq!(back.kind, el.kind);
    assert_eq!(back.group_id.as_deref(), Some("g1"));
    assert_eq!(back.content, el.content);
    assert_eq!(back.version, el.version);
}

#[test]
fn element_center_uses_size() {
    let mut el = make_element(ElementKind::Rectangle);
    el.x = 10.0;
    el.y = 20.0;
    el.width = Some(100.0);
    el.height = Some(40.0);
    assert_eq!(el.center(), (60.0, 40.0));
}

#[test]
fn element_center_without_size_is_position() {
    let mut el = make_element(ElementKind::Text);
    el.x = 7.0;
    el.y = 9.0;
    el.width = None;
    el.height = None;
    assert_eq!(el.center(), (7.0, 9.0));
}

#[test]
fn set_points_drops_unpaired_tail() {
    let mut el = make_element(ElementKind::Arrow);
    el.set_points(&[0.0, 0.0, 50.0, 25.0, 99.0]);
    assert_eq!(el.content().points(), vec![0.0, 0.0, 50.0, 25.0]);
}

// =============================================================
// Content accessor
// =============================================================

#[test]
fn content_defaults_on_empty_bag() {
    let value = json!({});
    let c = Content::new(&value);
    assert_eq!(c.fill(), crate::consts::DEFAULT_FILL);
    assert_eq!(c.stroke(), crate::consts::DEFAULT_STROKE);
    assert_eq!(c.stroke_width(), 1.0);
    assert_eq!(c.text(), "");
    assert_eq!(c.font_size(), crate::consts::DEFAULT_FONT_SIZE);
    assert_eq!(c.font_style(), "normal");
    assert_eq!(c.url(), "");
    assert!(!c.is_playing());
    assert!(c.is_muted());
    assert_eq!(c.rating(), 0);
    assert!(c.points().is_empty());
}

#[test]
fn content_reads_all_values() {
    let value = json!({
        "fill": "#aabbcc",
        "stroke": "#112233",
        "strokeWidth": 3.0,
        "text": "scene 4",
        "fontSize": 22.0,
        "fontStyle": "bold",
        "url": "https://example.com/clip.mp4",
        "isPlaying": true,
        "isMuted": false,
        "rating": 4,
        "points": [0.0, 0.0, 10.0, 5.0]
    });
    let c = Content::new(&value);
    assert_eq!(c.fill(), "#aabbcc");
    assert_eq!(c.stroke(), "#112233");
    assert_eq!(c.stroke_width(), 3.0);
    assert_eq!(c.text(), "scene 4");
    assert_eq!(c.font_size(), 22.0);
    assert_eq!(c.font_style(), "bold");
    assert_eq!(c.url(), "https://example.com/clip.mp4");
    assert!(c.is_playing());
    assert!(!c.is_muted());
    assert_eq!(c.rating(), 4);
    assert_eq!(c.points(), vec![0.0, 0.0, 10.0, 5.0]);
}

#[test]
fn content_wrong_types_use_defaults() {
    let value = json!({"fill": 42, "strokeWidth": "thick", "points": "zigzag"});
    let c = Content::new(&value);
    assert_eq!(c.fill(), crate::consts::DEFAULT_FILL);
    assert_eq!(c.stroke_width(), 1.0);
    assert!(c.points().is_empty());
}

// =============================================================
// ElementSeed defaults
// =============================================================

#[test]
fn seed_rectangle_defaults() {
    let seed = ElementSeed::new(ElementKind::Rectangle, 5.0, 6.0);
    assert_eq!(seed.width, Some(crate::consts::DEFAULT_RECT_SIZE));
    assert_eq!(seed.height, Some(crate::consts::DEFAULT_RECT_SIZE));
    assert_eq!(seed.content["fill"], crate::consts::DEFAULT_FILL);
}

#[test]
fn seed_arrow_has_points_and_no_size() {
    let seed = ElementSeed::new(ElementKind::Arrow, 0.0, 0.0);
    assert!(seed.width.is_none());
    assert!(seed.height.is_none());
    assert_eq!(seed.content["points"], json!([0.0, 0.0, 100.0, 0.0]));
}

#[test]
fn seed_into_element_carries_everything() {
    let id = Uuid::new_v4();
    let seed = ElementSeed::new(ElementKind::Video, 10.0, 20.0);
    let el = seed.into_element(id, page(), 1);
    assert_eq!(el.id, id);
    assert_eq!(el.page_id, page());
    assert_eq!(el.kind, ElementKind::Video);
    assert_eq!(el.x, 10.0);
    assert!(el.content().is_muted());
    assert_eq!(el.version, 1);
}

// =============================================================
// PartialElement serde
// =============================================================

#[test]
fn partial_skip_serializes_only_present_fields() {
    let p = PartialElement { x: Some(10.0), ..Default::default() };
    let serialized = serde_json::to_string(&p).unwrap();
    assert!(serialized.contains("\"x\""));
    assert!(!serialized.contains("\"y\""));
    assert!(!serialized.contains("group_id"));
    assert!(!serialized.contains("content"));
}

#[test]
fn partial_group_null_deserializes_to_clear() {
    let p: PartialElement = serde_json::from_str(r#"{"group_id": null}"#).unwrap();
    assert_eq!(p.group_id, Some(None));

    let p: PartialElement = serde_json::from_str(r#"{"group_id": "g2"}"#).unwrap();
    assert_eq!(p.group_id, Some(Some("g2".into())));

    let p: PartialElement = serde_json::from_str("{}").unwrap();
    assert_eq!(p.group_id, None);
}

// =============================================================
// ElementStore: load / insert / remove / order
// =============================================================

#[test]
fn store_new_is_empty_and_unscoped() {
    let store = ElementStore::new();
    assert!(store.is_empty());
    assert!(store.page_id().is_none());
}

#[test]
fn load_scopes_and_orders() {
    let a = make_element(ElementKind::Rectangle);
    let b = make_element(ElementKind::Text);
    let (ida, idb) = (a.id, b.id);
    let store = loaded_store(vec![a, b]);
    assert_eq!(store.page_id(), Some(page()));
    assert_eq!(store.order(), &[ida, idb]);
    assert_eq!(store.len(), 2);
}

#[test]
fn insert_appends_to_paint_order() {
    let mut store = loaded_store(vec![make_element(ElementKind::Rectangle)]);
    let el = make_element(ElementKind::Text);
    let id = el.id;
    store.insert(el);
    assert_eq!(store.order().last(), Some(&id));
}

#[test]
fn insert_existing_id_replaces_without_reordering() {
    let a = make_element(ElementKind::Rectangle);
    let b = make_element(ElementKind::Rectangle);
    let (ida, idb) = (a.id, b.id);
    let mut store = loaded_store(vec![a, b.clone()]);

    let mut replacement = b;
    replacement.x = 999.0;
    store.insert(replacement);
    assert_eq!(store.order(), &[ida, idb]);
    assert_eq!(store.get(&idb).unwrap().x, 999.0);
}

#[test]
fn remove_drops_from_order() {
    let a = make_element(ElementKind::Rectangle);
    let b = make_element(ElementKind::Rectangle);
    let (ida, idb) = (a.id, b.id);
    let mut store = loaded_store(vec![a, b]);
    assert!(store.remove(&ida).is_some());
    assert_eq!(store.order(), &[idb]);
    assert!(store.remove(&ida).is_none());
}

#[test]
fn set_order_drops_unknown_and_keeps_local_extras() {
    let a = make_element(ElementKind::Rectangle);
    let b = make_element(ElementKind::Rectangle);
    let c = make_element(ElementKind::Rectangle);
    let (ida, idb, idc) = (a.id, b.id, c.id);
    let mut store = loaded_store(vec![a, b, c]);

    // Stale order from a peer that never saw `c` and still lists a ghost.
    let ghost = Uuid::new_v4();
    store.set_order(&[idb, ghost, ida]);

    assert_eq!(store.order(), &[idb, ida, idc]);
    assert!(store.get(&idc).is_some());
}

// =============================================================
// ElementStore: apply_partial
// =============================================================

#[test]
fn apply_partial_top_level_fields() {
    let el = make_element(ElementKind::Rectangle);
    let id = el.id;
    let mut store = loaded_store(vec![el]);
    let partial = PartialElement {
        x: Some(50.0),
        y: Some(60.0),
        width: Some(200.0),
        height: Some(150.0),
        version: Some(7),
        ..Default::default()
    };
    assert!(store.apply_partial(&id, &partial));
    let updated = store.get(&id).unwrap();
    assert_eq!(updated.x, 50.0);
    assert_eq!(updated.y, 60.0);
    assert_eq!(updated.width, Some(200.0));
    assert_eq!(updated.height, Some(150.0));
    assert_eq!(updated.version, 7);
}

#[test]
fn apply_partial_content_merges_and_null_deletes() {
    let mut el = make_element(ElementKind::Rectangle);
    el.content = json!({"fill": "#ff0000", "stroke": "#000000"});
    let id = el.id;
    let mut store = loaded_store(vec![el]);

    let partial = PartialElement {
        content: Some(json!({"fill": "#00ff00", "stroke": null, "strokeWidth": 4.0})),
        ..Default::default()
    };
    assert!(store.apply_partial(&id, &partial));
    let content = &store.get(&id).unwrap().content;
    assert_eq!(content["fill"], "#00ff00");
    assert!(content.get("stroke").is_none());
    assert_eq!(content["strokeWidth"], 4.0);
}

#[test]
fn apply_partial_content_and_top_level_in_one_event() {
    let el = make_element(ElementKind::Rectangle);
    let id = el.id;
    let mut store = loaded_store(vec![el]);

    let partial = PartialElement {
        x: Some(42.0),
        content: Some(json!({"fill": "#123456"})),
        ..Default::default()
    };
    assert!(store.apply_partial(&id, &partial));
    let updated = store.get(&id).unwrap();
    assert_eq!(updated.x, 42.0);
    assert_eq!(updated.content["fill"], "#123456");
}

#[test]
fn apply_partial_clears_group_and_links() {
    let mut el = make_element(ElementKind::Arrow);
    el.group_id = Some("g1".into());
    el.end_element_id = Some(Uuid::new_v4());
    let id = el.id;
    let mut store = loaded_store(vec![el]);

    let partial = PartialElement {
        group_id: Some(None),
        end_element_id: Some(None),
        ..Default::default()
    };
    assert!(store.apply_partial(&id, &partial));
    let updated = store.get(&id).unwrap();
    assert!(updated.group_id.is_none());
    assert!(updated.end_element_id.is_none());
}

#[test]
fn apply_partial_unknown_id_returns_false() {
    let mut store = loaded_store(vec![]);
    let partial = PartialElement { x: Some(1.0), ..Default::default() };
    assert!(!store.apply_partial(&Uuid::new_v4(), &partial));
}

#[test]
fn apply_partial_non_object_content_rejected() {
    let el = make_element(ElementKind::Rectangle);
    let id = el.id;
    let mut store = loaded_store(vec![el]);
    let partial = PartialElement { content: Some(json!(42)), ..Default::default() };
    assert!(!store.apply_partial(&id, &partial));
}

#[test]
fn apply_partial_initializes_non_object_content() {
    let mut el = make_element(ElementKind::Rectangle);
    el.content = json!(null);
    let id = el.id;
    let mut store = loaded_store(vec![el]);
    let partial = PartialElement { content: Some(json!({"fill": "#00ff00"})), ..Default::default() };
    assert!(store.apply_partial(&id, &partial));
    assert_eq!(store.get(&id).unwrap().content["fill"], "#00ff00");
}

// =============================================================
// ElementStore: merge_remote
// =============================================================

#[test]
fn merge_add_is_idempotent() {
    let mut store = loaded_store(vec![]);
    let mut el = make_element(ElementKind::Rectangle);
    el.x = 1.0;
    let event = RemoteEvent::Added(el.clone());

    store.merge_remote(&event);
    assert_eq!(store.len(), 1);

    // The echo carries the same id; the second apply must not duplicate or
    // clobber later local state.
    store.get_mut(&el.id).unwrap().x = 99.0;
    store.merge_remote(&event);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(&el.id).unwrap().x, 99.0);
}

#[test]
fn merge_add_for_other_page_ignored() {
    let mut store = loaded_store(vec![]);
    let mut el = make_element(ElementKind::Rectangle);
    el.page_id = Uuid::from_u128(0x22);
    store.merge_remote(&RemoteEvent::Added(el));
    assert!(store.is_empty());
}

#[test]
fn merge_update_unknown_id_is_noop() {
    let mut store = loaded_store(vec![make_element(ElementKind::Rectangle)]);
    let event = RemoteEvent::Updated {
        id: Uuid::new_v4(),
        fields: PartialElement { x: Some(5.0), ..Default::default() },
    };
    store.merge_remote(&event);
    assert_eq!(store.len(), 1);
}

#[test]
fn merge_update_applied_twice_is_stable() {
    let el = make_element(ElementKind::Rectangle);
    let id = el.id;
    let mut store = loaded_store(vec![el]);
    let event = RemoteEvent::Updated {
        id,
        fields: PartialElement { x: Some(5.0), content: Some(json!({"fill": "#fff"})), ..Default::default() },
    };
    store.merge_remote(&event);
    let once = store.get(&id).unwrap().clone();
    store.merge_remote(&event);
    let twice = store.get(&id).unwrap();
    assert_eq!(twice.x, once.x);
    assert_eq!(twice.content, once.content);
}

#[test]
fn merge_move_updates_position() {
    let el = make_element(ElementKind::Rectangle);
    let id = el.id;
    let mut store = loaded_store(vec![el]);
    store.merge_remote(&RemoteEvent::Moved { id, x: 31.0, y: 17.0 });
    let moved = store.get(&id).unwrap();
    assert_eq!((moved.x, moved.y), (31.0, 17.0));
}

#[test]
fn merge_delete_unknown_id_is_noop() {
    let mut store = loaded_store(vec![make_element(ElementKind::Rectangle)]);
    store.merge_remote(&RemoteEvent::Deleted { id: Uuid::new_v4() });
    assert_eq!(store.len(), 1);
}

#[test]
fn merge_delete_applied_twice_is_stable() {
    let el = make_element(ElementKind::Rectangle);
    let id = el.id;
    let mut store = loaded_store(vec![el]);
    let event = RemoteEvent::Deleted { id };
    store.merge_remote(&event);
    store.merge_remote(&event);
    assert!(store.is_empty());
}

#[test]
fn merge_reorder_for_other_page_ignored() {
    let a = make_element(ElementKind::Rectangle);
    let b = make_element(ElementKind::Rectangle);
    let (ida, idb) = (a.id, b.id);
    let mut store = loaded_store(vec![a, b]);
    store.merge_remote(&RemoteEvent::Reordered {
        page_id: Uuid::from_u128(0x22),
        order: vec![idb, ida],
    });
    assert_eq!(store.order(), &[ida, idb]);
}

#[test]
fn merge_reorder_never_destroys_unacknowledged_local_element() {
    let a = make_element(ElementKind::Rectangle);
    let b = make_element(ElementKind::Rectangle);
    let local = make_element(ElementKind::Rectangle);
    let (ida, idb, id_local) = (a.id, b.id, local.id);
    let mut store = loaded_store(vec![a, b, local]);

    // A stale reorder from before the peer learned about `local`.
    store.merge_remote(&RemoteEvent::Reordered { page_id: page(), order: vec![idb, ida] });
    assert_eq!(store.order(), &[idb, ida, id_local]);
    assert!(store.get(&id_local).is_some());
}

// =============================================================
// ElementStore: snapshot / restore
// =============================================================

#[test]
fn snapshot_restore_round_trip() {
    let a = make_element(ElementKind::Rectangle);
    let b = make_element(ElementKind::Text);
    let order: Vec<ElementId> = vec![a.id, b.id];
    let mut store = loaded_store(vec![a, b]);

    let snapshot = store.snapshot();
    store.remove(&order[0]);
    store.get_mut(&order[1]).unwrap().x = 500.0;

    store.restore(snapshot);
    assert_eq!(store.order(), order.as_slice());
    assert_eq!(store.get(&order[1]).unwrap().x, 0.0);
    assert_eq!(store.page_id(), Some(page()));
}
