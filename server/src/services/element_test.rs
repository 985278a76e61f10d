#![allow(clippy::float_cmp)]

use scene::doc::{ElementKind, ElementSeed, PartialElement};
use serde_json::json;
use uuid::Uuid;

use super::*;
use crate::state::test_helpers;

async fn create_rect(state: &AppState, page_id: Uuid, x: f64, y: f64) -> Element {
    create_element(state, page_id, ElementSeed::new(ElementKind::Rectangle, x, y))
        .await
        .unwrap()
}

#[tokio::test]
async fn create_element_assigns_id_and_appends() {
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;

    let element = create_rect(&state, page_id, 10.0, 20.0).await;
    assert_eq!(element.page_id, page_id);
    assert_eq!(element.kind, ElementKind::Rectangle);
    assert_eq!((element.x, element.y), (10.0, 20.0));
    assert_eq!(element.version, 1);

    let pages = state.pages.read().await;
    let page = pages.get(&page_id).unwrap();
    assert_eq!(page.store.order(), &[element.id]);
    assert!(page.dirty.contains(&element.id));
    assert!(page.order_dirty);
}

#[tokio::test]
async fn create_element_page_not_loaded() {
    let state = test_helpers::test_app_state();
    let result = create_element(
        &state,
        Uuid::new_v4(),
        ElementSeed::new(ElementKind::Text, 0.0, 0.0),
    )
    .await;
    assert!(matches!(result.unwrap_err(), ElementError::PageNotLoaded(_)));
}

#[tokio::test]
async fn update_element_merges_and_bumps_version() {
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;
    let element = create_rect(&state, page_id, 0.0, 0.0).await;

    let fields = PartialElement {
        x: Some(50.0),
        content: Some(json!({"fill": "#123456"})),
        ..Default::default()
    };
    let updated = update_element(&state, page_id, element.id, &fields)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.x, 50.0);
    assert_eq!(updated.content["fill"], "#123456");
    assert_eq!(updated.version, 2);

    let pages = state.pages.read().await;
    assert!(pages.get(&page_id).unwrap().dirty.contains(&element.id));
}

#[tokio::test]
async fn update_unknown_element_is_benign() {
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;
    let fields = PartialElement { x: Some(1.0), ..Default::default() };
    let result = update_element(&state, page_id, Uuid::new_v4(), &fields)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn later_write_wins_regardless_of_origin() {
    // Two writers race on the same field; whoever the relay applies second
    // stands, with no causal comparison.
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;
    let element = create_rect(&state, page_id, 0.0, 0.0).await;

    let first = PartialElement { content: Some(json!({"fill": "#aaaaaa"})), ..Default::default() };
    let second = PartialElement { content: Some(json!({"fill": "#bbbbbb"})), ..Default::default() };
    update_element(&state, page_id, element.id, &first).await.unwrap();
    let after = update_element(&state, page_id, element.id, &second)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.content["fill"], "#bbbbbb");
    assert_eq!(after.version, 3);
}

#[tokio::test]
async fn move_element_sets_position() {
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;
    let element = create_rect(&state, page_id, 0.0, 0.0).await;

    let moved = move_element(&state, page_id, element.id, 31.0, 17.0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((moved.x, moved.y), (31.0, 17.0));
    assert_eq!(moved.version, 2);

    assert!(move_element(&state, page_id, Uuid::new_v4(), 1.0, 1.0)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn batch_move_skips_unknown_ids() {
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;
    let a = create_rect(&state, page_id, 0.0, 0.0).await;
    let b = create_rect(&state, page_id, 10.0, 0.0).await;

    let moves = vec![(a.id, 100.0, 0.0), (Uuid::new_v4(), 5.0, 5.0), (b.id, 200.0, 0.0)];
    let updated = batch_move(&state, page_id, &moves).await.unwrap();
    assert_eq!(updated.len(), 2);
    assert_eq!(updated[0].x, 100.0);
    assert_eq!(updated[1].x, 200.0);
}

#[tokio::test]
async fn reorder_keeps_unmentioned_elements() {
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;
    let a = create_rect(&state, page_id, 0.0, 0.0).await;
    let b = create_rect(&state, page_id, 10.0, 0.0).await;
    let c = create_rect(&state, page_id, 20.0, 0.0).await;

    let applied = reorder_elements(&state, page_id, &[b.id, Uuid::new_v4(), a.id])
        .await
        .unwrap();
    assert_eq!(applied, vec![b.id, a.id, c.id]);

    let pages = state.pages.read().await;
    assert!(pages.get(&page_id).unwrap().order_dirty);
}

#[tokio::test]
#[ignore = "delete_elements hits Postgres via sqlx::query"]
async fn delete_elements_removes_rows() {
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;
    let element = create_rect(&state, page_id, 0.0, 0.0).await;
    let _ = delete_elements(&state, page_id, &[element.id]).await;
}

#[tokio::test]
async fn move_to_page_recreates_and_drops_cross_links() {
    let state = test_helpers::test_app_state();
    let source = test_helpers::seed_page(&state).await;
    let target = test_helpers::seed_page(&state).await;

    let anchor = create_rect(&state, source, 0.0, 0.0).await;
    let rider = create_rect(&state, source, 50.0, 0.0).await;
    // An arrow staying behind, linked to the element about to leave.
    let mut arrow_seed = ElementSeed::new(ElementKind::Arrow, 10.0, 10.0);
    arrow_seed.start_element_id = Some(anchor.id);
    arrow_seed.end_element_id = Some(rider.id);
    let arrow = create_element(&state, source, arrow_seed).await.unwrap();

    let result = move_to_page(&state, source, target, &[rider.id]).await.unwrap();
    assert_eq!(result.moved.len(), 1);
    assert_eq!(result.moved[0].page_id, target);
    assert_eq!(result.unlinked.len(), 1);
    assert_eq!(result.unlinked[0].id, arrow.id);
    // The link into the moved set is gone; the intra-page link survives.
    assert!(result.unlinked[0].end_element_id.is_none());
    assert_eq!(result.unlinked[0].start_element_id, Some(anchor.id));

    let pages = state.pages.read().await;
    let source_page = pages.get(&source).unwrap();
    assert!(!source_page.store.contains(&rider.id));
    let target_page = pages.get(&target).unwrap();
    assert!(target_page.store.contains(&rider.id));
    assert_eq!(target_page.store.get(&rider.id).unwrap().page_id, target);
}

#[tokio::test]
async fn move_to_page_drops_links_on_the_moved_arrow() {
    let state = test_helpers::test_app_state();
    let source = test_helpers::seed_page(&state).await;
    let target = test_helpers::seed_page(&state).await;

    let anchor = create_rect(&state, source, 0.0, 0.0).await;
    let mut arrow_seed = ElementSeed::new(ElementKind::Arrow, 10.0, 10.0);
    arrow_seed.start_element_id = Some(anchor.id);
    let arrow = create_element(&state, source, arrow_seed).await.unwrap();

    let result = move_to_page(&state, source, target, &[arrow.id]).await.unwrap();
    assert_eq!(result.moved.len(), 1);
    // The moved arrow's link pointed back across the boundary; dropped.
    assert!(result.moved[0].start_element_id.is_none());
    assert!(result.unlinked.is_empty());
}

#[tokio::test]
async fn move_to_page_with_unknown_ids_is_empty() {
    let state = test_helpers::test_app_state();
    let source = test_helpers::seed_page(&state).await;
    let target = test_helpers::seed_page(&state).await;
    let result = move_to_page(&state, source, target, &[Uuid::new_v4()]).await.unwrap();
    assert!(result.moved.is_empty());
    assert!(result.unlinked.is_empty());
}
