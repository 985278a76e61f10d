#![allow(clippy::float_cmp)]

use frames::{Data, Frame};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::*;
use crate::state::test_helpers;

fn dirty_page(elements: usize) -> (PageState, Vec<ElementId>) {
    let page_id = Uuid::new_v4();
    let mut page = PageState::new();
    let mut ids = Vec::new();
    let loaded: Vec<Element> = (0..elements)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let el = scene::doc::ElementSeed::new(ElementKind::Rectangle, i as f64, 0.0)
                .into_element(Uuid::new_v4(), page_id, 1);
            ids.push(el.id);
            el
        })
        .collect();
    page.store.load(page_id, loaded);
    (page, ids)
}

// =============================================================
// Flush batch snapshotting
// =============================================================

#[test]
fn clean_page_yields_no_batch() {
    let (page, _) = dirty_page(2);
    assert!(collect_flush_batch(&page).is_none());
}

#[test]
fn dirty_elements_flush_with_their_position() {
    let (mut page, ids) = dirty_page(3);
    page.dirty.insert(ids[2]);

    let batch = collect_flush_batch(&page).unwrap();
    assert_eq!(batch.rows.len(), 1);
    assert_eq!(batch.rows[0].0.id, ids[2]);
    assert_eq!(batch.rows[0].1, 2);
    assert!(batch.order_snapshot.is_none());
}

#[test]
fn order_dirty_flushes_every_element() {
    let (mut page, ids) = dirty_page(3);
    page.order_dirty = true;

    let batch = collect_flush_batch(&page).unwrap();
    assert_eq!(batch.rows.len(), 3);
    assert_eq!(batch.order_snapshot.as_deref(), Some(ids.as_slice()));
}

#[test]
fn acknowledge_clears_only_unchanged_versions() {
    let (mut page, ids) = dirty_page(2);
    page.dirty.insert(ids[0]);
    page.dirty.insert(ids[1]);
    let batch = collect_flush_batch(&page).unwrap();

    // Element 1 was edited again while the flush was in flight.
    page.store.get_mut(&ids[1]).unwrap().version += 1;
    acknowledge_flush(&mut page, &batch);

    assert!(!page.dirty.contains(&ids[0]));
    assert!(page.dirty.contains(&ids[1]));
}

#[test]
fn acknowledge_clears_flag_for_deleted_elements() {
    let (mut page, ids) = dirty_page(1);
    page.dirty.insert(ids[0]);
    let batch = collect_flush_batch(&page).unwrap();

    page.store.remove(&ids[0]);
    acknowledge_flush(&mut page, &batch);
    assert!(page.dirty.is_empty());
}

#[test]
fn acknowledge_keeps_order_flag_when_order_moved_on() {
    let (mut page, ids) = dirty_page(2);
    page.order_dirty = true;
    let batch = collect_flush_batch(&page).unwrap();

    // The order changed again mid-flush; the flag must survive.
    page.store.set_order(&[ids[1], ids[0]]);
    acknowledge_flush(&mut page, &batch);
    assert!(page.order_dirty);

    // A flush of the new order clears it.
    let batch = collect_flush_batch(&page).unwrap();
    acknowledge_flush(&mut page, &batch);
    assert!(!page.order_dirty);
}

// =============================================================
// Broadcast
// =============================================================

#[tokio::test]
async fn broadcast_reaches_everyone_but_excluded() {
    let state = test_helpers::test_app_state();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    let (id_a, id_b) = (Uuid::new_v4(), Uuid::new_v4());
    {
        let mut clients = state.clients.write().await;
        clients.insert(id_a, tx_a);
        clients.insert(id_b, tx_b);
    }

    let frame = Frame::request("element:move", Data::new()).with_data("id", "x");
    broadcast(&state, &frame, Some(id_a)).await;

    assert!(rx_a.try_recv().is_err());
    let received = rx_b.try_recv().unwrap();
    assert_eq!(received.syscall, "element:move");
}

#[tokio::test]
async fn broadcast_without_exclusion_includes_origin() {
    let state = test_helpers::test_app_state();
    let (tx, mut rx) = mpsc::channel(8);
    let client = Uuid::new_v4();
    state.clients.write().await.insert(client, tx);

    let frame = Frame::request("element:delete", Data::new());
    broadcast(&state, &frame, None).await;
    assert!(rx.try_recv().is_ok());
}

// =============================================================
// Part / eviction
// =============================================================

#[tokio::test]
async fn part_page_evicts_clean_page() {
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;
    let client = Uuid::new_v4();
    state
        .pages
        .write()
        .await
        .get_mut(&page_id)
        .unwrap()
        .viewers
        .insert(client);

    part_page(&state, page_id, client).await;
    assert!(!state.pages.read().await.contains_key(&page_id));
}

#[tokio::test]
async fn part_page_keeps_state_while_viewers_remain() {
    let state = test_helpers::test_app_state();
    let page_id = test_helpers::seed_page(&state).await;
    let (leaving, staying) = (Uuid::new_v4(), Uuid::new_v4());
    {
        let mut pages = state.pages.write().await;
        let page = pages.get_mut(&page_id).unwrap();
        page.viewers.insert(leaving);
        page.viewers.insert(staying);
    }

    part_page(&state, page_id, leaving).await;
    let pages = state.pages.read().await;
    assert!(pages.contains_key(&page_id));
    assert_eq!(pages.get(&page_id).unwrap().viewers.len(), 1);
}

#[tokio::test]
async fn part_unknown_page_is_noop() {
    let state = test_helpers::test_app_state();
    part_page(&state, Uuid::new_v4(), Uuid::new_v4()).await;
}

// =============================================================
// Hydration (live database only)
// =============================================================

#[tokio::test]
#[ignore = "join_page hydrates from Postgres"]
async fn join_page_round_trips_elements() {
    let state = test_helpers::test_app_state();
    let _ = join_page(&state, Uuid::new_v4(), Uuid::new_v4()).await;
}
