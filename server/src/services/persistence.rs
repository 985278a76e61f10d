//! Persistence service — background flush for dirty elements.
//!
//! DESIGN
//! ======
//! A background task snapshots every page's dirty elements under the lock,
//! performs the Postgres writes lock-free, then acknowledges. Dirty flags
//! are cleared only after successful writes: repeated upserts are
//! acceptable, silent data loss is not. A transient failure leaves the
//! flags in place and the next cycle retries — in-memory state is never
//! rolled back.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::services::page::{self, FlushBatch};
use crate::state::AppState;

const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Spawn the background persistence task. Returns a handle for shutdown.
pub fn spawn_persistence_task(state: AppState) -> JoinHandle<()> {
    let flush_interval_ms = env_parse("ELEMENT_FLUSH_INTERVAL_MS", DEFAULT_FLUSH_INTERVAL_MS);
    info!(flush_interval_ms, "element persistence flush configured");
    tokio::spawn(async move {
        loop {
            flush_all_dirty(&state).await;
            tokio::time::sleep(Duration::from_millis(flush_interval_ms)).await;
        }
    })
}

async fn flush_all_dirty(state: &AppState) {
    // PHASE: SNAPSHOT DIRTY ELEMENTS
    // WHY: collect immutable clones under lock, then perform I/O lock-free.
    let batches: Vec<(Uuid, FlushBatch)> = {
        let pages = state.pages.read().await;
        pages
            .iter()
            .filter_map(|(page_id, page)| page::collect_flush_batch(page).map(|batch| (*page_id, batch)))
            .collect()
    };

    // PHASE: FLUSH PER PAGE + ACK DIRTY FLAGS
    // WHY: if a flush fails the flags stay set and the next cycle retries.
    for (page_id, batch) in batches {
        match page::flush_elements(&state.pool, &batch.rows).await {
            Ok(()) => {
                let mut pages = state.pages.write().await;
                if let Some(page) = pages.get_mut(&page_id) {
                    page::acknowledge_flush(page, &batch);
                }
            }
            Err(e) => {
                error!(error = %e, count = batch.rows.len(), %page_id, "persistence flush failed");
            }
        }
    }
}

#[cfg(test)]
pub(crate) async fn flush_all_dirty_for_tests(state: &AppState) {
    flush_all_dirty(state).await;
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
