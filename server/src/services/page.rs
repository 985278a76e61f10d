//! Page service — join/part, hydration from Postgres, broadcast, flush.
//!
//! DESIGN
//! ======
//! Page rows themselves are owned by an external collaborator; this service
//! only manages the live element state for pages clients are viewing. State
//! hydrates from Postgres when the first viewer joins and evicts when the
//! last viewer leaves.
//!
//! ERROR HANDLING
//! ==============
//! On last-viewer part, dirty elements are flushed before eviction. If that
//! flush fails, the page is intentionally kept in memory with dirty flags
//! intact so the persistence worker can retry instead of losing edits.

use scene::doc::{Element, ElementId, ElementKind};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use frames::Frame;

use crate::state::{AppState, PageState};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl frames::ErrorCode for PageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// Snapshot of what a flush will write, captured under the page lock so the
/// database I/O can run lock-free.
pub(crate) struct FlushBatch {
    /// Element rows with their paint-order position.
    pub rows: Vec<(Element, i32)>,
    /// `(id, version)` pairs used to acknowledge only unchanged elements.
    pub versions: Vec<(ElementId, i64)>,
    /// Paint order at snapshot time when the whole order is being written.
    pub order_snapshot: Option<Vec<ElementId>>,
}

// =============================================================================
// JOIN / PART
// =============================================================================

/// Join a page. Hydrates from Postgres if this is the first viewer.
/// Returns the element snapshot in paint order.
///
/// # Errors
///
/// Returns a database error if hydration fails.
pub async fn join_page(state: &AppState, page_id: Uuid, client_id: Uuid) -> Result<Vec<Element>, PageError> {
    // Fetch outside the lock; applied only when this viewer is the first.
    let hydrated = hydrate_elements(&state.pool, page_id).await?;

    let mut pages = state.pages.write().await;
    let page = pages.entry(page_id).or_insert_with(PageState::new);

    // A page retained after a failed flush keeps its in-memory edits; stale
    // rows must not clobber them.
    if page.viewers.is_empty() && page.dirty.is_empty() && !page.order_dirty {
        let count = hydrated.len();
        page.store.load(page_id, hydrated);
        info!(%page_id, count, "hydrated page from database");
    }

    page.viewers.insert(client_id);
    info!(%page_id, %client_id, viewers = page.viewers.len(), "client joined page");
    Ok(page.store.snapshot())
}

/// Leave a page. If this was the last viewer, flushes dirty elements and
/// evicts the page state from memory.
pub async fn part_page(state: &AppState, page_id: Uuid, client_id: Uuid) {
    let batch = {
        let mut pages = state.pages.write().await;
        let Some(page) = pages.get_mut(&page_id) else {
            return;
        };
        page.viewers.remove(&client_id);
        info!(%page_id, %client_id, remaining = page.viewers.len(), "client left page");

        if !page.viewers.is_empty() {
            return;
        }
        let Some(batch) = collect_flush_batch(page) else {
            pages.remove(&page_id);
            info!(%page_id, "evicted page from memory");
            return;
        };
        batch
    };

    // Flush outside the lock; dirty flags clear only after the write lands.
    let flush_result = flush_elements(&state.pool, &batch.rows).await;

    let mut pages = state.pages.write().await;
    let Some(page) = pages.get_mut(&page_id) else {
        return;
    };
    if !page.viewers.is_empty() {
        return;
    }

    match flush_result {
        Ok(()) => {
            acknowledge_flush(page, &batch);
            if page.dirty.is_empty() && !page.order_dirty {
                pages.remove(&page_id);
                info!(%page_id, "evicted page from memory");
            } else {
                warn!(%page_id, remaining_dirty = page.dirty.len(), "retaining page after final flush; newer edits exist");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, %page_id, "final flush failed; page retained for retry");
        }
    }
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Send a frame to every connected client, optionally excluding one.
/// Clients filter by `page_id` on receipt; the registry is connection-wide.
pub async fn broadcast(state: &AppState, frame: &Frame, exclude: Option<Uuid>) {
    let clients = state.clients.read().await;
    for (client_id, tx) in clients.iter() {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        let _ = tx.try_send(frame.clone());
    }
}

// =============================================================================
// FLUSH SNAPSHOTTING
// =============================================================================

/// Capture everything a flush must write for this page, or `None` when the
/// page is clean. When the order is dirty every element is written so that
/// positions stay consistent in one pass.
pub(crate) fn collect_flush_batch(page: &PageState) -> Option<FlushBatch> {
    if page.dirty.is_empty() && !page.order_dirty {
        return None;
    }
    let order = page.store.order().to_vec();
    let mut rows = Vec::new();
    for (position, id) in order.iter().enumerate() {
        if !page.order_dirty && !page.dirty.contains(id) {
            continue;
        }
        let Some(element) = page.store.get(id) else {
            continue;
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        rows.push((element.clone(), position as i32));
    }
    if rows.is_empty() && !page.order_dirty {
        return None;
    }
    let versions = rows.iter().map(|(el, _)| (el.id, el.version)).collect();
    let order_snapshot = page.order_dirty.then_some(order);
    Some(FlushBatch { rows, versions, order_snapshot })
}

/// Clear dirty flags covered by a successful flush. An element edited again
/// since the snapshot keeps its flag; the order flag clears only when the
/// order is still what was written.
pub(crate) fn acknowledge_flush(page: &mut PageState, batch: &FlushBatch) {
    for (element_id, flushed_version) in &batch.versions {
        let can_clear = match page.store.get(element_id) {
            Some(current) => current.version == *flushed_version,
            None => true,
        };
        if can_clear {
            page.dirty.remove(element_id);
        }
    }
    if let Some(snapshot) = &batch.order_snapshot {
        if page.store.order() == snapshot.as_slice() {
            page.order_dirty = false;
        }
    }
}

// =============================================================================
// POSTGRES I/O
// =============================================================================

type ElementRow = (
    Uuid,
    Uuid,
    String,
    f64,
    f64,
    Option<f64>,
    Option<f64>,
    Option<String>,
    Option<Uuid>,
    Option<Uuid>,
    serde_json::Value,
    i64,
);

/// Load a page's elements in paint order.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn hydrate_elements(pool: &PgPool, page_id: Uuid) -> Result<Vec<Element>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ElementRow>(
        "SELECT id, page_id, kind, x, y, width, height, group_id, start_element_id, end_element_id, content, version \
         FROM elements WHERE page_id = $1 ORDER BY position ASC, id ASC",
    )
    .bind(page_id)
    .fetch_all(pool)
    .await?;

    let mut elements = Vec::with_capacity(rows.len());
    for (id, page_id, kind, x, y, width, height, group_id, start_element_id, end_element_id, content, version) in rows {
        let Some(kind) = kind_from_str(&kind) else {
            warn!(%id, kind, "skipping element row with unknown kind");
            continue;
        };
        elements.push(Element {
            id,
            page_id,
            kind,
            x,
            y,
            width,
            height,
            group_id,
            start_element_id,
            end_element_id,
            content,
            version,
        });
    }
    Ok(elements)
}

/// Batch upsert element rows with explicit positions.
///
/// # Errors
///
/// Returns a database error if any write fails.
pub async fn flush_elements(pool: &PgPool, rows: &[(Element, i32)]) -> Result<(), sqlx::Error> {
    for (element, position) in rows {
        sqlx::query(
            "INSERT INTO elements (id, page_id, kind, x, y, width, height, group_id, start_element_id, end_element_id, content, position, version, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now()) \
             ON CONFLICT (id) DO UPDATE SET \
                 page_id = EXCLUDED.page_id, x = EXCLUDED.x, y = EXCLUDED.y, \
                 width = EXCLUDED.width, height = EXCLUDED.height, \
                 group_id = EXCLUDED.group_id, \
                 start_element_id = EXCLUDED.start_element_id, end_element_id = EXCLUDED.end_element_id, \
                 content = EXCLUDED.content, position = EXCLUDED.position, \
                 version = EXCLUDED.version, updated_at = now()",
        )
        .bind(element.id)
        .bind(element.page_id)
        .bind(kind_to_str(element.kind))
        .bind(element.x)
        .bind(element.y)
        .bind(element.width)
        .bind(element.height)
        .bind(&element.group_id)
        .bind(element.start_element_id)
        .bind(element.end_element_id)
        .bind(&element.content)
        .bind(position)
        .bind(element.version)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Upsert one element row, appending it to the end of its page's paint
/// order. Used for cross-page moves where the target page may not be live.
///
/// # Errors
///
/// Returns a database error if the write fails.
pub async fn upsert_element_appending(pool: &PgPool, element: &Element) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO elements (id, page_id, kind, x, y, width, height, group_id, start_element_id, end_element_id, content, position, version, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
                 (SELECT COALESCE(MAX(position) + 1, 0) FROM elements WHERE page_id = $2), $12, now()) \
         ON CONFLICT (id) DO UPDATE SET \
             page_id = EXCLUDED.page_id, x = EXCLUDED.x, y = EXCLUDED.y, \
             width = EXCLUDED.width, height = EXCLUDED.height, \
             group_id = EXCLUDED.group_id, \
             start_element_id = EXCLUDED.start_element_id, end_element_id = EXCLUDED.end_element_id, \
             content = EXCLUDED.content, position = EXCLUDED.position, \
             version = EXCLUDED.version, updated_at = now()",
    )
    .bind(element.id)
    .bind(element.page_id)
    .bind(kind_to_str(element.kind))
    .bind(element.x)
    .bind(element.y)
    .bind(element.width)
    .bind(element.height)
    .bind(&element.group_id)
    .bind(element.start_element_id)
    .bind(element.end_element_id)
    .bind(&element.content)
    .bind(element.version)
    .execute(pool)
    .await?;
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn kind_to_str(kind: ElementKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

fn kind_from_str(kind: &str) -> Option<ElementKind> {
    serde_json::from_value(serde_json::Value::String(kind.to_owned())).ok()
}

#[cfg(test)]
#[path = "page_test.rs"]
mod tests;
