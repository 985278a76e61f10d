//! Element service — the storage collaborator's mutation vocabulary.
//!
//! DESIGN
//! ======
//! Mutations update the in-memory page store immediately, mark the element
//! dirty for debounced persistence, and return the updated record for
//! broadcast. Conflict policy is last-write-wins by arrival order: the most
//! recently applied write for a field stands, regardless of logical
//! causality. The version counter is stamped on every applied mutation for
//! observability, not for rejection.
//!
//! Updates and moves for ids the page doesn't hold return `Ok(None)` rather
//! than an error — a peer may have deleted the element a moment earlier and
//! that race is benign by design.

use std::collections::HashSet;

use scene::doc::{Element, ElementId, ElementSeed, PartialElement};
use uuid::Uuid;

use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ElementError {
    #[error("page not loaded: {0}")]
    PageNotLoaded(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl frames::ErrorCode for ElementError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::PageNotLoaded(_) => "E_PAGE_NOT_LOADED",
            Self::Database(_) => "E_DATABASE",
        }
    }
}

/// Result of a cross-page move: the recreated elements plus the elements
/// left behind whose smart links were dropped at the boundary.
#[derive(Debug, Default)]
pub struct PageMove {
    pub moved: Vec<Element>,
    pub unlinked: Vec<Element>,
}

// =============================================================================
// CREATE
// =============================================================================

/// Create a new element on a page, assigning its canonical id.
///
/// # Errors
///
/// Returns `PageNotLoaded` if the page isn't in memory.
pub async fn create_element(
    state: &AppState,
    page_id: Uuid,
    seed: ElementSeed,
) -> Result<Element, ElementError> {
    let mut pages = state.pages.write().await;
    let page = pages
        .get_mut(&page_id)
        .ok_or(ElementError::PageNotLoaded(page_id))?;

    let element = seed.into_element(Uuid::new_v4(), page_id, 1);
    let result = element.clone();
    page.dirty.insert(element.id);
    page.order_dirty = true;
    page.store.insert(element);

    Ok(result)
}

// =============================================================================
// UPDATE / MOVE
// =============================================================================

/// Merge sparse fields into an element. Content bundle first, then
/// top-level fields. Returns `Ok(None)` for unknown ids.
///
/// # Errors
///
/// Returns `PageNotLoaded` if the page isn't in memory.
pub async fn update_element(
    state: &AppState,
    page_id: Uuid,
    element_id: ElementId,
    fields: &PartialElement,
) -> Result<Option<Element>, ElementError> {
    let mut pages = state.pages.write().await;
    let page = pages
        .get_mut(&page_id)
        .ok_or(ElementError::PageNotLoaded(page_id))?;

    if !page.store.apply_partial(&element_id, fields) {
        return Ok(None);
    }
    let Some(element) = page.store.get_mut(&element_id) else {
        return Ok(None);
    };
    element.version += 1;
    let result = element.clone();
    page.dirty.insert(element_id);
    Ok(Some(result))
}

/// Set an element's position. Returns `Ok(None)` for unknown ids.
///
/// # Errors
///
/// Returns `PageNotLoaded` if the page isn't in memory.
pub async fn move_element(
    state: &AppState,
    page_id: Uuid,
    element_id: ElementId,
    x: f64,
    y: f64,
) -> Result<Option<Element>, ElementError> {
    let mut pages = state.pages.write().await;
    let page = pages
        .get_mut(&page_id)
        .ok_or(ElementError::PageNotLoaded(page_id))?;
    let Some(element) = page.store.get_mut(&element_id) else {
        return Ok(None);
    };
    element.x = x;
    element.y = y;
    element.version += 1;
    let result = element.clone();
    page.dirty.insert(element_id);
    Ok(Some(result))
}

/// Apply a batch of `(id, x, y)` position triples, returning the updated
/// records. Unknown ids are skipped.
///
/// # Errors
///
/// Returns `PageNotLoaded` if the page isn't in memory.
pub async fn batch_move(
    state: &AppState,
    page_id: Uuid,
    moves: &[(ElementId, f64, f64)],
) -> Result<Vec<Element>, ElementError> {
    let mut pages = state.pages.write().await;
    let page = pages
        .get_mut(&page_id)
        .ok_or(ElementError::PageNotLoaded(page_id))?;

    let mut updated = Vec::with_capacity(moves.len());
    for (element_id, x, y) in moves {
        let Some(element) = page.store.get_mut(element_id) else {
            continue;
        };
        element.x = *x;
        element.y = *y;
        element.version += 1;
        page.dirty.insert(*element_id);
        updated.push(element.clone());
    }
    Ok(updated)
}

// =============================================================================
// DELETE
// =============================================================================

/// Delete elements from a page, single or batch. Absent ids are ignored.
/// Removes from memory and Postgres immediately; returns the ids actually
/// removed.
///
/// # Errors
///
/// Returns `PageNotLoaded` if the page isn't in memory, or a database error
/// if the row delete fails.
pub async fn delete_elements(
    state: &AppState,
    page_id: Uuid,
    ids: &[ElementId],
) -> Result<Vec<ElementId>, ElementError> {
    let removed = {
        let mut pages = state.pages.write().await;
        let page = pages
            .get_mut(&page_id)
            .ok_or(ElementError::PageNotLoaded(page_id))?;

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if page.store.remove(id).is_some() {
                page.dirty.remove(id);
                removed.push(*id);
            }
        }
        if !removed.is_empty() {
            page.order_dirty = true;
        }
        removed
    };

    for id in &removed {
        sqlx::query("DELETE FROM elements WHERE id = $1")
            .bind(id)
            .execute(&state.pool)
            .await?;
    }
    Ok(removed)
}

// =============================================================================
// REORDER
// =============================================================================

/// Replace a page's paint order. Unknown ids are dropped from the incoming
/// order; elements it doesn't mention keep their relative position at the
/// end. Returns the resulting order.
///
/// # Errors
///
/// Returns `PageNotLoaded` if the page isn't in memory.
pub async fn reorder_elements(
    state: &AppState,
    page_id: Uuid,
    order: &[ElementId],
) -> Result<Vec<ElementId>, ElementError> {
    let mut pages = state.pages.write().await;
    let page = pages
        .get_mut(&page_id)
        .ok_or(ElementError::PageNotLoaded(page_id))?;
    page.store.set_order(order);
    page.order_dirty = true;
    Ok(page.store.order().to_vec())
}

// =============================================================================
// CROSS-PAGE MOVE
// =============================================================================

/// Move elements to a different page with delete-then-recreate semantics:
/// source viewers see deletes, target viewers see adds. Smart links that
/// would span the page boundary are dropped on both sides.
///
/// The recreated rows are persisted immediately and best-effort — a failed
/// write is logged and the in-memory move stands.
///
/// # Errors
///
/// Returns `PageNotLoaded` if the source page isn't in memory.
pub async fn move_to_page(
    state: &AppState,
    from_page: Uuid,
    to_page: Uuid,
    ids: &[ElementId],
) -> Result<PageMove, ElementError> {
    let mut result = PageMove::default();
    {
        let mut pages = state.pages.write().await;
        let source = pages
            .get_mut(&from_page)
            .ok_or(ElementError::PageNotLoaded(from_page))?;

        let moving: Vec<Element> = ids.iter().filter_map(|id| source.store.remove(id)).collect();
        if moving.is_empty() {
            return Ok(result);
        }
        source.order_dirty = true;
        let moved_ids: HashSet<ElementId> = moving.iter().map(|el| el.id).collect();
        for id in &moved_ids {
            source.dirty.remove(id);
        }

        // Arrows staying behind lose any link into the moved set.
        let remaining: Vec<ElementId> = source.store.order().to_vec();
        for id in remaining {
            let Some(element) = source.store.get_mut(&id) else {
                continue;
            };
            let mut changed = false;
            if element.start_element_id.is_some_and(|t| moved_ids.contains(&t)) {
                element.start_element_id = None;
                changed = true;
            }
            if element.end_element_id.is_some_and(|t| moved_ids.contains(&t)) {
                element.end_element_id = None;
                changed = true;
            }
            if changed {
                element.version += 1;
                source.dirty.insert(id);
                result.unlinked.push(element.clone());
            }
        }

        // Recreate on the target page; links pointing back across the
        // boundary are dropped the same way.
        for mut element in moving {
            element.page_id = to_page;
            if element.start_element_id.is_some_and(|t| !moved_ids.contains(&t)) {
                element.start_element_id = None;
            }
            if element.end_element_id.is_some_and(|t| !moved_ids.contains(&t)) {
                element.end_element_id = None;
            }
            element.version += 1;
            result.moved.push(element);
        }

        if let Some(target) = pages.get_mut(&to_page) {
            for element in &result.moved {
                target.store.insert(element.clone());
                target.dirty.insert(element.id);
            }
            target.order_dirty = true;
        }
    }

    // Persist the recreated rows immediately: the target page may not be
    // live on any connection, so the flush worker would never see them.
    for element in &result.moved {
        if let Err(e) = crate::services::page::upsert_element_appending(&state.pool, element).await {
            tracing::warn!(error = %e, id = %element.id, "cross-page persist failed; in-memory move stands");
        }
    }
    Ok(result)
}

#[cfg(test)]
#[path = "element_test.rs"]
mod tests;
