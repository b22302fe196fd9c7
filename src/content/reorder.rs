use std::collections::{HashMap, HashSet};

use axum::async_trait;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReorderError {
    #[error("reordered ids do not match the stored collection")]
    InvalidPermutation,
    #[error("record not found in collection")]
    UnknownId,
    #[error("could not persist the new order")]
    PersistenceFailure(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// The slice of an orderable record the reconciler works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedItem {
    pub id: Uuid,
    pub sort_order: i32,
    pub created_at: OffsetDateTime,
}

/// One pending `(id, sort_order)` persistence operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderUpdate {
    pub id: Uuid,
    pub sort_order: i32,
}

/// Display order. Ties on `sort_order` can only arise from a partial
/// failure history; the secondary keys keep the order deterministic.
pub fn sort_for_display(items: &mut [OrderedItem]) {
    items.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// Full reorder: the new `sort_order` of each record is its 0-based
/// position in the requested permutation. Only changed pairs are returned.
/// The permutation must mention every current id exactly once.
pub fn plan_full_reorder(
    current: &[OrderedItem],
    ordered_ids: &[Uuid],
) -> Result<Vec<OrderUpdate>, ReorderError> {
    if ordered_ids.len() != current.len() {
        return Err(ReorderError::InvalidPermutation);
    }
    let by_id: HashMap<Uuid, i32> = current.iter().map(|i| (i.id, i.sort_order)).collect();
    let mut seen = HashSet::with_capacity(ordered_ids.len());
    let mut updates = Vec::new();
    for (position, id) in ordered_ids.iter().enumerate() {
        if !seen.insert(*id) {
            return Err(ReorderError::InvalidPermutation);
        }
        let Some(&old) = by_id.get(id) else {
            return Err(ReorderError::InvalidPermutation);
        };
        let new = position as i32;
        if old != new {
            updates.push(OrderUpdate {
                id: *id,
                sort_order: new,
            });
        }
    }
    Ok(updates)
}

/// Single-step move: swap `sort_order` with the adjacent record in display
/// order. `Ok(None)` for first-up and last-down; no persistence may be
/// attempted for those.
pub fn plan_move(
    current: &[OrderedItem],
    id: Uuid,
    direction: MoveDirection,
) -> Result<Option<[OrderUpdate; 2]>, ReorderError> {
    let mut items = current.to_vec();
    sort_for_display(&mut items);
    let index = items
        .iter()
        .position(|i| i.id == id)
        .ok_or(ReorderError::UnknownId)?;
    let neighbor = match direction {
        MoveDirection::Up if index == 0 => return Ok(None),
        MoveDirection::Down if index == items.len() - 1 => return Ok(None),
        MoveDirection::Up => index - 1,
        MoveDirection::Down => index + 1,
    };
    Ok(Some([
        OrderUpdate {
            id: items[index].id,
            sort_order: items[neighbor].sort_order,
        },
        OrderUpdate {
            id: items[neighbor].id,
            sort_order: items[index].sort_order,
        },
    ]))
}

/// Persistence boundary for order updates. The batch is a sequence of
/// per-id writes, not one transaction; callers tolerate partial
/// application by rolling back their optimistic state.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn persist_orders(&self, updates: &[OrderUpdate]) -> anyhow::Result<()>;
}

/// An ordered collection with optimistic apply. The list mutates
/// synchronously before the store call is issued; on failure the exact
/// pre-update snapshot is restored (a re-fetch could silently absorb a
/// concurrent edit) and a single failure surfaces.
#[derive(Debug, Clone)]
pub struct OrderedList {
    items: Vec<OrderedItem>,
}

impl OrderedList {
    pub fn new(mut items: Vec<OrderedItem>) -> Self {
        sort_for_display(&mut items);
        Self { items }
    }

    pub fn items(&self) -> &[OrderedItem] {
        &self.items
    }

    pub async fn apply<S: OrderStore + ?Sized>(
        &mut self,
        store: &S,
        updates: &[OrderUpdate],
    ) -> Result<(), ReorderError> {
        if updates.is_empty() {
            return Ok(());
        }
        let snapshot = self.items.clone();
        for update in updates {
            if let Some(item) = self.items.iter_mut().find(|i| i.id == update.id) {
                item.sort_order = update.sort_order;
            }
        }
        sort_for_display(&mut self.items);
        match store.persist_orders(updates).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, updates = updates.len(), "order persistence failed; rolling back");
                self.items = snapshot;
                Err(ReorderError::PersistenceFailure(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use time::Duration;

    fn items(orders: &[i32]) -> Vec<OrderedItem> {
        let base = OffsetDateTime::UNIX_EPOCH;
        orders
            .iter()
            .enumerate()
            .map(|(i, &o)| OrderedItem {
                id: Uuid::new_v4(),
                sort_order: o,
                created_at: base + Duration::minutes(i as i64),
            })
            .collect()
    }

    /// Store double that records every batch and can be told to fail.
    struct RecordingStore {
        batches: Mutex<Vec<Vec<OrderUpdate>>>,
        fail: bool,
    }

    impl RecordingStore {
        fn new(fail: bool) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail,
            }
        }

        fn batch_count(&self) -> usize {
            self.batches.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl OrderStore for RecordingStore {
        async fn persist_orders(&self, updates: &[OrderUpdate]) -> anyhow::Result<()> {
            self.batches.lock().expect("lock").push(updates.to_vec());
            if self.fail {
                anyhow::bail!("simulated storage failure");
            }
            Ok(())
        }
    }

    #[test]
    fn full_reorder_assigns_positions() {
        let current = items(&[0, 1, 2, 3]);
        // Drag the last record to the front.
        let permutation = vec![
            current[3].id,
            current[0].id,
            current[1].id,
            current[2].id,
        ];
        let plan = plan_full_reorder(&current, &permutation).expect("plan");
        assert_eq!(plan.len(), 4);
        let mut reordered = current.clone();
        for update in &plan {
            reordered
                .iter_mut()
                .find(|i| i.id == update.id)
                .expect("known id")
                .sort_order = update.sort_order;
        }
        sort_for_display(&mut reordered);
        let ids: Vec<Uuid> = reordered.iter().map(|i| i.id).collect();
        assert_eq!(ids, permutation);
        let orders: Vec<i32> = reordered.iter().map(|i| i.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn full_reorder_skips_unchanged_records() {
        let current = items(&[0, 1, 2]);
        // Swap only the last two.
        let permutation = vec![current[0].id, current[2].id, current[1].id];
        let plan = plan_full_reorder(&current, &permutation).expect("plan");
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|u| u.id != current[0].id));
    }

    #[test]
    fn full_reorder_rejects_wrong_length() {
        let current = items(&[0, 1, 2]);
        let short = vec![current[0].id, current[1].id];
        assert!(matches!(
            plan_full_reorder(&current, &short),
            Err(ReorderError::InvalidPermutation)
        ));
    }

    #[test]
    fn full_reorder_rejects_duplicates_and_strangers() {
        let current = items(&[0, 1, 2]);
        let dupes = vec![current[0].id, current[0].id, current[1].id];
        assert!(matches!(
            plan_full_reorder(&current, &dupes),
            Err(ReorderError::InvalidPermutation)
        ));
        let strangers = vec![current[0].id, current[1].id, Uuid::new_v4()];
        assert!(matches!(
            plan_full_reorder(&current, &strangers),
            Err(ReorderError::InvalidPermutation)
        ));
    }

    #[test]
    fn move_swaps_adjacent_orders() {
        let current = items(&[0, 1, 2]);
        let plan = plan_move(&current, current[1].id, MoveDirection::Up)
            .expect("plan")
            .expect("swap");
        assert_eq!(plan.len(), 2);
        let moved = plan.iter().find(|u| u.id == current[1].id).expect("moved");
        let other = plan.iter().find(|u| u.id == current[0].id).expect("other");
        assert_eq!(moved.sort_order, 0);
        assert_eq!(other.sort_order, 1);
    }

    #[test]
    fn move_at_boundary_is_a_no_op() {
        let current = items(&[0, 1, 2]);
        assert!(plan_move(&current, current[0].id, MoveDirection::Up)
            .expect("plan")
            .is_none());
        assert!(plan_move(&current, current[2].id, MoveDirection::Down)
            .expect("plan")
            .is_none());
    }

    #[test]
    fn move_unknown_id_errors() {
        let current = items(&[0, 1]);
        assert!(matches!(
            plan_move(&current, Uuid::new_v4(), MoveDirection::Up),
            Err(ReorderError::UnknownId)
        ));
    }

    #[test]
    fn ties_resolve_by_creation_time_then_id() {
        let mut tied = items(&[1, 1, 0]);
        sort_for_display(&mut tied);
        assert_eq!(tied[0].sort_order, 0);
        // Both order-1 records: the earlier creation wins.
        assert!(tied[1].created_at < tied[2].created_at);
    }

    #[tokio::test]
    async fn apply_persists_and_keeps_optimistic_state() {
        let current = items(&[0, 1, 2]);
        let permutation = vec![current[2].id, current[0].id, current[1].id];
        let plan = plan_full_reorder(&current, &permutation).expect("plan");
        let store = RecordingStore::new(false);
        let mut list = OrderedList::new(current);
        list.apply(&store, &plan).await.expect("apply");
        assert_eq!(store.batch_count(), 1);
        let ids: Vec<Uuid> = list.items().iter().map(|i| i.id).collect();
        assert_eq!(ids, permutation);
    }

    #[tokio::test]
    async fn apply_empty_plan_never_touches_the_store() {
        let store = RecordingStore::new(false);
        let mut list = OrderedList::new(items(&[0, 1, 2]));
        list.apply(&store, &[]).await.expect("no-op");
        assert_eq!(store.batch_count(), 0);
    }

    #[tokio::test]
    async fn apply_rolls_back_on_persistence_failure() {
        let current = items(&[0, 1, 2, 3]);
        let permutation = vec![
            current[3].id,
            current[0].id,
            current[1].id,
            current[2].id,
        ];
        let plan = plan_full_reorder(&current, &permutation).expect("plan");
        let store = RecordingStore::new(true);
        let mut list = OrderedList::new(current.clone());
        let before = list.items().to_vec();
        let err = list.apply(&store, &plan).await.unwrap_err();
        assert!(matches!(err, ReorderError::PersistenceFailure(_)));
        // Exactly one attempt, exact snapshot restored.
        assert_eq!(store.batch_count(), 1);
        assert_eq!(list.items(), before.as_slice());
    }

    /// Three certifications A, B, C with orders [0, 1, 2]; dragging C to
    /// the front persists A=1, B=2, C=0, and a storage failure leaves the
    /// list exactly as it was.
    #[tokio::test]
    async fn certification_drag_scenario() {
        let current = items(&[0, 1, 2]);
        let (a, b, c) = (current[0].id, current[1].id, current[2].id);
        let permutation = vec![c, a, b];
        let plan = plan_full_reorder(&current, &permutation).expect("plan");
        assert_eq!(plan.len(), 3);

        let ok_store = RecordingStore::new(false);
        let mut list = OrderedList::new(current.clone());
        list.apply(&ok_store, &plan).await.expect("apply");
        let find = |id: Uuid| {
            list.items()
                .iter()
                .find(|i| i.id == id)
                .expect("present")
                .sort_order
        };
        assert_eq!(find(a), 1);
        assert_eq!(find(b), 2);
        assert_eq!(find(c), 0);
        assert_eq!(ok_store.batches.lock().expect("lock")[0].len(), 3);

        let failing = RecordingStore::new(true);
        let mut list = OrderedList::new(current.clone());
        let mut failures = 0;
        if list.apply(&failing, &plan).await.is_err() {
            failures += 1;
        }
        assert_eq!(failures, 1);
        let orders: Vec<i32> = list.items().iter().map(|i| i.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        let ids: Vec<Uuid> = list.items().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }
}
