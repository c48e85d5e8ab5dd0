//! Per-source queue of pending change requests, highest score first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::change::{ChangeRequest, LayerId};
use crate::tile::TileKey;

/// A source's queue is keyed by tile and layer; the source is implied.
type Slot = (TileKey, LayerId);

/// Heap entry. Ordered by score, then by insertion order so equal scores
/// pop first-in first-out.
#[derive(Clone, Copy, Debug)]
struct HeapEntry {
    score: f64,
    sequence: u64,
    slot: Slot,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Clone, Debug)]
struct Member {
    change: ChangeRequest,
    sequence: u64,
    /// Set on a Remove that displaced a queued non-Remove for the same slot.
    superseded: bool,
}

/// A Remove taken out of the queue for immediate processing.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedRemove {
    /// The Remove itself.
    pub change: ChangeRequest,
    /// Whether the Remove displaced a queued change for the same tile.
    pub superseded: bool,
}

/// Pending changes for one source.
///
/// Holds at most one change per (tile, layer). Later changes for an occupied
/// slot are dropped, except that a Remove displaces a queued non-Remove.
/// Displaced and taken entries stay in the heap and are skipped on pop.
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<HeapEntry>,
    members: FxHashMap<Slot, Member>,
    next_sequence: u64,
}

impl PendingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a change. Returns `false` if it was dropped as a duplicate.
    pub fn push(&mut self, change: ChangeRequest) -> bool {
        let slot = (change.key, change.layer);
        let superseded = match self.members.get(&slot) {
            Some(existing) if change.is_remove() && !existing.change.is_remove() => true,
            Some(_) => return false,
            None => false,
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(HeapEntry {
            score: change.score,
            sequence,
            slot,
        });
        self.members.insert(
            slot,
            Member {
                change,
                sequence,
                superseded,
            },
        );
        true
    }

    /// Remove and return the highest-scoring change.
    pub fn pop(&mut self) -> Option<ChangeRequest> {
        while let Some(entry) = self.heap.pop() {
            if let Some(member) = self.members.get(&entry.slot)
                && member.sequence == entry.sequence
            {
                return self.members.remove(&entry.slot).map(|member| member.change);
            }
            // Stale entry, skip it.
        }
        None
    }

    /// The highest-scoring change without removing it.
    pub fn peek(&mut self) -> Option<&ChangeRequest> {
        while let Some(entry) = self.heap.peek() {
            let live = self
                .members
                .get(&entry.slot)
                .is_some_and(|member| member.sequence == entry.sequence);
            if live {
                let slot = entry.slot;
                return self.members.get(&slot).map(|member| &member.change);
            }
            self.heap.pop();
        }
        None
    }

    /// Drop the queued change for a slot, if any.
    pub fn remove(&mut self, key: TileKey, layer: LayerId) -> Option<ChangeRequest> {
        self.members.remove(&(key, layer)).map(|member| member.change)
    }

    #[must_use]
    pub fn contains(&self, key: TileKey, layer: LayerId) -> bool {
        self.members.contains_key(&(key, layer))
    }

    /// Take every queued Remove, oldest first.
    pub fn take_removes(&mut self) -> Vec<QueuedRemove> {
        let mut removes: Vec<(u64, QueuedRemove)> = Vec::new();
        self.members.retain(|_, member| {
            if !member.change.is_remove() {
                return true;
            }
            removes.push((
                member.sequence,
                QueuedRemove {
                    change: member.change.clone(),
                    superseded: member.superseded,
                },
            ));
            false
        });
        removes.sort_by_key(|(sequence, _)| *sequence);
        removes.into_iter().map(|(_, remove)| remove).collect()
    }

    /// Drop every change queued for `layer`.
    pub fn retain_layer(&mut self, layer: LayerId) {
        self.members.retain(|(_, slot_layer), _| *slot_layer != layer);
    }

    /// Keep only the queued changes for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&ChangeRequest) -> bool) {
        self.members.retain(|_, member| keep(&member.change));
    }

    /// Queued changes in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeRequest> {
        self.members.values().map(|member| &member.change)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{REMOVE_SCORE, TileAction};
    use crate::dataset::SourceId;

    fn change(action: TileAction, x: i64, score: f64) -> ChangeRequest {
        ChangeRequest {
            action,
            key: TileKey::new(x, 0),
            layer: LayerId::new(0),
            source: SourceId::from("src"),
            lod: 0,
            score,
        }
    }

    #[test]
    fn test_pop_highest_score_first() {
        let mut queue = PendingQueue::new();
        queue.push(change(TileAction::Create, 0, 1.0));
        queue.push(change(TileAction::Create, 1, 50.0));
        queue.push(change(TileAction::Upgrade, 2, 10.0));

        let order: Vec<i64> = std::iter::from_fn(|| queue.pop()).map(|c| c.key.x).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!(queue.is_empty());
    }

    /// Equal scores come out in insertion order.
    #[test]
    fn test_ties_are_fifo() {
        let mut queue = PendingQueue::new();
        for x in [5, 3, 9, 1] {
            queue.push(change(TileAction::Create, x, 2.0));
        }
        let order: Vec<i64> = std::iter::from_fn(|| queue.pop()).map(|c| c.key.x).collect();
        assert_eq!(order, vec![5, 3, 9, 1]);
    }

    #[test]
    fn test_first_change_for_a_slot_wins() {
        let mut queue = PendingQueue::new();
        assert!(queue.push(change(TileAction::Create, 0, 1.0)));
        assert!(!queue.push(change(TileAction::Create, 0, 99.0)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().map(|c| c.score), Some(1.0));
    }

    #[test]
    fn test_remove_displaces_queued_create() {
        let mut queue = PendingQueue::new();
        queue.push(change(TileAction::Create, 2, 40.0));
        assert!(queue.push(change(TileAction::Remove, 2, REMOVE_SCORE)));
        assert_eq!(queue.len(), 1);

        let removes = queue.take_removes();
        assert_eq!(removes.len(), 1);
        assert!(removes[0].superseded);
        assert_eq!(removes[0].change.action, TileAction::Remove);
        // The displaced create must not resurface.
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_second_remove_is_dropped() {
        let mut queue = PendingQueue::new();
        assert!(queue.push(change(TileAction::Remove, 0, REMOVE_SCORE)));
        assert!(!queue.push(change(TileAction::Remove, 0, REMOVE_SCORE)));
        let removes = queue.take_removes();
        assert_eq!(removes.len(), 1);
        assert!(!removes[0].superseded);
    }

    #[test]
    fn test_take_removes_leaves_other_changes() {
        let mut queue = PendingQueue::new();
        queue.push(change(TileAction::Remove, 4, REMOVE_SCORE));
        queue.push(change(TileAction::Create, 1, 3.0));
        queue.push(change(TileAction::Remove, 2, REMOVE_SCORE));

        let removed: Vec<i64> = queue.take_removes().iter().map(|r| r.change.key.x).collect();
        assert_eq!(removed, vec![4, 2]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().map(|c| c.key.x), Some(1));
        assert_eq!(queue.pop().map(|c| c.key.x), Some(1));
    }

    #[test]
    fn test_remove_slot_skips_stale_heap_entry() {
        let mut queue = PendingQueue::new();
        queue.push(change(TileAction::Create, 0, 10.0));
        queue.push(change(TileAction::Create, 1, 5.0));
        assert!(queue.remove(TileKey::new(0, 0), LayerId::new(0)).is_some());
        assert!(!queue.contains(TileKey::new(0, 0), LayerId::new(0)));
        assert_eq!(queue.pop().map(|c| c.key.x), Some(1));
        assert!(queue.pop().is_none());
    }

    /// A slot re-queued after removal is live again; its old heap entry is not.
    #[test]
    fn test_requeue_after_remove() {
        let mut queue = PendingQueue::new();
        queue.push(change(TileAction::Create, 0, 10.0));
        queue.remove(TileKey::new(0, 0), LayerId::new(0));
        queue.push(change(TileAction::Upgrade, 0, 1.0));
        let popped = queue.pop().unwrap();
        assert_eq!(popped.action, TileAction::Upgrade);
        assert!(queue.pop().is_none());
    }
}
