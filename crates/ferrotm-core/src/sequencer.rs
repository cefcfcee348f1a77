//! Global sequencer - commit order counters, cohort membership and the
//! commit queue
//!
//! All cohort bookkeeping uses `SeqCst`: admission, the in-place claim and
//! the drain checks are store-then-load patterns across different words,
//! which acquire/release alone does not order.

use crate::padded::CacheAligned;
use crate::spin::SpinWait;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};

/// Sentinel for "no turn node"
pub const NO_TURN: usize = usize::MAX;

/// Global commit-order state
#[derive(Debug)]
pub struct Sequencer {
    /// Monotonic commit-order counter (also the cohort "pending" counter)
    timestamp: CacheAligned<AtomicU64>,
    /// Highest fully finished commit order
    last_complete: CacheAligned<AtomicU64>,
    /// Orders that have finished, successfully or not
    committed: CacheAligned<AtomicU64>,
    /// Live members of the current cohort
    started: CacheAligned<AtomicI64>,
    /// Set while a sole cohort member writes in place
    inplace: CacheAligned<AtomicBool>,
    queue: CommitQueue,
}

impl Sequencer {
    /// Create a sequencer with a turn node per thread slot
    pub fn new(slots: usize) -> Self {
        Self {
            timestamp: CacheAligned::new(AtomicU64::new(0)),
            last_complete: CacheAligned::new(AtomicU64::new(0)),
            committed: CacheAligned::new(AtomicU64::new(0)),
            started: CacheAligned::new(AtomicI64::new(0)),
            inplace: CacheAligned::new(AtomicBool::new(false)),
            queue: CommitQueue::new(slots),
        }
    }

    /// Current commit-order counter
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }

    /// Take the next order number
    #[inline]
    pub fn advance(&self) -> u64 {
        self.timestamp.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Raise the counter to at least `floor`
    pub fn raise_timestamp(&self, floor: u64) {
        self.timestamp.fetch_max(floor, Ordering::SeqCst);
    }

    /// Highest fully finished order
    #[inline]
    pub fn last_complete(&self) -> u64 {
        self.last_complete.load(Ordering::SeqCst)
    }

    /// Publish `order` as finished
    #[inline]
    pub fn set_last_complete(&self, order: u64) {
        self.last_complete.store(order, Ordering::SeqCst);
    }

    /// Finished order count
    #[inline]
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    /// Count one more finished order
    #[inline]
    pub fn mark_committed(&self) {
        self.committed.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether every handed-out order has finished
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.timestamp() == self.committed()
    }

    /// Live cohort members
    #[inline]
    pub fn started(&self) -> i64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Join the current cohort
    #[inline]
    pub fn join_cohort(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    /// Leave the current cohort
    #[inline]
    pub fn leave_cohort(&self) {
        self.started.fetch_sub(1, Ordering::SeqCst);
    }

    /// Whether the in-place flag is set
    #[inline]
    pub fn inplace(&self) -> bool {
        self.inplace.load(Ordering::SeqCst)
    }

    /// Set the in-place flag, returning its previous value
    #[inline]
    pub fn claim_inplace(&self) -> bool {
        self.inplace.swap(true, Ordering::SeqCst)
    }

    /// Clear the in-place flag
    #[inline]
    pub fn clear_inplace(&self) {
        self.inplace.store(false, Ordering::SeqCst);
    }

    /// The commit queue
    #[inline]
    pub fn queue(&self) -> &CommitQueue {
        &self.queue
    }

    /// Reinitialize cohort state; only valid while no transaction is live
    pub fn reset_cohorts(&self) {
        let now = self.timestamp();
        self.committed.store(now, Ordering::SeqCst);
        self.last_complete.store(now, Ordering::SeqCst);
        self.started.store(0, Ordering::SeqCst);
        self.inplace.store(false, Ordering::SeqCst);
        self.queue.reset();
    }
}

/// Turn node embedded per thread slot
#[derive(Debug)]
pub struct TurnNode {
    done: AtomicBool,
    next: AtomicUsize,
}

impl TurnNode {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(true),
            next: AtomicUsize::new(NO_TURN),
        }
    }
}

/// Lock-free commit-order queue over a turn-node arena
///
/// `head` names the slot that pushed most recently, i.e. the tail of the
/// commit order; each node links to the slot that pushed before it. Pushes
/// race through CAS; only the thread that still finds itself at `head` when
/// it finishes may reset it to empty.
#[derive(Debug)]
pub struct CommitQueue {
    head: CacheAligned<AtomicUsize>,
    nodes: Box<[TurnNode]>,
}

impl CommitQueue {
    /// Create a queue with one turn node per slot
    pub fn new(slots: usize) -> Self {
        Self {
            head: CacheAligned::new(AtomicUsize::new(NO_TURN)),
            nodes: (0..slots).map(|_| TurnNode::new()).collect(),
        }
    }

    /// Whether no commit is queued
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::SeqCst) == NO_TURN
    }

    /// Slot at the head (most recent push), if any
    pub fn head(&self) -> Option<usize> {
        match self.head.load(Ordering::SeqCst) {
            NO_TURN => None,
            slot => Some(slot),
        }
    }

    /// Mark `slot`'s turn as not done, ready for a new commit attempt
    #[inline]
    pub fn reset_turn(&self, slot: usize) {
        self.nodes[slot].next.store(NO_TURN, Ordering::SeqCst);
        self.nodes[slot].done.store(false, Ordering::SeqCst);
    }

    /// Push `slot`, returning its predecessor in commit order
    pub fn push(&self, slot: usize) -> Option<usize> {
        let node = &self.nodes[slot];
        loop {
            let prev = self.head.load(Ordering::SeqCst);
            node.next.store(prev, Ordering::SeqCst);
            if self
                .head
                .compare_exchange(prev, slot, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return (prev != NO_TURN).then_some(prev);
            }
            std::hint::spin_loop();
        }
    }

    /// Whether `slot` has finished its turn
    #[inline]
    pub fn is_done(&self, slot: usize) -> bool {
        self.nodes[slot].done.load(Ordering::SeqCst)
    }

    /// Spin until `slot` has finished its turn
    pub fn wait_for(&self, slot: usize, spin: &mut SpinWait) {
        spin.until(|| self.is_done(slot));
    }

    /// Signal that `slot` has finished its turn
    #[inline]
    pub fn mark_done(&self, slot: usize) {
        self.nodes[slot].done.store(true, Ordering::SeqCst);
    }

    /// Reset the queue to empty if `slot` is still the tail
    pub fn release_if_tail(&self, slot: usize) -> bool {
        self.head
            .compare_exchange(slot, NO_TURN, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Spin until the queue is empty
    pub fn wait_empty(&self, spin: &mut SpinWait) {
        spin.until(|| self.is_empty());
    }

    fn reset(&self) {
        for node in self.nodes.iter() {
            node.done.store(true, Ordering::SeqCst);
            node.next.store(NO_TURN, Ordering::SeqCst);
        }
        self.head.store(NO_TURN, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_advance_is_monotonic() {
        let seq = Sequencer::new(2);
        assert_eq!(seq.advance(), 1);
        assert_eq!(seq.advance(), 2);
        seq.raise_timestamp(1);
        assert_eq!(seq.timestamp(), 2);
        seq.raise_timestamp(10);
        assert_eq!(seq.timestamp(), 10);
    }

    #[test]
    fn test_drained_tracks_committed() {
        let seq = Sequencer::new(2);
        assert!(seq.is_drained());
        seq.advance();
        assert!(!seq.is_drained());
        seq.mark_committed();
        assert!(seq.is_drained());
    }

    #[test]
    fn test_reset_cohorts() {
        let seq = Sequencer::new(2);
        seq.advance();
        seq.advance();
        seq.join_cohort();
        seq.claim_inplace();
        seq.queue().reset_turn(1);
        seq.queue().push(1);

        seq.reset_cohorts();

        assert_eq!(seq.committed(), 2);
        assert_eq!(seq.last_complete(), 2);
        assert_eq!(seq.started(), 0);
        assert!(!seq.inplace());
        assert!(seq.queue().is_empty());
    }

    // ==================== Commit Queue Tests ====================

    #[test]
    fn test_push_links_predecessors() {
        let q = CommitQueue::new(3);
        for slot in 0..3 {
            q.reset_turn(slot);
        }
        assert_eq!(q.push(0), None);
        assert_eq!(q.push(2), Some(0));
        assert_eq!(q.push(1), Some(2));
        assert_eq!(q.head(), Some(1));
    }

    #[test]
    fn test_only_tail_releases() {
        let q = CommitQueue::new(2);
        q.reset_turn(0);
        q.reset_turn(1);
        q.push(0);
        q.push(1);

        assert!(!q.release_if_tail(0));
        assert!(q.release_if_tail(1));
        assert!(q.is_empty());
    }

    #[test]
    fn test_turns_complete_in_push_order() {
        let threads = 8;
        let q = Arc::new(CommitQueue::new(threads));
        let finished = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let pushed = Arc::new(Barrier::new(threads));
        for slot in 0..threads {
            q.reset_turn(slot);
        }

        let handles: Vec<_> = (0..threads)
            .map(|slot| {
                let q = Arc::clone(&q);
                let finished = Arc::clone(&finished);
                let pushed = Arc::clone(&pushed);
                thread::spawn(move || {
                    let pred = q.push(slot);
                    pushed.wait();
                    if let Some(pred) = pred {
                        q.wait_for(pred, &mut SpinWait::new(64));
                    }
                    finished.lock().push((pred, slot));
                    q.mark_done(slot);
                    q.release_if_tail(slot);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // every thread ran after the node it was linked behind
        let finished = finished.lock();
        for (i, (pred, _)) in finished.iter().enumerate() {
            match pred {
                None => assert_eq!(i, 0),
                Some(p) => assert_eq!(finished[i - 1].1, *p),
            }
        }
        assert!(q.is_empty());
    }
}
