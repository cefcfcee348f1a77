//! Thread slots - identity, liveness flags and quiescence
//!
//! Every attached thread owns one slot. A slot's index is its identity in
//! orec owner bits and in the turn-node arena. The `active` flag is raised
//! for the duration of a transaction so an algorithm switch can wait for
//! every thread to leave; the `abort_requested` flag is how a contention
//! manager asks another transaction to give up.

use crate::padded::CacheAligned;
use crate::spin::SpinWait;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Slot {
    claimed: AtomicBool,
    active: AtomicBool,
    abort_requested: AtomicBool,
}

/// Fixed table of thread slots
#[derive(Debug)]
pub struct ThreadSlots {
    slots: Box<[CacheAligned<Slot>]>,
    switching: CacheAligned<AtomicBool>,
}

impl ThreadSlots {
    /// Create `max` slots
    pub fn new(max: usize) -> Self {
        Self {
            slots: (0..max).map(|_| CacheAligned::new(Slot::default())).collect(),
            switching: CacheAligned::new(AtomicBool::new(false)),
        }
    }

    /// Slot capacity
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claim a free slot
    pub fn claim(&self) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.claimed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    /// Return a slot to the free pool
    pub fn release(&self, slot: usize) {
        let s = &self.slots[slot];
        s.active.store(false, Ordering::SeqCst);
        s.abort_requested.store(false, Ordering::SeqCst);
        s.claimed.store(false, Ordering::Release);
    }

    /// Number of claimed slots
    pub fn claimed_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.claimed.load(Ordering::Acquire))
            .count()
    }

    /// Mark `slot` as inside a transaction, waiting out any algorithm switch
    pub fn enter(&self, slot: usize, spin: &mut SpinWait) {
        let s = &self.slots[slot];
        loop {
            spin.until(|| !self.switching.load(Ordering::SeqCst));
            s.abort_requested.store(false, Ordering::SeqCst);
            s.active.store(true, Ordering::SeqCst);
            if !self.switching.load(Ordering::SeqCst) {
                return;
            }
            // a switch started between the check and the flag; back out
            s.active.store(false, Ordering::SeqCst);
        }
    }

    /// Mark `slot` as outside any transaction
    pub fn exit(&self, slot: usize) {
        self.slots[slot].active.store(false, Ordering::SeqCst);
    }

    /// Whether `slot` is inside a transaction
    pub fn is_active(&self, slot: usize) -> bool {
        self.slots[slot].active.load(Ordering::SeqCst)
    }

    /// Ask the transaction in `victim` to abort at its next barrier
    ///
    /// Returns false if the victim is not running a transaction.
    pub fn request_abort(&self, victim: usize) -> bool {
        let s = match self.slots.get(victim) {
            Some(s) => s,
            None => return false,
        };
        if !s.active.load(Ordering::SeqCst) {
            return false;
        }
        s.abort_requested.store(true, Ordering::SeqCst);
        true
    }

    /// Whether another thread asked `slot` to abort
    #[inline]
    pub fn abort_requested(&self, slot: usize) -> bool {
        self.slots[slot].abort_requested.load(Ordering::Acquire)
    }

    /// Block new transactions and wait for running ones to finish
    ///
    /// Callers serialize switches among themselves.
    pub fn quiesce(&self, spin: &mut SpinWait) {
        self.switching.store(true, Ordering::SeqCst);
        for s in self.slots.iter() {
            spin.until(|| !s.active.load(Ordering::SeqCst));
        }
    }

    /// Reopen admission after [`quiesce`](Self::quiesce)
    pub fn resume(&self) {
        self.switching.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_claim_and_release() {
        let slots = ThreadSlots::new(2);
        assert_eq!(slots.claim(), Some(0));
        assert_eq!(slots.claim(), Some(1));
        assert_eq!(slots.claim(), None);

        slots.release(0);
        assert_eq!(slots.claimed_count(), 1);
        assert_eq!(slots.claim(), Some(0));
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let slots = Arc::new(ThreadSlots::new(16));
        let claimed = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let slots = Arc::clone(&slots);
                let claimed = Arc::clone(&claimed);
                thread::spawn(move || {
                    if slots.claim().is_some() {
                        claimed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(claimed.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_abort_request_requires_active_victim() {
        let slots = ThreadSlots::new(2);
        assert!(!slots.request_abort(1));
        assert!(!slots.request_abort(7));

        slots.enter(1, &mut SpinWait::new(4));
        assert!(slots.request_abort(1));
        assert!(slots.abort_requested(1));

        // re-entering clears a stale request
        slots.exit(1);
        slots.enter(1, &mut SpinWait::new(4));
        assert!(!slots.abort_requested(1));
    }

    #[test]
    fn test_quiesce_waits_for_active_slot() {
        let slots = Arc::new(ThreadSlots::new(2));
        slots.enter(0, &mut SpinWait::new(4));

        let switcher = {
            let slots = Arc::clone(&slots);
            thread::spawn(move || {
                slots.quiesce(&mut SpinWait::new(4));
                let active = slots.is_active(0);
                slots.resume();
                active
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        slots.exit(0);
        assert!(!switcher.join().unwrap());

        // admission reopened
        slots.enter(0, &mut SpinWait::new(4));
        assert!(slots.is_active(0));
    }
}
