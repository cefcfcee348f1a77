//! Per-thread transaction descriptor

use crate::algorithms::Algorithm;
use crate::memory::{Addr, Mask, SharedMemory, Word};
use crate::write_set::WriteSet;
use ferrotm_metrics::TxStats;
use std::fmt;
use std::ops::Range;

/// How a transaction's writes reach memory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TxMode {
    /// Writes are buffered (or, for eager acquisition, undo-logged) and
    /// published by the commit protocol
    #[default]
    Buffering,
    /// The transaction is the only writer and stores straight to memory
    InPlace,
}

/// A value observed by a read, kept for value-based validation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueLogEntry {
    /// Address read
    pub addr: Addr,
    /// Value observed
    pub value: Word,
    /// Bytes the read covered
    pub mask: Mask,
}

/// An in-place write's original value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UndoEntry {
    /// Address overwritten
    pub addr: Addr,
    /// Value before the write
    pub old: Word,
}

/// An orec this transaction owns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockEntry {
    /// Orec table index
    pub orec: usize,
}

/// Action run after the enclosing transaction commits
pub type DeferredAction = Box<dyn FnOnce() + Send>;

/// Mutable state of one thread's transactions
///
/// Reused across begin/commit/abort cycles; logs are cleared, not freed.
pub struct TxDescriptor {
    pub(crate) slot: usize,
    pub(crate) algorithm: Algorithm,
    pub(crate) start_time: u64,
    pub(crate) order: Option<u64>,
    pub(crate) ts_cache: u64,
    pub(crate) nesting: u32,
    pub(crate) mode: TxMode,
    pub(crate) read_orecs: Vec<usize>,
    pub(crate) value_log: Vec<ValueLogEntry>,
    pub(crate) write_set: WriteSet,
    pub(crate) undo_log: Vec<UndoEntry>,
    pub(crate) locks: Vec<LockEntry>,
    /// Counted in the cohort membership counter
    pub(crate) cohort_member: bool,
    /// Turn node pushed on the commit queue and not yet marked done
    pub(crate) enqueued: bool,
    pub(crate) deferred: Vec<DeferredAction>,
    pub(crate) stats: TxStats,
}

impl TxDescriptor {
    /// Create the descriptor for a thread slot
    pub fn new(slot: usize, algorithm: Algorithm) -> Self {
        Self {
            slot,
            algorithm,
            start_time: 0,
            order: None,
            ts_cache: 0,
            nesting: 0,
            mode: TxMode::Buffering,
            read_orecs: Vec::new(),
            value_log: Vec::new(),
            write_set: WriteSet::new(),
            undo_log: Vec::new(),
            locks: Vec::new(),
            cohort_member: false,
            enqueued: false,
            deferred: Vec::new(),
            stats: TxStats::new(),
        }
    }

    /// Thread slot
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Algorithm the current (or last) transaction runs under
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Snapshot time taken at begin
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Assigned commit order, while one is held
    pub fn order(&self) -> Option<u64> {
        self.order
    }

    /// Current write mode
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// Flat nesting depth
    pub fn nesting(&self) -> u32 {
        self.nesting
    }

    /// Whether a transaction is running
    pub fn in_transaction(&self) -> bool {
        self.nesting > 0
    }

    /// Whether the current attempt has produced any write
    pub fn has_writes(&self) -> bool {
        !self.write_set.is_empty() || !self.undo_log.is_empty() || !self.locks.is_empty()
    }

    /// Buffered writes
    pub fn write_set(&self) -> &WriteSet {
        &self.write_set
    }

    /// Orecs recorded as read evidence
    pub fn read_orecs(&self) -> &[usize] {
        &self.read_orecs
    }

    /// Commit/abort counters
    pub fn stats(&self) -> &TxStats {
        &self.stats
    }

    /// Record `addr`'s current value, then store `value` in place
    pub(crate) fn write_in_place(
        &mut self,
        memory: &SharedMemory,
        addr: Addr,
        value: Word,
        mask: Mask,
    ) -> crate::TxResult<()> {
        let old = memory.load(addr)?;
        self.undo_log.push(UndoEntry { addr, old });
        memory.store(addr, value, mask)
    }

    /// Restore every in-place write, newest first
    ///
    /// Entries inside `keep` are left applied (exception objects survive
    /// the unwind).
    pub(crate) fn undo(&mut self, memory: &SharedMemory, keep: Option<&Range<Addr>>) {
        for entry in self.undo_log.drain(..).rev() {
            if keep.is_some_and(|r| r.contains(&entry.addr)) {
                continue;
            }
            if let Err(e) = memory.store(entry.addr, entry.old, Mask::FULL) {
                tracing::error!(slot = self.slot, error = %e, "undo of an unchecked address");
            }
        }
    }

    /// Apply buffered writes that target `range` (exception unwind)
    pub(crate) fn publish_range(&self, memory: &SharedMemory, range: &Range<Addr>) {
        for entry in self.write_set.iter().filter(|e| range.contains(&e.addr)) {
            if let Err(e) = memory.store(entry.addr, entry.value, entry.mask) {
                tracing::error!(slot = self.slot, error = %e, "exception write-back failed");
            }
        }
    }

    /// Forget read evidence, buffered writes and undo entries
    pub(crate) fn clear_logs(&mut self) {
        self.read_orecs.clear();
        self.value_log.clear();
        self.write_set.clear();
        self.undo_log.clear();
        self.locks.clear();
    }
}

impl fmt::Debug for TxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxDescriptor")
            .field("slot", &self.slot)
            .field("algorithm", &self.algorithm)
            .field("start_time", &self.start_time)
            .field("order", &self.order)
            .field("nesting", &self.nesting)
            .field("mode", &self.mode)
            .field("reads", &(self.read_orecs.len() + self.value_log.len()))
            .field("writes", &self.write_set.len())
            .field("undo", &self.undo_log.len())
            .field("locks", &self.locks.len())
            .finish()
    }
}
