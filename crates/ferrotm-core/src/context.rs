//! Process-wide state shared by every protocol

use crate::config::StmConfig;
use crate::contention::ContentionManager;
use crate::memory::SharedMemory;
use crate::orec::OrecTable;
use crate::padded::CacheAligned;
use crate::sequencer::Sequencer;
use crate::slots::ThreadSlots;
use crate::spin::SpinWait;
use std::sync::atomic::AtomicU64;

/// Shared metadata the algorithms operate on
#[derive(Debug)]
pub struct TmContext {
    /// Transactional words
    pub memory: SharedMemory,
    /// Ownership records
    pub orecs: OrecTable,
    /// Commit counters, cohort state and commit queue
    pub sequencer: Sequencer,
    /// Single global sequence lock (odd while a writer holds it)
    pub global_lock: CacheAligned<AtomicU64>,
    /// Thread slots
    pub slots: ThreadSlots,
    /// Conflict policy for eager acquisition
    pub contention: Box<dyn ContentionManager>,
    spin_before_yield: u32,
}

impl TmContext {
    /// Allocate the shared state for a validated configuration
    pub fn new(config: &StmConfig) -> Self {
        Self {
            memory: SharedMemory::new(config.memory_words),
            orecs: OrecTable::new(config.orec_count, config.stripe_shift),
            sequencer: Sequencer::new(config.max_threads),
            global_lock: CacheAligned::new(AtomicU64::new(0)),
            slots: ThreadSlots::new(config.max_threads),
            contention: config.contention.build(config.contention_max_attempts),
            spin_before_yield: config.spin_before_yield,
        }
    }

    /// Fresh waiter with the configured yield threshold
    #[inline]
    pub fn spin(&self) -> SpinWait {
        SpinWait::new(self.spin_before_yield)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_debug_summarizes_tables() {
        let ctx = TmContext::new(&StmConfig {
            memory_words: 64,
            orec_count: 16,
            max_threads: 4,
            ..StmConfig::default()
        });
        let rendered = format!("{:?}", ctx);
        assert!(rendered.contains("SharedMemory { len: 64 }"));
        assert!(rendered.contains("OrecTable { len: 16, stripe_shift: 0 }"));
    }
}
