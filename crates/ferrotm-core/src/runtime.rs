//! Runtime - shared state, thread attachment and algorithm switching

use crate::algorithms::Algorithm;
use crate::config::StmConfig;
use crate::context::TmContext;
use crate::error::{ConfigError, TxError, TxResult};
use crate::handle::ThreadHandle;
use crate::memory::SharedMemory;
use crate::retry::RetryPolicy;
use ferrotm_metrics::{timed, Metrics, ALGORITHM_SWITCHES, ATTACHED_THREADS, QUIESCE_US};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Transactional memory runtime
///
/// Owns the shared memory and all protocol metadata. Threads take part by
/// attaching, which hands out a [`ThreadHandle`] bound to a thread slot.
pub struct Runtime {
    ctx: TmContext,
    config: StmConfig,
    algorithm: AtomicU8,
    switch_lock: Mutex<()>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl Runtime {
    /// Create a runtime from a configuration
    pub fn new(config: StmConfig) -> Result<Arc<Self>, ConfigError> {
        Self::with_metrics(config, Arc::new(Metrics::new()))
    }

    /// Create a runtime reporting into an existing metrics registry
    pub fn with_metrics(config: StmConfig, metrics: Arc<Metrics>) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let ctx = TmContext::new(&config);
        info!(
            algorithm = %config.algorithm,
            memory_words = config.memory_words,
            orecs = config.orec_count,
            max_threads = config.max_threads,
            contention = ctx.contention.name(),
            "transactional memory runtime created"
        );
        Ok(Arc::new(Self {
            algorithm: AtomicU8::new(config.algorithm.id()),
            retry: RetryPolicy::new(config.retry.clone()),
            switch_lock: Mutex::new(()),
            ctx,
            config,
            metrics,
        }))
    }

    /// Attach the calling thread
    pub fn attach(self: &Arc<Self>) -> TxResult<ThreadHandle> {
        let slot = self.ctx.slots.claim().ok_or(TxError::ThreadLimit {
            max: self.config.max_threads,
        })?;
        self.metrics.gauge_add(ATTACHED_THREADS, 1);
        debug!(slot, "thread attached");
        Ok(ThreadHandle::new(Arc::clone(self), slot))
    }

    /// Algorithm new transactions run under
    pub fn algorithm(&self) -> Algorithm {
        Algorithm::from_id(self.algorithm.load(Ordering::SeqCst)).unwrap_or_default()
    }

    /// Install a different algorithm
    ///
    /// Blocks new transactions, waits for running ones to finish, prepares
    /// the metadata for the target protocol and reopens admission. Must not
    /// be called from a thread that is inside a transaction.
    pub fn switch_algorithm(&self, target: Algorithm) {
        let _guard = self.switch_lock.lock();
        let current = self.algorithm();
        let mut spin = self.ctx.spin();
        timed!(self.metrics, QUIESCE_US, {
            self.ctx.slots.quiesce(&mut spin);
        });
        target.protocol().on_switch_to(&self.ctx);
        self.algorithm.store(target.id(), Ordering::SeqCst);
        self.ctx.slots.resume();
        self.metrics.counter(ALGORITHM_SWITCHES, 1);
        debug!(from = %current, to = %target, "algorithm switched");
    }

    /// Shared memory, for setup and inspection outside transactions
    pub fn memory(&self) -> &SharedMemory {
        &self.ctx.memory
    }

    /// Configuration in effect
    pub fn config(&self) -> &StmConfig {
        &self.config
    }

    /// Retry policy used by `atomically`
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Metrics registry
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Number of attached threads
    pub fn attached_threads(&self) -> usize {
        self.ctx.slots.claimed_count()
    }

    pub(crate) fn context(&self) -> &TmContext {
        &self.ctx
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("algorithm", &self.algorithm())
            .field("memory_words", &self.config.memory_words)
            .field("attached_threads", &self.attached_threads())
            .finish()
    }
}
