//! Per-thread transaction interface
//!
//! A [`ThreadHandle`] is the entry point for everything a thread does
//! transactionally. Barriers validate the address, run the protocol chosen
//! at begin and, when the protocol reports a conflict, roll the attempt back
//! before returning the error: callers never see a half-aborted transaction.
//!
//! Nesting is flat. An inner `begin` only deepens the nesting count, an inner
//! `commit` only shallows it, and an abort anywhere aborts the outermost
//! transaction.

use crate::algorithms::{Algorithm, TmAlgorithm};
use crate::error::{TxError, TxResult};
use crate::memory::{Addr, Mask, Word};
use crate::runtime::Runtime;
use crate::descriptor::{TxDescriptor, TxMode};
use ferrotm_metrics::TxStats;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// A thread's attachment to a [`Runtime`]
///
/// Not `Sync`: each handle belongs to exactly one thread at a time.
pub struct ThreadHandle {
    runtime: Arc<Runtime>,
    tx: TxDescriptor,
    _not_sync: PhantomData<Cell<()>>,
}

impl ThreadHandle {
    pub(crate) fn new(runtime: Arc<Runtime>, slot: usize) -> Self {
        let algorithm = runtime.algorithm();
        Self {
            runtime,
            tx: TxDescriptor::new(slot, algorithm),
            _not_sync: PhantomData,
        }
    }

    /// Thread slot
    pub fn slot(&self) -> usize {
        self.tx.slot
    }

    /// Owning runtime
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Commit/abort counters for this thread
    pub fn stats(&self) -> &TxStats {
        &self.tx.stats
    }

    /// Transaction descriptor
    pub fn descriptor(&self) -> &TxDescriptor {
        &self.tx
    }

    /// Whether a transaction is running
    pub fn in_transaction(&self) -> bool {
        self.tx.in_transaction()
    }

    /// Flat nesting depth (0 outside a transaction)
    pub fn nesting_depth(&self) -> u32 {
        self.tx.nesting
    }

    fn protocol(&self) -> &'static dyn TmAlgorithm {
        self.tx.algorithm.protocol()
    }

    /// Begin a transaction (or deepen the current one)
    pub fn begin(&mut self) -> TxResult<()> {
        if self.tx.nesting > 0 {
            self.tx.nesting += 1;
            return Ok(());
        }
        let ctx = self.runtime.context();
        ctx.slots.enter(self.tx.slot, &mut ctx.spin());
        // the algorithm is fixed for the whole attempt
        self.tx.algorithm = self.runtime.algorithm();
        self.tx.nesting = 1;
        if let Err(e) = self.protocol().begin(ctx, &mut self.tx) {
            return Err(self.abort(e, None));
        }
        Ok(())
    }

    fn require_transaction(&self) -> TxResult<()> {
        if self.tx.nesting == 0 {
            return Err(TxError::NotInTransaction);
        }
        Ok(())
    }

    fn check_address(&mut self, addr: Addr) -> TxResult<()> {
        if let Err(e) = self.runtime.context().memory.check(addr) {
            return Err(self.abort(e, None));
        }
        Ok(())
    }

    /// Read a whole word
    pub fn read(&mut self, addr: Addr) -> TxResult<Word> {
        self.read_masked(addr, Mask::FULL)
    }

    /// Read the bytes of a word selected by `mask`
    pub fn read_masked(&mut self, addr: Addr, mask: Mask) -> TxResult<Word> {
        self.require_transaction()?;
        self.check_address(addr)?;
        let ctx = self.runtime.context();
        match self.protocol().read(ctx, &mut self.tx, addr, mask) {
            Ok(value) => Ok(value),
            Err(e) => Err(self.abort(e, None)),
        }
    }

    /// Write a whole word
    pub fn write(&mut self, addr: Addr, value: Word) -> TxResult<()> {
        self.write_masked(addr, value, Mask::FULL)
    }

    /// Write the bytes of `value` selected by `mask`
    pub fn write_masked(&mut self, addr: Addr, value: Word, mask: Mask) -> TxResult<()> {
        self.require_transaction()?;
        self.check_address(addr)?;
        let ctx = self.runtime.context();
        match self.protocol().write(ctx, &mut self.tx, addr, value, mask) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.abort(e, None)),
        }
    }

    /// Commit the transaction (or shallow the nesting)
    ///
    /// On success, actions registered with [`on_commit`](Self::on_commit)
    /// run after the transaction is fully published.
    pub fn commit(&mut self) -> TxResult<()> {
        self.require_transaction()?;
        if self.tx.nesting > 1 {
            self.tx.nesting -= 1;
            return Ok(());
        }
        let wrote = self.tx.has_writes() || self.tx.mode == TxMode::InPlace;
        let ctx = self.runtime.context();
        if let Err(e) = self.protocol().commit(ctx, &mut self.tx) {
            return Err(self.abort(e, None));
        }
        self.tx.stats.record_commit(wrote);
        self.finish();
        for action in std::mem::take(&mut self.tx.deferred) {
            action();
        }
        Ok(())
    }

    /// Abort the transaction at the caller's request
    pub fn rollback(&mut self) -> TxResult<()> {
        self.require_transaction()?;
        self.abort(TxError::Cancelled, None);
        Ok(())
    }

    /// Abort the transaction, keeping its writes to `exception`
    ///
    /// Buffered writes into the range are published and in-place writes
    /// into it are not undone, so an exception object built inside the
    /// transaction survives the unwind. The range must not be shared with
    /// other transactions.
    pub fn rollback_with_exception(&mut self, exception: Range<Addr>) -> TxResult<()> {
        self.require_transaction()?;
        self.abort(TxError::Cancelled, Some(&exception));
        Ok(())
    }

    /// Whether the transaction is guaranteed to commit
    pub fn is_irrevocable(&self) -> bool {
        self.tx.nesting > 0 && self.protocol().is_irrevocable(&self.tx)
    }

    /// Make the transaction impossible to abort
    ///
    /// Only the single-lock algorithm supports this; elsewhere the request
    /// is a fatal error and the transaction is rolled back.
    pub fn become_irrevocable(&mut self) -> TxResult<()> {
        self.require_transaction()?;
        let ctx = self.runtime.context();
        match self.protocol().become_irrevocable(ctx, &mut self.tx) {
            Ok(()) => {
                debug!(slot = self.tx.slot, algorithm = %self.tx.algorithm, "transaction became irrevocable");
                Ok(())
            }
            Err(e) => Err(self.abort(e, None)),
        }
    }

    /// Run `action` after the enclosing transaction commits
    ///
    /// Dropped without running if the transaction aborts. Outside a
    /// transaction the action runs immediately.
    pub fn on_commit(&mut self, action: impl FnOnce() + Send + 'static) {
        if self.tx.nesting == 0 {
            action();
        } else {
            self.tx.deferred.push(Box::new(action));
        }
    }

    /// Run `body` as a transaction, retrying it on conflicts
    ///
    /// Retries follow the runtime's [`RetryPolicy`](crate::RetryPolicy).
    /// Errors that are not retryable, including an explicit
    /// [`Transaction::cancel`], end the loop and are returned. Called inside
    /// an already running transaction, `body` runs once as a nested part of
    /// it and any failure propagates to the outer transaction.
    pub fn atomically<T, F>(&mut self, mut body: F) -> TxResult<T>
    where
        F: FnMut(&mut Transaction<'_>) -> TxResult<T>,
    {
        if self.tx.nesting > 0 {
            self.begin()?;
            return match body(&mut Transaction { handle: self }) {
                Ok(value) => {
                    self.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    // the whole flattened transaction goes, not just this level
                    if self.tx.nesting > 0 {
                        self.abort(e.clone(), None);
                    }
                    Err(e)
                }
            };
        }

        let policy = self.runtime.retry_policy().clone();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.attempt(&mut body, policy.should_escalate(attempt)) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if let Err(final_err) = policy.check(attempt, &err) {
                if matches!(final_err, TxError::RetriesExhausted { .. }) {
                    warn!(slot = self.tx.slot, attempts = attempt, last = %err, "transaction retries exhausted");
                }
                return Err(final_err);
            }
            policy.backoff(attempt);
        }
    }

    fn attempt<T, F>(&mut self, body: &mut F, escalate: bool) -> TxResult<T>
    where
        F: FnMut(&mut Transaction<'_>) -> TxResult<T>,
    {
        self.begin()?;
        if escalate && self.tx.algorithm.supports_irrevocability() {
            self.become_irrevocable()?;
        }
        match body(&mut Transaction { handle: self }) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                // errors raised by the body itself leave the attempt open
                if self.tx.nesting > 0 {
                    self.abort(e.clone(), None);
                }
                Err(e)
            }
        }
    }

    /// Roll back the running attempt and account for it
    fn abort(&mut self, err: TxError, keep: Option<&Range<Addr>>) -> TxError {
        let ctx = self.runtime.context();
        if let Some(range) = keep {
            self.tx.publish_range(&ctx.memory, range);
        }
        self.protocol().rollback(ctx, &mut self.tx, keep);
        self.tx.stats.record_abort(err.abort_kind());
        if err.is_fatal() {
            error!(slot = self.tx.slot, algorithm = %self.tx.algorithm, error = %err, "transaction failed");
        } else {
            trace!(slot = self.tx.slot, algorithm = %self.tx.algorithm, reason = %err, "transaction aborted");
        }
        self.tx.deferred.clear();
        self.finish();
        err
    }

    fn finish(&mut self) {
        self.tx.nesting = 0;
        self.tx.mode = TxMode::Buffering;
        self.runtime.context().slots.exit(self.tx.slot);
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        if self.tx.nesting > 0 {
            self.abort(TxError::Cancelled, None);
        }
        self.runtime.metrics().record_stats(&self.tx.stats);
        self.runtime
            .metrics()
            .gauge_add(ferrotm_metrics::ATTACHED_THREADS, -1);
        self.runtime.context().slots.release(self.tx.slot);
        debug!(slot = self.tx.slot, commits = self.tx.stats.commits(), aborts = self.tx.stats.aborts(), "thread detached");
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("slot", &self.tx.slot)
            .field("tx", &self.tx)
            .finish()
    }
}

/// Closure-facing view of a running transaction
pub struct Transaction<'a> {
    handle: &'a mut ThreadHandle,
}

impl Transaction<'_> {
    /// Read a whole word
    pub fn read(&mut self, addr: Addr) -> TxResult<Word> {
        self.handle.read(addr)
    }

    /// Read the bytes of a word selected by `mask`
    pub fn read_masked(&mut self, addr: Addr, mask: Mask) -> TxResult<Word> {
        self.handle.read_masked(addr, mask)
    }

    /// Write a whole word
    pub fn write(&mut self, addr: Addr, value: Word) -> TxResult<()> {
        self.handle.write(addr, value)
    }

    /// Write the bytes of `value` selected by `mask`
    pub fn write_masked(&mut self, addr: Addr, value: Word, mask: Mask) -> TxResult<()> {
        self.handle.write_masked(addr, value, mask)
    }

    /// Whether the transaction is guaranteed to commit
    pub fn is_irrevocable(&self) -> bool {
        self.handle.is_irrevocable()
    }

    /// Make the transaction impossible to abort
    pub fn become_irrevocable(&mut self) -> TxResult<()> {
        self.handle.become_irrevocable()
    }

    /// Run `action` after commit
    pub fn on_commit(&mut self, action: impl FnOnce() + Send + 'static) {
        self.handle.on_commit(action)
    }

    /// Algorithm this attempt runs under
    pub fn algorithm(&self) -> Algorithm {
        self.handle.tx.algorithm
    }

    /// Abandon the transaction: `return tx.cancel();`
    pub fn cancel<T>(&mut self) -> TxResult<T> {
        if self.handle.tx.nesting > 0 {
            self.handle.abort(TxError::Cancelled, None);
        }
        Err(TxError::Cancelled)
    }
}
