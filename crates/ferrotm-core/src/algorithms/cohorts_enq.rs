//! Cohort-ordered batches with a commit queue and in-place turbo mode
//!
//! Like [`Cohorts`](super::Cohorts), but commit order comes from a lock-free
//! queue of per-thread turn nodes instead of order numbers, and reads are
//! validated by value. A transaction that finds itself the only live member
//! of its cohort at its first write switches to in-place ("turbo") mode:
//! it writes memory directly and is never validated.

use super::TmAlgorithm;
use crate::context::TmContext;
use crate::descriptor::{TxDescriptor, TxMode, ValueLogEntry};
use crate::error::{TxError, TxResult};
use crate::memory::{Addr, Mask, Word};
use crate::validation::values_valid;
use std::ops::Range;

/// Queue-ordered cohorts protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct CohortsEnq;

impl CohortsEnq {
    /// Try to become the sole in-place writer
    ///
    /// The membership check is repeated after raising the flag: a
    /// transaction that joined in between either sees the flag and backs
    /// out, or is seen here.
    fn try_turbo(ctx: &TmContext) -> bool {
        let seq = &ctx.sequencer;
        if seq.started() != 1 {
            return false;
        }
        if seq.claim_inplace() {
            // flag already raised by someone else; leave it alone
            return false;
        }
        if seq.started() == 1 {
            return true;
        }
        seq.clear_inplace();
        false
    }

    /// Leave the cohort and drop the in-place flag once queued committers
    /// have drained
    fn finish_turbo(ctx: &TmContext, tx: &mut TxDescriptor) {
        let seq = &ctx.sequencer;
        seq.leave_cohort();
        tx.cohort_member = false;
        seq.queue().wait_empty(&mut ctx.spin());
        seq.clear_inplace();
        tx.mode = TxMode::Buffering;
    }

    fn finish_turn(ctx: &TmContext, tx: &mut TxDescriptor) {
        let queue = ctx.sequencer.queue();
        queue.mark_done(tx.slot);
        queue.release_if_tail(tx.slot);
        tx.enqueued = false;
    }
}

impl TmAlgorithm for CohortsEnq {
    fn begin(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()> {
        let seq = &ctx.sequencer;
        let queue = seq.queue();
        let mut spin = ctx.spin();
        loop {
            spin.until(|| queue.is_empty());
            seq.join_cohort();
            if queue.is_empty() && !seq.inplace() {
                break;
            }
            seq.leave_cohort();
            spin.spin();
        }
        tx.cohort_member = true;
        tx.mode = TxMode::Buffering;
        queue.reset_turn(tx.slot);
        Ok(())
    }

    fn read(
        &self,
        ctx: &TmContext,
        tx: &mut TxDescriptor,
        addr: Addr,
        mask: Mask,
    ) -> TxResult<Word> {
        if tx.mode == TxMode::InPlace {
            return ctx.memory.load(addr);
        }
        if let Some(value) = tx.write_set.lookup(addr, mask) {
            return Ok(value);
        }
        let value = ctx.memory.load(addr)?;
        tx.value_log.push(ValueLogEntry { addr, value, mask });
        Ok(tx.write_set.overlay(addr, value))
    }

    fn write(
        &self,
        ctx: &TmContext,
        tx: &mut TxDescriptor,
        addr: Addr,
        value: Word,
        mask: Mask,
    ) -> TxResult<()> {
        if tx.mode == TxMode::Buffering && tx.write_set.is_empty() && Self::try_turbo(ctx) {
            tx.mode = TxMode::InPlace;
            tracing::trace!(slot = tx.slot, "entered in-place mode");
        }
        if tx.mode == TxMode::InPlace {
            return tx.write_in_place(&ctx.memory, addr, value, mask);
        }
        tx.write_set.insert(addr, value, mask);
        Ok(())
    }

    fn commit(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()> {
        let seq = &ctx.sequencer;
        if tx.mode == TxMode::InPlace {
            Self::finish_turbo(ctx, tx);
            tx.clear_logs();
            return Ok(());
        }
        if tx.write_set.is_empty() {
            seq.leave_cohort();
            tx.cohort_member = false;
            tx.clear_logs();
            return Ok(());
        }

        let queue = seq.queue();
        let predecessor = queue.push(tx.slot);
        tx.enqueued = true;
        seq.leave_cohort();
        tx.cohort_member = false;

        let mut spin = ctx.spin();
        if let Some(pred) = predecessor {
            queue.wait_for(pred, &mut spin);
        }
        spin.until(|| seq.started() == 0);

        // the head of the queue skips validation unless a turbo writer ran
        if (seq.inplace() || predecessor.is_some()) && !values_valid(&ctx.memory, &tx.value_log)? {
            return Err(TxError::ValidationFailure);
        }

        tx.write_set.write_back(&ctx.memory)?;
        Self::finish_turn(ctx, tx);
        tx.clear_logs();
        Ok(())
    }

    fn rollback(&self, ctx: &TmContext, tx: &mut TxDescriptor, keep: Option<&Range<Addr>>) {
        if tx.enqueued {
            Self::finish_turn(ctx, tx);
        }
        if tx.mode == TxMode::InPlace {
            tx.undo(&ctx.memory, keep);
            Self::finish_turbo(ctx, tx);
        } else if tx.cohort_member {
            ctx.sequencer.leave_cohort();
            tx.cohort_member = false;
        }
        tx.clear_logs();
    }

    fn on_switch_to(&self, ctx: &TmContext) {
        ctx.sequencer.reset_cohorts();
    }
}
