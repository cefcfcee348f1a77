//! Cohort-ordered batches with order numbers
//!
//! Transactions start together in a cohort and buffer their writes. Once a
//! member starts committing, no new transaction may begin until every order
//! handed out to the cohort has finished. Committers take an order number,
//! wait for their predecessor and for the whole cohort to stop running, then
//! validate and write back in order. The first committer of a cohort skips
//! validation: nothing was published since the cohort began.

use super::TmAlgorithm;
use crate::context::TmContext;
use crate::descriptor::TxDescriptor;
use crate::error::{TxError, TxResult};
use crate::memory::{Addr, Mask, Word};
use crate::validation::orecs_valid;
use std::ops::Range;

/// Plain cohorts protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct Cohorts;

impl TmAlgorithm for Cohorts {
    fn begin(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()> {
        let seq = &ctx.sequencer;
        let mut spin = ctx.spin();
        loop {
            spin.until(|| seq.is_drained());
            seq.join_cohort();
            // a member began committing between the check and the join
            if seq.is_drained() {
                break;
            }
            seq.leave_cohort();
            spin.spin();
        }
        tx.cohort_member = true;
        tx.ts_cache = seq.last_complete();
        Ok(())
    }

    fn read(
        &self,
        ctx: &TmContext,
        tx: &mut TxDescriptor,
        addr: Addr,
        mask: Mask,
    ) -> TxResult<Word> {
        if let Some(value) = tx.write_set.lookup(addr, mask) {
            return Ok(value);
        }
        let value = ctx.memory.load(addr)?;
        tx.read_orecs.push(ctx.orecs.index_of(addr));
        Ok(tx.write_set.overlay(addr, value))
    }

    fn write(
        &self,
        _ctx: &TmContext,
        tx: &mut TxDescriptor,
        addr: Addr,
        value: Word,
        mask: Mask,
    ) -> TxResult<()> {
        tx.write_set.insert(addr, value, mask);
        Ok(())
    }

    fn commit(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()> {
        let seq = &ctx.sequencer;
        if tx.write_set.is_empty() {
            seq.leave_cohort();
            tx.cohort_member = false;
            tx.clear_logs();
            return Ok(());
        }

        let order = seq.advance();
        tx.order = Some(order);
        // still counted in the cohort, so `committed` cannot move yet
        let first = order - 1 == seq.committed();
        seq.leave_cohort();
        tx.cohort_member = false;

        let mut spin = ctx.spin();
        spin.until(|| seq.last_complete() == order - 1);
        spin.until(|| seq.started() == 0);

        if !first && !orecs_valid(&ctx.orecs, &tx.read_orecs, tx.ts_cache, tx.slot) {
            return Err(TxError::ValidationFailure);
        }

        for entry in tx.write_set.iter() {
            ctx.orecs.for_addr(entry.addr).stamp(order);
            ctx.memory.store(entry.addr, entry.value, entry.mask)?;
        }

        seq.set_last_complete(order);
        tx.order = None;
        seq.mark_committed();
        tx.clear_logs();
        Ok(())
    }

    fn rollback(&self, ctx: &TmContext, tx: &mut TxDescriptor, _keep: Option<&Range<Addr>>) {
        let seq = &ctx.sequencer;
        if let Some(order) = tx.order.take() {
            // an abandoned order still finishes so successors can proceed
            seq.set_last_complete(order);
            seq.mark_committed();
        }
        if tx.cohort_member {
            seq.leave_cohort();
            tx.cohort_member = false;
        }
        tx.clear_logs();
    }

    fn on_switch_to(&self, ctx: &TmContext) {
        ctx.sequencer.raise_timestamp(ctx.orecs.max_version());
        ctx.sequencer.reset_cohorts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::Algorithm;
    use crate::config::StmConfig;

    fn context() -> TmContext {
        TmContext::new(&StmConfig {
            memory_words: 16,
            orec_count: 16,
            max_threads: 4,
            ..StmConfig::default()
        })
    }

    fn descriptor(slot: usize) -> TxDescriptor {
        TxDescriptor::new(slot, Algorithm::Cohorts)
    }

    #[test]
    fn test_writes_are_buffered_until_commit() {
        let ctx = context();
        let mut tx = descriptor(0);
        Cohorts.begin(&ctx, &mut tx).unwrap();
        assert_eq!(ctx.sequencer.started(), 1);

        Cohorts.write(&ctx, &mut tx, Addr(1), 8, Mask::FULL).unwrap();
        assert_eq!(ctx.memory.load(Addr(1)).unwrap(), 0);
        assert_eq!(Cohorts.read(&ctx, &mut tx, Addr(1), Mask::FULL).unwrap(), 8);

        Cohorts.commit(&ctx, &mut tx).unwrap();
        assert_eq!(ctx.memory.load(Addr(1)).unwrap(), 8);
        assert_eq!(ctx.sequencer.last_complete(), 1);
        assert_eq!(ctx.sequencer.committed(), 1);
        assert_eq!(ctx.sequencer.started(), 0);
        assert_eq!(ctx.orecs.for_addr(Addr(1)).raw(), 1);
    }

    #[test]
    fn test_second_committer_validates_against_first() {
        let ctx = context();
        let mut a = descriptor(0);
        let mut b = descriptor(1);
        Cohorts.begin(&ctx, &mut a).unwrap();
        Cohorts.begin(&ctx, &mut b).unwrap();

        Cohorts.read(&ctx, &mut b, Addr(2), Mask::FULL).unwrap();
        Cohorts.write(&ctx, &mut b, Addr(3), 1, Mask::FULL).unwrap();
        Cohorts.write(&ctx, &mut a, Addr(2), 5, Mask::FULL).unwrap();

        std::thread::scope(|s| {
            let first = s.spawn(|| Cohorts.commit(&ctx, &mut a));
            // `a` holds order 1 and waits for `b` to stop running
            ctx.spin().until(|| ctx.sequencer.timestamp() == 1);

            assert_eq!(Cohorts.commit(&ctx, &mut b), Err(TxError::ValidationFailure));
            assert_eq!(b.order(), Some(2));
            Cohorts.rollback(&ctx, &mut b, None);
            assert!(first.join().unwrap().is_ok());
        });

        let seq = &ctx.sequencer;
        assert_eq!(seq.last_complete(), 2);
        assert!(seq.is_drained());
        assert_eq!(ctx.memory.load(Addr(2)).unwrap(), 5);
        assert_eq!(ctx.memory.load(Addr(3)).unwrap(), 0);
    }

    #[test]
    fn test_read_only_commit_leaves_cohort() {
        let ctx = context();
        let mut tx = descriptor(0);
        Cohorts.begin(&ctx, &mut tx).unwrap();
        Cohorts.read(&ctx, &mut tx, Addr(0), Mask::FULL).unwrap();
        Cohorts.commit(&ctx, &mut tx).unwrap();
        assert_eq!(ctx.sequencer.started(), 0);
        assert_eq!(ctx.sequencer.timestamp(), 0);
    }

    #[test]
    fn test_switch_resets_cohort_state() {
        let ctx = context();
        ctx.orecs.get(0).stamp(9);
        ctx.sequencer.join_cohort();
        Cohorts.on_switch_to(&ctx);
        assert_eq!(ctx.sequencer.timestamp(), 9);
        assert_eq!(ctx.sequencer.last_complete(), 9);
        assert!(ctx.sequencer.is_drained());
        assert_eq!(ctx.sequencer.started(), 0);
    }
}
