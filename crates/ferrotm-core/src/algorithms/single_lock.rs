//! Single global sequence lock
//!
//! Readers run against a snapshot of the lock word and abort as soon as it
//! moves. The first write bumps the lock from the snapshot to odd, after
//! which the transaction is the only writer and cannot be aborted by
//! anyone else.

use super::TmAlgorithm;
use crate::context::TmContext;
use crate::descriptor::{TxDescriptor, TxMode};
use crate::error::{TxError, TxResult};
use crate::memory::{Addr, Mask, Word};
use std::ops::Range;
use std::sync::atomic::Ordering;

/// Single-lock protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleLock;

impl SingleLock {
    /// Move the lock from the snapshot to odd
    fn acquire(ctx: &TmContext, tx: &mut TxDescriptor) -> bool {
        let claimed = ctx
            .global_lock
            .compare_exchange(
                tx.start_time,
                tx.start_time + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if claimed {
            tx.start_time += 1;
            tx.mode = TxMode::InPlace;
        }
        claimed
    }

    fn release(ctx: &TmContext, tx: &mut TxDescriptor) {
        ctx.global_lock.fetch_add(1, Ordering::Release);
        tx.mode = TxMode::Buffering;
    }
}

impl TmAlgorithm for SingleLock {
    fn begin(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()> {
        let mut spin = ctx.spin();
        loop {
            let seq = ctx.global_lock.load(Ordering::Acquire);
            if seq & 1 == 0 {
                tx.start_time = seq;
                tx.mode = TxMode::Buffering;
                return Ok(());
            }
            spin.spin();
        }
    }

    fn read(
        &self,
        ctx: &TmContext,
        tx: &mut TxDescriptor,
        addr: Addr,
        _mask: Mask,
    ) -> TxResult<Word> {
        let value = ctx.memory.load(addr)?;
        if tx.mode == TxMode::Buffering && ctx.global_lock.load(Ordering::Acquire) != tx.start_time
        {
            return Err(TxError::Conflict { addr });
        }
        Ok(value)
    }

    fn write(
        &self,
        ctx: &TmContext,
        tx: &mut TxDescriptor,
        addr: Addr,
        value: Word,
        mask: Mask,
    ) -> TxResult<()> {
        if tx.mode == TxMode::Buffering && !Self::acquire(ctx, tx) {
            return Err(TxError::Conflict { addr });
        }
        tx.write_in_place(&ctx.memory, addr, value, mask)
    }

    fn commit(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()> {
        if tx.mode == TxMode::InPlace {
            Self::release(ctx, tx);
        }
        tx.clear_logs();
        Ok(())
    }

    fn rollback(&self, ctx: &TmContext, tx: &mut TxDescriptor, keep: Option<&Range<Addr>>) {
        if tx.mode == TxMode::InPlace {
            tx.undo(&ctx.memory, keep);
            Self::release(ctx, tx);
        }
        tx.clear_logs();
    }

    fn become_irrevocable(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()> {
        if tx.mode == TxMode::InPlace || Self::acquire(ctx, tx) {
            return Ok(());
        }
        // a writer committed since the snapshot; earlier reads may be stale
        Err(TxError::ValidationFailure)
    }

    fn on_switch_to(&self, ctx: &TmContext) {
        let seq = ctx.global_lock.load(Ordering::Acquire);
        if seq & 1 == 1 {
            tracing::error!(lock = seq, "global lock held across an algorithm switch");
            ctx.global_lock.fetch_add(1, Ordering::Release);
        }
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

    fn lock(ctx: &TmContext) -> u64 {
        ctx.global_lock.load(Ordering::SeqCst)
    }

    #[test]
    fn test_writer_holds_odd_lock() {
        let ctx = context();
        let mut tx = TxDescriptor::new(0, Algorithm::SingleLock);
        SingleLock.begin(&ctx, &mut tx).unwrap();
        assert!(!SingleLock.is_irrevocable(&tx));

        SingleLock.write(&ctx, &mut tx, Addr(0), 5, Mask::FULL).unwrap();
        assert_eq!(lock(&ctx), 1);
        assert!(SingleLock.is_irrevocable(&tx));
        assert_eq!(SingleLock.read(&ctx, &mut tx, Addr(0), Mask::FULL).unwrap(), 5);

        SingleLock.commit(&ctx, &mut tx).unwrap();
        assert_eq!(lock(&ctx), 2);
        assert_eq!(ctx.memory.load(Addr(0)).unwrap(), 5);
    }

    #[test]
    fn test_second_writer_and_stale_reader_conflict() {
        let ctx = context();
        let mut a = TxDescriptor::new(0, Algorithm::SingleLock);
        let mut b = TxDescriptor::new(1, Algorithm::SingleLock);
        SingleLock.begin(&ctx, &mut a).unwrap();
        SingleLock.begin(&ctx, &mut b).unwrap();

        SingleLock.write(&ctx, &mut a, Addr(1), 1, Mask::FULL).unwrap();
        assert_eq!(
            SingleLock.write(&ctx, &mut b, Addr(2), 2, Mask::FULL),
            Err(TxError::Conflict { addr: Addr(2) })
        );
        assert!(SingleLock.read(&ctx, &mut b, Addr(3), Mask::FULL).is_err());
        SingleLock.rollback(&ctx, &mut b, None);
        // the loser held nothing, so the lock is untouched
        assert_eq!(lock(&ctx), 1);
    }

    #[test]
    fn test_rollback_undoes_and_releases() {
        let ctx = context();
        ctx.memory.init(Addr(4), 40).unwrap();
        let mut tx = TxDescriptor::new(0, Algorithm::SingleLock);
        SingleLock.begin(&ctx, &mut tx).unwrap();
        SingleLock.write(&ctx, &mut tx, Addr(4), 41, Mask::FULL).unwrap();

        SingleLock.rollback(&ctx, &mut tx, None);
        assert_eq!(ctx.memory.load(Addr(4)).unwrap(), 40);
        assert_eq!(lock(&ctx) & 1, 0);
        assert_eq!(tx.mode(), TxMode::Buffering);
    }

    #[test]
    fn test_become_irrevocable() {
        let ctx = context();
        let mut a = TxDescriptor::new(0, Algorithm::SingleLock);
        SingleLock.begin(&ctx, &mut a).unwrap();
        SingleLock.become_irrevocable(&ctx, &mut a).unwrap();
        assert!(SingleLock.is_irrevocable(&a));
        SingleLock.commit(&ctx, &mut a).unwrap();

        // snapshot taken before another writer committed
        let mut stale = TxDescriptor::new(1, Algorithm::SingleLock);
        SingleLock.begin(&ctx, &mut stale).unwrap();
        let mut w = TxDescriptor::new(0, Algorithm::SingleLock);
        SingleLock.begin(&ctx, &mut w).unwrap();
        SingleLock.write(&ctx, &mut w, Addr(0), 1, Mask::FULL).unwrap();
        SingleLock.commit(&ctx, &mut w).unwrap();
        assert_eq!(
            SingleLock.become_irrevocable(&ctx, &mut stale),
            Err(TxError::ValidationFailure)
        );
    }
}
