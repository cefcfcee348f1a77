//! Eager acquisition over ownership records
//!
//! Reads check the covering orec against the start time. A write claims the
//! orec at first touch, logs the old value and writes in place. Commit takes
//! a new timestamp, validates the read orecs if anyone committed since the
//! start, and releases every owned orec stamped with that timestamp.

use super::TmAlgorithm;
use crate::context::TmContext;
use crate::contention::{ConflictAction, ConflictInfo};
use crate::descriptor::{LockEntry, TxDescriptor};
use crate::error::{TxError, TxResult};
use crate::memory::{Addr, Mask, Word};
use crate::orec::OrecState;
use crate::spin::pause;
use crate::validation::orecs_valid;
use std::ops::Range;

/// Eager-acquire protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct EagerAcquire;

impl EagerAcquire {
    /// Ask the contention manager about an owned orec
    ///
    /// `Ok` means look at the orec again; `Err` aborts the requester.
    fn resolve(
        ctx: &TmContext,
        tx: &TxDescriptor,
        addr: Addr,
        owner: usize,
        attempt: &mut u32,
    ) -> TxResult<()> {
        *attempt += 1;
        let info = ConflictInfo {
            slot: tx.slot,
            owner,
            attempt: *attempt,
            consecutive_aborts: tx.stats.consecutive_aborts,
        };
        match ctx.contention.on_conflict(&info) {
            ConflictAction::Backoff(spins) => pause(spins),
            ConflictAction::Yield => std::thread::yield_now(),
            ConflictAction::AbortOwner => {
                if ctx.slots.request_abort(owner) {
                    tracing::trace!(slot = tx.slot, victim = owner, %addr, "requested owner abort");
                }
                std::thread::yield_now();
            }
            ConflictAction::AbortSelf => return Err(TxError::Conflict { addr }),
        }
        Self::check_killed(ctx, tx, addr)
    }

    #[inline]
    fn check_killed(ctx: &TmContext, tx: &TxDescriptor, addr: Addr) -> TxResult<()> {
        if ctx.slots.abort_requested(tx.slot) {
            return Err(TxError::Conflict { addr });
        }
        Ok(())
    }

    fn release_all(ctx: &TmContext, tx: &mut TxDescriptor, version: u64) {
        for lock in tx.locks.drain(..) {
            ctx.orecs.get(lock.orec).release(version);
        }
    }
}

impl TmAlgorithm for EagerAcquire {
    fn begin(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()> {
        tx.start_time = ctx.sequencer.timestamp();
        Ok(())
    }

    fn read(
        &self,
        ctx: &TmContext,
        tx: &mut TxDescriptor,
        addr: Addr,
        _mask: Mask,
    ) -> TxResult<Word> {
        Self::check_killed(ctx, tx, addr)?;
        let index = ctx.orecs.index_of(addr);
        let orec = ctx.orecs.get(index);
        let mut attempt = 0;
        loop {
            let before = orec.raw();
            match OrecState::decode(before) {
                OrecState::Owned(owner) if owner == tx.slot => return ctx.memory.load(addr),
                OrecState::Owned(owner) => Self::resolve(ctx, tx, addr, owner, &mut attempt)?,
                OrecState::Version(v) if v > tx.start_time => {
                    return Err(TxError::Conflict { addr });
                }
                OrecState::Version(_) => {
                    let value = ctx.memory.load(addr)?;
                    if orec.raw() == before {
                        tx.read_orecs.push(index);
                        return Ok(value);
                    }
                }
            }
        }
    }

    fn write(
        &self,
        ctx: &TmContext,
        tx: &mut TxDescriptor,
        addr: Addr,
        value: Word,
        mask: Mask,
    ) -> TxResult<()> {
        Self::check_killed(ctx, tx, addr)?;
        let index = ctx.orecs.index_of(addr);
        let orec = ctx.orecs.get(index);
        let mut attempt = 0;
        loop {
            match orec.state() {
                OrecState::Owned(owner) if owner == tx.slot => break,
                OrecState::Owned(owner) => Self::resolve(ctx, tx, addr, owner, &mut attempt)?,
                OrecState::Version(v) if v > tx.start_time => {
                    return Err(TxError::Conflict { addr });
                }
                OrecState::Version(v) => {
                    if orec.try_acquire(v, tx.slot).is_ok() {
                        tx.locks.push(LockEntry { orec: index });
                        break;
                    }
                }
            }
        }
        tx.write_in_place(&ctx.memory, addr, value, mask)
    }

    fn commit(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()> {
        if tx.locks.is_empty() {
            tx.clear_logs();
            return Ok(());
        }
        if ctx.slots.abort_requested(tx.slot) {
            return Err(TxError::ValidationFailure);
        }
        let end = ctx.sequencer.advance();
        if end != tx.start_time + 1
            && !orecs_valid(&ctx.orecs, &tx.read_orecs, tx.start_time, tx.slot)
        {
            return Err(TxError::ValidationFailure);
        }
        Self::release_all(ctx, tx, end);
        tx.clear_logs();
        Ok(())
    }

    fn rollback(&self, ctx: &TmContext, tx: &mut TxDescriptor, keep: Option<&Range<Addr>>) {
        tx.undo(&ctx.memory, keep);
        if !tx.locks.is_empty() {
            // a reader that saw the speculative value must fail validation,
            // so the released orecs carry a version newer than any snapshot
            let version = ctx.sequencer.advance();
            Self::release_all(ctx, tx, version);
        }
        tx.clear_logs();
    }

    fn on_switch_to(&self, ctx: &TmContext) {
        ctx.sequencer.raise_timestamp(ctx.orecs.max_version());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::Algorithm;
    use crate::config::StmConfig;
    use crate::contention::ContentionPolicy;

    fn context() -> TmContext {
        TmContext::new(&StmConfig {
            memory_words: 64,
            orec_count: 64,
            max_threads: 4,
            contention: ContentionPolicy::HyperAggressive,
            ..StmConfig::default()
        })
    }

    fn descriptor(slot: usize) -> TxDescriptor {
        TxDescriptor::new(slot, Algorithm::EagerAcquire)
    }

    #[test]
    fn test_write_claims_orec_and_commit_releases() {
        let ctx = context();
        let mut tx = descriptor(0);
        EagerAcquire.begin(&ctx, &mut tx).unwrap();
        EagerAcquire.write(&ctx, &mut tx, Addr(3), 9, Mask::FULL).unwrap();

        assert!(ctx.orecs.for_addr(Addr(3)).is_owner(0));
        assert_eq!(ctx.memory.load(Addr(3)).unwrap(), 9);

        EagerAcquire.commit(&ctx, &mut tx).unwrap();
        assert_eq!(ctx.orecs.for_addr(Addr(3)).state(), OrecState::Version(1));
        assert_eq!(ctx.sequencer.timestamp(), 1);
    }

    #[test]
    fn test_second_writer_conflicts() {
        let ctx = context();
        let mut a = descriptor(0);
        let mut b = descriptor(1);
        EagerAcquire.begin(&ctx, &mut a).unwrap();
        EagerAcquire.begin(&ctx, &mut b).unwrap();

        EagerAcquire.write(&ctx, &mut a, Addr(5), 1, Mask::FULL).unwrap();
        assert_eq!(
            EagerAcquire.write(&ctx, &mut b, Addr(5), 2, Mask::FULL),
            Err(TxError::Conflict { addr: Addr(5) })
        );
        assert_eq!(
            EagerAcquire.read(&ctx, &mut b, Addr(5), Mask::FULL),
            Err(TxError::Conflict { addr: Addr(5) })
        );
    }

    #[test]
    fn test_read_newer_version_conflicts() {
        let ctx = context();
        let mut reader = descriptor(0);
        EagerAcquire.begin(&ctx, &mut reader).unwrap();

        let mut writer = descriptor(1);
        EagerAcquire.begin(&ctx, &mut writer).unwrap();
        EagerAcquire.write(&ctx, &mut writer, Addr(1), 4, Mask::FULL).unwrap();
        EagerAcquire.commit(&ctx, &mut writer).unwrap();

        assert!(matches!(
            EagerAcquire.read(&ctx, &mut reader, Addr(1), Mask::FULL),
            Err(TxError::Conflict { .. })
        ));
    }

    #[test]
    fn test_commit_fails_validation_after_interleaved_commit() {
        let ctx = context();
        let mut a = descriptor(0);
        let mut b = descriptor(1);
        EagerAcquire.begin(&ctx, &mut a).unwrap();
        EagerAcquire.begin(&ctx, &mut b).unwrap();

        EagerAcquire.read(&ctx, &mut a, Addr(0), Mask::FULL).unwrap();
        EagerAcquire.write(&ctx, &mut b, Addr(0), 7, Mask::FULL).unwrap();
        EagerAcquire.commit(&ctx, &mut b).unwrap();

        EagerAcquire.write(&ctx, &mut a, Addr(1), 1, Mask::FULL).unwrap();
        assert_eq!(EagerAcquire.commit(&ctx, &mut a), Err(TxError::ValidationFailure));
        EagerAcquire.rollback(&ctx, &mut a, None);
        assert_eq!(ctx.memory.load(Addr(1)).unwrap(), 0);
        assert_eq!(ctx.orecs.owned_count(), 0);
    }

    #[test]
    fn test_rollback_restores_and_publishes_newer_version() {
        let ctx = context();
        ctx.memory.init(Addr(2), 11).unwrap();
        let mut tx = descriptor(0);
        EagerAcquire.begin(&ctx, &mut tx).unwrap();
        EagerAcquire.write(&ctx, &mut tx, Addr(2), 12, Mask::FULL).unwrap();
        EagerAcquire.write(&ctx, &mut tx, Addr(2), 13, Mask::FULL).unwrap();
        // one lock entry per claimed orec, however often it is written
        assert_eq!(
            tx.locks,
            vec![LockEntry {
                orec: ctx.orecs.index_of(Addr(2))
            }]
        );

        EagerAcquire.rollback(&ctx, &mut tx, None);
        assert!(tx.locks.is_empty());
        assert_eq!(ctx.memory.load(Addr(2)).unwrap(), 11);
        match ctx.orecs.for_addr(Addr(2)).state() {
            OrecState::Version(v) => assert!(v > tx.start_time),
            other => panic!("orec still owned: {:?}", other),
        }
        assert!(ctx.sequencer.timestamp() >= ctx.orecs.max_version());
    }

    #[test]
    fn test_kill_request_aborts_victim() {
        let ctx = context();
        let mut tx = descriptor(2);
        ctx.slots.enter(2, &mut ctx.spin());
        EagerAcquire.begin(&ctx, &mut tx).unwrap();
        assert!(ctx.slots.request_abort(2));
        assert!(matches!(
            EagerAcquire.read(&ctx, &mut tx, Addr(0), Mask::FULL),
            Err(TxError::Conflict { .. })
        ));
    }

    #[test]
    fn test_switch_raises_timestamp() {
        let ctx = context();
        ctx.orecs.get(7).stamp(40);
        EagerAcquire.on_switch_to(&ctx);
        assert_eq!(ctx.sequencer.timestamp(), 40);
    }
}
