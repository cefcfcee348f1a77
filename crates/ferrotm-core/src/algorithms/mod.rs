//! Transactional protocols and their dispatch
//!
//! Each protocol is a unit struct implementing [`TmAlgorithm`]. The closed
//! [`Algorithm`] enum names them and resolves to the implementation; a
//! transaction resolves once at begin and keeps that protocol until it
//! commits or aborts.
//!
//! Contract shared by all protocols:
//! - `read`/`write`/`commit` returning `Err` leave the descriptor in a state
//!   where `rollback` finishes the abort (any commit order or queue turn the
//!   attempt holds is released there).
//! - `rollback` never fails and leaves no trace of the attempt in memory or
//!   in the shared metadata, except for writes inside the `keep` range.

mod cohorts;
mod cohorts_enq;
mod eager;
mod single_lock;

pub use cohorts::Cohorts;
pub use cohorts_enq::CohortsEnq;
pub use eager::EagerAcquire;
pub use single_lock::SingleLock;

use crate::context::TmContext;
use crate::descriptor::{TxDescriptor, TxMode};
use crate::error::{TxError, TxResult};
use crate::memory::{Addr, Mask, Word};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Protocol operations
pub trait TmAlgorithm: Send + Sync {
    /// Start an attempt
    fn begin(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()>;

    /// Transactional read of the bytes of `addr` selected by `mask`
    fn read(&self, ctx: &TmContext, tx: &mut TxDescriptor, addr: Addr, mask: Mask)
        -> TxResult<Word>;

    /// Transactional write of the bytes of `value` selected by `mask`
    fn write(
        &self,
        ctx: &TmContext,
        tx: &mut TxDescriptor,
        addr: Addr,
        value: Word,
        mask: Mask,
    ) -> TxResult<()>;

    /// Publish the attempt
    fn commit(&self, ctx: &TmContext, tx: &mut TxDescriptor) -> TxResult<()>;

    /// Undo the attempt and release everything it holds
    fn rollback(&self, ctx: &TmContext, tx: &mut TxDescriptor, keep: Option<&Range<Addr>>);

    /// Whether the attempt can no longer abort
    fn is_irrevocable(&self, tx: &TxDescriptor) -> bool {
        tx.mode == TxMode::InPlace
    }

    /// Make the attempt impossible to abort
    fn become_irrevocable(&self, _ctx: &TmContext, _tx: &mut TxDescriptor) -> TxResult<()> {
        Err(TxError::UnsupportedOperation("irrevocability"))
    }

    /// Prepare shared metadata before this protocol takes over
    ///
    /// Runs while every thread is quiesced.
    fn on_switch_to(&self, ctx: &TmContext);
}

/// Selectable protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Per-location orecs acquired at first write, in-place writes
    #[default]
    EagerAcquire,
    /// One global sequence lock; one writer at a time
    SingleLock,
    /// Cohorts with order numbers and orec validation
    Cohorts,
    /// Cohorts with a commit queue, value validation and in-place turbo
    CohortsEnq,
}

static EAGER: EagerAcquire = EagerAcquire;
static SINGLE_LOCK: SingleLock = SingleLock;
static COHORTS: Cohorts = Cohorts;
static COHORTS_ENQ: CohortsEnq = CohortsEnq;

impl Algorithm {
    /// Every algorithm
    pub const ALL: [Algorithm; 4] = [
        Algorithm::EagerAcquire,
        Algorithm::SingleLock,
        Algorithm::Cohorts,
        Algorithm::CohortsEnq,
    ];

    /// Configuration name
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::EagerAcquire => "eager-acquire",
            Algorithm::SingleLock => "single-lock",
            Algorithm::Cohorts => "cohorts",
            Algorithm::CohortsEnq => "cohorts-enq",
        }
    }

    /// One-line description
    pub fn description(self) -> &'static str {
        match self {
            Algorithm::EagerAcquire => "encounter-time orec acquisition with undo logging",
            Algorithm::SingleLock => "global sequence lock, single in-place writer",
            Algorithm::Cohorts => "batched cohorts committing in order-number sequence",
            Algorithm::CohortsEnq => "batched cohorts with commit queue and in-place turbo mode",
        }
    }

    /// Whether `become_irrevocable` can succeed
    pub fn supports_irrevocability(self) -> bool {
        matches!(self, Algorithm::SingleLock)
    }

    /// Stable numeric id
    pub(crate) fn id(self) -> u8 {
        match self {
            Algorithm::EagerAcquire => 0,
            Algorithm::SingleLock => 1,
            Algorithm::Cohorts => 2,
            Algorithm::CohortsEnq => 3,
        }
    }

    /// Inverse of [`id`](Self::id)
    pub(crate) fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// The protocol implementation
    pub fn protocol(self) -> &'static dyn TmAlgorithm {
        match self {
            Algorithm::EagerAcquire => &EAGER,
            Algorithm::SingleLock => &SINGLE_LOCK,
            Algorithm::Cohorts => &COHORTS,
            Algorithm::CohortsEnq => &COHORTS_ENQ,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown algorithm name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.name() == lower)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}
