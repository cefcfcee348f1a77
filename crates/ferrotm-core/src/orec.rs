//! Ownership-record table - versioned locks striped over memory
//!
//! Each orec is a single `AtomicU64`. With the top bit clear the word is the
//! version of the last commit that wrote any address in the stripe; with it
//! set the low bits name the thread slot that currently owns the stripe.

use crate::memory::Addr;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bit marking an orec as owned
pub const OWNED_BIT: u64 = 1 << 63;

/// Decoded orec word
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrecState {
    /// Unowned, stamped with this version
    Version(u64),
    /// Owned by the thread in this slot
    Owned(usize),
}

impl OrecState {
    /// Decode a raw orec word
    pub fn decode(raw: u64) -> Self {
        if raw & OWNED_BIT != 0 {
            OrecState::Owned((raw & !OWNED_BIT) as usize)
        } else {
            OrecState::Version(raw)
        }
    }

    /// Encode into a raw orec word
    pub fn encode(self) -> u64 {
        match self {
            OrecState::Version(v) => v & !OWNED_BIT,
            OrecState::Owned(slot) => OWNED_BIT | slot as u64,
        }
    }
}

/// A single ownership record
#[derive(Debug, Default)]
pub struct Orec {
    word: AtomicU64,
}

impl Orec {
    /// Create an orec at version 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire load of the raw word
    #[inline]
    pub fn raw(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    /// Acquire load, decoded
    #[inline]
    pub fn state(&self) -> OrecState {
        OrecState::decode(self.raw())
    }

    /// Try to claim the orec for `slot`, expecting it unowned at `version`
    ///
    /// Returns the state actually observed on failure.
    pub fn try_acquire(&self, version: u64, slot: usize) -> Result<(), OrecState> {
        self.word
            .compare_exchange(
                OrecState::Version(version).encode(),
                OrecState::Owned(slot).encode(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(OrecState::decode)
    }

    /// Release ownership by publishing `version`
    #[inline]
    pub fn release(&self, version: u64) {
        self.word
            .store(OrecState::Version(version).encode(), Ordering::Release);
    }

    /// Stamp an unowned orec with a new version (ordered write-back)
    #[inline]
    pub fn stamp(&self, version: u64) {
        self.release(version);
    }

    /// Whether `slot` owns this orec
    pub fn is_owner(&self, slot: usize) -> bool {
        self.state() == OrecState::Owned(slot)
    }
}

/// Striped table of ownership records, shared process-wide
pub struct OrecTable {
    orecs: Box<[Orec]>,
    mask: usize,
    stripe_shift: u32,
}

impl OrecTable {
    /// Create `count` orecs (a power of two), each covering `1 << stripe_shift` words
    pub fn new(count: usize, stripe_shift: u32) -> Self {
        debug_assert!(count.is_power_of_two());
        let orecs = (0..count).map(|_| Orec::new()).collect();
        Self {
            orecs,
            mask: count - 1,
            stripe_shift,
        }
    }

    /// Index of the orec covering `addr`
    #[inline]
    pub fn index_of(&self, addr: Addr) -> usize {
        (addr.0 >> self.stripe_shift) & self.mask
    }

    /// Orec at a table index
    #[inline]
    pub fn get(&self, index: usize) -> &Orec {
        &self.orecs[index & self.mask]
    }

    /// Orec covering `addr`
    #[inline]
    pub fn for_addr(&self, addr: Addr) -> &Orec {
        self.get(self.index_of(addr))
    }

    /// Number of orecs
    pub fn len(&self) -> usize {
        self.orecs.len()
    }

    /// Whether the table is empty (never true for a constructed table)
    pub fn is_empty(&self) -> bool {
        self.orecs.is_empty()
    }

    /// Highest version stamped on any unowned orec
    pub fn max_version(&self) -> u64 {
        self.orecs
            .iter()
            .filter_map(|o| match o.state() {
                OrecState::Version(v) => Some(v),
                OrecState::Owned(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Number of currently owned orecs
    pub fn owned_count(&self) -> usize {
        self.orecs
            .iter()
            .filter(|o| matches!(o.state(), OrecState::Owned(_)))
            .count()
    }
}

impl fmt::Debug for OrecTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrecTable")
            .field("len", &self.orecs.len())
            .field("stripe_shift", &self.stripe_shift)
            .finish()
    }
}
