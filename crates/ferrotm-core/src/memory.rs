//! Word-addressed shared memory

use crate::error::{TxError, TxResult};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// A machine word of transactional memory
pub type Word = u64;

/// Index of a word in [`SharedMemory`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(pub usize);

impl Addr {
    /// Create a new address
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw word index
    pub fn index(&self) -> usize {
        self.0
    }

    /// Address `n` words further on
    pub fn offset(&self, n: usize) -> Self {
        Self(self.0 + n)
    }
}

impl From<usize> for Addr {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Byte mask selecting which bits of a word an access covers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mask(pub u64);

impl Mask {
    /// Every byte of the word
    pub const FULL: Mask = Mask(u64::MAX);
    /// No bytes
    pub const EMPTY: Mask = Mask(0);

    /// Mask covering bytes `[from, to)` of a little-endian word
    pub fn bytes(from: usize, to: usize) -> Self {
        let from = from.min(8);
        let to = to.clamp(from, 8);
        let mut bits = 0u64;
        for byte in from..to {
            bits |= 0xFFu64 << (byte * 8);
        }
        Mask(bits)
    }

    /// Whether every bit of `other` is also in `self`
    pub fn covers(&self, other: Mask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two masks
    pub fn union(&self, other: Mask) -> Mask {
        Mask(self.0 | other.0)
    }

    /// Whether this is the full word
    pub fn is_full(&self) -> bool {
        self.0 == u64::MAX
    }

    /// Replace the masked bits of `base` with those of `value`
    pub fn merge(&self, base: Word, value: Word) -> Word {
        (base & !self.0) | (value & self.0)
    }
}

impl Default for Mask {
    fn default() -> Self {
        Mask::FULL
    }
}

/// The region of memory transactions operate on
///
/// Every word is an `AtomicU64`, so racy non-transactional access is
/// well-defined; the protocols decide which interleavings are observable.
pub struct SharedMemory {
    words: Box<[AtomicU64]>,
}

impl SharedMemory {
    /// Allocate `len` zeroed words
    pub fn new(len: usize) -> Self {
        let words = (0..len).map(|_| AtomicU64::new(0)).collect();
        Self { words }
    }

    /// Number of words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the region has no words
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Fail with `InvalidAddress` unless `addr` is inside the region
    pub fn check(&self, addr: Addr) -> TxResult<()> {
        if addr.0 < self.words.len() {
            Ok(())
        } else {
            Err(TxError::InvalidAddress(addr))
        }
    }

    fn cell(&self, addr: Addr) -> TxResult<&AtomicU64> {
        self.words.get(addr.0).ok_or(TxError::InvalidAddress(addr))
    }

    /// Acquire load of a word
    pub fn load(&self, addr: Addr) -> TxResult<Word> {
        Ok(self.cell(addr)?.load(Ordering::Acquire))
    }

    /// Release store of the masked bytes of a word
    ///
    /// Callers hold exclusive write permission for the word (an owned orec,
    /// the global lock, or their commit turn), so the read-modify-write only
    /// races with readers.
    pub fn store(&self, addr: Addr, value: Word, mask: Mask) -> TxResult<()> {
        let cell = self.cell(addr)?;
        if mask.is_full() {
            cell.store(value, Ordering::Release);
        } else {
            let current = cell.load(Ordering::Acquire);
            cell.store(mask.merge(current, value), Ordering::Release);
        }
        Ok(())
    }

    /// Non-transactional initialization helper
    pub fn init(&self, addr: Addr, value: Word) -> TxResult<()> {
        self.cell(addr)?.store(value, Ordering::SeqCst);
        Ok(())
    }

    /// Non-transactional snapshot of a range (for checks after threads join)
    pub fn snapshot(&self, range: Range<usize>) -> Vec<Word> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        self.words[start..end]
            .iter()
            .map(|w| w.load(Ordering::SeqCst))
            .collect()
    }
}

impl fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("len", &self.words.len())
            .finish()
    }
}
