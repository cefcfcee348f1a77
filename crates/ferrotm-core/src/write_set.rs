//! Redo write set - buffered writes applied at commit

use crate::memory::{Addr, Mask, SharedMemory, Word};
use crate::error::TxResult;
use std::collections::HashMap;

/// A buffered write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteEntry {
    /// Target word
    pub addr: Addr,
    /// Buffered value (only the masked bytes are meaningful)
    pub value: Word,
    /// Bytes written so far
    pub mask: Mask,
}

/// Ordered write set with unique addresses
///
/// Entries keep the order of first insertion; a later write to the same
/// address overwrites the masked bytes in place (last write wins).
#[derive(Clone, Debug, Default)]
pub struct WriteSet {
    entries: Vec<WriteEntry>,
    index: HashMap<Addr, usize>,
}

impl WriteSet {
    /// Create an empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a write
    pub fn insert(&mut self, addr: Addr, value: Word, mask: Mask) {
        match self.index.get(&addr) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.value = mask.merge(entry.value, value);
                entry.mask = entry.mask.union(mask);
            }
            None => {
                self.index.insert(addr, self.entries.len());
                self.entries.push(WriteEntry {
                    addr,
                    value: value & mask.0,
                    mask,
                });
            }
        }
    }

    /// Buffered entry for `addr`
    pub fn get(&self, addr: Addr) -> Option<&WriteEntry> {
        self.index.get(&addr).map(|&i| &self.entries[i])
    }

    /// Check if this transaction has written `addr`
    pub fn contains(&self, addr: Addr) -> bool {
        self.index.contains_key(&addr)
    }

    /// Read-after-write lookup
    ///
    /// Returns the buffered value when it covers every byte of `mask`;
    /// otherwise `None`, and the caller must read memory and
    /// [`overlay`](Self::overlay) the buffered bytes onto it.
    pub fn lookup(&self, addr: Addr, mask: Mask) -> Option<Word> {
        self.get(addr)
            .filter(|e| e.mask.covers(mask))
            .map(|e| e.value)
    }

    /// Merge any buffered bytes for `addr` over a value read from memory
    pub fn overlay(&self, addr: Addr, memory_value: Word) -> Word {
        match self.get(addr) {
            Some(e) => e.mask.merge(memory_value, e.value),
            None => memory_value,
        }
    }

    /// Apply every entry to memory in insertion order
    pub fn write_back(&self, memory: &SharedMemory) -> TxResult<()> {
        for e in &self.entries {
            memory.store(e.addr, e.value, e.mask)?;
        }
        Ok(())
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &WriteEntry> {
        self.entries.iter()
    }

    /// Number of distinct addresses written
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
