//! Cache-line padding for hot shared words

use std::ops::Deref;

/// Cache line size in bytes (x86-64 and AArch64)
pub const CACHE_LINE_BYTES: usize = 64;

/// Wraps a value so it owns a whole cache line
///
/// Global counters and lock words are each placed in their own line so that
/// spinning on one does not invalidate its neighbours.
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    /// Wrap `value` with cache-line alignment
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    /// Unwrap, returning the inner value
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_alignment_and_size() {
        assert_eq!(std::mem::align_of::<CacheAligned<AtomicU64>>(), CACHE_LINE_BYTES);
        assert_eq!(std::mem::size_of::<CacheAligned<AtomicU64>>(), CACHE_LINE_BYTES);
    }

    #[test]
    fn test_deref() {
        let word = CacheAligned::new(AtomicU64::new(5));
        word.fetch_add(1, Ordering::Relaxed);
        assert_eq!(word.into_inner().into_inner(), 6);
    }
}
