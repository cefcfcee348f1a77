//! Read-evidence validation

use crate::descriptor::ValueLogEntry;
use crate::error::TxResult;
use crate::memory::SharedMemory;
use crate::orec::{OrecState, OrecTable};

/// Check that no orec in `read_orecs` changed after `bound`
///
/// An orec passes when it is unowned with a version no newer than `bound`,
/// or when `slot` itself owns it.
pub fn orecs_valid(orecs: &OrecTable, read_orecs: &[usize], bound: u64, slot: usize) -> bool {
    read_orecs.iter().all(|&i| match orecs.get(i).state() {
        OrecState::Version(v) => v <= bound,
        OrecState::Owned(owner) => owner == slot,
    })
}

/// Check that every logged value is still in memory
pub fn values_valid(memory: &SharedMemory, log: &[ValueLogEntry]) -> TxResult<bool> {
    for entry in log {
        let current = memory.load(entry.addr)?;
        if (current ^ entry.value) & entry.mask.0 != 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Addr, Mask};

    #[test]
    fn test_orecs_valid() {
        let orecs = OrecTable::new(8, 0);
        orecs.get(1).stamp(3);
        orecs.get(2).try_acquire(0, 4).unwrap();

        assert!(orecs_valid(&orecs, &[0, 1], 3, 0));
        assert!(!orecs_valid(&orecs, &[0, 1], 2, 0));
        // owned by self passes, owned by another fails
        assert!(orecs_valid(&orecs, &[2], 0, 4));
        assert!(!orecs_valid(&orecs, &[2], 10, 5));
        assert!(orecs_valid(&orecs, &[], 0, 0));
    }

    #[test]
    fn test_values_valid_respects_mask() {
        let mem = SharedMemory::new(2);
        mem.init(Addr(0), 0x1234).unwrap();
        let log = vec![ValueLogEntry {
            addr: Addr(0),
            value: 0x1234,
            mask: Mask::FULL,
        }];
        assert!(values_valid(&mem, &log).unwrap());

        // a change outside the logged bytes is not a conflict
        let partial = vec![ValueLogEntry {
            addr: Addr(0),
            value: 0x34,
            mask: Mask::bytes(0, 1),
        }];
        mem.init(Addr(0), 0xFF34).unwrap();
        assert!(values_valid(&mem, &partial).unwrap());
        assert!(!values_valid(&mem, &log).unwrap());
    }
}
