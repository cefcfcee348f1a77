//! Contention management for encounter-time conflicts
//!
//! When an eager transaction finds the orec it needs owned by someone else,
//! the contention manager decides what happens next. Managers never touch
//! another thread's state directly; asking an owner to abort only raises
//! that owner's abort-request flag, which it observes at its next barrier.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do about an owned orec
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictAction {
    /// Spin for this many iterations, then look again
    Backoff(u32),
    /// Yield the time slice, then look again
    Yield,
    /// Ask the owner to abort, then look again
    AbortOwner,
    /// Give up: abort the requesting transaction
    AbortSelf,
}

/// Details of one encounter
#[derive(Clone, Copy, Debug)]
pub struct ConflictInfo {
    /// Requesting thread slot
    pub slot: usize,
    /// Owning thread slot
    pub owner: usize,
    /// 1-based attempt count for this access
    pub attempt: u32,
    /// Requester's aborts since its last commit
    pub consecutive_aborts: u32,
}

/// Conflict resolution policy
pub trait ContentionManager: Send + Sync + fmt::Debug {
    /// Policy name for logs
    fn name(&self) -> &'static str;

    /// Decide how to react to an owned orec
    fn on_conflict(&self, info: &ConflictInfo) -> ConflictAction;
}

/// Abort on the first encounter
#[derive(Debug, Default, Clone, Copy)]
pub struct HyperAggressive;

impl ContentionManager for HyperAggressive {
    fn name(&self) -> &'static str {
        "hyper-aggressive"
    }

    fn on_conflict(&self, _info: &ConflictInfo) -> ConflictAction {
        ConflictAction::AbortSelf
    }
}

/// Randomized exponential back-off, then abort
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    max_attempts: u32,
    base_spins: u32,
    max_spins: u32,
}

impl Backoff {
    /// Create a back-off manager
    pub fn new(max_attempts: u32, base_spins: u32, max_spins: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_spins: base_spins.max(1),
            max_spins: max_spins.max(base_spins.max(1)),
        }
    }

    fn window(&self, attempt: u32, aborts: u32) -> u32 {
        let exp = attempt.saturating_add(aborts).min(16);
        self.base_spins.saturating_mul(1 << exp).min(self.max_spins)
    }
}

impl ContentionManager for Backoff {
    fn name(&self) -> &'static str {
        "backoff"
    }

    fn on_conflict(&self, info: &ConflictInfo) -> ConflictAction {
        if info.attempt >= self.max_attempts {
            return ConflictAction::AbortSelf;
        }
        let window = self.window(info.attempt, info.consecutive_aborts);
        ConflictAction::Backoff(rand::thread_rng().gen_range(1..=window))
    }
}

/// Ask the owner to abort, wait a bounded time for it, then give up
#[derive(Debug, Clone, Copy)]
pub struct Aggressive {
    max_attempts: u32,
}

impl Aggressive {
    /// Create an aggressive manager
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(2),
        }
    }
}

impl ContentionManager for Aggressive {
    fn name(&self) -> &'static str {
        "aggressive"
    }

    fn on_conflict(&self, info: &ConflictInfo) -> ConflictAction {
        match info.attempt {
            1 => ConflictAction::AbortOwner,
            n if n >= self.max_attempts => ConflictAction::AbortSelf,
            _ => ConflictAction::Yield,
        }
    }
}

/// Configurable choice of contention manager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentionPolicy {
    /// [`HyperAggressive`]
    HyperAggressive,
    /// [`Backoff`]
    #[default]
    Backoff,
    /// [`Aggressive`]
    Aggressive,
}

impl ContentionPolicy {
    /// Build the manager for this policy
    pub fn build(self, max_attempts: u32) -> Box<dyn ContentionManager> {
        match self {
            ContentionPolicy::HyperAggressive => Box::new(HyperAggressive),
            ContentionPolicy::Backoff => Box::new(Backoff::new(max_attempts, 4, 4096)),
            ContentionPolicy::Aggressive => Box::new(Aggressive::new(max_attempts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(attempt: u32) -> ConflictInfo {
        ConflictInfo {
            slot: 0,
            owner: 1,
            attempt,
            consecutive_aborts: 0,
        }
    }

    #[test]
    fn test_hyper_aggressive_always_aborts_self() {
        assert_eq!(HyperAggressive.on_conflict(&info(1)), ConflictAction::AbortSelf);
    }

    #[test]
    fn test_backoff_is_bounded() {
        let cm = Backoff::new(3, 2, 64);
        for attempt in 1..3 {
            match cm.on_conflict(&info(attempt)) {
                ConflictAction::Backoff(n) => assert!((1..=64).contains(&n)),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(cm.on_conflict(&info(3)), ConflictAction::AbortSelf);
    }

    #[test]
    fn test_backoff_window_caps() {
        let cm = Backoff::new(100, 4, 100);
        assert_eq!(cm.window(1, 0), 8);
        assert_eq!(cm.window(50, 50), 100);
    }

    #[test]
    fn test_aggressive_sequence() {
        let cm = Aggressive::new(4);
        assert_eq!(cm.on_conflict(&info(1)), ConflictAction::AbortOwner);
        assert_eq!(cm.on_conflict(&info(2)), ConflictAction::Yield);
        assert_eq!(cm.on_conflict(&info(4)), ConflictAction::AbortSelf);
    }

    #[test]
    fn test_policy_build_names() {
        assert_eq!(ContentionPolicy::HyperAggressive.build(8).name(), "hyper-aggressive");
        assert_eq!(ContentionPolicy::Backoff.build(8).name(), "backoff");
        assert_eq!(ContentionPolicy::Aggressive.build(8).name(), "aggressive");
        assert_eq!(ContentionPolicy::default(), ContentionPolicy::Backoff);
    }
}
