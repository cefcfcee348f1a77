//! Runtime configuration

use crate::algorithms::Algorithm;
use crate::contention::ContentionPolicy;
use crate::error::ConfigError;
use crate::retry::RetryConfig;
use crate::orec::OWNED_BIT;
use serde::{Deserialize, Serialize};

/// Largest thread slot count (slot ids live in the orec owner bits and the
/// turn-node arena is allocated up front)
pub const MAX_THREADS: usize = 4096;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StmConfig {
    /// Algorithm active at startup
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Shared memory size in words
    #[serde(default = "default_memory_words")]
    pub memory_words: usize,
    /// Orec table size (power of two)
    #[serde(default = "default_orec_count")]
    pub orec_count: usize,
    /// Words per orec stripe, as a shift
    #[serde(default)]
    pub stripe_shift: u32,
    /// Thread slot count
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Contention manager for eager acquisition
    #[serde(default)]
    pub contention: ContentionPolicy,
    /// Encounters with an owned orec before the manager gives up
    #[serde(default = "default_contention_max_attempts")]
    pub contention_max_attempts: u32,
    /// Spin iterations before a waiter starts yielding
    #[serde(default = "default_spin_before_yield")]
    pub spin_before_yield: u32,
    /// Retry policy for `atomically`
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_memory_words() -> usize {
    1 << 16
}

fn default_orec_count() -> usize {
    1 << 16
}

fn default_max_threads() -> usize {
    64
}

fn default_contention_max_attempts() -> u32 {
    64
}

fn default_spin_before_yield() -> u32 {
    128
}

impl Default for StmConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            memory_words: default_memory_words(),
            orec_count: default_orec_count(),
            stripe_shift: 0,
            max_threads: default_max_threads(),
            contention: ContentionPolicy::default(),
            contention_max_attempts: default_contention_max_attempts(),
            spin_before_yield: default_spin_before_yield(),
            retry: RetryConfig::default(),
        }
    }
}

impl StmConfig {
    /// Default configuration running `algorithm`
    pub fn with_algorithm(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    /// Check sizes and limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_words == 0 {
            return Err(ConfigError::Zero("memory_words"));
        }
        if self.orec_count == 0 {
            return Err(ConfigError::Zero("orec_count"));
        }
        if !self.orec_count.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo(self.orec_count));
        }
        if self.max_threads == 0 {
            return Err(ConfigError::Zero("max_threads"));
        }
        if self.max_threads > MAX_THREADS || self.max_threads as u64 >= OWNED_BIT {
            return Err(ConfigError::TooManyThreads(self.max_threads, MAX_THREADS));
        }
        if self.contention_max_attempts == 0 {
            return Err(ConfigError::Zero("contention_max_attempts"));
        }
        Ok(())
    }
}
