//! Retry policy for closure-style transactions

use crate::error::TxError;
use crate::spin::pause;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Give up after this many attempts (`None` retries forever)
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Initial back-off window in spin iterations (0 retries immediately)
    #[serde(default = "default_backoff_base_spins")]
    pub backoff_base_spins: u32,
    /// Back-off window cap
    #[serde(default = "default_backoff_max_spins")]
    pub backoff_max_spins: u32,
    /// After this many failed attempts, start as irrevocable when the
    /// active algorithm supports it
    #[serde(default)]
    pub escalate_after: Option<u32>,
}

fn default_backoff_base_spins() -> u32 {
    16
}

fn default_backoff_max_spins() -> u32 {
    1 << 14
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_base_spins: default_backoff_base_spins(),
            backoff_max_spins: default_backoff_max_spins(),
            escalate_after: None,
        }
    }
}

/// Decides whether and how an aborted attempt is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from settings
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Retry immediately, forever
    pub fn immediate() -> Self {
        Self::new(RetryConfig {
            backoff_base_spins: 0,
            ..RetryConfig::default()
        })
    }

    /// Settings in effect
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decide what to do after attempt number `attempt` (1-based) failed
    ///
    /// Returns the error to surface when the attempt must not be retried.
    pub fn check(&self, attempt: u32, err: &TxError) -> Result<(), TxError> {
        if !err.is_retryable() {
            return Err(err.clone());
        }
        match self.config.max_attempts {
            Some(max) if attempt >= max => Err(TxError::RetriesExhausted { attempts: attempt }),
            _ => Ok(()),
        }
    }

    /// Spin window before attempt `attempt + 1`
    pub fn backoff_window(&self, attempt: u32) -> u32 {
        if self.config.backoff_base_spins == 0 {
            return 0;
        }
        let exp = attempt.saturating_sub(1).min(20);
        self.config
            .backoff_base_spins
            .saturating_mul(1 << exp)
            .min(self.config.backoff_max_spins.max(self.config.backoff_base_spins))
    }

    /// Wait a randomized slice of the back-off window
    pub fn backoff(&self, attempt: u32) {
        let window = self.backoff_window(attempt);
        if window > 0 {
            pause(rand::thread_rng().gen_range(0..=window));
        }
    }

    /// Whether attempt `attempt` (1-based) should start irrevocably
    pub fn should_escalate(&self, attempt: u32) -> bool {
        self.config
            .escalate_after
            .is_some_and(|after| attempt > after)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
