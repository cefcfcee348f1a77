//! Error types for transactional execution

use crate::memory::Addr;
use ferrotm_metrics::AbortKind;
use thiserror::Error;

/// Transaction errors
///
/// `Conflict` and `ValidationFailure` are recoverable: the attempt has
/// already been rolled back when the error is returned, and the caller may
/// simply begin again. Every other variant is final for the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// A concurrent access invalidated this transaction's view
    #[error("conflict on {addr}")]
    Conflict {
        /// Address whose covering metadata was contended
        addr: Addr,
    },

    /// Read evidence was stale when re-checked
    #[error("read validation failed")]
    ValidationFailure,

    /// The transaction was explicitly rolled back
    #[error("transaction cancelled")]
    Cancelled,

    /// The active algorithm does not implement this operation
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Internal state reached an impossible transition
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Address outside the shared memory region
    #[error("address {0} is outside shared memory")]
    InvalidAddress(Addr),

    /// Operation requires an active transaction
    #[error("no active transaction")]
    NotInTransaction,

    /// Every thread slot is taken
    #[error("thread limit of {max} reached")]
    ThreadLimit {
        /// Configured slot count
        max: usize,
    },

    /// The retry policy gave up
    #[error("gave up after {attempts} attempts")]
    RetriesExhausted {
        /// Attempts made, including the last failed one
        attempts: u32,
    },
}

impl TxError {
    /// Whether a fresh attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TxError::Conflict { .. } | TxError::ValidationFailure)
    }

    /// Whether the error must never be retried or swallowed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TxError::UnsupportedOperation(_)
                | TxError::InvariantViolation(_)
                | TxError::InvalidAddress(_)
        )
    }

    /// Statistics bucket for an attempt that ended with this error
    pub fn abort_kind(&self) -> AbortKind {
        match self {
            TxError::Conflict { .. } => AbortKind::Conflict,
            TxError::ValidationFailure => AbortKind::Validation,
            TxError::Cancelled => AbortKind::Cancelled,
            _ => AbortKind::Fatal,
        }
    }
}

/// Result type for transactional operations
pub type TxResult<T> = Result<T, TxError>;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A size that must be non-zero was zero
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// The orec table size must be a power of two
    #[error("orec_count must be a power of two, got {0}")]
    NotPowerOfTwo(usize),

    /// Thread slots are encoded in the orec owner bits
    #[error("max_threads {0} exceeds the supported maximum {1}")]
    TooManyThreads(usize, usize),
}
