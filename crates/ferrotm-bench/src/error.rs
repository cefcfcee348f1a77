//! Bench error types

use ferrotm_core::{ConfigError, TxError};
use thiserror::Error;

/// Bench error type
#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid command-line input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Runtime configuration rejected
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A transaction failed for a reason retries cannot fix
    #[error("Transaction error: {0}")]
    Transaction(#[from] TxError),

    /// The workload's consistency check failed
    #[error("Invariant violated in {workload}: {detail}")]
    InvariantViolated {
        /// Workload name
        workload: &'static str,
        /// What was observed
        detail: String,
    },

    /// A worker thread panicked
    #[error("Worker thread panicked")]
    WorkerPanicked,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrotm_core::Addr;

    #[test]
    fn test_error_display() {
        let err = BenchError::InvariantViolated {
            workload: "bank",
            detail: "total 10 != 20".to_string(),
        };
        assert_eq!(err.to_string(), "Invariant violated in bank: total 10 != 20");

        let err: BenchError = TxError::InvalidAddress(Addr(5)).into();
        assert!(err.to_string().contains("@5"));

        let err: BenchError = ConfigError::NotPowerOfTwo(3).into();
        assert!(err.to_string().contains("power of two"));
    }
}
