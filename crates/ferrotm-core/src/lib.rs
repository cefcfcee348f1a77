//! # ferrotm-core
//!
//! Word-based software transactional memory for ferrotm.
//!
//! This crate implements the conflict-detection and commit-ordering
//! protocols that let threads run transactions over a shared region of
//! memory words with all-or-nothing semantics.
//!
//! Features:
//! - Eager orec acquisition with undo logging and contention management
//! - Single global sequence lock with irrevocability
//! - Cohort-ordered batches with order numbers or a commit queue
//! - Runtime algorithm switching under quiescence
//!
//! ```no_run
//! use ferrotm_core::{Addr, Runtime, StmConfig};
//!
//! let rt = Runtime::new(StmConfig::default()).unwrap();
//! let mut thread = rt.attach().unwrap();
//! thread
//!     .atomically(|tx| {
//!         let v = tx.read(Addr(0))?;
//!         tx.write(Addr(0), v + 1)
//!     })
//!     .unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithms;
pub mod config;
pub mod contention;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod memory;
pub mod orec;
pub mod padded;
pub mod retry;
pub mod runtime;
pub mod sequencer;
pub mod slots;
pub mod spin;
pub mod validation;
pub mod write_set;

pub use algorithms::{Algorithm, TmAlgorithm, UnknownAlgorithm};
pub use config::StmConfig;
pub use contention::{ContentionManager, ContentionPolicy};
pub use descriptor::{TxDescriptor, TxMode};
pub use error::{ConfigError, TxError, TxResult};
pub use handle::{ThreadHandle, Transaction};
pub use memory::{Addr, Mask, SharedMemory, Word};
pub use retry::{RetryConfig, RetryPolicy};
pub use runtime::Runtime;
