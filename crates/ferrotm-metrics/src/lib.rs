//! # ferrotm-metrics
//!
//! Commit/abort accounting for the ferrotm transactional memory runtime.
//!
//! Features:
//! - Per-thread transaction statistics (`TxStats`)
//! - Shared counter/gauge/histogram registry (`Metrics`)
//! - JSON export of a point-in-time snapshot

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collector;
mod export;
mod histogram;
mod stats;

pub use collector::Metrics;
pub use export::{HistogramSummary, MetricsSnapshot};
pub use histogram::Histogram;
pub use stats::{AbortKind, TxStats};

/// Counter: read-only commits
pub const COMMITS_RO: &str = "tx.commits.ro";
/// Counter: writer commits
pub const COMMITS_RW: &str = "tx.commits.rw";
/// Counter: aborts caused by a conflicting access
pub const ABORTS_CONFLICT: &str = "tx.aborts.conflict";
/// Counter: aborts caused by failed read validation
pub const ABORTS_VALIDATION: &str = "tx.aborts.validation";
/// Counter: explicit cancellations
pub const ABORTS_CANCELLED: &str = "tx.aborts.cancelled";
/// Counter: aborts caused by fatal errors
pub const ABORTS_FATAL: &str = "tx.aborts.fatal";
/// Gauge: number of attached threads
pub const ATTACHED_THREADS: &str = "runtime.attached_threads";
/// Counter: completed algorithm switches
pub const ALGORITHM_SWITCHES: &str = "runtime.algorithm_switches";
/// Histogram: microseconds spent draining transactions during a switch
pub const QUIESCE_US: &str = "runtime.quiesce_us";

/// Macro for timing a block of code into a histogram (microseconds)
#[macro_export]
macro_rules! timed {
    ($metrics:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $metrics.histogram($name, start.elapsed().as_micros() as f64);
        result
    }};
}
