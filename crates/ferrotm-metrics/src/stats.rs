//! Per-thread transaction statistics

use serde::{Deserialize, Serialize};

/// Why an attempt was rolled back
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortKind {
    /// A concurrent access invalidated the attempt
    Conflict,
    /// Read evidence was stale at validation time
    Validation,
    /// The transaction asked to be rolled back
    Cancelled,
    /// Unrecoverable error while the transaction was active
    Fatal,
}

/// Commit and abort counters owned by a single thread
///
/// Kept in the transaction descriptor and only merged into shared
/// [`Metrics`](crate::Metrics) when the thread detaches, so the hot path
/// never touches a shared cache line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStats {
    /// Read-only commits
    pub commits_ro: u64,
    /// Commits that published writes
    pub commits_rw: u64,
    /// Conflict aborts
    pub aborts_conflict: u64,
    /// Validation aborts
    pub aborts_validation: u64,
    /// Explicit cancellations
    pub aborts_cancelled: u64,
    /// Fatal aborts
    pub aborts_fatal: u64,
    /// Aborts since the last successful commit
    pub consecutive_aborts: u32,
}

impl TxStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit
    pub fn record_commit(&mut self, wrote: bool) {
        if wrote {
            self.commits_rw += 1;
        } else {
            self.commits_ro += 1;
        }
        self.consecutive_aborts = 0;
    }

    /// Record an abort of the given kind
    pub fn record_abort(&mut self, kind: AbortKind) {
        match kind {
            AbortKind::Conflict => self.aborts_conflict += 1,
            AbortKind::Validation => self.aborts_validation += 1,
            AbortKind::Cancelled => self.aborts_cancelled += 1,
            AbortKind::Fatal => self.aborts_fatal += 1,
        }
        self.consecutive_aborts = self.consecutive_aborts.saturating_add(1);
    }

    /// Total commits
    pub fn commits(&self) -> u64 {
        self.commits_ro + self.commits_rw
    }

    /// Total aborts
    pub fn aborts(&self) -> u64 {
        self.aborts_conflict + self.aborts_validation + self.aborts_cancelled + self.aborts_fatal
    }

    /// Fraction of attempts that aborted (0.0 when nothing ran)
    pub fn abort_rate(&self) -> f64 {
        let attempts = self.commits() + self.aborts();
        if attempts == 0 {
            return 0.0;
        }
        self.aborts() as f64 / attempts as f64
    }

    /// Accumulate another thread's statistics into this one
    pub fn merge(&mut self, other: &TxStats) {
        self.commits_ro += other.commits_ro;
        self.commits_rw += other.commits_rw;
        self.aborts_conflict += other.aborts_conflict;
        self.aborts_validation += other.aborts_validation;
        self.aborts_cancelled += other.aborts_cancelled;
        self.aborts_fatal += other.aborts_fatal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_commit_resets_consecutive() {
        let mut stats = TxStats::new();
        stats.record_abort(AbortKind::Conflict);
        stats.record_abort(AbortKind::Validation);
        assert_eq!(stats.consecutive_aborts, 2);

        stats.record_commit(true);
        assert_eq!(stats.consecutive_aborts, 0);
        assert_eq!(stats.commits_rw, 1);
        assert_eq!(stats.aborts(), 2);
    }

    #[test]
    fn test_abort_rate() {
        let mut stats = TxStats::new();
        assert_eq!(stats.abort_rate(), 0.0);

        stats.record_commit(false);
        stats.record_abort(AbortKind::Conflict);
        assert!((stats.abort_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge() {
        let mut a = TxStats::new();
        a.record_commit(false);
        let mut b = TxStats::new();
        b.record_commit(true);
        b.record_abort(AbortKind::Cancelled);

        a.merge(&b);
        assert_eq!(a.commits(), 2);
        assert_eq!(a.aborts_cancelled, 1);
    }

    #[test]
    fn test_serde_kind_names() {
        let json = serde_json::to_string(&AbortKind::Validation).unwrap();
        assert_eq!(json, "\"validation\"");
    }
}
