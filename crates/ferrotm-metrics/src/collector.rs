//! Shared metrics registry

use crate::{Histogram, TxStats};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe metrics storage
///
/// Lookups take the read lock; a name is inserted under the write lock the
/// first time it is seen.
pub struct Metrics {
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<String, Arc<AtomicI64>>>,
}

impl Metrics {
    /// Create a new metrics store
    pub fn new() -> Self {
        Self {
            histograms: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
        }
    }

    /// Record a histogram observation
    pub fn histogram(&self, name: &str, value: f64) {
        let histograms = self.histograms.read();
        if let Some(h) = histograms.get(name) {
            h.observe(value);
            return;
        }
        drop(histograms);

        let mut histograms = self.histograms.write();
        let h = histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::new()));
        h.observe(value);
    }

    /// Increment a counter
    pub fn counter(&self, name: &str, delta: u64) {
        let counters = self.counters.read();
        if let Some(c) = counters.get(name) {
            c.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        drop(counters);

        let mut counters = self.counters.write();
        let c = counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)));
        c.fetch_add(delta, Ordering::Relaxed);
    }

    /// Add a (possibly negative) delta to a gauge
    pub fn gauge_add(&self, name: &str, delta: i64) {
        let gauges = self.gauges.read();
        if let Some(g) = gauges.get(name) {
            g.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        drop(gauges);

        let mut gauges = self.gauges.write();
        let g = gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)));
        g.fetch_add(delta, Ordering::Relaxed);
    }

    /// Merge a detaching thread's statistics into the shared counters
    pub fn record_stats(&self, stats: &TxStats) {
        let pairs = [
            (crate::COMMITS_RO, stats.commits_ro),
            (crate::COMMITS_RW, stats.commits_rw),
            (crate::ABORTS_CONFLICT, stats.aborts_conflict),
            (crate::ABORTS_VALIDATION, stats.aborts_validation),
            (crate::ABORTS_CANCELLED, stats.aborts_cancelled),
            (crate::ABORTS_FATAL, stats.aborts_fatal),
        ];
        for (name, value) in pairs {
            if value > 0 {
                self.counter(name, value);
            }
        }
        tracing::trace!(
            commits = stats.commits(),
            aborts = stats.aborts(),
            "merged thread statistics"
        );
    }

    /// Rebuild aggregate statistics from the shared counters
    pub fn tx_stats(&self) -> TxStats {
        let get = |name| self.get_counter(name).unwrap_or(0);
        TxStats {
            commits_ro: get(crate::COMMITS_RO),
            commits_rw: get(crate::COMMITS_RW),
            aborts_conflict: get(crate::ABORTS_CONFLICT),
            aborts_validation: get(crate::ABORTS_VALIDATION),
            aborts_cancelled: get(crate::ABORTS_CANCELLED),
            aborts_fatal: get(crate::ABORTS_FATAL),
            consecutive_aborts: 0,
        }
    }

    /// Get histogram mean for a metric
    pub fn get_histogram_mean(&self, name: &str) -> Option<f64> {
        self.histograms.read().get(name).map(|h| h.mean())
    }

    /// Get counter value
    pub fn get_counter(&self, name: &str) -> Option<u64> {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// Get gauge value
    pub fn get_gauge(&self, name: &str) -> Option<i64> {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
    }

    /// Get all counter names and values
    pub fn all_counters(&self) -> Vec<(String, u64)> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// Get all gauge names and values
    pub fn all_gauges(&self) -> Vec<(String, i64)> {
        self.gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// Get all histogram names with mean and count
    pub fn all_histograms(&self) -> Vec<(String, f64, u64)> {
        self.histograms
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.mean(), v.total_count()))
            .collect()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
