//! Metrics snapshot and JSON export

use crate::{Metrics, TxStats};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of all metrics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: HashMap<String, u64>,
    /// Gauge values
    pub gauges: HashMap<String, i64>,
    /// Histogram summaries (mean, count)
    pub histograms: HashMap<String, HistogramSummary>,
    /// Aggregated transaction statistics
    pub transactions: TxStats,
}

/// Summary of a histogram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean value
    pub mean: f64,
    /// Total observation count
    pub count: u64,
}

impl MetricsSnapshot {
    /// Create a snapshot from a Metrics instance
    pub fn from_metrics(metrics: &Metrics) -> Self {
        let counters = metrics.all_counters().into_iter().collect();
        let gauges = metrics.all_gauges().into_iter().collect();
        let histograms = metrics
            .all_histograms()
            .into_iter()
            .map(|(name, mean, count)| (name, HistogramSummary { mean, count }))
            .collect();

        Self {
            counters,
            gauges,
            histograms,
            transactions: metrics.tx_stats(),
        }
    }

    /// Export snapshot as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export snapshot as compact JSON string
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json() {
        let metrics = Metrics::new();
        let mut stats = TxStats::new();
        stats.record_commit(true);
        metrics.record_stats(&stats);
        metrics.gauge_add(crate::ATTACHED_THREADS, 3);

        let snapshot = MetricsSnapshot::from_metrics(&metrics);
        let json = snapshot.to_json().unwrap();

        assert!(json.contains(crate::COMMITS_RW));
        assert!(json.contains(crate::ATTACHED_THREADS));
        assert!(json.contains("\"commits_rw\": 1"));
    }

    #[test]
    fn test_snapshot_compact_parses_back() {
        let metrics = Metrics::new();
        metrics.counter("x", 7);
        let json = MetricsSnapshot::from_metrics(&metrics).to_json_compact().unwrap();
        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.counters["x"], 7);
    }
}
