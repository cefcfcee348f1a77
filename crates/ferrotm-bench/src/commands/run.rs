//! Run a workload and report throughput

use clap::Args;
use ferrotm_core::{Algorithm, Runtime};
use ferrotm_metrics::MetricsSnapshot;
use std::path::PathBuf;

use crate::{
    config,
    output::Output,
    workload::{self, Workload, WorkloadParams},
    BenchError,
};

/// Arguments for `ftm run`
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Workload to drive
    #[arg(short, long, value_enum, default_value = "counter")]
    pub workload: Workload,

    /// Protocol; overrides the config file
    #[arg(short, long)]
    pub algorithm: Option<Algorithm>,

    /// Worker threads
    #[arg(short, long, default_value_t = 4)]
    pub threads: usize,

    /// Transactions per thread
    #[arg(short, long, default_value_t = 10_000)]
    pub ops: u64,

    /// Accounts for the bank workload
    #[arg(long, default_value_t = 64)]
    pub accounts: usize,

    /// Runtime configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Include the metrics snapshot in JSON output
    #[arg(long)]
    pub metrics: bool,
}

impl RunArgs {
    /// Run the workload and print the report
    pub fn execute(self, json: bool) -> Result<(), BenchError> {
        if self.threads == 0 {
            return Err(BenchError::InvalidInput("threads must be at least 1".into()));
        }
        let mut cfg = config::load(self.config.as_deref())?;
        if let Some(algorithm) = self.algorithm {
            cfg.algorithm = algorithm;
        }
        if self.threads > cfg.max_threads {
            return Err(BenchError::InvalidInput(format!(
                "{} threads exceeds max_threads {}",
                self.threads, cfg.max_threads
            )));
        }

        let rt = Runtime::new(cfg)?;
        let params = WorkloadParams {
            workload: self.workload,
            threads: self.threads,
            ops: self.ops,
            accounts: self.accounts,
        };
        let report = workload::run(&rt, &params)?;
        let verdict = workload::verify(&rt, &params);
        let invariant_ok = verdict.is_ok();

        let mut out = Output::new(json)
            .field("algorithm", rt.algorithm().name())
            .field("workload", self.workload.name())
            .field_u64("threads", self.threads as u64)
            .field_u64("transactions", report.transactions)
            .field_u64("aborts", report.stats.aborts())
            .field_f64("abort_rate", report.stats.abort_rate())
            .field_f64("elapsed_ms", report.elapsed.as_secs_f64() * 1_000.0)
            .field_f64("throughput", report.throughput())
            .field_bool("invariant_ok", invariant_ok)
            .line(format!(
                "{} / {} on {} threads",
                self.workload.name(),
                rt.algorithm(),
                self.threads
            ))
            .line(format!(
                "  {} commits, {} aborts ({:.2}%)",
                report.transactions,
                report.stats.aborts(),
                report.stats.abort_rate() * 100.0
            ))
            .line(format!(
                "  {:.1} ms, {:.0} tx/s",
                report.elapsed.as_secs_f64() * 1_000.0,
                report.throughput()
            ))
            .line(format!(
                "  invariant: {}",
                if invariant_ok { "ok" } else { "VIOLATED" }
            ));
        if self.metrics {
            let snapshot = MetricsSnapshot::from_metrics(rt.metrics());
            out = out.field_value("metrics", serde_json::to_value(&snapshot)?);
        }
        out.print();

        verdict
    }
}
