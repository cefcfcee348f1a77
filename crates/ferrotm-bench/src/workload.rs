//! Benchmark workloads
//!
//! Each workload drives a fixed number of transactions per thread and then
//! checks an invariant that only holds if every transaction was atomic.

use crate::BenchError;
use clap::ValueEnum;
use ferrotm_core::{Addr, Runtime, ThreadHandle, TxResult};
use ferrotm_metrics::TxStats;
use rand::Rng;
use serde::Serialize;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Initial balance of every bank account
pub const INITIAL_BALANCE: u64 = 1_000;

/// Words between two threads' private slots in the disjoint workload
const DISJOINT_STRIDE: usize = 8;

/// Workload kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workload {
    /// Every transaction increments one shared word
    Counter,
    /// Random transfers between accounts; the total is conserved
    Bank,
    /// Each thread increments its own word
    Disjoint,
}

impl Workload {
    /// Workload name
    pub fn name(self) -> &'static str {
        match self {
            Workload::Counter => "counter",
            Workload::Bank => "bank",
            Workload::Disjoint => "disjoint",
        }
    }

    /// Words of shared memory the workload touches
    pub fn words_needed(self, threads: usize, accounts: usize) -> usize {
        match self {
            Workload::Counter => 1,
            Workload::Bank => accounts,
            Workload::Disjoint => threads * DISJOINT_STRIDE,
        }
    }
}

/// Workload parameters
#[derive(Clone, Copy, Debug)]
pub struct WorkloadParams {
    /// Workload kind
    pub workload: Workload,
    /// Worker threads
    pub threads: usize,
    /// Transactions per thread
    pub ops: u64,
    /// Accounts for the bank workload
    pub accounts: usize,
}

/// Outcome of a workload run
#[derive(Clone, Debug, Serialize)]
pub struct WorkloadReport {
    /// Workload kind
    pub workload: Workload,
    /// Worker threads
    pub threads: usize,
    /// Committed transactions across all threads
    pub transactions: u64,
    /// Wall-clock time of the measured phase
    #[serde(rename = "elapsed_ms")]
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
    /// Aggregated commit/abort counters
    pub stats: TxStats,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1_000.0)
}

impl WorkloadReport {
    /// Committed transactions per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.transactions as f64 / secs
    }
}

/// Lay out initial memory for `params`
pub fn prepare(rt: &Runtime, params: &WorkloadParams) -> Result<(), BenchError> {
    let needed = params.workload.words_needed(params.threads, params.accounts);
    if needed > rt.memory().len() {
        return Err(BenchError::InvalidInput(format!(
            "{} needs {} words but memory has {}",
            params.workload.name(),
            needed,
            rt.memory().len()
        )));
    }
    if params.workload == Workload::Bank {
        if params.accounts < 2 {
            return Err(BenchError::InvalidInput("bank needs at least 2 accounts".into()));
        }
        for i in 0..params.accounts {
            rt.memory().init(Addr(i), INITIAL_BALANCE)?;
        }
    }
    Ok(())
}

fn transfer(h: &mut ThreadHandle, accounts: usize, rng: &mut impl Rng) -> TxResult<()> {
    let from = Addr(rng.gen_range(0..accounts));
    let to = Addr((from.0 + rng.gen_range(1..accounts)) % accounts);
    let amount = rng.gen_range(1..=100);
    h.atomically(|tx| {
        let a = tx.read(from)?;
        if a < amount {
            return Ok(());
        }
        let b = tx.read(to)?;
        tx.write(from, a - amount)?;
        tx.write(to, b + amount)
    })
}

fn increment(h: &mut ThreadHandle, addr: Addr) -> TxResult<()> {
    h.atomically(|tx| {
        let v = tx.read(addr)?;
        tx.write(addr, v + 1)
    })
}

/// Run `params` on `rt` and return the measured report
pub fn run(rt: &Arc<Runtime>, params: &WorkloadParams) -> Result<WorkloadReport, BenchError> {
    prepare(rt, params)?;
    let barrier = Arc::new(Barrier::new(params.threads + 1));

    let workers: Vec<_> = (0..params.threads)
        .map(|t| {
            let rt = Arc::clone(rt);
            let barrier = Arc::clone(&barrier);
            let params = *params;
            thread::spawn(move || -> Result<TxStats, BenchError> {
                let attached = rt.attach();
                barrier.wait();
                let mut h = attached?;
                let mut rng = rand::thread_rng();
                for _ in 0..params.ops {
                    match params.workload {
                        Workload::Counter => increment(&mut h, Addr(0))?,
                        Workload::Bank => transfer(&mut h, params.accounts, &mut rng)?,
                        Workload::Disjoint => increment(&mut h, Addr(t * DISJOINT_STRIDE))?,
                    }
                }
                Ok(*h.stats())
            })
        })
        .collect();

    barrier.wait();
    let start = Instant::now();
    let mut stats = TxStats::new();
    let mut first_error = None;
    for worker in workers {
        match worker.join() {
            Ok(Ok(s)) => stats.merge(&s),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(_) => {
                first_error.get_or_insert(BenchError::WorkerPanicked);
            }
        }
    }
    let elapsed = start.elapsed();
    if let Some(e) = first_error {
        return Err(e);
    }

    let report = WorkloadReport {
        workload: params.workload,
        threads: params.threads,
        transactions: stats.commits(),
        elapsed,
        stats,
    };
    tracing::info!(
        workload = params.workload.name(),
        algorithm = %rt.algorithm(),
        commits = report.transactions,
        aborts = report.stats.aborts(),
        elapsed_ms = elapsed.as_millis() as u64,
        "workload finished"
    );
    Ok(report)
}

/// Check the workload's invariant against final memory
pub fn verify(rt: &Runtime, params: &WorkloadParams) -> Result<(), BenchError> {
    let memory = rt.memory();
    match params.workload {
        Workload::Counter => {
            let expected = params.threads as u64 * params.ops;
            let actual = memory.load(Addr(0))?;
            if actual != expected {
                return Err(BenchError::InvariantViolated {
                    workload: "counter",
                    detail: format!("counter {} != expected {}", actual, expected),
                });
            }
        }
        Workload::Bank => {
            let expected = INITIAL_BALANCE * params.accounts as u64;
            let actual: u64 = memory.snapshot(0..params.accounts).iter().sum();
            if actual != expected {
                return Err(BenchError::InvariantViolated {
                    workload: "bank",
                    detail: format!("total {} != expected {}", actual, expected),
                });
            }
        }
        Workload::Disjoint => {
            for t in 0..params.threads {
                let actual = memory.load(Addr(t * DISJOINT_STRIDE))?;
                if actual != params.ops {
                    return Err(BenchError::InvariantViolated {
                        workload: "disjoint",
                        detail: format!("thread {} slot holds {} != {}", t, actual, params.ops),
                    });
                }
            }
        }
    }
    Ok(())
}
