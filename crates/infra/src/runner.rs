//! Batch runner: mimics the external scheduler's contract.
//!
//! Each tick hands the engine a fresh governance budget; failed runs are
//! retried a bounded number of times; self-resubmitted jobs are drained
//! from an in-memory queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use recommit_engine::{
    BatchDispatch, DispatchError, DispatchHandle, GovernanceBudget, JobKind, JobStore,
    ReallocationEngine, RunOutcome, RunReport,
};
use recommit_orders::{LineSearch, OrderStore};

/// In-memory batch queue.
#[derive(Debug, Default)]
pub struct InMemoryDispatcher {
    queue: Mutex<VecDeque<JobKind>>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn pop(&self) -> Option<JobKind> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

impl BatchDispatch for InMemoryDispatcher {
    fn enqueue(&self, kind: JobKind) -> Result<DispatchHandle, DispatchError> {
        self.queue.lock().unwrap().push_back(kind);
        Ok(DispatchHandle(Uuid::now_v7()))
    }
}

/// Runner knobs, mirroring what the external scheduler enforces.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Governance units granted to each run.
    pub units_per_run: u64,
    /// Retries per failed run before giving up.
    pub max_retries: u32,
    /// Upper bound on runs per drain, as a runaway guard.
    pub max_runs: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            units_per_run: 1_000,
            max_retries: 3,
            max_runs: 64,
        }
    }
}

/// Drives the engine the way the external scheduler would: bounded budget
/// per run, bounded retries, queue-driven continuation.
pub struct BatchRunner<S, Q, J>
where
    S: OrderStore,
    Q: LineSearch,
    J: JobStore,
{
    engine: ReallocationEngine<S, Q, J, Arc<InMemoryDispatcher>>,
    queue: Arc<InMemoryDispatcher>,
    config: RunnerConfig,
}

impl<S, Q, J> BatchRunner<S, Q, J>
where
    S: OrderStore,
    Q: LineSearch,
    J: JobStore,
{
    pub fn new(
        engine: ReallocationEngine<S, Q, J, Arc<InMemoryDispatcher>>,
        queue: Arc<InMemoryDispatcher>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            engine,
            queue,
            config,
        }
    }

    pub fn queue(&self) -> &Arc<InMemoryDispatcher> {
        &self.queue
    }

    /// One scheduled tick: a run under a fresh budget, with bounded retries
    /// on hard failures.
    pub fn run_scheduled(&self) -> anyhow::Result<RunReport> {
        let mut attempt = 0u32;
        loop {
            let mut budget = GovernanceBudget::new(self.config.units_per_run);
            match self.engine.run_cycle(&mut budget) {
                Ok(report) => {
                    info!(
                        outcome = ?report.outcome,
                        stages = report.stages.len(),
                        units = report.units_spent,
                        "engine run finished"
                    );
                    return Ok(report);
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "engine run failed; retrying");
                }
                Err(e) => {
                    return Err(e).context("engine run failed after retries");
                }
            }
        }
    }

    /// Tick until the engine reports idle and the queue is empty. Each
    /// queued self-resubmission consumes one tick, exactly as the external
    /// scheduler would grant it.
    pub fn drain(&self) -> anyhow::Result<Vec<RunReport>> {
        let mut reports = Vec::new();
        for _ in 0..self.config.max_runs {
            let _ = self.queue.pop();
            let report = self.run_scheduled()?;
            let idle = matches!(report.outcome, RunOutcome::Idle);
            reports.push(report);
            if idle && self.queue.pending() == 0 {
                break;
            }
        }
        Ok(reports)
    }
}
