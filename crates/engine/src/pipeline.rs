//! The reallocation pipeline: job building and the stage state machine.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{info, warn};

use recommit_allocation::{CommitmentAction, FillLevel, SupplyWindow, redistribute};
use recommit_core::{ItemId, LocationId, OrderId};
use recommit_orders::{LineSearch, OrderStore};

use crate::applier::{Applier, StageReport};
use crate::budget::GovernanceBudget;
use crate::config::EngineConfig;
use crate::demand::DemandReader;
use crate::dispatch::BatchDispatch;
use crate::error::EngineError;
use crate::job::{JobKind, JobPlans, JobStatus, JobStore, ReallocationJob};
use crate::supply::{SupplyWindowCalculator, assign_windows};
use crate::trigger::TriggerDetector;

/// How one engine run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No triggers and no in-flight job: nothing to do.
    Idle,
    /// The job reached `Complete` within this run's budget.
    Completed { resubmitted: bool },
    /// The budget ran out; the persisted job status resumes the pipeline on
    /// the next scheduled run.
    BudgetExhausted,
}

/// Summary of one engine run, for logging and assertions.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// One entry per non-empty stage dispatched this run.
    pub stages: Vec<StageReport>,
    pub units_spent: u64,
}

/// The engine: ties the readers, the kernel, the job record and the applier
/// together behind the order-store and search ports.
pub struct ReallocationEngine<S, Q, J, D>
where
    S: OrderStore,
    Q: LineSearch,
    J: JobStore,
    D: BatchDispatch,
{
    store: S,
    search: Q,
    jobs: J,
    dispatch: D,
    config: EngineConfig,
}

impl<S, Q, J, D> ReallocationEngine<S, Q, J, D>
where
    S: OrderStore,
    Q: LineSearch,
    J: JobStore,
    D: BatchDispatch,
{
    pub fn new(store: S, search: Q, jobs: J, dispatch: D, config: EngineConfig) -> Self {
        Self {
            store,
            search,
            jobs,
            dispatch,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One scheduled run: resume the in-flight job if there is one,
    /// otherwise detect triggers and build a fresh job, then drain stages
    /// until done or out of budget.
    pub fn run_cycle(&self, budget: &mut GovernanceBudget) -> Result<RunReport, EngineError> {
        let start = budget.spent();

        let job = match self.jobs.active(JobKind::CommitmentReallocation)? {
            Some(job) => Some(job),
            None => match self.build_job(budget) {
                Ok(job) => job,
                Err(EngineError::BudgetExhausted) => {
                    // Nothing persisted yet; the next run redetects from scratch.
                    return Ok(RunReport {
                        outcome: RunOutcome::BudgetExhausted,
                        stages: Vec::new(),
                        units_spent: budget.spent() - start,
                    });
                }
                Err(e) => return Err(e),
            },
        };

        match job {
            Some(job) => self.run_pipeline(job, budget, start),
            None => Ok(RunReport {
                outcome: RunOutcome::Idle,
                stages: Vec::new(),
                units_spent: budget.spent() - start,
            }),
        }
    }

    /// Detect triggers and compute the full set of stage plans from one
    /// consistent read. Returns `None` when there is nothing to do, or when
    /// another in-flight job exists (at-most-one active run; the benign
    /// race between this check and the save resolves as a no-op job).
    pub fn build_job(
        &self,
        budget: &mut GovernanceBudget,
    ) -> Result<Option<ReallocationJob>, EngineError> {
        let kind = JobKind::CommitmentReallocation;
        if self.jobs.active(kind)?.is_some() {
            return Ok(None);
        }

        let since = self.jobs.watermark(kind)?;
        let started_at = Utc::now();

        let detector = TriggerDetector::new(&self.search, &self.config);
        let triggers = detector.detect(since, budget)?;
        if triggers.is_empty() {
            return Ok(None);
        }

        let calculator = SupplyWindowCalculator::new(&self.search, &self.config);
        let windows = calculator.windows_for(&triggers.pairs, budget)?;
        let reader = DemandReader::new(&self.search, &self.config);

        let mut plans = JobPlans::default();
        let mut touched: BTreeSet<OrderId> = BTreeSet::new();
        let mut failed_pairs: BTreeSet<(ItemId, LocationId)> = BTreeSet::new();

        for pair in &triggers.pairs {
            let mut lines = match reader.read(pair.0, pair.1, None, budget) {
                Ok(lines) => lines,
                Err(EngineError::BudgetExhausted) => return Err(EngineError::BudgetExhausted),
                Err(e) => {
                    // Query failures stay local to the pair: its trigger
                    // flags survive, so the next run picks it up again.
                    warn!(
                        item = %pair.0,
                        location = %pair.1,
                        error = %e,
                        "demand read failed; pair deferred to a later run"
                    );
                    failed_pairs.insert(*pair);
                    continue;
                }
            };

            let window = windows.get(pair).cloned().unwrap_or_else(SupplyWindow::empty);
            assign_windows(&mut lines, &window);

            let outcome = redistribute(lines);
            for d in &outcome.donations {
                info!(
                    item = %pair.0,
                    location = %pair.1,
                    donor_order = %d.donor_order,
                    donor_line = d.donor_line,
                    donor_window = d.donor_window,
                    recipient_order = %d.recipient_order,
                    recipient_line = d.recipient_line,
                    recipient_window = d.recipient_window,
                    quantity = d.quantity,
                    "reallocating committed quantity"
                );
            }

            plans.decommit.extend(outcome.decommit_actions());
            plans
                .recommit_all
                .extend(outcome.recommit_actions_at(FillLevel::Full));
            plans
                .recommit_partial
                .extend(outcome.recommit_actions_at(FillLevel::Partial));
            plans
                .recommit_none
                .extend(outcome.recommit_actions_at(FillLevel::None));
            touched.extend(outcome.touched_orders());
        }

        plans.fill_rate_updates = touched
            .iter()
            .map(|order| CommitmentAction::update_fill_rate(*order))
            .collect();
        // Flagged orders with no commitment change still need their trigger
        // flag cleared, through the cheap partial-update path. Orders on a
        // pair whose read failed keep their flag so the retry finds them.
        let blocked: BTreeSet<OrderId> = triggers
            .flagged
            .iter()
            .filter(|f| failed_pairs.contains(&(f.item, f.location)))
            .map(|f| f.order_id)
            .collect();
        plans.clear_trigger = triggers
            .flagged_orders()
            .into_iter()
            .filter(|order| !touched.contains(order) && !blocked.contains(order))
            .map(CommitmentAction::clear_trigger)
            .collect();

        let job = ReallocationJob::new(kind, plans, started_at);
        self.jobs.save(&job)?;
        info!(
            job = %job.id,
            pairs = triggers.pairs.len(),
            decommits = job.plans.decommit.len(),
            recommits = job.plans.recommit_all.len()
                + job.plans.recommit_partial.len()
                + job.plans.recommit_none.len(),
            fill_rate_updates = job.plans.fill_rate_updates.len(),
            trigger_clears = job.plans.clear_trigger.len(),
            "reallocation job created"
        );
        Ok(Some(job))
    }

    fn run_pipeline(
        &self,
        mut job: ReallocationJob,
        budget: &mut GovernanceBudget,
        start: u64,
    ) -> Result<RunReport, EngineError> {
        let applier = Applier::new(&self.store, &self.config.costs);
        let mut stages = Vec::new();

        while let Some(next) = job.status.next() {
            // Persist the stage advance before dispatching its actions. A
            // crash between the status write and the last action is safe:
            // the resumed run moves on instead of replaying a stale plan,
            // and whatever stayed unapplied is healed by the next trigger
            // cycle.
            job.advance(next, Utc::now());
            self.jobs.save(&job)?;

            if next == JobStatus::Complete {
                break;
            }

            let plan = job.plan_for(next).to_vec();
            if plan.is_empty() {
                // Fall through to the next stage within the same run.
                continue;
            }

            let report = applier.apply_stage(next, &plan, budget);
            info!(
                job = %job.id,
                stage = ?next,
                applied = report.applied,
                skipped = report.skipped,
                failed = report.failed,
                remaining = report.remaining,
                "stage dispatched"
            );
            let interrupted = report.interrupted();
            stages.push(report);

            if interrupted {
                return Ok(RunReport {
                    outcome: RunOutcome::BudgetExhausted,
                    stages,
                    units_spent: budget.spent() - start,
                });
            }
        }

        // The job is complete: advance the watermark to the snapshot time,
        // then self-resubmit if new trigger flags appeared while it ran.
        self.jobs.set_watermark(job.kind, job.created_at)?;

        let detector = TriggerDetector::new(&self.search, &self.config);
        let resubmitted = match detector.has_pending_triggers(budget) {
            Ok(true) => {
                self.dispatch.enqueue(job.kind)?;
                info!(job = %job.id, "trigger flags remain; follow-up job enqueued");
                true
            }
            Ok(false) => false,
            // Out of budget for the probe: the next schedule tick detects
            // the flags anyway.
            Err(EngineError::BudgetExhausted) => false,
            Err(e) => return Err(e),
        };

        Ok(RunReport {
            outcome: RunOutcome::Completed { resubmitted },
            stages,
            units_spent: budget.spent() - start,
        })
    }
}
