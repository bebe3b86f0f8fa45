//! Commitment action applier: one order mutation at a time.

use tracing::{debug, error, info, warn};

use recommit_allocation::{ActionKind, CommitmentAction};
use recommit_core::OrderId;
use recommit_orders::{CommitPolicy, OrderPatch, OrderStore, StoreError};

use crate::budget::{GovernanceBudget, UnitCosts};
use crate::job::JobStatus;

/// Result of applying one action. Failures never abort the batch; the
/// failed order is re-flagged so a later job retries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Skipped(String),
    Failed(String),
}

/// Per-stage aggregation of apply outcomes.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub stage: Option<JobStatus>,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Actions left undispatched when the budget ran out mid-stage.
    pub remaining: usize,
    pub failures: Vec<(OrderId, String)>,
}

impl StageReport {
    pub fn interrupted(&self) -> bool {
        self.remaining > 0
    }
}

/// Executes decommit/recommit decisions against persisted order records,
/// sequentially, through the external order-update interface.
pub struct Applier<'a, S: OrderStore> {
    store: &'a S,
    costs: &'a UnitCosts,
}

impl<'a, S: OrderStore> Applier<'a, S> {
    pub fn new(store: &'a S, costs: &'a UnitCosts) -> Self {
        Self { store, costs }
    }

    /// Apply a stage's plan until it is drained or the budget runs out.
    /// Orders are processed one at a time; a failure on one order never
    /// blocks the rest of the batch.
    pub fn apply_stage(
        &self,
        stage: JobStatus,
        plan: &[CommitmentAction],
        budget: &mut GovernanceBudget,
    ) -> StageReport {
        let mut report = StageReport {
            stage: Some(stage),
            ..StageReport::default()
        };

        for (idx, action) in plan.iter().enumerate() {
            if !budget.try_spend(self.cost_of(action.kind)) {
                report.remaining = plan.len() - idx;
                warn!(
                    stage = ?stage,
                    dispatched = idx,
                    remaining = report.remaining,
                    "governance budget exhausted mid-stage"
                );
                break;
            }

            match self.apply_one(action) {
                ApplyOutcome::Applied => {
                    report.applied += 1;
                    info!(
                        stage = ?stage,
                        kind = ?action.kind,
                        order = %action.order_id,
                        line = action.line_index,
                        "commitment action applied"
                    );
                }
                ApplyOutcome::Skipped(reason) => {
                    report.skipped += 1;
                    debug!(
                        stage = ?stage,
                        kind = ?action.kind,
                        order = %action.order_id,
                        reason = %reason,
                        "commitment action skipped"
                    );
                }
                ApplyOutcome::Failed(reason) => {
                    report.failed += 1;
                    error!(
                        stage = ?stage,
                        kind = ?action.kind,
                        order = %action.order_id,
                        reason = %reason,
                        "commitment action failed; order re-flagged for the next job"
                    );
                    report.failures.push((action.order_id, reason));
                    self.reflag(action.order_id, budget);
                }
            }
        }

        report
    }

    /// Consume one action. `Decommit`/`Recommit` load the order, flip the
    /// line's commit policy and save; `UpdateFillRate` also clears the
    /// trigger flag; `ClearTrigger` goes through the lightweight partial
    /// update and never loads the record.
    pub fn apply_one(&self, action: &CommitmentAction) -> ApplyOutcome {
        match action.kind {
            ActionKind::Decommit => self.set_policy(action, CommitPolicy::DoNotCommit),
            ActionKind::Recommit => self.set_policy(action, CommitPolicy::CommitAvailable),
            ActionKind::UpdateFillRate => self.update_fill_rate(action.order_id),
            ActionKind::ClearTrigger => {
                match self.store.partial_update(action.order_id, &OrderPatch::clear_trigger()) {
                    Ok(()) => ApplyOutcome::Applied,
                    Err(StoreError::NotFound(_)) => {
                        ApplyOutcome::Skipped("order no longer exists".to_string())
                    }
                    Err(e) => ApplyOutcome::Failed(e.to_string()),
                }
            }
        }
    }

    fn set_policy(&self, action: &CommitmentAction, policy: CommitPolicy) -> ApplyOutcome {
        let Some(index) = action.line_index else {
            return ApplyOutcome::Skipped("line-level action without a line index".to_string());
        };

        let mut order = match self.store.load(action.order_id) {
            Ok(order) => order,
            Err(StoreError::NotFound(_)) => {
                return ApplyOutcome::Skipped("order no longer exists".to_string());
            }
            Err(e) => return ApplyOutcome::Failed(e.to_string()),
        };

        match order.line(index) {
            None => return ApplyOutcome::Skipped(format!("line {index} not found")),
            Some(line) if line.commit_policy == policy => {
                return ApplyOutcome::Skipped("commit policy already set".to_string());
            }
            Some(_) => {}
        }

        // Cannot fail: the line was just found.
        let _ = order.set_line_commit_policy(index, policy);

        match self.store.save(&order) {
            Ok(_) => ApplyOutcome::Applied,
            Err(StoreError::NotFound(_)) => {
                ApplyOutcome::Skipped("order vanished before save".to_string())
            }
            Err(e) => ApplyOutcome::Failed(e.to_string()),
        }
    }

    fn update_fill_rate(&self, order_id: OrderId) -> ApplyOutcome {
        let mut order = match self.store.load(order_id) {
            Ok(order) => order,
            Err(StoreError::NotFound(_)) => {
                return ApplyOutcome::Skipped("order no longer exists".to_string());
            }
            Err(e) => return ApplyOutcome::Failed(e.to_string()),
        };

        if order.recompute_fill_rate && !order.needs_reallocation {
            return ApplyOutcome::Skipped("nothing to update".to_string());
        }

        order.recompute_fill_rate = true;
        order.needs_reallocation = false;

        match self.store.save(&order) {
            Ok(_) => ApplyOutcome::Applied,
            Err(StoreError::NotFound(_)) => {
                ApplyOutcome::Skipped("order vanished before save".to_string())
            }
            Err(e) => ApplyOutcome::Failed(e.to_string()),
        }
    }

    /// Best-effort: keep a failed order flagged so the next trigger cycle
    /// picks it up again. Skipped silently when the budget cannot even
    /// cover the partial update.
    fn reflag(&self, order_id: OrderId, budget: &mut GovernanceBudget) {
        if !budget.try_spend(self.costs.partial_update) {
            return;
        }
        if let Err(e) = self.store.partial_update(order_id, &OrderPatch::set_trigger()) {
            debug!(order = %order_id, error = %e, "could not re-flag failed order");
        }
    }

    fn cost_of(&self, kind: ActionKind) -> u64 {
        match kind {
            ActionKind::ClearTrigger => self.costs.partial_update,
            ActionKind::Decommit | ActionKind::Recommit | ActionKind::UpdateFillRate => {
                self.costs.full_write()
            }
        }
    }
}
