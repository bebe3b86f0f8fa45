//! The reallocation job record and its persistence port.
//!
//! One durable row per job kind replaces any process-wide "current job"
//! state: the tagged status plus the plans computed at build time are all a
//! resumed run needs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use recommit_allocation::CommitmentAction;
use recommit_core::JobId;

/// Job kinds this engine owns. Dispatch and the job store key on this.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    CommitmentReallocation,
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            JobKind::CommitmentReallocation => f.write_str("commitment_reallocation"),
        }
    }
}

/// Pipeline stage, persisted as a single enum value so that a crash or
/// governance interruption mid-batch resumes at the correct stage.
///
/// The status names the stage whose actions have been dispatched (at least
/// partially). A resumed run therefore always moves to the *next* stage and
/// never replays a stage from a stale plan.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Decommitting,
    RecommittingAll,
    RecommittingPartial,
    RecommittingNone,
    UpdatingFillRates,
    UncheckingTriggerFlags,
    Complete,
}

impl JobStatus {
    /// Strict forward order; `None` past `Complete`.
    pub fn next(self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::Decommitting),
            JobStatus::Decommitting => Some(JobStatus::RecommittingAll),
            JobStatus::RecommittingAll => Some(JobStatus::RecommittingPartial),
            JobStatus::RecommittingPartial => Some(JobStatus::RecommittingNone),
            JobStatus::RecommittingNone => Some(JobStatus::UpdatingFillRates),
            JobStatus::UpdatingFillRates => Some(JobStatus::UncheckingTriggerFlags),
            JobStatus::UncheckingTriggerFlags => Some(JobStatus::Complete),
            JobStatus::Complete => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == JobStatus::Complete
    }
}

/// The stage plans computed once at job build time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPlans {
    pub decommit: Vec<CommitmentAction>,
    pub recommit_all: Vec<CommitmentAction>,
    pub recommit_partial: Vec<CommitmentAction>,
    pub recommit_none: Vec<CommitmentAction>,
    pub fill_rate_updates: Vec<CommitmentAction>,
    pub clear_trigger: Vec<CommitmentAction>,
}

impl JobPlans {
    pub fn total_actions(&self) -> usize {
        self.decommit.len()
            + self.recommit_all.len()
            + self.recommit_partial.len()
            + self.recommit_none.len()
            + self.fill_rate_updates.len()
            + self.clear_trigger.len()
    }
}

/// One in-flight reallocation run. At most one non-complete job exists per
/// kind at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReallocationJob {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub plans: JobPlans,
    /// When the demand snapshot behind the plans was taken. Becomes the
    /// trigger watermark once the job completes.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReallocationJob {
    pub fn new(kind: JobKind, plans: JobPlans, created_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            kind,
            status: JobStatus::Pending,
            plans,
            created_at,
            updated_at: created_at,
        }
    }

    /// The action list a stage dispatches.
    pub fn plan_for(&self, stage: JobStatus) -> &[CommitmentAction] {
        match stage {
            JobStatus::Decommitting => &self.plans.decommit,
            JobStatus::RecommittingAll => &self.plans.recommit_all,
            JobStatus::RecommittingPartial => &self.plans.recommit_partial,
            JobStatus::RecommittingNone => &self.plans.recommit_none,
            JobStatus::UpdatingFillRates => &self.plans.fill_rate_updates,
            JobStatus::UncheckingTriggerFlags => &self.plans.clear_trigger,
            JobStatus::Pending | JobStatus::Complete => &[],
        }
    }

    pub fn advance(&mut self, status: JobStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Job persistence error.
#[derive(Debug, Clone, Error)]
pub enum JobStoreError {
    #[error("storage error: {0}")]
    Backend(String),
}

/// Durable-row persistence for jobs and the trigger watermark.
///
/// The watermark lives on the schedule record next to the job so that a
/// deployment carries exactly one piece of engine state per kind.
pub trait JobStore: Send + Sync {
    /// The current non-complete job for a kind, if any.
    fn active(&self, kind: JobKind) -> Result<Option<ReallocationJob>, JobStoreError>;

    /// Upsert the job row for its kind.
    fn save(&self, job: &ReallocationJob) -> Result<(), JobStoreError>;

    /// The last completed run's snapshot timestamp.
    fn watermark(&self, kind: JobKind) -> Result<Option<DateTime<Utc>>, JobStoreError>;

    fn set_watermark(&self, kind: JobKind, at: DateTime<Utc>) -> Result<(), JobStoreError>;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn active(&self, kind: JobKind) -> Result<Option<ReallocationJob>, JobStoreError> {
        (**self).active(kind)
    }

    fn save(&self, job: &ReallocationJob) -> Result<(), JobStoreError> {
        (**self).save(job)
    }

    fn watermark(&self, kind: JobKind) -> Result<Option<DateTime<Utc>>, JobStoreError> {
        (**self).watermark(kind)
    }

    fn set_watermark(&self, kind: JobKind, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        (**self).set_watermark(kind, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recommit_allocation::CommitmentAction;
    use recommit_core::OrderId;

    #[test]
    fn status_walks_the_full_pipeline_in_order() {
        let mut status = JobStatus::Pending;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            status = next;
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                JobStatus::Pending,
                JobStatus::Decommitting,
                JobStatus::RecommittingAll,
                JobStatus::RecommittingPartial,
                JobStatus::RecommittingNone,
                JobStatus::UpdatingFillRates,
                JobStatus::UncheckingTriggerFlags,
                JobStatus::Complete,
            ]
        );
        assert!(status.is_terminal());
    }

    #[test]
    fn each_stage_reads_its_own_plan() {
        let order = OrderId::new();
        let plans = JobPlans {
            decommit: vec![CommitmentAction::decommit(order, 1)],
            recommit_partial: vec![CommitmentAction::recommit(order, 1)],
            clear_trigger: vec![CommitmentAction::clear_trigger(order)],
            ..JobPlans::default()
        };
        let job = ReallocationJob::new(JobKind::CommitmentReallocation, plans, Utc::now());

        assert_eq!(job.plan_for(JobStatus::Decommitting).len(), 1);
        assert_eq!(job.plan_for(JobStatus::RecommittingAll).len(), 0);
        assert_eq!(job.plan_for(JobStatus::RecommittingPartial).len(), 1);
        assert_eq!(job.plan_for(JobStatus::UncheckingTriggerFlags).len(), 1);
        assert!(job.plan_for(JobStatus::Pending).is_empty());
        assert!(job.plan_for(JobStatus::Complete).is_empty());
        assert_eq!(job.plans.total_actions(), 3);
    }

    #[test]
    fn job_record_round_trips_through_json() {
        let order = OrderId::new();
        let plans = JobPlans {
            decommit: vec![CommitmentAction::decommit(order, 2)],
            fill_rate_updates: vec![CommitmentAction::update_fill_rate(order)],
            ..JobPlans::default()
        };
        let mut job = ReallocationJob::new(JobKind::CommitmentReallocation, plans, Utc::now());
        job.advance(JobStatus::Decommitting, Utc::now());

        let json = serde_json::to_string(&job).unwrap();
        let back: ReallocationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
        assert_eq!(back.status, JobStatus::Decommitting);
    }
}
