//! In-memory job persistence: one durable row per job kind, plus the
//! trigger watermark.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use recommit_engine::{JobKind, JobStore, JobStoreError, ReallocationJob};

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobKind, ReallocationJob>>,
    watermarks: RwLock<HashMap<JobKind, DateTime<Utc>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Test introspection: the stored row for a kind, complete or not.
    pub fn job(&self, kind: JobKind) -> Option<ReallocationJob> {
        self.jobs.read().unwrap().get(&kind).cloned()
    }
}

impl JobStore for InMemoryJobStore {
    fn active(&self, kind: JobKind) -> Result<Option<ReallocationJob>, JobStoreError> {
        Ok(self
            .jobs
            .read()
            .unwrap()
            .get(&kind)
            .filter(|job| !job.is_terminal())
            .cloned())
    }

    fn save(&self, job: &ReallocationJob) -> Result<(), JobStoreError> {
        self.jobs.write().unwrap().insert(job.kind, job.clone());
        Ok(())
    }

    fn watermark(&self, kind: JobKind) -> Result<Option<DateTime<Utc>>, JobStoreError> {
        Ok(self.watermarks.read().unwrap().get(&kind).copied())
    }

    fn set_watermark(&self, kind: JobKind, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        self.watermarks.write().unwrap().insert(kind, at);
        Ok(())
    }
}
