//! Batch dispatch port: the external task queue that schedules engine runs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::job::JobKind;

/// Opaque handle returned by the queue for an enqueued run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchHandle(pub Uuid);

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("enqueue rejected: {0}")]
    Rejected(String),
}

/// Ask the external scheduler for another run of a job kind.
///
/// Used for self-resubmission: a completing job that finds fresh trigger
/// flags enqueues its own successor instead of waiting for the next
/// schedule tick, letting an arbitrarily large backlog drain across many
/// budget-bounded runs.
pub trait BatchDispatch: Send + Sync {
    fn enqueue(&self, kind: JobKind) -> Result<DispatchHandle, DispatchError>;
}

impl<D> BatchDispatch for Arc<D>
where
    D: BatchDispatch + ?Sized,
{
    fn enqueue(&self, kind: JobKind) -> Result<DispatchHandle, DispatchError> {
        (**self).enqueue(kind)
    }
}
