//! Engine-level error type.

use thiserror::Error;

use recommit_orders::{QueryError, StoreError};

use crate::dispatch::DispatchError;
use crate::job::JobStoreError;

/// Anything an engine cycle can fail with.
///
/// Budget exhaustion travels as an error internally but is not a failure:
/// the pipeline converts it into a resumable run outcome at the boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("order store failed: {0}")]
    Store(#[from] StoreError),

    #[error("job store failed: {0}")]
    JobStore(#[from] JobStoreError),

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("governance budget exhausted")]
    BudgetExhausted,
}
