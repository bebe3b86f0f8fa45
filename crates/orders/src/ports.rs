//! The two interfaces this subsystem talks to the outside world through.
//!
//! Everything the engine persists or reads goes through [`OrderStore`] and
//! [`LineSearch`]. Implementations decide the storage technology; the
//! reference in-memory implementations live in `recommit-infra`.

use std::sync::Arc;

use thiserror::Error;

use recommit_core::OrderId;

use crate::model::{Order, OrderPatch};
use crate::query::{Page, Pagination, QueryError, QuerySpec};

/// Order persistence error.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("record rejected: {0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Backend(String),
}

/// Whole-record order persistence.
pub trait OrderStore: Send + Sync {
    /// Load one order by id.
    fn load(&self, id: OrderId) -> Result<Order, StoreError>;

    /// Persist a full order record, returning its id.
    fn save(&self, order: &Order) -> Result<OrderId, StoreError>;

    /// Lightweight write that touches only the patched fields, without a
    /// full record load.
    fn partial_update(&self, id: OrderId, patch: &OrderPatch) -> Result<(), StoreError>;
}

/// Parameterized, paged search over order lines and purchase-order lines.
pub trait LineSearch: Send + Sync {
    fn search(&self, spec: &QuerySpec, page: Pagination) -> Result<Page, QueryError>;
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn load(&self, id: OrderId) -> Result<Order, StoreError> {
        (**self).load(id)
    }

    fn save(&self, order: &Order) -> Result<OrderId, StoreError> {
        (**self).save(order)
    }

    fn partial_update(&self, id: OrderId, patch: &OrderPatch) -> Result<(), StoreError> {
        (**self).partial_update(id, patch)
    }
}

impl<S> LineSearch for Arc<S>
where
    S: LineSearch + ?Sized,
{
    fn search(&self, spec: &QuerySpec, page: Pagination) -> Result<Page, QueryError> {
        (**self).search(spec, page)
    }
}
