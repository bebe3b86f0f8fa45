//! Commitment actions: the unit of work handed to the applier.

use serde::{Deserialize, Serialize};

use recommit_core::OrderId;

/// What an action does to its target order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Release the line's reservation (set its commit policy to do-not-commit).
    Decommit,
    /// Restore the line's reservation (set its commit policy to commit-available).
    Recommit,
    /// Flag the order for fill-rate recomputation and clear its trigger flag.
    UpdateFillRate,
    /// Clear only the trigger flag, via a lightweight partial update.
    ClearTrigger,
}

/// One unit of work, produced by the redistribution pass or the job builder
/// and consumed exactly once by the applier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentAction {
    pub kind: ActionKind,
    pub order_id: OrderId,
    /// Present for line-level actions (`Decommit`/`Recommit`); absent for
    /// order-level ones.
    pub line_index: Option<u32>,
}

impl CommitmentAction {
    pub fn decommit(order_id: OrderId, line_index: u32) -> Self {
        Self {
            kind: ActionKind::Decommit,
            order_id,
            line_index: Some(line_index),
        }
    }

    pub fn recommit(order_id: OrderId, line_index: u32) -> Self {
        Self {
            kind: ActionKind::Recommit,
            order_id,
            line_index: Some(line_index),
        }
    }

    pub fn update_fill_rate(order_id: OrderId) -> Self {
        Self {
            kind: ActionKind::UpdateFillRate,
            order_id,
            line_index: None,
        }
    }

    pub fn clear_trigger(order_id: OrderId) -> Self {
        Self {
            kind: ActionKind::ClearTrigger,
            order_id,
            line_index: None,
        }
    }
}
