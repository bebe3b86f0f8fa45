//! Typed order records, as loaded from and saved to the external store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use recommit_core::{DomainError, DomainResult, ItemId, LocationId, OrderId};

/// How the backing order system commits inventory to a line.
///
/// The engine never writes committed quantities directly; it steers the
/// backend by flipping this policy. Decommitting a line means setting
/// `DoNotCommit`, which releases its reservation back to the pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// The backend may reserve available inventory for this line.
    CommitAvailable,
    /// The line holds no reservation and claims nothing new.
    DoNotCommit,
}

/// One line of a sales order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub index: u32,
    pub item: ItemId,
    pub location: LocationId,
    pub quantity: i64,
    pub committed: i64,
    pub ship_date: NaiveDate,
    /// Explicit urgency override; lower is more urgent.
    pub priority: Option<u32>,
    pub logistics_approved: bool,
    pub split_from_order: Option<OrderId>,
    pub commit_policy: CommitPolicy,
    /// Fully shipped or cancelled lines are closed and carry no demand.
    pub closed: bool,
}

impl OrderLine {
    pub fn is_open(&self) -> bool {
        !self.closed
    }
}

/// A sales order as persisted by the external order system.
///
/// Owned by that system: this subsystem mutates commit policies and the two
/// flags below, and never creates or deletes orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub lines: Vec<OrderLine>,
    /// Trigger flag: commitments may be stale, re-evaluate on the next job.
    pub needs_reallocation: bool,
    /// Asks the surrounding system to recompute the order's fill rate.
    pub recompute_fill_rate: bool,
    pub modified_at: DateTime<Utc>,
}

impl Order {
    pub fn line(&self, index: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.index == index)
    }

    pub fn line_mut(&mut self, index: u32) -> Option<&mut OrderLine> {
        self.lines.iter_mut().find(|l| l.index == index)
    }

    /// Set one line's commit policy.
    pub fn set_line_commit_policy(
        &mut self,
        index: u32,
        policy: CommitPolicy,
    ) -> DomainResult<()> {
        let line = self.line_mut(index).ok_or(DomainError::NotFound)?;
        line.commit_policy = policy;
        Ok(())
    }

    pub fn open_lines(&self) -> impl Iterator<Item = &OrderLine> {
        self.lines.iter().filter(|l| l.is_open())
    }

    /// Check the persistence invariant: a stored line never commits more
    /// than it ordered, and never a negative amount.
    pub fn validate(&self) -> DomainResult<()> {
        for line in &self.lines {
            if line.quantity < 0 {
                return Err(DomainError::validation(format!(
                    "line {} has negative quantity",
                    line.index
                )));
            }
            if line.committed < 0 || line.committed > line.quantity {
                return Err(DomainError::invariant(format!(
                    "line {} committed {} outside [0, {}]",
                    line.index, line.committed, line.quantity
                )));
            }
        }
        Ok(())
    }
}

/// Lightweight write: the fields a partial update may touch without loading
/// the whole record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub needs_reallocation: Option<bool>,
    pub recompute_fill_rate: Option<bool>,
}

impl OrderPatch {
    pub fn clear_trigger() -> Self {
        Self {
            needs_reallocation: Some(false),
            ..Self::default()
        }
    }

    pub fn set_trigger() -> Self {
        Self {
            needs_reallocation: Some(true),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.needs_reallocation.is_none() && self.recompute_fill_rate.is_none()
    }

    pub fn apply_to(&self, order: &mut Order) {
        if let Some(v) = self.needs_reallocation {
            order.needs_reallocation = v;
        }
        if let Some(v) = self.recompute_fill_rate {
            order.recompute_fill_rate = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_line(index: u32, quantity: i64, committed: i64) -> OrderLine {
        OrderLine {
            index,
            item: ItemId::from_uuid(Uuid::from_u128(1)),
            location: LocationId::from_uuid(Uuid::from_u128(2)),
            quantity,
            committed,
            ship_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            priority: None,
            logistics_approved: false,
            split_from_order: None,
            commit_policy: CommitPolicy::CommitAvailable,
            closed: false,
        }
    }

    fn test_order(lines: Vec<OrderLine>) -> Order {
        Order {
            id: OrderId::new(),
            lines,
            needs_reallocation: false,
            recompute_fill_rate: false,
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn set_commit_policy_on_existing_line() {
        let mut order = test_order(vec![test_line(1, 10, 5)]);
        order
            .set_line_commit_policy(1, CommitPolicy::DoNotCommit)
            .unwrap();
        assert_eq!(order.line(1).unwrap().commit_policy, CommitPolicy::DoNotCommit);
    }

    #[test]
    fn set_commit_policy_on_missing_line_is_not_found() {
        let mut order = test_order(vec![test_line(1, 10, 5)]);
        let err = order
            .set_line_commit_policy(9, CommitPolicy::DoNotCommit)
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn validate_rejects_over_commit() {
        let order = test_order(vec![test_line(1, 10, 11)]);
        assert!(matches!(
            order.validate(),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn validate_rejects_negative_commit() {
        let order = test_order(vec![test_line(1, 10, -1)]);
        assert!(order.validate().is_err());
    }

    #[test]
    fn open_lines_skip_closed_ones() {
        let mut closed = test_line(2, 4, 0);
        closed.closed = true;
        let order = test_order(vec![test_line(1, 10, 5), closed]);
        assert_eq!(order.open_lines().count(), 1);
    }

    #[test]
    fn patch_touches_only_named_fields() {
        let mut order = test_order(vec![]);
        order.needs_reallocation = true;
        order.recompute_fill_rate = true;

        OrderPatch::clear_trigger().apply_to(&mut order);
        assert!(!order.needs_reallocation);
        assert!(order.recompute_fill_rate);
    }
}
