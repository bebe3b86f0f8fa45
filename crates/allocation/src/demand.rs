//! Demand lines: one order's reservation of one item at one location.

use chrono::NaiveDate;

use recommit_core::{ItemId, LocationId, OrderId};

/// A single open order line competing for committed inventory.
///
/// Read fresh from the order store at job start. The `do_decommit` and
/// `do_recommit` flags are working state for one redistribution pass and are
/// never persisted; the persisted outcome is the emitted
/// [`CommitmentAction`](crate::CommitmentAction) list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandLine {
    pub order_id: OrderId,
    pub line_index: u32,
    pub item: ItemId,
    pub location: LocationId,
    /// Quantity ordered.
    pub quantity: i64,
    /// Quantity currently reserved for this line.
    pub committed: i64,
    /// Requested ship date.
    pub ship_date: NaiveDate,
    /// Explicit urgency override. Lower is more urgent; `None` sorts last.
    pub priority: Option<u32>,
    /// Logistics has signed off on this line; it may never be raided.
    pub logistics_approved: bool,
    /// Set when this line was split off another order; exempt from raiding.
    pub split_from_order: Option<OrderId>,
    /// Index of the purchase-order receipt this line's timing draws from.
    /// Derived from the pair's [`SupplyWindow`](crate::SupplyWindow).
    pub po_window: usize,
    pub do_decommit: bool,
    pub do_recommit: bool,
}

impl DemandLine {
    /// Quantity still wanted on top of what is committed. May be negative
    /// only transiently inside a redistribution working set.
    pub fn deficit(&self) -> i64 {
        self.quantity - self.committed
    }

    /// Protected lines never donate committed quantity.
    pub fn is_protected(&self) -> bool {
        self.logistics_approved || self.split_from_order.is_some()
    }

    pub fn fill_level(&self) -> FillLevel {
        if self.committed >= self.quantity {
            FillLevel::Full
        } else if self.committed > 0 {
            FillLevel::Partial
        } else {
            FillLevel::None
        }
    }
}

/// How much of a line's ordered quantity its commitment covers after a
/// redistribution pass. Drives which recommit stage the line lands in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillLevel {
    Full,
    Partial,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn line(quantity: i64, committed: i64) -> DemandLine {
        DemandLine {
            order_id: OrderId::new(),
            line_index: 1,
            item: ItemId::new(),
            location: LocationId::new(),
            quantity,
            committed,
            ship_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            priority: None,
            logistics_approved: false,
            split_from_order: None,
            po_window: 0,
            do_decommit: false,
            do_recommit: false,
        }
    }

    #[test]
    fn deficit_is_quantity_minus_committed() {
        assert_eq!(line(10, 4).deficit(), 6);
        assert_eq!(line(10, 10).deficit(), 0);
    }

    #[test]
    fn logistics_approval_protects_a_line() {
        let mut l = line(10, 10);
        assert!(!l.is_protected());
        l.logistics_approved = true;
        assert!(l.is_protected());
    }

    #[test]
    fn split_origin_protects_a_line() {
        let mut l = line(10, 10);
        l.split_from_order = Some(OrderId::new());
        assert!(l.is_protected());
    }

    #[test]
    fn fill_level_buckets() {
        assert_eq!(line(10, 10).fill_level(), FillLevel::Full);
        assert_eq!(line(10, 3).fill_level(), FillLevel::Partial);
        assert_eq!(line(10, 0).fill_level(), FillLevel::None);
    }
}
