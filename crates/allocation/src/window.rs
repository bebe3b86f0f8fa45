//! Supply windows: the ordered future purchase-order receipts for one
//! (item, location) pair.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Distinct expected-receipt dates for one (item, location) pair, strictly
/// ascending. Window index 0 is the earliest receipt. Recomputed on every
/// job run; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyWindow {
    dates: Vec<NaiveDate>,
}

impl SupplyWindow {
    /// Build a window set from raw receipt dates; duplicates collapse and
    /// ordering is normalized.
    pub fn new(mut dates: Vec<NaiveDate>) -> Self {
        dates.sort_unstable();
        dates.dedup();
        Self { dates }
    }

    /// No known future receipts.
    pub fn empty() -> Self {
        Self { dates: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Map a requested ship date to its window index.
    ///
    /// The index is the number of receipt dates on or before the ship date.
    /// A ship date earlier than every receipt maps to window 0; a ship date
    /// later than every receipt maps to `len()`. A ship date equal to a
    /// receipt date counts as dependent on that receipt: shipping the same
    /// day stock arrives waits for the truck. In particular a ship date
    /// equal to the first receipt date maps to window 1, not 0.
    pub fn window_for(&self, ship_date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d <= ship_date)
    }
}
