//! Per-deployment engine parameters.

use serde::{Deserialize, Serialize};

use recommit_core::ItemId;

use crate::budget::UnitCosts;

/// Default saved-query identifier for open sales-order lines.
pub const DEFAULT_DEMAND_SOURCE: &str = "open_sales_order_lines";

/// Default saved-query identifier for open purchase-order lines.
pub const DEFAULT_SUPPLY_SOURCE: &str = "open_purchase_order_lines";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Saved query the demand reader and trigger detector run against.
    pub demand_source: String,
    /// Saved query the supply window calculator runs against.
    pub supply_source: String,
    /// Staged rollout: when set, only this item's pairs are processed and
    /// only its orders are touched.
    pub test_item: Option<ItemId>,
    /// Search page size.
    pub page_size: u32,
    /// Governance unit accounting.
    pub costs: UnitCosts,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            demand_source: DEFAULT_DEMAND_SOURCE.to_string(),
            supply_source: DEFAULT_SUPPLY_SOURCE.to_string(),
            test_item: None,
            page_size: 200,
            costs: UnitCosts::default(),
        }
    }
}
