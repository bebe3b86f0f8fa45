//! Supply window calculator: future purchase-order receipts per pair.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use recommit_allocation::{DemandLine, SupplyWindow};
use recommit_core::{ItemId, LocationId};
use recommit_orders::{Field, Filter, LineSearch, QuerySpec, Value};

use crate::budget::GovernanceBudget;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::search::fetch_all;

/// Derives each pair's ordered receipt dates from open purchase-order lines
/// with remaining unreceived quantity. Recomputed on every run; the windows
/// are never persisted.
pub struct SupplyWindowCalculator<'a, Q: LineSearch> {
    search: &'a Q,
    config: &'a EngineConfig,
}

impl<'a, Q: LineSearch> SupplyWindowCalculator<'a, Q> {
    pub fn new(search: &'a Q, config: &'a EngineConfig) -> Self {
        Self { search, config }
    }

    /// One search covers all requested pairs; rows are grouped client-side.
    /// Pairs with no open supply get an empty window.
    pub fn windows_for(
        &self,
        pairs: &[(ItemId, LocationId)],
        budget: &mut GovernanceBudget,
    ) -> Result<HashMap<(ItemId, LocationId), SupplyWindow>, EngineError> {
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }

        let items: BTreeSet<ItemId> = pairs.iter().map(|p| p.0).collect();
        let locations: BTreeSet<LocationId> = pairs.iter().map(|p| p.1).collect();

        let spec = QuerySpec::against(self.config.supply_source.clone())
            .filter(Filter::AnyOf(
                Field::Item,
                items.iter().map(|i| Value::Uuid((*i).into())).collect(),
            ))
            .filter(Filter::AnyOf(
                Field::Location,
                locations.iter().map(|l| Value::Uuid((*l).into())).collect(),
            ))
            .filter(Filter::GreaterThan(Field::RemainingQuantity, Value::Int(0)))
            .columns([Field::Item, Field::Location, Field::ExpectedReceiptDate]);

        let rows = fetch_all(self.search, &spec, self.config, budget)?;

        let mut dates: HashMap<(ItemId, LocationId), Vec<NaiveDate>> = HashMap::new();
        for row in rows {
            let key = (
                ItemId::from_uuid(row.get_uuid(Field::Item)?),
                LocationId::from_uuid(row.get_uuid(Field::Location)?),
            );
            dates
                .entry(key)
                .or_default()
                .push(row.get_date(Field::ExpectedReceiptDate)?);
        }

        Ok(pairs
            .iter()
            .map(|pair| {
                let window = dates
                    .remove(pair)
                    .map(SupplyWindow::new)
                    .unwrap_or_else(SupplyWindow::empty);
                (*pair, window)
            })
            .collect())
    }
}

/// Stamp each demand line with the window its ship date falls into.
pub fn assign_windows(lines: &mut [DemandLine], window: &SupplyWindow) {
    for line in lines {
        line.po_window = window.window_for(line.ship_date);
    }
}
