//! Demand reader: the open order lines competing for one pair's inventory.

use chrono::{DateTime, Utc};

use recommit_allocation::DemandLine;
use recommit_core::{ItemId, LocationId, OrderId};
use recommit_orders::{Field, Filter, LineSearch, QuerySpec, Row, Value};

use crate::budget::GovernanceBudget;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::search::fetch_all;

/// Read-only view over open, unfulfilled order lines for one
/// (item, location) pair.
///
/// A query failure here aborts only the current pair's work; the caller
/// logs it and the pair is retried on the next scheduled run. Nothing is
/// written, so no state can be corrupted for other pairs.
pub struct DemandReader<'a, Q: LineSearch> {
    search: &'a Q,
    config: &'a EngineConfig,
}

impl<'a, Q: LineSearch> DemandReader<'a, Q> {
    pub fn new(search: &'a Q, config: &'a EngineConfig) -> Self {
        Self { search, config }
    }

    /// Fetch the pair's demand list. `since` narrows to lines modified
    /// after the watermark; plan building passes `None` to read the whole
    /// working set.
    pub fn read(
        &self,
        item: ItemId,
        location: LocationId,
        since: Option<DateTime<Utc>>,
        budget: &mut GovernanceBudget,
    ) -> Result<Vec<DemandLine>, EngineError> {
        let mut spec = QuerySpec::against(self.config.demand_source.clone())
            .filter(Filter::Equals(Field::Item, Value::Uuid(item.into())))
            .filter(Filter::Equals(Field::Location, Value::Uuid(location.into())))
            .filter(Filter::Equals(Field::LineClosed, Value::Bool(false)))
            .columns([
                Field::OrderId,
                Field::LineIndex,
                Field::Quantity,
                Field::Committed,
                Field::ShipDate,
                Field::Priority,
                Field::LogisticsApproved,
                Field::SplitFromOrder,
            ]);
        if let Some(since) = since {
            spec = spec.filter(Filter::GreaterThan(
                Field::ModifiedAt,
                Value::DateTime(since),
            ));
        }

        let rows = fetch_all(self.search, &spec, self.config, budget)?;
        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            lines.push(line_from_row(&row, item, location)?);
        }
        Ok(lines)
    }
}

fn line_from_row(row: &Row, item: ItemId, location: LocationId) -> Result<DemandLine, EngineError> {
    Ok(DemandLine {
        order_id: OrderId::from_uuid(row.get_uuid(Field::OrderId)?),
        line_index: row.get_u32(Field::LineIndex)?,
        item,
        location,
        quantity: row.get_i64(Field::Quantity)?,
        committed: row.get_i64(Field::Committed)?,
        ship_date: row.get_date(Field::ShipDate)?,
        priority: row.get_opt_u32(Field::Priority)?,
        logistics_approved: row.get_bool(Field::LogisticsApproved)?,
        split_from_order: row
            .get_opt_uuid(Field::SplitFromOrder)?
            .map(OrderId::from_uuid),
        po_window: 0,
        do_decommit: false,
        do_recommit: false,
    })
}
