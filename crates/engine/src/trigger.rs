//! Trigger detector: which pairs need a fresh redistribution pass.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use recommit_core::{ItemId, LocationId, OrderId};
use recommit_orders::{Field, Filter, LineSearch, Pagination, QuerySpec, Value};

use crate::budget::GovernanceBudget;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::search::fetch_all;

/// One explicitly flagged order line's whereabouts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlaggedOrder {
    pub order_id: OrderId,
    pub item: ItemId,
    pub location: LocationId,
}

/// The work found by one detection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSet {
    /// Distinct (item, location) pairs needing redistribution, ordered for
    /// deterministic processing.
    pub pairs: Vec<(ItemId, LocationId)>,
    /// Orders carrying an explicit trigger flag, whether or not their pairs
    /// produce any commitment change. Kept per pair so a pair whose read
    /// fails keeps its orders flagged.
    pub flagged: Vec<FlaggedOrder>,
}

impl TriggerSet {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && self.flagged.is_empty()
    }

    /// Distinct flagged order ids.
    pub fn flagged_orders(&self) -> Vec<OrderId> {
        let set: BTreeSet<OrderId> = self.flagged.iter().map(|f| f.order_id).collect();
        set.into_iter().collect()
    }
}

/// Two independent triggers feed new work: order lines created or modified
/// after the persisted watermark, and orders explicitly flagged for
/// re-evaluation regardless of timestamp.
pub struct TriggerDetector<'a, Q: LineSearch> {
    search: &'a Q,
    config: &'a EngineConfig,
}

impl<'a, Q: LineSearch> TriggerDetector<'a, Q> {
    pub fn new(search: &'a Q, config: &'a EngineConfig) -> Self {
        Self { search, config }
    }

    pub fn detect(
        &self,
        since: Option<DateTime<Utc>>,
        budget: &mut GovernanceBudget,
    ) -> Result<TriggerSet, EngineError> {
        let mut pairs: BTreeSet<(ItemId, LocationId)> = BTreeSet::new();
        let mut flagged: BTreeSet<FlaggedOrder> = BTreeSet::new();

        // Explicitly flagged orders, regardless of timestamp.
        let flagged_spec = self
            .open_lines_spec()
            .filter(Filter::Equals(Field::NeedsReallocation, Value::Bool(true)))
            .columns([Field::OrderId, Field::Item, Field::Location]);
        for row in fetch_all(self.search, &flagged_spec, self.config, budget)? {
            let item = ItemId::from_uuid(row.get_uuid(Field::Item)?);
            if !self.in_rollout(item) {
                continue;
            }
            let location = LocationId::from_uuid(row.get_uuid(Field::Location)?);
            pairs.insert((item, location));
            flagged.insert(FlaggedOrder {
                order_id: OrderId::from_uuid(row.get_uuid(Field::OrderId)?),
                item,
                location,
            });
        }

        // Lines created or modified since the last completed run.
        if let Some(since) = since {
            let modified_spec = self
                .open_lines_spec()
                .filter(Filter::GreaterThan(
                    Field::ModifiedAt,
                    Value::DateTime(since),
                ))
                .columns([Field::Item, Field::Location]);
            for row in fetch_all(self.search, &modified_spec, self.config, budget)? {
                let item = ItemId::from_uuid(row.get_uuid(Field::Item)?);
                if !self.in_rollout(item) {
                    continue;
                }
                pairs.insert((item, LocationId::from_uuid(row.get_uuid(Field::Location)?)));
            }
        }

        Ok(TriggerSet {
            pairs: pairs.into_iter().collect(),
            flagged: flagged.into_iter().collect(),
        })
    }

    /// Cheap existence check used by the self-resubmission path: are any
    /// trigger flags still set?
    pub fn has_pending_triggers(
        &self,
        budget: &mut GovernanceBudget,
    ) -> Result<bool, EngineError> {
        if !budget.try_spend(self.config.costs.search) {
            return Err(EngineError::BudgetExhausted);
        }
        let spec = self
            .open_lines_spec()
            .filter(Filter::Equals(Field::NeedsReallocation, Value::Bool(true)))
            .columns([Field::OrderId, Field::Item]);
        let page = self.search.search(&spec, Pagination::new(1, 0))?;
        if let Some(test_item) = self.config.test_item {
            for row in &page.rows {
                if ItemId::from_uuid(row.get_uuid(Field::Item)?) == test_item {
                    return Ok(true);
                }
            }
            // A single-row probe is not exhaustive under rollout filtering;
            // fall back to the full flagged scan.
            let full = self
                .open_lines_spec()
                .filter(Filter::Equals(Field::NeedsReallocation, Value::Bool(true)))
                .columns([Field::Item]);
            let rows = fetch_all(self.search, &full, self.config, budget)?;
            for row in rows {
                if ItemId::from_uuid(row.get_uuid(Field::Item)?) == test_item {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        Ok(!page.rows.is_empty())
    }

    fn open_lines_spec(&self) -> QuerySpec {
        QuerySpec::against(self.config.demand_source.clone())
            .filter(Filter::Equals(Field::LineClosed, Value::Bool(false)))
    }

    fn in_rollout(&self, item: ItemId) -> bool {
        self.config.test_item.is_none_or(|t| t == item)
    }
}
