//! In-memory order store and line search.
//!
//! Backs the engine's two ports for tests and development. Orders and
//! purchase-order lines live behind `RwLock`ed maps; the search side
//! evaluates filter predicates over the abstract field mapping, the same
//! way a real adapter would translate them into its query language.
//!
//! Failure injection (per-order save failures, per-item search failures)
//! exists so the engine's error-isolation paths are testable.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;

use recommit_core::{ItemId, LocationId, OrderId};
use recommit_orders::{
    CommitPolicy, Field, FieldMap, Filter, LineSearch, Order, OrderLine, OrderPatch, OrderStore,
    Page, Pagination, QueryError, QuerySpec, Row, StoreError, Value,
};

use recommit_engine::config::{DEFAULT_DEMAND_SOURCE, DEFAULT_SUPPLY_SOURCE};

/// One open purchase-order line, the supply side of the window calculation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PurchaseOrderLine {
    pub order_id: OrderId,
    pub item: ItemId,
    pub location: LocationId,
    pub quantity: i64,
    pub received: i64,
    pub expected_receipt_date: NaiveDate,
}

impl PurchaseOrderLine {
    pub fn remaining(&self) -> i64 {
        self.quantity - self.received
    }
}

/// In-memory order store for tests/dev.
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
    po_lines: RwLock<Vec<PurchaseOrderLine>>,
    failing_saves: RwLock<HashSet<OrderId>>,
    failing_search_items: RwLock<HashSet<ItemId>>,
    field_map: FieldMap,
    demand_source: String,
    supply_source: String,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::with_field_map(FieldMap::default())
    }

    pub fn with_field_map(field_map: FieldMap) -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            po_lines: RwLock::new(Vec::new()),
            failing_saves: RwLock::new(HashSet::new()),
            failing_search_items: RwLock::new(HashSet::new()),
            field_map,
            demand_source: DEFAULT_DEMAND_SOURCE.to_string(),
            supply_source: DEFAULT_SUPPLY_SOURCE.to_string(),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.write().unwrap().insert(order.id, order);
    }

    pub fn insert_po_line(&self, line: PurchaseOrderLine) {
        self.po_lines.write().unwrap().push(line);
    }

    /// Test introspection: a snapshot of one order.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.orders.read().unwrap().get(&id).cloned()
    }

    /// Test helper: mutate one order in place (an "external" edit).
    pub fn modify_order(&self, id: OrderId, f: impl FnOnce(&mut Order)) {
        if let Some(order) = self.orders.write().unwrap().get_mut(&id) {
            f(order);
        }
    }

    /// Inject (or clear) a save failure for one order.
    pub fn set_save_failure(&self, id: OrderId, failing: bool) {
        let mut set = self.failing_saves.write().unwrap();
        if failing {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    /// Inject (or clear) a search failure for demand queries on one item.
    pub fn set_search_failure(&self, item: ItemId, failing: bool) {
        let mut set = self.failing_search_items.write().unwrap();
        if failing {
            set.insert(item);
        } else {
            set.remove(&item);
        }
    }

    fn require_mapped(&self, spec: &QuerySpec) -> Result<(), QueryError> {
        for field in spec
            .filters
            .iter()
            .map(Filter::field)
            .chain(spec.columns.iter().copied())
        {
            if !self.field_map.supports(field) {
                return Err(QueryError::UnmappedField(field));
            }
        }
        Ok(())
    }

    fn search_sales_lines(&self, spec: &QuerySpec) -> Result<Vec<Row>, QueryError> {
        {
            let failing = self.failing_search_items.read().unwrap();
            for filter in &spec.filters {
                if let Filter::Equals(Field::Item, Value::Uuid(uuid)) = filter {
                    if failing.contains(&ItemId::from_uuid(*uuid)) {
                        return Err(QueryError::Backend("injected search failure".to_string()));
                    }
                }
            }
        }

        let orders = self.orders.read().unwrap();
        let mut matched: Vec<(OrderId, u32, Row)> = Vec::new();
        for order in orders.values() {
            for line in &order.lines {
                if spec
                    .filters
                    .iter()
                    .all(|f| f.matches(&sales_line_value(order, line, f.field())))
                {
                    let row = project(spec, |field| sales_line_value(order, line, field));
                    matched.push((order.id, line.index, row));
                }
            }
        }
        matched.sort_by_key(|(order_id, index, _)| (*order_id, *index));
        Ok(matched.into_iter().map(|(_, _, row)| row).collect())
    }

    fn search_po_lines(&self, spec: &QuerySpec) -> Result<Vec<Row>, QueryError> {
        let po_lines = self.po_lines.read().unwrap();
        let mut matched: Vec<(OrderId, NaiveDate, Row)> = Vec::new();
        for line in po_lines.iter() {
            if spec
                .filters
                .iter()
                .all(|f| f.matches(&po_line_value(line, f.field())))
            {
                let row = project(spec, |field| po_line_value(line, field));
                matched.push((line.order_id, line.expected_receipt_date, row));
            }
        }
        matched.sort_by_key(|(order_id, date, _)| (*order_id, *date));
        Ok(matched.into_iter().map(|(_, _, row)| row).collect())
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

fn project(spec: &QuerySpec, value_of: impl Fn(Field) -> Value) -> Row {
    spec.columns
        .iter()
        .fold(Row::new(), |row, field| row.with(*field, value_of(*field)))
}

fn sales_line_value(order: &Order, line: &OrderLine, field: Field) -> Value {
    match field {
        Field::OrderId => Value::Uuid(order.id.into()),
        Field::LineIndex => Value::Int(line.index as i64),
        Field::Item => Value::Uuid(line.item.into()),
        Field::Location => Value::Uuid(line.location.into()),
        Field::Quantity => Value::Int(line.quantity),
        Field::Committed => Value::Int(line.committed),
        Field::RemainingQuantity => Value::Int(line.quantity - line.committed),
        Field::ShipDate => Value::Date(line.ship_date),
        Field::ExpectedReceiptDate => Value::Null,
        Field::Priority => line
            .priority
            .map(|p| Value::Int(p as i64))
            .unwrap_or(Value::Null),
        Field::LogisticsApproved => Value::Bool(line.logistics_approved),
        Field::SplitFromOrder => line
            .split_from_order
            .map(|o| Value::Uuid(o.into()))
            .unwrap_or(Value::Null),
        Field::CommitPolicy => Value::Text(
            match line.commit_policy {
                CommitPolicy::CommitAvailable => "commit_available",
                CommitPolicy::DoNotCommit => "do_not_commit",
            }
            .to_string(),
        ),
        Field::LineClosed => Value::Bool(line.closed),
        Field::NeedsReallocation => Value::Bool(order.needs_reallocation),
        Field::RecomputeFillRate => Value::Bool(order.recompute_fill_rate),
        Field::ModifiedAt => Value::DateTime(order.modified_at),
    }
}

fn po_line_value(line: &PurchaseOrderLine, field: Field) -> Value {
    match field {
        Field::OrderId => Value::Uuid(line.order_id.into()),
        Field::Item => Value::Uuid(line.item.into()),
        Field::Location => Value::Uuid(line.location.into()),
        Field::Quantity => Value::Int(line.quantity),
        Field::RemainingQuantity => Value::Int(line.remaining()),
        Field::ExpectedReceiptDate => Value::Date(line.expected_receipt_date),
        _ => Value::Null,
    }
}

impl OrderStore for InMemoryOrderStore {
    fn load(&self, id: OrderId) -> Result<Order, StoreError> {
        self.orders
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn save(&self, order: &Order) -> Result<OrderId, StoreError> {
        order
            .validate()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        if self.failing_saves.read().unwrap().contains(&order.id) {
            return Err(StoreError::Backend("injected save failure".to_string()));
        }
        let mut orders = self.orders.write().unwrap();
        if !orders.contains_key(&order.id) {
            return Err(StoreError::NotFound(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(order.id)
    }

    fn partial_update(&self, id: OrderId, patch: &OrderPatch) -> Result<(), StoreError> {
        let mut orders = self.orders.write().unwrap();
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        patch.apply_to(order);
        Ok(())
    }
}

impl LineSearch for InMemoryOrderStore {
    fn search(&self, spec: &QuerySpec, page: Pagination) -> Result<Page, QueryError> {
        self.require_mapped(spec)?;

        let source = spec.source.as_deref().unwrap_or(&self.demand_source);
        let rows = if source == self.demand_source {
            self.search_sales_lines(spec)?
        } else if source == self.supply_source {
            self.search_po_lines(spec)?
        } else {
            return Err(QueryError::UnknownSource(source.to_string()));
        };

        let start = (page.offset as usize).min(rows.len());
        let end = (start + page.limit as usize).min(rows.len());
        Ok(Page {
            has_more: end < rows.len(),
            rows: rows[start..end].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn item(n: u128) -> ItemId {
        ItemId::from_uuid(Uuid::from_u128(n))
    }

    fn location(n: u128) -> LocationId {
        LocationId::from_uuid(Uuid::from_u128(n))
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
    }

    fn order_line(item_tag: u128, quantity: i64, committed: i64, closed: bool) -> OrderLine {
        OrderLine {
            index: 1,
            item: item(item_tag),
            location: location(1),
            quantity,
            committed,
            ship_date: date(15),
            priority: None,
            logistics_approved: false,
            split_from_order: None,
            commit_policy: CommitPolicy::CommitAvailable,
            closed,
        }
    }

    fn order_with(lines: Vec<OrderLine>) -> Order {
        Order {
            id: OrderId::new(),
            lines,
            needs_reallocation: false,
            recompute_fill_rate: false,
            modified_at: Utc::now(),
        }
    }

    fn demand_spec(item_tag: u128) -> QuerySpec {
        QuerySpec::against(DEFAULT_DEMAND_SOURCE)
            .filter(Filter::Equals(Field::Item, Value::Uuid(Uuid::from_u128(item_tag))))
            .filter(Filter::Equals(Field::LineClosed, Value::Bool(false)))
            .columns([Field::OrderId, Field::LineIndex, Field::Quantity])
    }

    #[test]
    fn demand_query_skips_closed_lines_and_other_items() {
        let store = InMemoryOrderStore::new();
        store.insert_order(order_with(vec![order_line(7, 10, 5, false)]));
        store.insert_order(order_with(vec![order_line(7, 4, 0, true)]));
        store.insert_order(order_with(vec![order_line(8, 9, 9, false)]));

        let page = store
            .search(&demand_spec(7), Pagination::default())
            .unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].get_i64(Field::Quantity).unwrap(), 10);
    }

    #[test]
    fn supply_query_filters_on_remaining_quantity() {
        let store = InMemoryOrderStore::new();
        store.insert_po_line(PurchaseOrderLine {
            order_id: OrderId::new(),
            item: item(7),
            location: location(1),
            quantity: 100,
            received: 100,
            expected_receipt_date: date(3),
        });
        store.insert_po_line(PurchaseOrderLine {
            order_id: OrderId::new(),
            item: item(7),
            location: location(1),
            quantity: 100,
            received: 40,
            expected_receipt_date: date(9),
        });

        let spec = QuerySpec::against(DEFAULT_SUPPLY_SOURCE)
            .filter(Filter::GreaterThan(Field::RemainingQuantity, Value::Int(0)))
            .columns([Field::ExpectedReceiptDate]);
        let page = store.search(&spec, Pagination::default()).unwrap();

        assert_eq!(page.rows.len(), 1);
        assert_eq!(
            page.rows[0].get_date(Field::ExpectedReceiptDate).unwrap(),
            date(9)
        );
    }

    #[test]
    fn unknown_source_is_rejected() {
        let store = InMemoryOrderStore::new();
        let spec = QuerySpec::against("no_such_saved_search");
        let err = store.search(&spec, Pagination::default()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownSource(_)));
    }

    #[test]
    fn unmapped_field_is_rejected() {
        let store =
            InMemoryOrderStore::with_field_map(FieldMap::default().without(Field::Priority));
        let spec = QuerySpec::against(DEFAULT_DEMAND_SOURCE).columns([Field::Priority]);
        let err = store.search(&spec, Pagination::default()).unwrap_err();
        assert!(matches!(err, QueryError::UnmappedField(Field::Priority)));
    }

    #[test]
    fn paging_reports_more_rows() {
        let store = InMemoryOrderStore::new();
        for _ in 0..3 {
            store.insert_order(order_with(vec![order_line(7, 10, 0, false)]));
        }

        let page = store.search(&demand_spec(7), Pagination::new(2, 0)).unwrap();
        assert_eq!(page.rows.len(), 2);
        assert!(page.has_more);

        let rest = store.search(&demand_spec(7), Pagination::new(2, 2)).unwrap();
        assert_eq!(rest.rows.len(), 1);
        assert!(!rest.has_more);
    }

    #[test]
    fn injected_search_failure_hits_only_that_item() {
        let store = InMemoryOrderStore::new();
        store.insert_order(order_with(vec![order_line(7, 10, 0, false)]));
        store.insert_order(order_with(vec![order_line(8, 10, 0, false)]));
        store.set_search_failure(item(7), true);

        assert!(matches!(
            store.search(&demand_spec(7), Pagination::default()),
            Err(QueryError::Backend(_))
        ));
        assert!(store.search(&demand_spec(8), Pagination::default()).is_ok());
    }

    #[test]
    fn save_rejects_an_over_committed_record() {
        let store = InMemoryOrderStore::new();
        let mut order = order_with(vec![order_line(7, 10, 0, false)]);
        store.insert_order(order.clone());

        order.lines[0].committed = 11;
        assert!(matches!(
            store.save(&order),
            Err(StoreError::Rejected(_))
        ));
    }

    #[test]
    fn partial_update_on_missing_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let err = store
            .partial_update(OrderId::new(), &OrderPatch::clear_trigger())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
