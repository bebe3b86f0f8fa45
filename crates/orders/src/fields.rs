//! Abstract field names and the mapping to store-specific identifiers.
//!
//! Queries and partial updates name fields abstractly; a [`FieldMap`] owned
//! by the store adapter translates each abstract field to whatever column or
//! script identifier the deployment actually uses. Nothing outside the
//! adapter ever sees a raw column name.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every attribute the engine reads or writes on the external store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    OrderId,
    LineIndex,
    Item,
    Location,
    Quantity,
    Committed,
    /// On purchase-order lines: ordered minus received.
    RemainingQuantity,
    ShipDate,
    ExpectedReceiptDate,
    Priority,
    LogisticsApproved,
    SplitFromOrder,
    CommitPolicy,
    LineClosed,
    NeedsReallocation,
    RecomputeFillRate,
    ModifiedAt,
}

impl Field {
    /// Canonical column identifier, used when a deployment does not remap
    /// the field.
    pub fn canonical_column(self) -> &'static str {
        match self {
            Field::OrderId => "order_id",
            Field::LineIndex => "line_index",
            Field::Item => "item",
            Field::Location => "location",
            Field::Quantity => "quantity",
            Field::Committed => "committed",
            Field::RemainingQuantity => "remaining_quantity",
            Field::ShipDate => "ship_date",
            Field::ExpectedReceiptDate => "expected_receipt_date",
            Field::Priority => "priority",
            Field::LogisticsApproved => "logistics_approved",
            Field::SplitFromOrder => "split_from_order",
            Field::CommitPolicy => "commit_policy",
            Field::LineClosed => "line_closed",
            Field::NeedsReallocation => "needs_reallocation",
            Field::RecomputeFillRate => "recompute_fill_rate",
            Field::ModifiedAt => "modified_at",
        }
    }
}

impl core::fmt::Display for Field {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.canonical_column())
    }
}

/// A dynamically typed cell, as carried by query rows and filter operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Uuid(Uuid),
    Int(i64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Bool(bool),
    Text(String),
    Null,
}

impl Value {
    /// Ordered comparison between two values of the same shape. Mismatched
    /// shapes and nulls do not compare.
    pub fn compare(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// The one adapter between abstract fields and a deployment's schema.
///
/// The default map exposes every field under its canonical name. A
/// deployment with renamed or missing columns builds its own map; a query
/// naming an unmapped field fails loudly instead of silently reading the
/// wrong column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMap {
    columns: HashMap<Field, String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        const ALL: [Field; 17] = [
            Field::OrderId,
            Field::LineIndex,
            Field::Item,
            Field::Location,
            Field::Quantity,
            Field::Committed,
            Field::RemainingQuantity,
            Field::ShipDate,
            Field::ExpectedReceiptDate,
            Field::Priority,
            Field::LogisticsApproved,
            Field::SplitFromOrder,
            Field::CommitPolicy,
            Field::LineClosed,
            Field::NeedsReallocation,
            Field::RecomputeFillRate,
            Field::ModifiedAt,
        ];
        let columns = ALL
            .into_iter()
            .map(|f| (f, f.canonical_column().to_string()))
            .collect();
        Self { columns }
    }
}

impl FieldMap {
    /// Map with no fields; build it up with [`FieldMap::with_column`].
    pub fn unmapped() -> Self {
        Self {
            columns: HashMap::new(),
        }
    }

    /// Override (or add) the column identifier for one field.
    pub fn with_column(mut self, field: Field, column: impl Into<String>) -> Self {
        self.columns.insert(field, column.into());
        self
    }

    /// Remove a field from the map, making queries against it fail.
    pub fn without(mut self, field: Field) -> Self {
        self.columns.remove(&field);
        self
    }

    pub fn column(&self, field: Field) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    pub fn supports(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_covers_canonical_names() {
        let map = FieldMap::default();
        assert_eq!(map.column(Field::Committed), Some("committed"));
        assert_eq!(map.column(Field::NeedsReallocation), Some("needs_reallocation"));
    }

    #[test]
    fn deployment_can_remap_a_column() {
        let map = FieldMap::default().with_column(Field::Priority, "custcol_priority");
        assert_eq!(map.column(Field::Priority), Some("custcol_priority"));
    }

    #[test]
    fn removed_field_is_unsupported() {
        let map = FieldMap::default().without(Field::Priority);
        assert!(!map.supports(Field::Priority));
        assert!(map.column(Field::Priority).is_none());
    }

    #[test]
    fn values_compare_within_one_shape_only() {
        use std::cmp::Ordering;
        assert_eq!(
            Value::Int(3).compare(&Value::Int(5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int(3).compare(&Value::Bool(true)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }
}
