//! Order model and the two ports this subsystem talks through.
//!
//! The engine never owns order persistence; it loads and saves whole order
//! records and runs parameterized searches through the traits defined here.
//! The external store's schema is isolated behind [`FieldMap`], one adapter
//! from abstract field names to store-specific column identifiers.

pub mod fields;
pub mod model;
pub mod ports;
pub mod query;

pub use fields::{Field, FieldMap, Value};
pub use model::{CommitPolicy, Order, OrderLine, OrderPatch};
pub use ports::{LineSearch, OrderStore, StoreError};
pub use query::{Filter, Page, Pagination, QueryError, QuerySpec, Row};
