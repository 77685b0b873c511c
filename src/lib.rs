// VALUES List Scan Engine

pub mod query;

// Re-export key items for convenient access
pub use query::ast::{ColumnInfo, Expression, SubPlan, Value};
pub use query::executor::operators::values::ValuesScanOperator;
pub use query::executor::operators::{ScanDirection, ScanOperator, create_values_scan};
pub use query::executor::result::{DataValue, QueryError, QueryResult, RowSlot};
