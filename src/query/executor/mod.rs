// Query Executor Module
//
// This module is responsible for producing rows from scan operators in the
// iterator-based execution model.

// Re-export public components
pub mod context;
pub mod expression_eval;
pub mod operators;
pub mod result;

// Export key types
pub use self::operators::{ScanDirection, ScanOperator};
pub use self::result::{DataValue, QueryError, QueryResult, RowSlot};
