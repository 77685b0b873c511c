// Query Operators Module
//
// This module defines the scan-operator interface the generic pull-driven
// scan loop dispatches through in the iterator-based execution model.

pub mod values;

use crate::query::ast::Expression;
use crate::query::executor::result::{QueryResult, RowSlot};

/// Direction of a scan, chosen per pull by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// The ScanOperator trait defines the interface for row-producing scan
/// operators. The scan driver selects an implementation once at plan
/// construction time and then pulls rows through this interface.
///
/// An operator instance is owned exclusively by one execution path; no
/// internal locking is provided or required.
pub trait ScanOperator {
    /// Initialize the operator before execution
    fn init(&mut self) -> QueryResult<()>;

    /// Produce the next row in the given direction. `None` means the scan
    /// is exhausted in that direction; the returned slot reference is valid
    /// only until the next call.
    fn next(&mut self, direction: ScanDirection) -> QueryResult<Option<&RowSlot>>;

    /// Revalidate a previously returned row under a snapshot re-check
    fn recheck(&mut self, slot: &RowSlot) -> QueryResult<bool>;

    /// Reset the scan position; compiled state is retained
    fn rescan(&mut self) -> QueryResult<()>;

    /// Close the operator and release any resources
    fn close(&mut self) -> QueryResult<()>;
}

/// Create a VALUES list scan operator
pub fn create_values_scan(rows: Vec<Vec<Expression>>) -> QueryResult<Box<dyn ScanOperator>> {
    Ok(Box::new(values::ValuesScanOperator::new(rows)))
}
