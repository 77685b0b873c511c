// Query Result Implementation
//
// This module defines the value representations and the output row slot used
// by the scan operators, along with the executor's error types.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Possible data values produced by row materialization
#[derive(Debug, Clone)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Blob(Vec<u8>),
    /// Frozen array: immutable and self-contained, safe for repeated reads
    Array(Vec<DataValue>),
    /// Expanded array: mutable, reference-shared, bound to an evaluation
    /// scope. Must be frozen before being stored in a durable output row.
    Expanded(ExpandedValue),
}

/// A mutable, reference-counted value representation whose backing storage
/// belongs to an evaluation scope. The scope's reset releases it; any reader
/// still holding an unfrozen handle afterwards gets an internal error.
#[derive(Debug, Clone)]
pub struct ExpandedValue {
    cells: Arc<RwLock<Option<Vec<DataValue>>>>,
}

impl ExpandedValue {
    pub fn new(cells: Vec<DataValue>) -> Self {
        ExpandedValue {
            cells: Arc::new(RwLock::new(Some(cells))),
        }
    }

    /// Append a cell. Valid only while the owning scope is live.
    pub fn push(&self, value: DataValue) -> QueryResult<()> {
        match self.cells.write().as_mut() {
            Some(cells) => {
                cells.push(value);
                Ok(())
            }
            None => Err(QueryError::Internal(
                "write to expanded value after its scope was released".to_string(),
            )),
        }
    }

    /// Copy the current cells out into an owned vector.
    pub fn snapshot(&self) -> QueryResult<Vec<DataValue>> {
        self.cells.read().clone().ok_or_else(|| {
            QueryError::Internal(
                "read of expanded value after its scope was released".to_string(),
            )
        })
    }

    /// Invalidate the backing storage. Run by the owning scope's cleanup.
    pub fn release(&self) {
        *self.cells.write() = None;
    }

    pub fn is_released(&self) -> bool {
        self.cells.read().is_none()
    }
}

impl DataValue {
    /// Convert a possibly expanded (mutable, shared) value into an
    /// immutable, self-contained representation.
    ///
    /// The same output row may be read multiple times by downstream
    /// consumers without an intervening copy, so a still-mutable shared
    /// representation must never reach the output slot.
    pub fn freeze(self) -> QueryResult<DataValue> {
        match self {
            DataValue::Expanded(expanded) => Ok(DataValue::Array(expanded.snapshot()?)),
            other => Ok(other),
        }
    }

    pub fn is_expanded(&self) -> bool {
        matches!(self, DataValue::Expanded(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => true,
            (DataValue::Integer(a), DataValue::Integer(b)) => a == b,
            (DataValue::Float(a), DataValue::Float(b)) => a == b,
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64) == *b,
            (DataValue::Float(a), DataValue::Integer(b)) => *a == (*b as f64),
            (DataValue::Text(a), DataValue::Text(b)) => a == b,
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a == b,
            (DataValue::Blob(a), DataValue::Blob(b)) => a == b,
            (DataValue::Array(a), DataValue::Array(b)) => a == b,
            // Expanded values compare by their current contents so callers
            // can assert against frozen counterparts; released values
            // compare unequal to everything.
            (DataValue::Expanded(a), b) | (b, DataValue::Expanded(a)) => {
                match a.snapshot() {
                    Ok(cells) => &DataValue::Array(cells) == b,
                    Err(_) => false,
                }
            }
            _ => false,
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Some(std::cmp::Ordering::Equal),
            (DataValue::Null, _) => Some(std::cmp::Ordering::Less),
            (_, DataValue::Null) => Some(std::cmp::Ordering::Greater),
            (DataValue::Integer(a), DataValue::Integer(b)) => a.partial_cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64).partial_cmp(b),
            (DataValue::Float(a), DataValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (DataValue::Text(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.partial_cmp(b),
            (DataValue::Blob(a), DataValue::Blob(b)) => Some(a.cmp(b)),
            // Arrays and expanded values only support equality
            _ => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "\"{}\"", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::Blob(b) => write!(f, "X'{}'", hex::encode(b)),
            DataValue::Array(cells) => {
                write!(f, "[")?;
                for (i, cell) in cells.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", cell)?;
                }
                write!(f, "]")
            }
            DataValue::Expanded(e) => match e.snapshot() {
                Ok(cells) => write!(f, "{}", DataValue::Array(cells)),
                Err(_) => write!(f, "<released expanded value>"),
            },
        }
    }
}

/// The operator's output row: one value and one null flag per column.
///
/// The slot is owned by the operator, overwritten on every successful
/// materialization, and valid only until the next call. A cleared slot is
/// the canonical end-of-data marker.
#[derive(Debug)]
pub struct RowSlot {
    values: Vec<DataValue>,
    nulls: Vec<bool>,
    filled: bool,
}

impl RowSlot {
    /// Create an empty slot sized to the output column count
    pub fn new(width: usize) -> Self {
        RowSlot {
            values: vec![DataValue::Null; width],
            nulls: vec![true; width],
            filled: false,
        }
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }

    /// Clear the slot; it reads as end-of-data until the next store
    pub fn clear(&mut self) {
        for value in self.values.iter_mut() {
            *value = DataValue::Null;
        }
        for null in self.nulls.iter_mut() {
            *null = true;
        }
        self.filled = false;
    }

    /// Store one column's materialized value and null flag
    pub fn store(&mut self, column: usize, value: DataValue, is_null: bool) {
        self.values[column] = value;
        self.nulls[column] = is_null;
    }

    /// Mark the slot as holding a complete materialized row
    pub fn mark_filled(&mut self) {
        self.filled = true;
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn value(&self, column: usize) -> &DataValue {
        &self.values[column]
    }

    pub fn is_null(&self, column: usize) -> bool {
        self.nulls[column]
    }

    pub fn values(&self) -> &[DataValue] {
        &self.values
    }

    pub fn nulls(&self) -> &[bool] {
        &self.nulls
    }
}

/// Represents query execution error
#[derive(Error, Debug)]
pub enum QueryError {
    /// Internal-consistency failure; an upstream construction bug, never
    /// a data or user error
    #[error("internal error: {0}")]
    Internal(String),
    /// Error during query execution
    #[error("execution error: {0}")]
    ExecutionError(String),
    /// Error in data type handling
    #[error("type error: {0}")]
    TypeError(String),
    /// Invalid operation
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// Numeric overflow
    #[error("numeric overflow")]
    NumericOverflow,
    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_clear_and_store() {
        let mut slot = RowSlot::new(2);
        assert!(!slot.is_filled());
        assert!(slot.is_null(0));

        slot.store(0, DataValue::Integer(5), false);
        slot.store(1, DataValue::Null, true);
        slot.mark_filled();

        assert!(slot.is_filled());
        assert_eq!(slot.value(0), &DataValue::Integer(5));
        assert!(!slot.is_null(0));
        assert!(slot.is_null(1));

        slot.clear();
        assert!(!slot.is_filled());
        assert_eq!(slot.value(0), &DataValue::Null);
        assert!(slot.is_null(0));
    }

    #[test]
    fn test_expanded_value_freeze_and_release() {
        let expanded = ExpandedValue::new(vec![DataValue::Integer(1)]);
        expanded.push(DataValue::Integer(2)).unwrap();

        let frozen = DataValue::Expanded(expanded.clone()).freeze().unwrap();
        assert_eq!(
            frozen,
            DataValue::Array(vec![DataValue::Integer(1), DataValue::Integer(2)])
        );

        expanded.release();
        assert!(expanded.is_released());
        // The frozen copy is self-contained and survives the release.
        assert_eq!(
            frozen,
            DataValue::Array(vec![DataValue::Integer(1), DataValue::Integer(2)])
        );
        // The live handle does not.
        assert!(expanded.snapshot().is_err());
        assert!(DataValue::Expanded(expanded).freeze().is_err());
    }

    #[test]
    fn test_numeric_cross_type_equality() {
        assert_eq!(DataValue::Integer(3), DataValue::Float(3.0));
        assert_ne!(DataValue::Integer(3), DataValue::Float(3.5));
    }
}
