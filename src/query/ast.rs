// Row Expression AST
//
// This module defines the expression nodes a VALUES row table is built from.
// These arrive pre-parsed from the planner; no SQL parsing happens here.

use std::sync::Arc;

/// Literal values appearing in VALUES rows
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Blob(Vec<u8>),
}

/// Binary operators supported in row expressions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    // Comparison
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessEquals,
    GreaterEquals,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

/// Unary operators supported in row expressions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Minus,
    Not,
}

/// Expression in a VALUES row
#[derive(Debug, Clone)]
pub enum Expression {
    /// Literal value
    Literal(Value),
    /// Binary operation (e.g., 1 + 2, x = y)
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    /// Unary operation (e.g., -x, NOT b)
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    /// IS NULL / IS NOT NULL test
    IsNull {
        expr: Box<Expression>,
        not: bool,
    },
    /// Array constructor; evaluates to an expanded (mutable, scope-bound)
    /// value that must be frozen before it is stored in an output row
    Array(Vec<Expression>),
    /// Scalar sub-query, planned upstream. Rows containing one of these
    /// get their expression state compiled eagerly at operator init.
    Subquery(Arc<SubPlan>),
}

/// A planned scalar sub-query.
///
/// The sub-query has already been planned down to a list of candidate result
/// expressions, one per row it may yield. Executing it returns NULL for zero
/// rows, the single row's value for one, and errors for more than one.
#[derive(Debug)]
pub struct SubPlan {
    /// Plan-tree identifier, unique within the enclosing query
    pub plan_id: usize,
    /// One result expression per candidate row
    pub rows: Vec<Expression>,
}

/// Possible data types for the operator's output columns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Blob,
    Array,
}

/// One column of the operator's derived output schema
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column name; VALUES columns are named column1..columnN
    pub name: String,
    /// Statically derived type, if one could be determined
    pub data_type: Option<DataType>,
}

impl Expression {
    /// Best-effort static result type, used to derive the output schema
    /// from the first row of the VALUES list.
    pub fn static_type(&self) -> Option<DataType> {
        match self {
            Expression::Literal(v) => match v {
                Value::Null => None,
                Value::Integer(_) => Some(DataType::Integer),
                Value::Float(_) => Some(DataType::Float),
                Value::String(_) => Some(DataType::Text),
                Value::Boolean(_) => Some(DataType::Boolean),
                Value::Blob(_) => Some(DataType::Blob),
            },
            Expression::BinaryOp { left, op, right } => match op {
                BinaryOperator::Equals
                | BinaryOperator::NotEquals
                | BinaryOperator::LessThan
                | BinaryOperator::GreaterThan
                | BinaryOperator::LessEquals
                | BinaryOperator::GreaterEquals
                | BinaryOperator::And
                | BinaryOperator::Or => Some(DataType::Boolean),
                _ => match (left.static_type(), right.static_type()) {
                    (Some(DataType::Float), _) | (_, Some(DataType::Float)) => {
                        Some(DataType::Float)
                    }
                    (l, r) => l.or(r),
                },
            },
            Expression::UnaryOp { op, expr } => match op {
                UnaryOperator::Minus => expr.static_type(),
                UnaryOperator::Not => Some(DataType::Boolean),
            },
            Expression::IsNull { .. } => Some(DataType::Boolean),
            Expression::Array(_) => Some(DataType::Array),
            Expression::Subquery(plan) => {
                plan.rows.first().and_then(|expr| expr.static_type())
            }
        }
    }
}

/// Check whether an expression tree references a nested sub-query plan.
///
/// Used once per row at operator init to decide between eager (permanent)
/// and lazy (transient) expression state compilation.
pub fn contains_subplan(expr: &Expression) -> bool {
    match expr {
        Expression::Literal(_) => false,
        Expression::BinaryOp { left, right, .. } => {
            contains_subplan(left) || contains_subplan(right)
        }
        Expression::UnaryOp { expr, .. } => contains_subplan(expr),
        Expression::IsNull { expr, .. } => contains_subplan(expr),
        Expression::Array(elems) => elems.iter().any(contains_subplan),
        Expression::Subquery(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Expression {
        Expression::Literal(Value::Integer(i))
    }

    #[test]
    fn test_contains_subplan() {
        let plain = Expression::BinaryOp {
            left: Box::new(int(1)),
            op: BinaryOperator::Plus,
            right: Box::new(int(2)),
        };
        assert!(!contains_subplan(&plain));

        let sub = Expression::Subquery(Arc::new(SubPlan {
            plan_id: 7,
            rows: vec![int(42)],
        }));
        assert!(contains_subplan(&sub));

        let nested = Expression::Array(vec![int(1), sub]);
        assert!(contains_subplan(&nested));
    }

    #[test]
    fn test_static_types() {
        assert_eq!(int(1).static_type(), Some(DataType::Integer));
        assert_eq!(
            Expression::Literal(Value::Null).static_type(),
            None
        );

        let sum = Expression::BinaryOp {
            left: Box::new(int(1)),
            op: BinaryOperator::Plus,
            right: Box::new(Expression::Literal(Value::Float(2.0))),
        };
        assert_eq!(sum.static_type(), Some(DataType::Float));

        let cmp = Expression::BinaryOp {
            left: Box::new(int(1)),
            op: BinaryOperator::LessThan,
            right: Box::new(int(2)),
        };
        assert_eq!(cmp.static_type(), Some(DataType::Boolean));
    }
}
