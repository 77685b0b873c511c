// Expression Evaluation Utility
//
// This module compiles a VALUES row's expression list into an evaluatable
// ExprState and walks expression trees against an evaluation scope. Sub-query
// expressions are dispatched through sub-plan states compiled at init time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::query::ast::{BinaryOperator, Expression, SubPlan, UnaryOperator, Value};
use crate::query::executor::context::{EvalScope, ExecContext};
use crate::query::executor::result::{DataValue, ExpandedValue, QueryError, QueryResult};

// Unique ids across all compiled states, for diagnostics and identity checks
static NEXT_STATE_ID: AtomicUsize = AtomicUsize::new(0);

/// The compiled, evaluatable form of one row's expression list.
///
/// Compiling with an `ExecContext` links any sub-plan states into it
/// (the permanent path, taken at operator init). Compiling without one is
/// the transient path and fails on sub-query expressions; the init pass
/// routes every sub-plan-bearing row through the permanent path first.
pub struct ExprState {
    id: usize,
    exprs: Vec<Expression>,
    subplans: HashMap<usize, Arc<SubPlanState>>,
}

impl ExprState {
    pub fn compile(
        exprs: &[Expression],
        mut context: Option<&mut ExecContext>,
    ) -> QueryResult<ExprState> {
        let mut subplans = HashMap::new();
        for expr in exprs {
            collect_subplans(expr, &mut context, &mut subplans)?;
        }
        let id = NEXT_STATE_ID.fetch_add(1, Ordering::SeqCst);
        debug!(
            "compiled expression state {} ({} columns, {} sub-plans)",
            id,
            exprs.len(),
            subplans.len()
        );
        Ok(ExprState {
            id,
            exprs: exprs.to_vec(),
            subplans,
        })
    }

    /// Identity of this compiled state; stable for its whole lifetime
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of output columns this state evaluates to
    pub fn width(&self) -> usize {
        self.exprs.len()
    }

    /// Evaluate one column's expression, producing a value and a null flag
    pub fn eval_column(
        &self,
        column: usize,
        scope: &mut EvalScope,
    ) -> QueryResult<(DataValue, bool)> {
        evaluate_expression(&self.exprs[column], scope, &self.subplans)
    }
}

/// The compiled state of a scalar sub-query plan.
///
/// Built once at operator init and linked into the execution context so it
/// stays alive, and visible to diagnostics, across rescans.
pub struct SubPlanState {
    id: usize,
    plan: Arc<SubPlan>,
    subplans: HashMap<usize, Arc<SubPlanState>>,
}

impl SubPlanState {
    /// Compile a sub-plan and register it (and any nested sub-plans) with
    /// the execution context.
    pub fn compile(plan: &Arc<SubPlan>, context: &mut ExecContext) -> QueryResult<Arc<SubPlanState>> {
        let mut nested = HashMap::new();
        let mut ctx = Some(&mut *context);
        for row in &plan.rows {
            collect_subplans(row, &mut ctx, &mut nested)?;
        }
        let state = Arc::new(SubPlanState {
            id: NEXT_STATE_ID.fetch_add(1, Ordering::SeqCst),
            plan: Arc::clone(plan),
            subplans: nested,
        });
        context.register_subplan(Arc::clone(&state));
        Ok(state)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn plan_id(&self) -> usize {
        self.plan.plan_id
    }

    /// Run the scalar sub-query: NULL for zero candidate rows, the single
    /// row's value for one, and an error for more than one.
    pub fn execute(&self, scope: &mut EvalScope) -> QueryResult<(DataValue, bool)> {
        match self.plan.rows.len() {
            0 => Ok((DataValue::Null, true)),
            1 => evaluate_expression(&self.plan.rows[0], scope, &self.subplans),
            _ => Err(QueryError::ExecutionError(
                "more than one row returned by a subquery used as an expression".to_string(),
            )),
        }
    }
}

// Walk an expression tree and compile sub-plan states for every sub-query
// it references, deduplicated by plan id.
fn collect_subplans(
    expr: &Expression,
    context: &mut Option<&mut ExecContext>,
    subplans: &mut HashMap<usize, Arc<SubPlanState>>,
) -> QueryResult<()> {
    match expr {
        Expression::Literal(_) => Ok(()),
        Expression::BinaryOp { left, right, .. } => {
            collect_subplans(left, context, subplans)?;
            collect_subplans(right, context, subplans)
        }
        Expression::UnaryOp { expr, .. } => collect_subplans(expr, context, subplans),
        Expression::IsNull { expr, .. } => collect_subplans(expr, context, subplans),
        Expression::Array(elems) => {
            for elem in elems {
                collect_subplans(elem, context, subplans)?;
            }
            Ok(())
        }
        Expression::Subquery(plan) => {
            let ctx = context.as_deref_mut().ok_or_else(|| {
                QueryError::Internal(
                    "sub-query expression reached transient compilation".to_string(),
                )
            })?;
            if !subplans.contains_key(&plan.plan_id) {
                let state = SubPlanState::compile(plan, ctx)?;
                subplans.insert(plan.plan_id, state);
            }
            Ok(())
        }
    }
}

/// Evaluate an expression against an evaluation scope, producing a value and
/// a null flag. Failures are surfaced verbatim; nothing here retries or
/// suppresses.
pub fn evaluate_expression(
    expr: &Expression,
    scope: &mut EvalScope,
    subplans: &HashMap<usize, Arc<SubPlanState>>,
) -> QueryResult<(DataValue, bool)> {
    match expr {
        Expression::Literal(val) => Ok(match val {
            Value::Null => (DataValue::Null, true),
            Value::Integer(i) => (DataValue::Integer(*i), false),
            Value::Float(f) => (DataValue::Float(*f), false),
            Value::String(s) => (DataValue::Text(s.clone()), false),
            Value::Boolean(b) => (DataValue::Boolean(*b), false),
            Value::Blob(b) => (DataValue::Blob(b.clone()), false),
        }),
        Expression::BinaryOp { left, op, right } => {
            let (left_val, left_null) = evaluate_expression(left, scope, subplans)?;
            let (right_val, right_null) = evaluate_expression(right, scope, subplans)?;

            // Basic NULL propagation: op(NULL, _) and op(_, NULL) are NULL
            if left_null || right_null {
                return Ok((DataValue::Null, true));
            }

            let result = match op {
                BinaryOperator::Equals => DataValue::Boolean(left_val == right_val),
                BinaryOperator::NotEquals => DataValue::Boolean(left_val != right_val),
                BinaryOperator::LessThan => {
                    match left_val.partial_cmp(&right_val) {
                        Some(std::cmp::Ordering::Less) => DataValue::Boolean(true),
                        Some(_) => DataValue::Boolean(false),
                        None => {
                            return Err(QueryError::TypeError(format!(
                                "cannot compare {:?} < {:?}",
                                left_val, right_val
                            )));
                        }
                    }
                }
                BinaryOperator::GreaterThan => {
                    match left_val.partial_cmp(&right_val) {
                        Some(std::cmp::Ordering::Greater) => DataValue::Boolean(true),
                        Some(_) => DataValue::Boolean(false),
                        None => {
                            return Err(QueryError::TypeError(format!(
                                "cannot compare {:?} > {:?}",
                                left_val, right_val
                            )));
                        }
                    }
                }
                BinaryOperator::LessEquals => {
                    match left_val.partial_cmp(&right_val) {
                        Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal) => {
                            DataValue::Boolean(true)
                        }
                        Some(_) => DataValue::Boolean(false),
                        None => {
                            return Err(QueryError::TypeError(format!(
                                "cannot compare {:?} <= {:?}",
                                left_val, right_val
                            )));
                        }
                    }
                }
                BinaryOperator::GreaterEquals => {
                    match left_val.partial_cmp(&right_val) {
                        Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal) => {
                            DataValue::Boolean(true)
                        }
                        Some(_) => DataValue::Boolean(false),
                        None => {
                            return Err(QueryError::TypeError(format!(
                                "cannot compare {:?} >= {:?}",
                                left_val, right_val
                            )));
                        }
                    }
                }
                BinaryOperator::Plus => match (left_val, right_val) {
                    (DataValue::Integer(l), DataValue::Integer(r)) => DataValue::Integer(
                        l.checked_add(r).ok_or(QueryError::NumericOverflow)?,
                    ),
                    (DataValue::Float(l), DataValue::Float(r)) => DataValue::Float(l + r),
                    (DataValue::Integer(l), DataValue::Float(r)) => DataValue::Float(l as f64 + r),
                    (DataValue::Float(l), DataValue::Integer(r)) => DataValue::Float(l + r as f64),
                    _ => {
                        return Err(QueryError::TypeError(
                            "unsupported types for + operator".to_string(),
                        ));
                    }
                },
                BinaryOperator::Minus => match (left_val, right_val) {
                    (DataValue::Integer(l), DataValue::Integer(r)) => DataValue::Integer(
                        l.checked_sub(r).ok_or(QueryError::NumericOverflow)?,
                    ),
                    (DataValue::Float(l), DataValue::Float(r)) => DataValue::Float(l - r),
                    (DataValue::Integer(l), DataValue::Float(r)) => DataValue::Float(l as f64 - r),
                    (DataValue::Float(l), DataValue::Integer(r)) => DataValue::Float(l - r as f64),
                    _ => {
                        return Err(QueryError::TypeError(
                            "unsupported types for - operator".to_string(),
                        ));
                    }
                },
                BinaryOperator::Multiply => match (left_val, right_val) {
                    (DataValue::Integer(l), DataValue::Integer(r)) => DataValue::Integer(
                        l.checked_mul(r).ok_or(QueryError::NumericOverflow)?,
                    ),
                    (DataValue::Float(l), DataValue::Float(r)) => DataValue::Float(l * r),
                    (DataValue::Integer(l), DataValue::Float(r)) => DataValue::Float(l as f64 * r),
                    (DataValue::Float(l), DataValue::Integer(r)) => DataValue::Float(l * r as f64),
                    _ => {
                        return Err(QueryError::TypeError(
                            "unsupported types for * operator".to_string(),
                        ));
                    }
                },
                BinaryOperator::Divide => match (left_val, right_val) {
                    (DataValue::Integer(l), DataValue::Integer(r)) => {
                        if r == 0 {
                            return Err(QueryError::DivisionByZero);
                        }
                        DataValue::Integer(l / r) // truncates
                    }
                    (DataValue::Float(l), DataValue::Float(r)) => {
                        if r == 0.0 {
                            return Err(QueryError::DivisionByZero);
                        }
                        DataValue::Float(l / r)
                    }
                    (DataValue::Integer(l), DataValue::Float(r)) => {
                        if r == 0.0 {
                            return Err(QueryError::DivisionByZero);
                        }
                        DataValue::Float(l as f64 / r)
                    }
                    (DataValue::Float(l), DataValue::Integer(r)) => {
                        if r == 0 {
                            return Err(QueryError::DivisionByZero);
                        }
                        DataValue::Float(l / r as f64)
                    }
                    _ => {
                        return Err(QueryError::TypeError(
                            "unsupported types for / operator".to_string(),
                        ));
                    }
                },
                BinaryOperator::Modulo => match (left_val, right_val) {
                    (DataValue::Integer(l), DataValue::Integer(r)) => {
                        if r == 0 {
                            return Err(QueryError::DivisionByZero);
                        }
                        DataValue::Integer(l % r)
                    }
                    _ => {
                        return Err(QueryError::TypeError(
                            "modulo operator only supports integers".to_string(),
                        ));
                    }
                },
                BinaryOperator::And => match (left_val.as_bool(), right_val.as_bool()) {
                    (Some(l), Some(r)) => DataValue::Boolean(l && r),
                    _ => {
                        return Err(QueryError::TypeError(
                            "AND requires boolean operands".to_string(),
                        ));
                    }
                },
                BinaryOperator::Or => match (left_val.as_bool(), right_val.as_bool()) {
                    (Some(l), Some(r)) => DataValue::Boolean(l || r),
                    _ => {
                        return Err(QueryError::TypeError(
                            "OR requires boolean operands".to_string(),
                        ));
                    }
                },
            };
            Ok((result, false))
        }
        Expression::UnaryOp { op, expr } => {
            let (val, is_null) = evaluate_expression(expr, scope, subplans)?;
            if is_null {
                // -NULL and NOT NULL are both NULL
                return Ok((DataValue::Null, true));
            }
            match op {
                UnaryOperator::Minus => match val {
                    DataValue::Integer(i) => Ok((
                        DataValue::Integer(i.checked_neg().ok_or(QueryError::NumericOverflow)?),
                        false,
                    )),
                    DataValue::Float(f) => Ok((DataValue::Float(-f), false)),
                    other => Err(QueryError::TypeError(format!(
                        "unary minus not supported for {:?}",
                        other
                    ))),
                },
                UnaryOperator::Not => match val.as_bool() {
                    Some(b) => Ok((DataValue::Boolean(!b), false)),
                    None => Err(QueryError::TypeError(
                        "unary NOT requires a boolean operand".to_string(),
                    )),
                },
            }
        }
        Expression::IsNull { expr, not } => {
            let (_, is_null) = evaluate_expression(expr, scope, subplans)?;
            let result = if *not { !is_null } else { is_null };
            Ok((DataValue::Boolean(result), false))
        }
        Expression::Array(elems) => {
            let mut cells = Vec::with_capacity(elems.len());
            for elem in elems {
                let (val, is_null) = evaluate_expression(elem, scope, subplans)?;
                cells.push(if is_null { DataValue::Null } else { val.freeze()? });
            }
            // The expanded representation aliases scope-local storage; the
            // scope owes its release before the next row begins.
            let expanded = ExpandedValue::new(cells);
            let handle = expanded.clone();
            scope.register_cleanup(Box::new(move || handle.release()));
            Ok((DataValue::Expanded(expanded), false))
        }
        Expression::Subquery(plan) => {
            let state = subplans.get(&plan.plan_id).ok_or_else(|| {
                QueryError::Internal(format!(
                    "no compiled state for sub-plan {}",
                    plan.plan_id
                ))
            })?;
            state.execute(scope)
        }
    }
}
