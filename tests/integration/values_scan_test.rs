// Integration tests for the VALUES list scan operator, driven through the
// ScanOperator interface the way the generic scan loop drives it.

use anyhow::Result;
use std::sync::Arc;

use valuescan::query::ast::{BinaryOperator, Expression, SubPlan, Value};
use valuescan::query::executor::operators::values::ValuesScanOperator;
use valuescan::query::executor::operators::{ScanDirection, ScanOperator, create_values_scan};
use valuescan::query::executor::result::{DataValue, QueryError, RowSlot};

fn int(i: i64) -> Expression {
    Expression::Literal(Value::Integer(i))
}

fn text(s: &str) -> Expression {
    Expression::Literal(Value::String(s.to_string()))
}

fn add(l: i64, r: i64) -> Expression {
    Expression::BinaryOp {
        left: Box::new(int(l)),
        op: BinaryOperator::Plus,
        right: Box::new(int(r)),
    }
}

/// The row table used throughout: [[1+1, 'x'], [2+2, 'y']]
fn two_row_table() -> Vec<Vec<Expression>> {
    vec![
        vec![add(1, 1), text("x")],
        vec![add(2, 2), text("y")],
    ]
}

/// Drain an operator in one direction, copying each materialized row out
/// the way a scan driver consuming the slot would.
fn drain(
    operator: &mut dyn ScanOperator,
    direction: ScanDirection,
) -> Result<Vec<Vec<DataValue>>> {
    let mut rows = Vec::new();
    while let Some(slot) = operator.next(direction)? {
        assert!(slot.is_filled());
        rows.push(slot.values().to_vec());
    }
    Ok(rows)
}

#[test]
fn test_forward_scan_through_trait_object() -> Result<()> {
    let mut operator = create_values_scan(two_row_table())?;
    operator.init()?;

    let rows = drain(operator.as_mut(), ScanDirection::Forward)?;
    assert_eq!(
        rows,
        vec![
            vec![DataValue::Integer(2), DataValue::Text("x".to_string())],
            vec![DataValue::Integer(4), DataValue::Text("y".to_string())],
        ]
    );

    // Pulling past the end keeps yielding the end marker.
    assert!(operator.next(ScanDirection::Forward)?.is_none());
    assert!(operator.next(ScanDirection::Forward)?.is_none());

    operator.close()?;
    Ok(())
}

#[test]
fn test_backward_scan_through_trait_object() -> Result<()> {
    let mut operator = create_values_scan(two_row_table())?;
    operator.init()?;

    let rows = drain(operator.as_mut(), ScanDirection::Backward)?;
    assert_eq!(
        rows,
        vec![
            vec![DataValue::Integer(4), DataValue::Text("y".to_string())],
            vec![DataValue::Integer(2), DataValue::Text("x".to_string())],
        ]
    );
    assert!(operator.next(ScanDirection::Backward)?.is_none());

    operator.close()?;
    Ok(())
}

#[test]
fn test_empty_values_list_is_rejected() -> Result<()> {
    let mut operator = create_values_scan(vec![])?;
    match operator.init() {
        Err(QueryError::Internal(_)) => Ok(()),
        other => panic!("expected an internal precondition error, got {:?}", other.err()),
    }
}

#[test]
fn test_rescan_replays_without_rebuilding_subplan_state() -> Result<()> {
    let rows = vec![
        vec![add(1, 1)],
        vec![Expression::Subquery(Arc::new(SubPlan {
            plan_id: 1,
            rows: vec![int(42)],
        }))],
    ];
    let mut operator = ValuesScanOperator::new(rows);
    operator.init()?;

    let permanent_id = operator
        .compiled_state_id(1)
        .expect("sub-plan row compiled at init");

    let first = drain(&mut operator, ScanDirection::Forward)?;
    assert_eq!(
        first,
        vec![vec![DataValue::Integer(2)], vec![DataValue::Integer(42)]]
    );

    operator.rescan()?;
    let second = drain(&mut operator, ScanDirection::Forward)?;
    assert_eq!(first, second);

    // The permanently compiled state kept its identity across the rescan.
    assert_eq!(operator.compiled_state_id(1), Some(permanent_id));
    assert_eq!(operator.exec_context().subplan_states().len(), 1);

    operator.close()?;
    Ok(())
}

#[test]
fn test_driver_scope_is_disjoint_from_row_scope() -> Result<()> {
    let mut operator = ValuesScanOperator::new(two_row_table());
    operator.init()?;

    // The scan driver parks its own cleanup in its dedicated scope.
    operator
        .driver_scope()
        .register_cleanup(Box::new(|| {}));
    assert_eq!(operator.driver_scope().pending_cleanups(), 1);

    // Materializing rows resets only the per-row scope.
    operator.next(ScanDirection::Forward)?;
    operator.next(ScanDirection::Forward)?;
    assert_eq!(operator.driver_scope().pending_cleanups(), 1);

    // And resetting the driver scope between rows does not disturb the
    // operator's own materialization.
    operator.driver_scope().reset();
    operator.rescan()?;
    let rows = drain(&mut operator, ScanDirection::Forward)?;
    assert_eq!(rows.len(), 2);

    operator.close()?;
    Ok(())
}

#[test]
fn test_driver_style_loop_with_recheck() -> Result<()> {
    // Emulates the pull loop the scan driver runs: pull, recheck, filter on
    // the slot's first column, project the second.
    let rows = vec![
        vec![int(1), text("a")],
        vec![int(2), text("b")],
        vec![int(3), text("c")],
    ];
    let mut operator = create_values_scan(rows)?;
    operator.init()?;

    let mut kept = Vec::new();
    loop {
        let keep = match operator.next(ScanDirection::Forward)? {
            None => break,
            Some(slot) => {
                match slot.value(0) {
                    DataValue::Integer(i) => {
                        if *i % 2 == 1 {
                            Some(slot.value(1).clone())
                        } else {
                            None
                        }
                    }
                    other => panic!("unexpected value {:?}", other),
                }
            }
        };
        if let Some(value) = keep {
            // Values rows always pass revalidation.
            let slot_ok = {
                let slot = RowSlot::new(2);
                operator.recheck(&slot)?
            };
            assert!(slot_ok);
            kept.push(value);
        }
    }
    assert_eq!(
        kept,
        vec![
            DataValue::Text("a".to_string()),
            DataValue::Text("c".to_string())
        ]
    );

    operator.close()?;
    Ok(())
}

#[test]
fn test_subquery_cardinality_error_aborts_the_scan() -> Result<()> {
    let rows = vec![vec![Expression::Subquery(Arc::new(SubPlan {
        plan_id: 1,
        rows: vec![int(1), int(2)],
    }))]];
    let mut operator = create_values_scan(rows)?;
    operator.init()?;

    match operator.next(ScanDirection::Forward) {
        Err(QueryError::ExecutionError(msg)) => {
            assert!(msg.contains("more than one row"));
        }
        other => panic!("expected a cardinality error, got {:?}", other.err()),
    }

    operator.close()?;
    Ok(())
}

#[test]
fn test_single_row_and_direction_turnaround() -> Result<()> {
    let mut operator = create_values_scan(vec![vec![int(10)]])?;
    operator.init()?;

    let slot = operator.next(ScanDirection::Forward)?.expect("one row");
    assert_eq!(slot.value(0), &DataValue::Integer(10));
    assert!(operator.next(ScanDirection::Forward)?.is_none());

    // Exhausted forward; turning around resumes from the last row.
    let slot = operator.next(ScanDirection::Backward)?.expect("turnaround");
    assert_eq!(slot.value(0), &DataValue::Integer(10));
    assert!(operator.next(ScanDirection::Backward)?.is_none());

    operator.close()?;
    Ok(())
}
