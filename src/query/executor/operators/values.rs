// VALUES List Scan Operator
//
// This module implements the scan operator over a literal/expression row
// table ("VALUES (...), (...), ..."). Rows are materialized one at a time,
// in either direction, without retaining per-row evaluation state beyond the
// current row; only rows referencing sub-query plans keep their compiled
// state for the operator's whole lifetime.

use log::debug;

use crate::query::ast::{ColumnInfo, Expression, contains_subplan};
use crate::query::executor::context::{EvalScope, ExecContext};
use crate::query::executor::expression_eval::ExprState;
use crate::query::executor::operators::{ScanDirection, ScanOperator};
use crate::query::executor::result::{QueryError, QueryResult, RowSlot};

/// Direction-aware cursor over row indices, with before-first and past-last
/// sentinels.
///
/// A fresh (or reset) cursor is unpositioned: the first advance enters the
/// table from whichever end the requested direction starts at. Once
/// traversal has begun, advancing saturates at the sentinel for the
/// exhausted direction, and advancing the other way resumes from the
/// nearest in-range row.
struct Cursor {
    pos: isize,
    len: isize,
    positioned: bool,
}

impl Cursor {
    fn new(len: usize) -> Self {
        Cursor {
            pos: -1,
            len: len as isize,
            positioned: false,
        }
    }

    /// Move one step in the given direction; returns the resulting row
    /// index if it is in range.
    fn advance(&mut self, direction: ScanDirection) -> Option<usize> {
        match direction {
            ScanDirection::Forward => {
                if !self.positioned {
                    self.pos = 0;
                } else if self.pos < self.len {
                    self.pos += 1;
                }
            }
            ScanDirection::Backward => {
                if !self.positioned {
                    self.pos = self.len - 1;
                } else if self.pos >= 0 {
                    self.pos -= 1;
                }
            }
        }
        self.positioned = true;
        if self.pos >= 0 && self.pos < self.len {
            Some(self.pos as usize)
        } else {
            None
        }
    }

    /// Back to the unpositioned before-first state
    fn reset(&mut self) {
        self.pos = -1;
        self.positioned = false;
    }
}

/// Per-row slot in the expression state cache.
///
/// Permanent entries are set only during init and never cleared before
/// close. A Transient entry is installed during a single next() call and
/// dropped no later than the next materialization's scope reset.
enum RowExprState {
    Absent,
    Permanent(ExprState),
    Transient(ExprState),
}

/// Scan operator producing the rows of a VALUES expression table on demand
pub struct ValuesScanOperator {
    /// The row table: one expression list per row, fixed at construction
    rows: Vec<Vec<Expression>>,
    /// Output schema derived from the first row
    schema: Vec<ColumnInfo>,
    /// Expression state cache, parallel to `rows`
    exprstates: Vec<RowExprState>,
    /// Row index of the currently installed Transient entry, if any
    transient_row: Option<usize>,
    /// Scan position
    cursor: Cursor,
    /// Scope the per-row expression evaluation runs in; reset between rows
    row_scope: EvalScope,
    /// Separate scope reserved for the enclosing scan driver's own filter
    /// and projection evaluation, so resetting one never invalidates the
    /// other's state
    driver_scope: EvalScope,
    /// Registry of permanently compiled sub-plan states
    context: ExecContext,
    /// Output row, overwritten on every materialization
    slot: RowSlot,
    /// Initialization status
    initialized: bool,
}

impl ValuesScanOperator {
    /// Create a new VALUES scan over the given row table
    pub fn new(rows: Vec<Vec<Expression>>) -> Self {
        let len = rows.len();
        ValuesScanOperator {
            rows,
            schema: Vec::new(),
            exprstates: Vec::new(),
            transient_row: None,
            cursor: Cursor::new(len),
            row_scope: EvalScope::new("values-row"),
            driver_scope: EvalScope::new("values-driver"),
            context: ExecContext::new(),
            slot: RowSlot::new(0),
            initialized: false,
        }
    }

    /// Output schema, derived from the first row's expression list
    pub fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    /// Number of rows in the table
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The evaluation scope reserved for the enclosing scan driver
    pub fn driver_scope(&mut self) -> &mut EvalScope {
        &mut self.driver_scope
    }

    /// Registry of sub-plan states compiled at init; what plan diagnostics
    /// walk
    pub fn exec_context(&self) -> &ExecContext {
        &self.context
    }

    /// Identity of the compiled expression state currently cached for a
    /// row, if one exists
    pub fn compiled_state_id(&self, row: usize) -> Option<usize> {
        match self.exprstates.get(row)? {
            RowExprState::Absent => None,
            RowExprState::Permanent(state) | RowExprState::Transient(state) => Some(state.id()),
        }
    }

    /// Evaluate row `idx`'s expressions into the output slot.
    fn materialize_row(&mut self, idx: usize) -> QueryResult<()> {
        // Get rid of the prior row's leftovers first: run the scope's owed
        // cleanup callbacks, then drop any transient expression state that
        // held references into it.
        self.row_scope.reset();
        if let Some(prev) = self.transient_row.take() {
            if matches!(self.exprstates[prev], RowExprState::Transient(_)) {
                self.exprstates[prev] = RowExprState::Absent;
            }
        }

        // Unless the eager pass at init already compiled this row (it does
        // so exactly for rows referencing sub-query plans), build its
        // expression state here and keep it only for this call. Compiling
        // without the context keeps the transient state from linking into
        // anything permanent.
        if matches!(self.exprstates[idx], RowExprState::Absent) {
            let state = ExprState::compile(&self.rows[idx], None)?;
            self.exprstates[idx] = RowExprState::Transient(state);
            self.transient_row = Some(idx);
        }

        let state = match &self.exprstates[idx] {
            RowExprState::Permanent(state) | RowExprState::Transient(state) => state,
            RowExprState::Absent => {
                return Err(QueryError::Internal(
                    "expression state missing after compilation".to_string(),
                ));
            }
        };

        // Upstream guarantees all rows have the declared width; a mismatch
        // here is a construction bug, not a data error.
        if state.width() != self.schema.len() {
            return Err(QueryError::Internal(format!(
                "row {} compiled to {} columns but the scan produces {}",
                idx,
                state.width(),
                self.schema.len()
            )));
        }

        for column in 0..self.schema.len() {
            let (value, is_null) = state.eval_column(column, &mut self.row_scope)?;
            // Force any mutable expanded value to a read-only form; the
            // slot may be read multiple times downstream without a copy.
            self.slot.store(column, value.freeze()?, is_null);
        }
        self.slot.mark_filled();
        Ok(())
    }
}

impl ScanOperator for ValuesScanOperator {
    /// Validate the row table, derive the output schema, and eagerly
    /// compile expression state for every row that references a sub-query
    /// plan
    fn init(&mut self) -> QueryResult<()> {
        if self.initialized {
            return Ok(());
        }

        if self.rows.is_empty() {
            return Err(QueryError::Internal(
                "VALUES list is empty; no row to derive the output schema from".to_string(),
            ));
        }
        let width = self.rows[0].len();
        for (idx, row) in self.rows.iter().enumerate() {
            if row.len() != width {
                return Err(QueryError::Internal(format!(
                    "VALUES row {} has {} expressions, expected {}",
                    idx,
                    row.len(),
                    width
                )));
            }
        }

        self.schema = self.rows[0]
            .iter()
            .enumerate()
            .map(|(idx, expr)| ColumnInfo {
                name: format!("column{}", idx + 1),
                data_type: expr.static_type(),
            })
            .collect();
        self.slot = RowSlot::new(width);
        self.cursor = Cursor::new(self.rows.len());

        // Sub-plans must link into the plan tree at init to be visible to
        // diagnostics and to survive repeated scope teardowns, so their
        // rows are compiled now; every other row compiles lazily per visit.
        let mut exprstates = Vec::with_capacity(self.rows.len());
        let mut permanent = 0;
        for row in &self.rows {
            if row.iter().any(contains_subplan) {
                let state = ExprState::compile(row, Some(&mut self.context))?;
                exprstates.push(RowExprState::Permanent(state));
                permanent += 1;
            } else {
                exprstates.push(RowExprState::Absent);
            }
        }
        self.exprstates = exprstates;
        self.transient_row = None;

        debug!(
            "values scan initialized: {} rows, {} columns, {} row(s) with sub-plans",
            self.rows.len(),
            width,
            permanent
        );
        self.initialized = true;
        Ok(())
    }

    /// Produce the next row in the given direction, or `None` once the scan
    /// is exhausted that way
    fn next(&mut self, direction: ScanDirection) -> QueryResult<Option<&RowSlot>> {
        if !self.initialized {
            return Err(QueryError::ExecutionError(
                "operator not initialized".to_string(),
            ));
        }

        let pos = self.cursor.advance(direction);

        // Always clear the slot before materializing into it; if the scan
        // is exhausted the cleared slot is the end-of-data marker.
        self.slot.clear();

        match pos {
            Some(idx) => {
                self.materialize_row(idx)?;
                Ok(Some(&self.slot))
            }
            None => Ok(None),
        }
    }

    /// A VALUES row has no underlying mutable storage; there is nothing to
    /// re-verify
    fn recheck(&mut self, _slot: &RowSlot) -> QueryResult<bool> {
        Ok(true)
    }

    /// Reset the scan position only; the expression state cache persists so
    /// permanently compiled sub-plan rows are not rebuilt
    fn rescan(&mut self) -> QueryResult<()> {
        if !self.initialized {
            return Err(QueryError::ExecutionError(
                "operator not initialized".to_string(),
            ));
        }
        debug!("values scan rescan: position reset");
        self.slot.clear();
        self.cursor.reset();
        Ok(())
    }

    /// Release both evaluation scopes, the expression state cache, and the
    /// registered sub-plan states. Safe to call at any time after init,
    /// including repeatedly.
    fn close(&mut self) -> QueryResult<()> {
        debug!("values scan closed");
        self.initialized = false;
        self.row_scope.reset();
        self.driver_scope.reset();
        self.slot.clear();
        self.exprstates.clear();
        self.transient_row = None;
        self.context.release();
        Ok(())
    }
}
