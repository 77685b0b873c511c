// Evaluation Scopes and Execution Context
//
// This module provides the per-row evaluation scope (resettable, with owed
// cleanup callbacks) and the execution context that keeps permanently
// compiled sub-plan states alive for the operator's lifetime.

use std::sync::Arc;

use log::trace;

use crate::query::executor::expression_eval::SubPlanState;

/// A short-lived memory/resource region within which expression evaluation
/// occurs.
///
/// Evaluation may register cleanup callbacks against the scope (for example
/// to release an expanded value's backing storage). Resetting the scope runs
/// every owed callback, not merely drops them, so scope-bound resources are
/// released on every exit path between rows.
pub struct EvalScope {
    name: &'static str,
    cleanups: Vec<Box<dyn FnOnce()>>,
}

impl EvalScope {
    pub fn new(name: &'static str) -> Self {
        EvalScope {
            name,
            cleanups: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a cleanup owed by the current row's evaluation
    pub fn register_cleanup(&mut self, cleanup: Box<dyn FnOnce()>) {
        self.cleanups.push(cleanup);
    }

    /// Number of cleanups registered but not yet run
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.len()
    }

    /// Discard the prior row's transient state, running owed cleanup
    /// callbacks in reverse registration order.
    pub fn reset(&mut self) {
        if !self.cleanups.is_empty() {
            trace!(
                "scope '{}': running {} cleanup callback(s)",
                self.name,
                self.cleanups.len()
            );
        }
        while let Some(cleanup) = self.cleanups.pop() {
            cleanup();
        }
    }
}

impl Drop for EvalScope {
    fn drop(&mut self) {
        // Cleanups still owed at teardown must run exactly as on reset.
        self.reset();
    }
}

/// Shared execution machinery that permanently compiled sub-plan states
/// link into.
///
/// Sub-plan states registered here stay alive for the operator's whole
/// lifetime and are what plan diagnostics walk; transient expression states
/// never touch this registry.
#[derive(Default)]
pub struct ExecContext {
    subplan_states: Vec<Arc<SubPlanState>>,
}

impl ExecContext {
    pub fn new() -> Self {
        ExecContext {
            subplan_states: Vec::new(),
        }
    }

    /// Link a compiled sub-plan state into the context. Only ever called
    /// during operator init.
    pub fn register_subplan(&mut self, state: Arc<SubPlanState>) {
        trace!("registering sub-plan state {} (plan {})", state.id(), state.plan_id());
        self.subplan_states.push(state);
    }

    /// All sub-plan states linked into this context, in registration order
    pub fn subplan_states(&self) -> &[Arc<SubPlanState>] {
        &self.subplan_states
    }

    /// Drop every registered sub-plan state. Called at operator close.
    pub fn release(&mut self) {
        self.subplan_states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_reset_runs_cleanups_in_reverse_order() {
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut scope = EvalScope::new("test");

        for i in 0..3 {
            let order = Rc::clone(&order);
            scope.register_cleanup(Box::new(move || order.borrow_mut().push(i)));
        }
        assert_eq!(scope.pending_cleanups(), 3);

        scope.reset();
        assert_eq!(scope.pending_cleanups(), 0);
        assert_eq!(*order.borrow(), vec![2, 1, 0]);

        // A second reset owes nothing.
        scope.reset();
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn test_drop_runs_owed_cleanups() {
        let ran = Rc::new(Cell::new(false));
        {
            let mut scope = EvalScope::new("test");
            let ran = Rc::clone(&ran);
            scope.register_cleanup(Box::new(move || ran.set(true)));
        }
        assert!(ran.get());
    }
}
