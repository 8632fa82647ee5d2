//! Execution contexts: the per-invocation record host callbacks observe.
//!
//! The context is held in a dynamically scoped, thread-local binding that
//! is re-established around every VM entry (immediate call or coroutine
//! resume). Coroutine bodies execute on the thread performing the resume,
//! so host functions invoked from script always see the binding of the
//! entry that reached them.

use crate::runtime::Runtime;
use coronest_core::EvalContext;
use std::cell::RefCell;

/// How the current invocation entered the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Synchronous entry; suspensions are rejected.
    Immediate,

    /// Entry on a system coroutine; suspendable calls may yield.
    Suspendable,
}

/// The per-invocation record: ambient evaluation context, the runtime that
/// issued the invocation, and the invocation mode.
#[derive(Clone)]
pub struct ExecutionContext {
    runtime: Runtime,
    evaluation: EvalContext,
    mode: InvocationMode,
}

thread_local! {
    static CURRENT: RefCell<Vec<ExecutionContext>> = const { RefCell::new(Vec::new()) };
}

impl ExecutionContext {
    /// Creates a context for one invocation.
    pub fn new(runtime: Runtime, evaluation: EvalContext, mode: InvocationMode) -> Self {
        Self {
            runtime,
            evaluation,
            mode,
        }
    }

    /// The runtime this invocation belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The ambient evaluation context.
    pub fn evaluation(&self) -> &EvalContext {
        &self.evaluation
    }

    /// The invocation mode.
    pub fn mode(&self) -> InvocationMode {
        self.mode
    }

    /// Binds this context on the current thread for the extent of the
    /// returned guard. Bindings nest; the innermost wins.
    pub fn bind(&self) -> ContextGuard {
        CURRENT.with(|stack| stack.borrow_mut().push(self.clone()));
        ContextGuard { _private: () }
    }

    /// Returns the innermost context bound on the current thread.
    pub fn current() -> Option<ExecutionContext> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }
}

/// Restores the previous binding when dropped.
pub struct ContextGuard {
    _private: (),
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
