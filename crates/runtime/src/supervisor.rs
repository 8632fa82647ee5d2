//! Invocation supervisor: the two entry points that run script functions.
//!
//! `invoke_immediate` is synchronous and forbids suspensions.
//! `invoke_suspending` parks the call on a system coroutine and drives it
//! to completion, invoking the host operation behind every suspend token
//! outside the VM lock and awaiting its future between resumes. The first
//! drive step runs inside the call itself, so an invocation that never
//! suspends resolves its future before `invoke_suspending` returns.

use crate::bridge::{from_lua, to_lua, to_lua_args};
use crate::context::{ExecutionContext, InvocationMode};
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::Runtime;
use crate::suspend::SuspendToken;
use coronest_core::{CoreError, EvalContext, SuspendResult, Value};
use futures::channel::oneshot;
use mlua::{Function, Lua, MultiValue, Value as LuaValue};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The script error an immediate invocation reports when the script tried
/// to yield its main thread.
pub const IMMEDIATE_YIELD_ERROR: &str =
    "Cannot use long-running editor function in this context";

/// Lua's messages for a yield attempt the interpreter cannot honor.
const MAIN_YIELD_MARKERS: [&str; 2] = [
    "attempt to yield from outside a coroutine",
    "attempt to yield across a C-call boundary",
];

/// The future of a suspending invocation, resolving to the script value
/// the invoked function returned.
pub struct ScriptFuture {
    rx: oneshot::Receiver<RuntimeResult<Value>>,
}

impl ScriptFuture {
    fn new(rx: oneshot::Receiver<RuntimeResult<Value>>) -> Self {
        Self { rx }
    }

    fn resolved(result: RuntimeResult<Value>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self::new(rx)
    }

    /// Returns the result if the invocation already completed, without
    /// blocking or requiring an executor.
    pub fn try_take(&mut self) -> Option<RuntimeResult<Value>> {
        match self.rx.try_recv() {
            Ok(Some(result)) => Some(result),
            Ok(None) => None,
            Err(_) => Some(Err(RuntimeError::Canceled)),
        }
    }
}

impl Future for ScriptFuture {
    type Output = RuntimeResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Canceled),
        })
    }
}

/// What one resume of the system coroutine produced.
enum StepOutcome {
    /// The coroutine finished; its final value.
    Done(Value),

    /// The coroutine raised an uncaught script error.
    Faulted(String),

    /// The coroutine yielded a suspend token.
    Suspended(SuspendToken),
}

/// What to feed into the next resume.
enum ResumeInput {
    /// The invocation's initial arguments.
    Start(Vec<Value>),

    /// The supervisor's reply to a suspension: `(ok, value)` as the
    /// suspendable wrapper expects it.
    Reply { ok: bool, value: Value },
}

impl Runtime {
    /// Runs `function` synchronously under the VM lock. No suspensions are
    /// permitted; a suspendable called from the script raises a script
    /// error, and a main-thread yield attempt is translated to
    /// [`IMMEDIATE_YIELD_ERROR`].
    ///
    /// When the caller supplies no evaluation context, a fresh one is
    /// acquired and its pending cache updates are committed on the UI
    /// thread after a successful call.
    pub fn invoke_immediate(
        &self,
        function: &Value,
        args: &[Value],
        evaluation: Option<EvalContext>,
    ) -> RuntimeResult<Value> {
        let function = script_function(function)?;
        let supplied = evaluation.is_some();
        let evaluation =
            evaluation.unwrap_or_else(|| self.inner.project.graph().acquire());
        let ctx = ExecutionContext::new(self.clone(), evaluation, InvocationMode::Immediate);

        let result = {
            let _bind = ctx.bind();
            self.inner
                .vm
                .with_lock(|lua| to_lua_args(lua, args))
                .and_then(|args| self.inner.vm.invoke_1(&function, args))
                .and_then(|first| self.inner.vm.with_lock(|lua| from_lua(lua, first)))
        };

        match result {
            Ok(value) => {
                if !supplied {
                    self.schedule_commit(ctx.evaluation());
                }
                Ok(value)
            }
            Err(error) => Err(translate_main_yield(error)),
        }
    }

    /// Runs `function` on a system coroutine and returns the future of its
    /// result. The drive loop holds the lock only across resumes, never
    /// across the host futures it awaits.
    pub fn invoke_suspending(&self, function: &Value, args: &[Value]) -> ScriptFuture {
        let function = match script_function(function) {
            Ok(f) => f,
            Err(e) => return ScriptFuture::resolved(Err(e)),
        };

        let co = match self.inner.vm.with_lock(|_lua| {
            self.inner
                .system
                .create
                .call::<LuaValue>(function)
                .map_err(RuntimeError::from)
        }) {
            Ok(co) => co,
            Err(e) => return ScriptFuture::resolved(Err(e)),
        };

        let evaluation = self.inner.project.graph().acquire();
        let ctx = ExecutionContext::new(self.clone(), evaluation, InvocationMode::Suspendable);

        match self.resume_step(&ctx, &co, ResumeInput::Start(args.to_vec())) {
            Ok(StepOutcome::Done(value)) => ScriptFuture::resolved(Ok(value)),
            Ok(StepOutcome::Faulted(message)) => {
                ScriptFuture::resolved(Err(RuntimeError::script(message)))
            }
            Ok(StepOutcome::Suspended(token)) => {
                let (tx, rx) = oneshot::channel();
                let runtime = self.clone();
                self.inner
                    .executor
                    .spawn(async move { runtime.drive(ctx, co, token, tx).await });
                ScriptFuture::new(rx)
            }
            Err(e) => ScriptFuture::resolved(Err(e)),
        }
    }

    /// One resume of the system coroutine, under the lock, with the
    /// execution context bound for the step's dynamic extent.
    fn resume_step(
        &self,
        ctx: &ExecutionContext,
        co: &LuaValue,
        input: ResumeInput,
    ) -> RuntimeResult<StepOutcome> {
        let _bind = ctx.bind();
        self.inner.vm.with_lock(|lua| {
            let mut call_args = vec![co.clone()];
            match input {
                ResumeInput::Start(args) => {
                    for arg in &args {
                        call_args.push(to_lua(lua, arg)?);
                    }
                }
                ResumeInput::Reply { ok, value } => {
                    call_args.push(LuaValue::Boolean(ok));
                    call_args.push(to_lua(lua, &value)?);
                }
            }

            let results = self
                .inner
                .system
                .resume
                .call::<MultiValue>(MultiValue::from_vec(call_args))
                .map_err(RuntimeError::from)?;
            let mut results = results.into_vec().into_iter();
            let ok = matches!(results.next(), Some(LuaValue::Boolean(true)));
            let ret = results.next().unwrap_or(LuaValue::Nil);

            if !ok {
                return Ok(StepOutcome::Faulted(error_text(lua, ret)));
            }

            let status: String = self
                .inner
                .system
                .status
                .call(co.clone())
                .map_err(RuntimeError::from)?;
            if status == "dead" {
                return Ok(StepOutcome::Done(from_lua(lua, ret)?));
            }

            match ret {
                LuaValue::UserData(ud) => {
                    let token = ud.take::<SuspendToken>().map_err(|_| {
                        RuntimeError::protocol("system yield did not carry a suspend token")
                    })?;
                    log::debug!("invocation suspended on {} argument(s)", token.args.len());
                    Ok(StepOutcome::Suspended(token))
                }
                other => Err(RuntimeError::protocol(format!(
                    "system yield carried {} instead of a suspend token",
                    other.type_name()
                ))),
            }
        })
    }

    /// The asynchronous tail of the drive loop: invoke the suspended host
    /// operation, await its future, refresh if requested, resume, repeat.
    async fn drive(
        self,
        mut ctx: ExecutionContext,
        co: LuaValue,
        mut token: SuspendToken,
        tx: oneshot::Sender<RuntimeResult<Value>>,
    ) {
        loop {
            let args = std::mem::take(&mut token.args);
            let outcome = (token.call)(args).await;

            let result = match outcome {
                Ok(result) => result,
                // A script-level failure of the host operation is delivered
                // to the script on the next resume.
                Err(RuntimeError::Script { message }) => SuspendResult::Error(message),
                // Anything else fails the invocation; no further resumes.
                Err(host_error) => {
                    let _ = tx.send(Err(host_error));
                    return;
                }
            };

            if result.wants_refresh() {
                match self.refresh(&ctx).await {
                    Ok(fresh) => ctx = fresh,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                }
            }

            let input = match result {
                SuspendResult::Value { value, .. } => ResumeInput::Reply { ok: true, value },
                SuspendResult::Error(message) => ResumeInput::Reply {
                    ok: false,
                    value: Value::Str(message),
                },
            };

            match self.resume_step(&ctx, &co, input) {
                Ok(StepOutcome::Done(value)) => {
                    let _ = tx.send(Ok(value));
                    return;
                }
                Ok(StepOutcome::Faulted(message)) => {
                    let _ = tx.send(Err(RuntimeError::script(message)));
                    return;
                }
                Ok(StepOutcome::Suspended(next)) => token = next,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            }
        }
    }

    /// Commits the current evaluation context's pending cache updates on
    /// the UI thread and adopts a fresh context. Awaited, so the commit is
    /// observable before the next script step.
    async fn refresh(&self, ctx: &ExecutionContext) -> RuntimeResult<ExecutionContext> {
        log::debug!("refreshing evaluation context");
        let (done_tx, done_rx) = oneshot::channel();
        let graph = self.inner.project.graph().clone();
        let evaluation = ctx.evaluation().clone();
        self.inner.project.ui().submit(Box::new(move || {
            graph.commit(&evaluation);
            let _ = done_tx.send(());
        }));
        done_rx.await.map_err(|_| RuntimeError::Canceled)?;

        let fresh = self.inner.project.graph().acquire();
        Ok(ExecutionContext::new(
            self.clone(),
            fresh,
            InvocationMode::Suspendable,
        ))
    }

    /// Schedules a commit of `evaluation` on the UI thread.
    fn schedule_commit(&self, evaluation: &EvalContext) {
        let graph = self.inner.project.graph().clone();
        let evaluation = evaluation.clone();
        self.inner
            .project
            .ui()
            .submit(Box::new(move || graph.commit(&evaluation)));
    }
}

fn script_function(value: &Value) -> RuntimeResult<Function> {
    if let Value::Foreign(foreign) = value {
        if let Some(function) = foreign.downcast_ref::<Function>() {
            return Ok(function.clone());
        }
    }
    Err(RuntimeError::Core(CoreError::unsupported_value(
        value.type_name().to_string(),
        "expected a script function".to_string(),
    )))
}

fn error_text(lua: &Lua, value: LuaValue) -> String {
    match &value {
        LuaValue::String(s) => s.to_string_lossy().to_string(),
        _ => match lua.coerce_string(value.clone()) {
            Ok(Some(s)) => s.to_string_lossy().to_string(),
            _ => format!("{value:?}"),
        },
    }
}

fn translate_main_yield(error: RuntimeError) -> RuntimeError {
    if let Some(message) = error.script_message() {
        if MAIN_YIELD_MARKERS.iter().any(|m| message.contains(m)) {
            return RuntimeError::script(IMMEDIATE_YIELD_ERROR);
        }
    }
    error
}
