//! Host-callable wrappers: suspendable and regular.
//!
//! A suspendable wraps a host function returning a future. Called from
//! script, it does not block: it packs the call into a suspend token and
//! yields the token through the system namespace; the supervisor invokes
//! the host function outside the VM lock and feeds the outcome back in on
//! the next resume. A regular wrapper runs its host function inline, under
//! the lock its caller already holds.

use crate::bridge::{from_lua, to_lua};
use crate::context::{ExecutionContext, InvocationMode};
use crate::coronest::CoroutineNamespace;
use crate::error::{RuntimeError, RuntimeResult};
use coronest_core::{SuspendResult, Value};
use futures::future::BoxFuture;
use mlua::{Function, Lua, MultiValue, UserData, Value as LuaValue};
use std::sync::Arc;

/// The script error raised when a suspendable is called outside a
/// suspending invocation.
pub const IMMEDIATE_SUSPEND_ERROR: &str =
    "Cannot use long-running editor function in immediate context.";

/// The future a suspendable host function returns.
pub type SuspendFuture = BoxFuture<'static, RuntimeResult<SuspendResult>>;

/// A suspendable host function: receives the captured script arguments as
/// already-wrapped script values and promises a [`SuspendResult`].
pub type SuspendableFn = dyn Fn(Vec<LuaValue>) -> SuspendFuture + Send + Sync;

/// A regular host function: runs under the current execution context and
/// the VM lock, over converted host values.
pub type HostFn =
    dyn Fn(Option<&ExecutionContext>, Vec<Value>) -> RuntimeResult<Value> + Send + Sync;

/// A long-running host operation exposable to scripts.
///
/// Merge the [`Value`] form into the runtime environment to make it
/// script-callable.
#[derive(Clone)]
pub struct HostSuspendable {
    name: String,
    call: Arc<SuspendableFn>,
}

impl HostSuspendable {
    /// Creates a suspendable from a host function returning a future.
    pub fn new<F>(name: impl Into<String>, call: F) -> Self
    where
        F: Fn(Vec<LuaValue>) -> SuspendFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            call: Arc::new(call),
        }
    }

    /// The name the operation is exposed under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wraps this suspendable as an environment leaf.
    pub fn value(self) -> Value {
        Value::foreign(self)
    }
}

/// A synchronous host operation exposable to scripts.
#[derive(Clone)]
pub struct HostCallable {
    name: String,
    call: Arc<HostFn>,
}

impl HostCallable {
    /// Creates a regular host callable.
    pub fn new<F>(name: impl Into<String>, call: F) -> Self
    where
        F: Fn(Option<&ExecutionContext>, Vec<Value>) -> RuntimeResult<Value>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            call: Arc::new(call),
        }
    }

    /// The name the operation is exposed under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wraps this callable as an environment leaf.
    pub fn value(self) -> Value {
        Value::foreign(self)
    }
}

/// A pending host call, yielded by a suspendable wrapper and consumed by
/// the supervisor. Never observable by script code.
pub(crate) struct SuspendToken {
    pub(crate) call: Arc<SuspendableFn>,
    pub(crate) args: Vec<LuaValue>,
}

impl UserData for SuspendToken {}

/// Script-side body of a suspendable wrapper: build the token, yield it,
/// interpret the supervisor's reply.
const SUSPEND_GLUE: &str = r#"
local make_token, yield = ...
return function(...)
  local ok, result = yield(make_token(...))
  if ok then
    return result
  end
  error(result, 0)
end
"#;

/// Builds the script-callable function for a suspendable. Must run under
/// the VM lock.
pub(crate) fn suspendable_function(
    lua: &Lua,
    system: &CoroutineNamespace,
    target: &HostSuspendable,
) -> RuntimeResult<Function> {
    let call = target.call.clone();
    let make_token = lua.create_function(move |lua, args: MultiValue| {
        match ExecutionContext::current() {
            Some(ctx) if ctx.mode() == InvocationMode::Suspendable => {}
            _ => {
                return Err(mlua::Error::RuntimeError(
                    IMMEDIATE_SUSPEND_ERROR.to_string(),
                ))
            }
        }
        lua.create_userdata(SuspendToken {
            call: call.clone(),
            args: args.into_vec(),
        })
    })?;

    lua.load(SUSPEND_GLUE)
        .set_name(format!("@suspendable:{}", target.name))
        .call::<Function>((make_token, system.yield_fn.clone()))
        .map_err(RuntimeError::from)
}

/// Builds the script-callable function for a regular host callable. Must
/// run under the VM lock.
pub(crate) fn regular_function(lua: &Lua, target: &HostCallable) -> RuntimeResult<Function> {
    let call = target.call.clone();
    let f = lua.create_function(move |lua, args: MultiValue| {
        let ctx = ExecutionContext::current();
        let mut host_args = Vec::with_capacity(args.len());
        for arg in args {
            host_args.push(from_lua(lua, arg).map_err(RuntimeError::into_lua)?);
        }
        let result = (call)(ctx.as_ref(), host_args).map_err(RuntimeError::into_lua)?;
        to_lua(lua, &result).map_err(RuntimeError::into_lua)
    })?;
    Ok(f)
}
