//! Runtime assembly and the public code/value operations.

use crate::bridge::{from_lua, key_to_lua, to_lua};
use crate::coronest::{self, CoroutineNamespace};
use crate::error::{RuntimeError, RuntimeResult};
use crate::sandbox;
use crate::suspend::{regular_function, suspendable_function, HostCallable, HostSuspendable};
use crate::vm::VmContainer;
use coronest_core::{Key, Project, Value};
use indexmap::IndexMap;
use mlua::{Function, Lua, MultiValue, Table, Value as LuaValue};
use parking_lot::Mutex;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;

/// A writable sink receiving script output (UTF-8).
pub type OutputSink = Arc<Mutex<dyn Write + Send>>;

/// Construction options for [`Runtime::make`].
#[derive(Default)]
pub struct RuntimeOptions {
    /// Sink for the script's standard output; defaults to process stdout.
    pub out: Option<OutputSink>,

    /// Sink for the script's standard error; defaults to process stderr.
    pub err: Option<OutputSink>,

    /// Environment overlay merged into the globals with nested-map
    /// semantics. Leaves may be [`HostCallable`] or [`HostSuspendable`]
    /// values, which are wrapped as script-callable functions on entry.
    pub env: Option<Value>,
}

impl RuntimeOptions {
    /// Sets the standard output sink.
    pub fn with_out(mut self, out: OutputSink) -> Self {
        self.out = Some(out);
        self
    }

    /// Sets the standard error sink.
    pub fn with_err(mut self, err: OutputSink) -> Self {
        self.err = Some(err);
        self
    }

    /// Sets the environment overlay.
    pub fn with_env(mut self, env: Value) -> Self {
        self.env = Some(env);
        self
    }
}

/// Executor for drive-loop continuations: the ambient tokio runtime when
/// the constructing thread has one, else a runtime-owned fallback.
pub(crate) enum Executor {
    Ambient(tokio::runtime::Handle),
    Owned(tokio::runtime::Runtime),
}

impl Executor {
    fn acquire() -> RuntimeResult<Self> {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            return Ok(Executor::Ambient(handle));
        }
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("coronest-driver")
            .enable_all()
            .build()
            .map(Executor::Owned)
            .map_err(|e| RuntimeError::host(anyhow::Error::from(e)))
    }

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self {
            Executor::Ambient(handle) => {
                handle.spawn(future);
            }
            Executor::Owned(runtime) => {
                runtime.spawn(future);
            }
        }
    }
}

pub(crate) struct RuntimeInner {
    pub(crate) vm: VmContainer,
    pub(crate) system: CoroutineNamespace,
    pub(crate) project: Project,
    pub(crate) executor: Executor,
    out: OutputSink,
    err: OutputSink,
}

/// A handle to one script runtime.
///
/// Cheap to clone and safe to share across threads; every entry into the
/// VM is serialised by the container's reentrant lock. Script values must
/// never alias between runtimes.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

/// A compiled, reusable chunk.
pub struct Code {
    pub(crate) function: Function,
    name: String,
}

impl Code {
    /// The chunk name used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Runtime {
    /// Creates a runtime over `project`.
    ///
    /// Startup order: open the safe standard libraries, install the
    /// sandbox, split the coroutine namespaces, then merge the caller's
    /// environment overlay.
    pub fn make(project: Project, options: RuntimeOptions) -> RuntimeResult<Runtime> {
        let vm = VmContainer::new()?;
        let out: OutputSink = options
            .out
            .unwrap_or_else(|| Arc::new(Mutex::new(std::io::stdout())));
        let err: OutputSink = options
            .err
            .unwrap_or_else(|| Arc::new(Mutex::new(std::io::stderr())));

        let system = vm.with_lock(|lua| -> RuntimeResult<CoroutineNamespace> {
            sandbox::install(lua, &project, &out, &err)?;
            let (_user, system) = coronest::split(lua)?;
            if let Some(env) = &options.env {
                merge_env(lua, &lua.globals(), env.as_map()?, &system)?;
            }
            Ok(system)
        })?;

        log::debug!("script runtime created");
        Ok(Runtime {
            inner: Arc::new(RuntimeInner {
                vm,
                system,
                project,
                executor: Executor::acquire()?,
                out,
                err,
            }),
        })
    }

    /// The project this runtime was constructed over.
    pub fn project(&self) -> &Project {
        &self.inner.project
    }

    /// The sink receiving the script's standard output.
    pub fn out(&self) -> &OutputSink {
        &self.inner.out
    }

    /// The sink receiving the script's standard error.
    pub fn err(&self) -> &OutputSink {
        &self.inner.err
    }

    /// Compiles `chunk` into a reusable code object. The default chunk
    /// name is `"REPL"`.
    pub fn read(&self, chunk: &str, name: Option<&str>) -> RuntimeResult<Code> {
        let name = name.unwrap_or("REPL");
        let function = self.inner.vm.load(chunk, name)?;
        Ok(Code {
            function,
            name: name.to_string(),
        })
    }

    /// Runs a compiled chunk under the lock and returns its first result.
    pub fn eval(&self, code: &Code) -> RuntimeResult<Value> {
        let first = self
            .inner
            .vm
            .invoke_1(&code.function, MultiValue::from_vec(Vec::new()))?;
        self.inner.vm.with_lock(|lua| from_lua(lua, first))
    }

    /// Converts a host value to a script value owned by this runtime.
    pub fn to_script(&self, value: &Value) -> RuntimeResult<LuaValue> {
        self.inner.vm.with_lock(|lua| to_lua(lua, value))
    }

    /// Converts a script value produced by this runtime to a host value.
    pub fn from_script(&self, value: LuaValue) -> RuntimeResult<Value> {
        self.inner.vm.with_lock(|lua| from_lua(lua, value))
    }
}

/// Merges an environment overlay into `target` with nested-map semantics:
/// recurse into tables that already exist, overwrite leaves. Host-callable
/// leaves are wrapped as script functions.
fn merge_env(
    lua: &Lua,
    target: &Table,
    overlay: &IndexMap<Key, Value>,
    system: &CoroutineNamespace,
) -> RuntimeResult<()> {
    for (key, value) in overlay {
        let lua_key = key_to_lua(lua, key)?;
        match value {
            Value::Map(nested) => {
                let existing: LuaValue = target.get(lua_key.clone())?;
                let table = match existing {
                    LuaValue::Table(t) => t,
                    _ => {
                        let t = lua.create_table()?;
                        target.set(lua_key, t.clone())?;
                        t
                    }
                };
                merge_env(lua, &table, nested, system)?;
            }
            Value::Foreign(foreign) => {
                if let Some(callable) = foreign.downcast_ref::<HostCallable>() {
                    target.set(lua_key, regular_function(lua, callable)?)?;
                } else if let Some(suspendable) = foreign.downcast_ref::<HostSuspendable>() {
                    target.set(lua_key, suspendable_function(lua, system, suspendable)?)?;
                } else {
                    target.set(lua_key, to_lua(lua, value)?)?;
                }
            }
            leaf => target.set(lua_key, to_lua(lua, leaf)?)?,
        }
    }
    Ok(())
}
