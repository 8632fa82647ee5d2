//! VM container: one interpreter instance behind a reentrant lock.
//!
//! All access to the interpreter is serialised by one reentrant lock per
//! container. Coroutine bodies execute on the thread that calls `resume`,
//! so a host callback reached from inside a resume re-acquires the lock
//! reentrantly on the owning thread; that re-acquisition is the "right of
//! way" a suspended script's callbacks rely on. The lock is never held
//! across a host future.

use crate::error::{RuntimeError, RuntimeResult};
use mlua::{Function, Lua, LuaOptions, MultiValue, StdLib, Value as LuaValue};
use parking_lot::ReentrantMutex;

/// Owns one script VM and serialises concurrent access to it.
pub struct VmContainer {
    state: ReentrantMutex<Lua>,
}

impl VmContainer {
    /// Creates a container over a fresh VM with the safe standard
    /// libraries loaded (base, coroutine, table, string, math, os, io,
    /// package, utf8).
    pub fn new() -> RuntimeResult<Self> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .map_err(RuntimeError::from)?;
        Ok(Self {
            state: ReentrantMutex::new(lua),
        })
    }

    /// Runs `body` with the VM locked.
    ///
    /// The lock is reentrant: nested `with_lock` calls on the owning
    /// thread run `body` directly. Released on every exit path, panics
    /// included.
    pub fn with_lock<R>(&self, body: impl FnOnce(&Lua) -> R) -> R {
        let guard = self.state.lock();
        body(&guard)
    }

    /// Compiles a chunk into a reusable function.
    pub fn load(&self, chunk: &str, name: &str) -> RuntimeResult<Function> {
        self.with_lock(|lua| {
            lua.load(chunk)
                .set_name(name)
                .into_function()
                .map_err(RuntimeError::from)
        })
    }

    /// Calls `function` under the lock and returns its first result.
    pub fn invoke_1(&self, function: &Function, args: MultiValue) -> RuntimeResult<LuaValue> {
        self.with_lock(|_lua| {
            let results = function.call::<MultiValue>(args)?;
            Ok(results.into_vec().into_iter().next().unwrap_or(LuaValue::Nil))
        })
    }

    /// Calls `function` under the lock and returns all results.
    pub fn invoke_all(&self, function: &Function, args: MultiValue) -> RuntimeResult<Vec<LuaValue>> {
        self.with_lock(|_lua| {
            let results = function.call::<MultiValue>(args)?;
            Ok(results.into_vec())
        })
    }
}
