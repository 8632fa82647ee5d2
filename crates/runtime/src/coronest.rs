//! Coroutine split: two independent coroutine namespaces from one VM.
//!
//! The bundled `coronest.lua` bootstrap returns a factory that
//! manufactures isolated `{create, resume, yield, status, wrap, running}`
//! namespaces. The runtime calls it twice: the `user` namespace becomes
//! the script-visible `coroutine` table, the `system` namespace is kept
//! private and parks suspending invocations. Yields from one namespace
//! never satisfy resumes in the other.

use crate::error::{RuntimeError, RuntimeResult};
use mlua::{Function, Lua, Table};

/// The bundled bootstrap resource.
pub const BOOTSTRAP: &str = include_str!("coronest.lua");

/// The canonical bootstrap resource name.
pub const BOOTSTRAP_NAME: &str = "@coronest.lua";

/// Handles to one coroutine namespace's functions.
#[derive(Clone)]
pub struct CoroutineNamespace {
    pub(crate) table: Table,
    pub(crate) create: Function,
    pub(crate) resume: Function,
    pub(crate) status: Function,
    pub(crate) yield_fn: Function,
}

impl CoroutineNamespace {
    fn from_table(table: Table) -> RuntimeResult<Self> {
        let create = table.get::<Function>("create")?;
        let resume = table.get::<Function>("resume")?;
        let status = table.get::<Function>("status")?;
        let yield_fn = table.get::<Function>("yield")?;
        Ok(Self {
            table,
            create,
            resume,
            status,
            yield_fn,
        })
    }
}

/// Loads the bootstrap and produces the `(user, system)` namespace pair,
/// rebinding the global `coroutine` table (and its `package.loaded` entry)
/// to the user namespace. Must run under the VM lock.
pub(crate) fn split(lua: &Lua) -> RuntimeResult<(CoroutineNamespace, CoroutineNamespace)> {
    let factory: Function = lua
        .load(BOOTSTRAP)
        .set_name(BOOTSTRAP_NAME)
        .eval()
        .map_err(RuntimeError::from)?;

    let user = CoroutineNamespace::from_table(factory.call::<Table>("user")?)?;
    let system = CoroutineNamespace::from_table(factory.call::<Table>("system")?)?;

    lua.globals().set("coroutine", user.table.clone())?;
    let loaded: Table = lua
        .globals()
        .get::<Table>("package")?
        .get::<Table>("loaded")?;
    loaded.set("coroutine", user.table.clone())?;

    Ok((user, system))
}
