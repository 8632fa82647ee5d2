//! Value bridge: bidirectional conversion between host and script values.
//!
//! Both directions run under the VM lock (the caller obtained the `&Lua`
//! inside `with_lock`). The table walk never re-enters script code; nested
//! tables are converted recursively under the same lock.

use crate::error::{RuntimeError, RuntimeResult};
use coronest_core::{CoreError, Foreign, Key, Value};
use indexmap::IndexMap;
use mlua::{AnyUserData, Lua, MultiValue, Table, UserData, Value as LuaValue};

/// Userdata wrapping an opaque host object passed into the VM.
pub(crate) struct ForeignObject(pub(crate) Foreign);

impl UserData for ForeignObject {}

/// Converts a host value to a script value.
///
/// Total over the host model: opaque references holding script objects
/// (functions, tables, threads, userdata) pass through unchanged; any
/// other opaque reference crosses as userdata wrapping the original.
pub fn to_lua(lua: &Lua, value: &Value) -> RuntimeResult<LuaValue> {
    match value {
        Value::Nil => Ok(LuaValue::Nil),
        Value::Bool(b) => Ok(LuaValue::Boolean(*b)),
        Value::Int(i) => Ok(LuaValue::Integer(*i)),
        Value::Num(n) => Ok(LuaValue::Number(*n)),
        Value::Str(s) => Ok(LuaValue::String(lua.create_string(s)?)),
        Value::Seq(items) => {
            let table = lua.create_table()?;
            for (index, item) in items.iter().enumerate() {
                table.raw_set(index as i64 + 1, to_lua(lua, item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
        Value::Map(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                table.raw_set(key_to_lua(lua, key)?, to_lua(lua, item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
        Value::Foreign(foreign) => foreign_to_lua(lua, foreign),
    }
}

/// Converts a mapping key to a script table key.
pub fn key_to_lua(lua: &Lua, key: &Key) -> RuntimeResult<LuaValue> {
    match key {
        Key::Name(s) => Ok(LuaValue::String(lua.create_string(s)?)),
        Key::Int(i) => Ok(LuaValue::Integer(*i)),
        Key::Num(n) => Ok(LuaValue::Number(*n)),
        Key::Bool(b) => Ok(LuaValue::Boolean(*b)),
    }
}

fn foreign_to_lua(lua: &Lua, foreign: &Foreign) -> RuntimeResult<LuaValue> {
    if let Some(f) = foreign.downcast_ref::<mlua::Function>() {
        return Ok(LuaValue::Function(f.clone()));
    }
    if let Some(t) = foreign.downcast_ref::<mlua::Table>() {
        return Ok(LuaValue::Table(t.clone()));
    }
    if let Some(t) = foreign.downcast_ref::<mlua::Thread>() {
        return Ok(LuaValue::Thread(t.clone()));
    }
    if let Some(u) = foreign.downcast_ref::<AnyUserData>() {
        return Ok(LuaValue::UserData(u.clone()));
    }
    let wrapped = lua.create_userdata(ForeignObject(foreign.clone()))?;
    Ok(LuaValue::UserData(wrapped))
}

/// Converts a slice of host values to script call arguments.
pub fn to_lua_args(lua: &Lua, args: &[Value]) -> RuntimeResult<MultiValue> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        out.push(to_lua(lua, arg)?);
    }
    Ok(MultiValue::from_vec(out))
}

/// Converts a script value to a host value.
pub fn from_lua(lua: &Lua, value: LuaValue) -> RuntimeResult<Value> {
    match value {
        LuaValue::Nil => Ok(Value::Nil),
        LuaValue::Boolean(b) => Ok(Value::Bool(b)),
        LuaValue::Integer(i) => Ok(Value::Int(i)),
        LuaValue::Number(n) => Ok(Value::Num(n)),
        LuaValue::String(s) => Ok(Value::Str(s.to_string_lossy().to_string())),
        LuaValue::Table(table) => table_to_host(lua, &table),
        LuaValue::Function(f) => Ok(Value::Foreign(Foreign::new(f))),
        LuaValue::Thread(t) => Ok(Value::Foreign(Foreign::new(t))),
        LuaValue::UserData(ud) => {
            if let Ok(wrapped) = ud.borrow::<ForeignObject>() {
                return Ok(Value::Foreign(wrapped.0.clone()));
            }
            Ok(Value::Foreign(Foreign::new(ud)))
        }
        other => Err(RuntimeError::Core(CoreError::unsupported_value(
            other.type_name().to_string(),
            "no host representation".to_string(),
        ))),
    }
}

/// Converts a script table following the one-pass walk:
///
/// While every key observed so far is a positive integer, accumulate into
/// a 0-indexed sequence (missing indices become nil holes). On the first
/// other key, demote the accumulated sequence to a mapping keyed by the
/// 1-based indices and continue as a mapping. Empty tables become empty
/// mappings.
fn table_to_host(lua: &Lua, table: &Table) -> RuntimeResult<Value> {
    let mut seq: Vec<Value> = Vec::new();
    let mut map: Option<IndexMap<Key, Value>> = None;

    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair.map_err(RuntimeError::from)?;
        let value = from_lua(lua, value)?;
        let key = host_key(&key)?;

        if let Some(map) = map.as_mut() {
            map.insert(key, value);
            continue;
        }

        match positive_index(&key) {
            Some(index) => {
                if index >= seq.len() {
                    seq.resize(index + 1, Value::Nil);
                }
                seq[index] = value;
            }
            None => {
                let mut demoted = IndexMap::with_capacity(seq.len() + 1);
                for (i, item) in seq.drain(..).enumerate() {
                    demoted.insert(Key::Int(i as i64 + 1), item);
                }
                demoted.insert(key, value);
                map = Some(demoted);
            }
        }
    }

    match map {
        Some(map) => Ok(Value::Map(map)),
        None if seq.is_empty() => Ok(Value::empty_map()),
        None => Ok(Value::Seq(seq)),
    }
}

fn host_key(key: &LuaValue) -> RuntimeResult<Key> {
    match key {
        LuaValue::Integer(i) => Ok(Key::Int(*i)),
        LuaValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Ok(Key::Int(*n as i64)),
        LuaValue::Number(n) => Ok(Key::Num(*n)),
        LuaValue::String(s) => Ok(Key::Name(s.to_string_lossy().to_string())),
        LuaValue::Boolean(b) => Ok(Key::Bool(*b)),
        other => Err(RuntimeError::Core(CoreError::unsupported_key(
            other.type_name().to_string(),
        ))),
    }
}

fn positive_index(key: &Key) -> Option<usize> {
    match key {
        Key::Int(i) if *i >= 1 => Some(*i as usize - 1),
        _ => None,
    }
}
