//! Host value model for the Coronest runtime.
//!
//! This module provides the polymorphic value type exchanged between the
//! host and the script VM. It is engine-independent: script-side objects
//! that have no host representation (functions, threads, userdata) travel
//! through it as opaque [`Foreign`] references and stay callable only via
//! the runtime that produced them.

use crate::error::{CoreError, CoreResult};
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An opaque reference to a host or script object crossing the boundary.
///
/// Equality is reference identity. The payload is only recoverable by
/// downcasting to the concrete type that was wrapped.
#[derive(Clone)]
pub struct Foreign(Arc<dyn Any + Send + Sync>);

impl Foreign {
    /// Wraps a host object as an opaque reference.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Foreign(Arc::new(value))
    }

    /// Wraps an already shared host object.
    pub fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        Foreign(value)
    }

    /// Attempts to view the wrapped object as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns the underlying shared pointer.
    pub fn as_arc(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.0
    }

    /// Returns true when both references name the same object.
    pub fn same(&self, other: &Foreign) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Foreign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Foreign({:p})", Arc::as_ptr(&self.0))
    }
}

impl PartialEq for Foreign {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

/// A key in a host mapping produced from a script table.
///
/// Script string keys become [`Key::Name`]; the remaining scalar key types
/// are preserved. Non-scalar keys are refused by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// A symbolic name (script string key).
    Name(String),

    /// An integer key.
    Int(i64),

    /// A floating point key, compared and hashed by bit pattern.
    Num(f64),

    /// A boolean key.
    Bool(bool),
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Name(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            Key::Int(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Key::Num(n) => {
                2u8.hash(state);
                n.to_bits().hash(state);
            }
            Key::Bool(b) => {
                3u8.hash(state);
                b.hash(state);
            }
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Name(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Name(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

/// Represents a value exchanged between the host and the script VM.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absent value; converts to script nil.
    Nil,

    /// A boolean value.
    Bool(bool),

    /// An integer value.
    Int(i64),

    /// A floating point value.
    Num(f64),

    /// A UTF-8 string.
    Str(String),

    /// An ordered sequence (0-indexed on the host side).
    Seq(Vec<Value>),

    /// A key/value mapping preserving insertion order.
    Map(IndexMap<Key, Value>),

    /// An opaque reference crossing the boundary unchanged.
    Foreign(Foreign),
}

impl Value {
    /// Creates a boolean value.
    pub fn from_bool(value: bool) -> Self {
        Value::Bool(value)
    }

    /// Creates an integer value.
    pub fn from_int<T: Into<i64>>(value: T) -> Self {
        Value::Int(value.into())
    }

    /// Creates a floating point value.
    pub fn from_num(value: f64) -> Self {
        Value::Num(value)
    }

    /// Creates a string value.
    pub fn from_str<T: Into<String>>(value: T) -> Self {
        Value::Str(value.into())
    }

    /// Creates a sequence value.
    pub fn from_seq<T: Into<Vec<Value>>>(value: T) -> Self {
        Value::Seq(value.into())
    }

    /// Creates a mapping value.
    pub fn from_map<T: Into<IndexMap<Key, Value>>>(value: T) -> Self {
        Value::Map(value.into())
    }

    /// Wraps a host object as an opaque value.
    pub fn foreign<T: Any + Send + Sync>(value: T) -> Self {
        Value::Foreign(Foreign::new(value))
    }

    /// Creates an empty mapping.
    pub fn empty_map() -> Self {
        Value::Map(IndexMap::new())
    }

    /// Returns true if the value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Converts the value to a boolean following script truthiness
    /// (nil and false are falsy, everything else is truthy).
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Converts the value to an integer.
    pub fn as_int(&self) -> CoreResult<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Num(n) if n.fract() == 0.0 => Ok(*n as i64),
            other => Err(CoreError::unsupported_value(
                other.type_name().to_string(),
                "expected an integer".to_string(),
            )),
        }
    }

    /// Converts the value to a float.
    pub fn as_num(&self) -> CoreResult<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Num(n) => Ok(*n),
            other => Err(CoreError::unsupported_value(
                other.type_name().to_string(),
                "expected a number".to_string(),
            )),
        }
    }

    /// Views the value as a string slice.
    pub fn as_str(&self) -> CoreResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(CoreError::unsupported_value(
                other.type_name().to_string(),
                "expected a string".to_string(),
            )),
        }
    }

    /// Views the value as a sequence.
    pub fn as_seq(&self) -> CoreResult<&[Value]> {
        match self {
            Value::Seq(items) => Ok(items),
            other => Err(CoreError::unsupported_value(
                other.type_name().to_string(),
                "expected a sequence".to_string(),
            )),
        }
    }

    /// Views the value as a mapping.
    pub fn as_map(&self) -> CoreResult<&IndexMap<Key, Value>> {
        match self {
            Value::Map(map) => Ok(map),
            other => Err(CoreError::unsupported_value(
                other.type_name().to_string(),
                "expected a mapping".to_string(),
            )),
        }
    }

    /// Returns the host-side type name of the value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
            Value::Foreign(_) => "foreign",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Num(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Nil,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Seq(value.into_iter().map(Into::into).collect())
    }
}

#[cfg(feature = "serde-types")]
mod serde_impls {
    use super::{Key, Value};
    use serde::ser::{SerializeMap, SerializeSeq};
    use serde::{Serialize, Serializer};

    impl Serialize for Key {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Key::Name(s) => serializer.serialize_str(s),
                Key::Int(i) => serializer.serialize_i64(*i),
                Key::Num(n) => serializer.serialize_f64(*n),
                Key::Bool(b) => serializer.serialize_bool(*b),
            }
        }
    }

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Value::Nil => serializer.serialize_unit(),
                Value::Bool(b) => serializer.serialize_bool(*b),
                Value::Int(i) => serializer.serialize_i64(*i),
                Value::Num(n) => serializer.serialize_f64(*n),
                Value::Str(s) => serializer.serialize_str(s),
                Value::Seq(items) => {
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for item in items {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
                Value::Map(map) => {
                    let mut out = serializer.serialize_map(Some(map.len()))?;
                    for (k, v) in map {
                        out.serialize_entry(k, v)?;
                    }
                    out.end()
                }
                // Opaque handles have no data representation.
                Value::Foreign(_) => serializer.serialize_unit(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_constructors() {
        assert_eq!(Value::from_bool(true), Value::Bool(true));
        assert_eq!(Value::from_int(42), Value::Int(42));
        assert_eq!(Value::from_str("hello"), Value::Str("hello".to_string()));
        assert!(Value::default().is_nil());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Str(String::new()).is_truthy());
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::Int(7).as_int().unwrap(), 7);
        assert_eq!(Value::Num(7.0).as_int().unwrap(), 7);
        assert!(Value::Num(7.5).as_int().is_err());
        assert_eq!(Value::Int(7).as_num().unwrap(), 7.0);
        assert!(Value::Str("7".into()).as_num().is_err());
    }

    #[test]
    fn test_key_hashing_distinguishes_variants() {
        use std::collections::HashSet;
        let mut keys = HashSet::new();
        keys.insert(Key::Int(1));
        keys.insert(Key::Name("1".to_string()));
        keys.insert(Key::Bool(true));
        keys.insert(Key::Num(1.0));
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn test_foreign_identity() {
        let a = Foreign::new(String::from("payload"));
        let b = a.clone();
        let c = Foreign::new(String::from("payload"));
        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert_eq!(a.downcast_ref::<String>().unwrap(), "payload");
        assert!(a.downcast_ref::<i64>().is_none());
    }
}
