//! Storable values
//!
//! Everything that passes through [`Storage`](crate::Storage) is first lowered
//! to a [`Value`]. The tree shape of a value is what storage decomposes:
//! [`Value::Sequence`] and [`Value::Collection`] nodes have their elements
//! stored separately, every other variant is a leaf.
//!
//! Floating point numbers are deliberately absent. Content addressing needs a
//! canonical encoding and floats have several bit patterns for "the same"
//! number.

use crate::{Digest, Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A serializable value tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value
    Null,
    /// Boolean scalar
    Bool(bool),
    /// Signed integer scalar
    Int(i64),
    /// UTF-8 string scalar
    Str(String),
    /// Opaque byte string
    Bytes(Vec<u8>),
    /// Reference to other stored content
    Digest(Digest),
    /// Ordered sequence; elements are stored individually
    Sequence(Vec<Value>),
    /// Named collection wrapper; elements are stored individually
    Collection {
        /// Name of the collection type
        kind: String,
        /// Member values
        items: Vec<Value>,
    },
    /// String-keyed map, stored whole
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a string value
    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Build a collection value
    #[must_use]
    pub fn collection(kind: impl Into<String>, items: Vec<Self>) -> Self {
        Self::Collection {
            kind: kind.into(),
            items,
        }
    }

    /// Build a map value from key/value pairs
    #[must_use]
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether storage decomposes this node into separately stored elements
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Sequence(_) | Self::Collection { .. })
    }

    /// Short variant name, used in error messages
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Digest(_) => "digest",
            Self::Sequence(_) => "sequence",
            Self::Collection { .. } => "collection",
            Self::Map(_) => "map",
        }
    }

    /// Lower any serde value through the JSON data model
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value cannot be represented,
    /// e.g. maps with non-string keys or floating point numbers
    pub fn from_serde<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value)
            .map_err(|e| Error::serialization(format!("Failed to encode value: {e}")))?;
        Self::from_json(json)
    }

    /// Raise this value into any serde type through the JSON data model
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the shapes do not match
    pub fn into_serde<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.into_json())
            .map_err(|e| Error::serialization(format!("Failed to decode value: {e}")))
    }

    /// Convert a JSON document into a value
    ///
    /// Arrays become sequences, objects become maps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] for numbers that are not 64-bit signed integers
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        Ok(match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Int(n.as_i64().ok_or_else(|| {
                Error::serialization(format!("Number {n} has no canonical encoding"))
            })?),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::Sequence(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Result<_>>()?,
            ),
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, Self::from_json(v)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Convert into a JSON document
    ///
    /// Bytes become arrays of numbers, digests become hex strings and
    /// collections become arrays.
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(b),
            Self::Int(i) => serde_json::Value::from(i),
            Self::Str(s) => serde_json::Value::String(s),
            Self::Bytes(b) => serde_json::Value::from(b),
            Self::Digest(d) => serde_json::Value::String(d.to_hex()),
            Self::Sequence(items) | Self::Collection { items, .. } => {
                serde_json::Value::Array(items.into_iter().map(Self::into_json).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
        }
    }
}

/// A type that can be lowered to and raised from a [`Value`]
pub trait Storable: Sized {
    /// Lower into a value tree
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value cannot be represented
    fn to_value(&self) -> Result<Value>;

    /// Raise from a value tree
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value has the wrong shape
    fn from_value(value: Value) -> Result<Self>;
}

fn shape_error(expected: &str, found: &Value) -> Error {
    Error::serialization(format!(
        "Expected {expected}, found {}",
        found.kind_name()
    ))
}

impl Storable for Value {
    fn to_value(&self) -> Result<Value> {
        Ok(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl Storable for String {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Str(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(shape_error("str", &other)),
        }
    }
}

impl Storable for bool {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Bool(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(shape_error("bool", &other)),
        }
    }
}

impl Storable for i64 {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Int(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(shape_error("int", &other)),
        }
    }
}

impl Storable for u32 {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Int(i64::from(*self)))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => {
                Self::try_from(i).map_err(|_| Error::serialization(format!("{i} out of range for u32")))
            }
            other => Err(shape_error("int", &other)),
        }
    }
}

impl Storable for Digest {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Digest(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Digest(d) => Ok(d),
            other => Err(shape_error("digest", &other)),
        }
    }
}

impl<T: Storable> Storable for Option<T> {
    fn to_value(&self) -> Result<Value> {
        self.as_ref().map_or(Ok(Value::Null), Storable::to_value)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Storable> Storable for Vec<T> {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Sequence(
            self.iter().map(Storable::to_value).collect::<Result<_>>()?,
        ))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Sequence(items) | Value::Collection { items, .. } => {
                items.into_iter().map(T::from_value).collect()
            }
            other => Err(shape_error("sequence", &other)),
        }
    }
}

impl<T: Storable> Storable for BTreeMap<String, T> {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Map(
            self.iter()
                .map(|(k, v)| Ok((k.clone(), v.to_value()?)))
                .collect::<Result<_>>()?,
        ))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, T::from_value(v)?)))
                .collect(),
            other => Err(shape_error("map", &other)),
        }
    }
}

fn tuple_items<const N: usize>(value: Value) -> Result<[Value; N]> {
    match value {
        Value::Sequence(items) => {
            let len = items.len();
            items
                .try_into()
                .map_err(|_| Error::serialization(format!("Expected {N}-tuple, found {len} items")))
        }
        other => Err(shape_error("sequence", &other)),
    }
}

impl<A: Storable, B: Storable> Storable for (A, B) {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Sequence(vec![self.0.to_value()?, self.1.to_value()?]))
    }

    fn from_value(value: Value) -> Result<Self> {
        let [a, b] = tuple_items(value)?;
        Ok((A::from_value(a)?, B::from_value(b)?))
    }
}

impl<A: Storable, B: Storable, C: Storable> Storable for (A, B, C) {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Sequence(vec![
            self.0.to_value()?,
            self.1.to_value()?,
            self.2.to_value()?,
        ]))
    }

    fn from_value(value: Value) -> Result<Self> {
        let [a, b, c] = tuple_items(value)?;
        Ok((A::from_value(a)?, B::from_value(b)?, C::from_value(c)?))
    }
}

/// Adapter storing any serde type through the JSON data model
///
/// Sequences inside the serde value are decomposed like any other sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serde<T>(pub T);

impl<T: Serialize + DeserializeOwned> Storable for Serde<T> {
    fn to_value(&self) -> Result<Value> {
        Value::from_serde(&self.0)
    }

    fn from_value(value: Value) -> Result<Self> {
        value.into_serde().map(Serde)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct CompileResult {
        status: String,
        outputs: Vec<String>,
        exit_code: i32,
    }

    #[test]
    fn test_tuple_lowering() {
        let value = ("compile".to_string(), "Foo.java".to_string()).to_value().unwrap();
        assert_eq!(
            value,
            Value::Sequence(vec![Value::str("compile"), Value::str("Foo.java")])
        );
        let back: (String, String) = Storable::from_value(value).unwrap();
        assert_eq!(back.1, "Foo.java");
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let value = Value::Sequence(vec![Value::Int(1)]);
        let err = <(i64, i64)>::from_value(value).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_option_roundtrip() {
        assert_eq!(None::<String>.to_value().unwrap(), Value::Null);
        let some: Option<i64> = Storable::from_value(Value::Int(3)).unwrap();
        assert_eq!(some, Some(3));
    }

    #[test]
    fn test_u32_range_checked() {
        assert!(u32::from_value(Value::Int(-1)).is_err());
        assert_eq!(u32::from_value(Value::Int(7)).unwrap(), 7);
    }

    #[test]
    fn test_serde_adapter_roundtrip() {
        let result = CompileResult {
            status: "ok".into(),
            outputs: vec!["Foo.class".into()],
            exit_code: 0,
        };
        let value = Serde(result.clone()).to_value().unwrap();
        assert!(matches!(value, Value::Map(_)));
        let back = Serde::<CompileResult>::from_value(value).unwrap();
        assert_eq!(back.0, result);
    }

    #[test]
    fn test_floats_are_rejected() {
        let err = Value::from_serde(&1.5f64).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_non_string_map_keys_are_rejected() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        assert!(Value::from_serde(&map).is_err());
    }

    #[test]
    fn test_json_view_of_digest_and_collection() {
        let digest = Digest::create(b"x");
        let value = Value::collection("Classes", vec![Value::Digest(digest), Value::Bool(true)]);
        let json = value.into_json();
        assert_eq!(json, serde_json::json!([digest.to_hex(), true]));
    }

    #[test]
    fn test_container_detection() {
        assert!(Value::Sequence(vec![]).is_container());
        assert!(Value::collection("Deps", vec![]).is_container());
        assert!(!Value::map([("a", Value::Null)]).is_container());
        assert!(!Value::Bytes(vec![1, 2]).is_container());
    }
}
