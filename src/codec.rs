//! The byte-string <-> [`Value`] codec (C1).
//!
//! The wire format is JSON via `serde_json`: every peer in this ecosystem already
//! depends on `serde`, the format is human-inspectable for the introspection RPCs,
//! and `serde_json::Value` already has exactly the shape this module's [`Value`]
//! needs. The codec is pure: no ambient state, no side effects, deterministic.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Guards against pathological nesting; `decode` rejects anything deeper than this.
/// The wire format is a tree with no back-references, so true cycles can't be
/// constructed at all -- this guard exists for the other failure mode, a
/// maliciously or accidentally deep document.
const MAX_DEPTH: usize = 64;

/// Any serializable datum the codec can carry.
///
/// Partitions into **primitives** (`Null`, `Bool`, `Int`, `Float`, `String`, and
/// `List`/`Map` whose elements are transitively primitive) and, conceptually,
/// everything else -- non-primitives never appear as a `Value` at all in this
/// implementation, since the registry turns them into an [`crate::registry::ObjectId`]
/// handle before a `Value` is ever constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Every `Value` as defined here is a primitive by construction (SS3); this
    /// exists to make that invariant explicit at call sites that need to assert it.
    pub fn is_primitive(&self) -> bool {
        true
    }

    fn depth(&self) -> usize {
        match self {
            Value::List(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
            Value::Map(fields) => 1 + fields.values().map(Value::depth).max().unwrap_or(0),
            _ => 1,
        }
    }

    /// Rank used to order values of different variants against each other;
    /// same-variant pairs (and the numeric Int/Float cross case) compare on
    /// their actual value instead.
    fn variant_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::String(_) => 4,
            Value::List(_) => 5,
            Value::Map(_) => 6,
        }
    }
}

/// Manual `Eq`: `Value` is compared structurally elsewhere in this crate
/// (`PartialEq`, [`crate::message::Message`]'s field-wise ordering) with the
/// same float caveat every such type here already accepts -- `Float(f64::NAN)`
/// is not reflexively equal to itself under IEEE 754, a corner case this
/// codec does not attempt to paper over.
impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-field comparison for numeric/string/container values, used by
/// [`crate::message::Message`]'s "lexicographic field-wise" ordering. Values
/// of differing variants fall back to [`Value::variant_rank`]; `Int`/`Float`
/// compare numerically against each other rather than by rank so a schema
/// change from one to the other doesn't silently reorder values.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (a, b) => a.variant_rank().cmp(&b.variant_rank()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Serialize a [`Value`] to its wire representation.
#[tracing::instrument(level = "trace", skip(value))]
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    if value.depth() > MAX_DEPTH {
        return Err(CodecError::TooDeep);
    }
    serde_json::to_vec(value).map_err(|err| CodecError::Encode(err.to_string()))
}

/// Deserialize a [`Value`] from bytes produced by [`encode`].
#[tracing::instrument(level = "trace", skip(bytes))]
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| CodecError::Decode(err.to_string()))?;
    if value.depth() > MAX_DEPTH {
        return Err(CodecError::TooDeep);
    }
    Ok(value)
}

/// Encode any `Serialize` type (e.g. a [`crate::message::Message`]) to wire bytes.
pub fn encode_typed<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|err| CodecError::Encode(err.to_string()))
}

/// Decode wire bytes into any `Deserialize` type.
pub fn decode_typed<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|err| CodecError::Decode(err.to_string()))
}
