//! Declarative typed messages (C2): fixed-field records with per-field
//! validation, structural equality/ordering/hashing, and defaults.
//!
//! A [`Message`] is a record whose attribute set is *exactly* its declared field
//! names, in declared order. Reading or writing any other name fails with
//! [`RpcError::Schema`]. This gives the dispatcher a way to assert argument shape
//! in the typed-message variant without relying on the codec's own tagging.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::codec::Value;
use crate::error::RpcError;

/// The declared type of one field, each bearing its own default-value generator.
///
/// Container specs ([`FieldSpec::List`], [`FieldSpec::Map`]) validate recursively.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    Int,
    Float,
    String,
    Boolean,
    /// A nested message, identified by its declared field set.
    Message(Box<Schema>),
    List(Box<FieldSpec>),
    Map(Box<FieldSpec>, Box<FieldSpec>),
}

impl FieldSpec {
    /// The value a freshly constructed message gets for this field before any
    /// assignment.
    pub fn default(&self) -> Value {
        match self {
            FieldSpec::Int => Value::Int(0),
            FieldSpec::Float => Value::Float(0.0),
            FieldSpec::String => Value::String(String::new()),
            FieldSpec::Boolean => Value::Bool(false),
            FieldSpec::Message(schema) => Value::Map(
                schema
                    .fields
                    .iter()
                    .map(|(name, spec)| (name.clone(), spec.default()))
                    .collect(),
            ),
            FieldSpec::List(_) => Value::List(Vec::new()),
            FieldSpec::Map(_, _) => Value::Map(BTreeMap::new()),
        }
    }

    /// Re-checks that `value`'s shape matches this spec, recursing into containers.
    pub fn validate(&self, value: &Value) -> Result<(), RpcError> {
        match (self, value) {
            (FieldSpec::Int, Value::Int(_)) => Ok(()),
            (FieldSpec::Float, Value::Float(_)) => Ok(()),
            (FieldSpec::Float, Value::Int(_)) => Ok(()),
            (FieldSpec::String, Value::String(_)) => Ok(()),
            (FieldSpec::Boolean, Value::Bool(_)) => Ok(()),
            (FieldSpec::Message(schema), Value::Map(fields)) => {
                for (name, spec) in schema.fields.iter() {
                    let field_value = fields
                        .get(name)
                        .ok_or_else(|| RpcError::Schema(format!("missing field `{name}`")))?;
                    spec.validate(field_value)?;
                }
                Ok(())
            }
            (FieldSpec::List(item_spec), Value::List(items)) => {
                for item in items {
                    item_spec.validate(item)?;
                }
                Ok(())
            }
            (FieldSpec::Map(key_spec, value_spec), Value::Map(fields)) => {
                for (key, v) in fields {
                    key_spec.validate(&Value::String(key.clone()))?;
                    value_spec.validate(v)?;
                }
                Ok(())
            }
            (spec, value) => Err(RpcError::Schema(format!(
                "value {value:?} does not match field spec {spec:?}"
            ))),
        }
    }

    /// A short human-readable description, used in schema errors and introspection.
    pub fn describe(&self) -> String {
        match self {
            FieldSpec::Int => "Int".to_string(),
            FieldSpec::Float => "Float".to_string(),
            FieldSpec::String => "String".to_string(),
            FieldSpec::Boolean => "Boolean".to_string(),
            FieldSpec::Message(schema) => format!("Message({})", schema.name),
            FieldSpec::List(inner) => format!("List({})", inner.describe()),
            FieldSpec::Map(k, v) => format!("Map({}, {})", k.describe(), v.describe()),
        }
    }
}

/// The declared field set of a [`Message`] subtype: a name plus an ordered list
/// of `(field name, FieldSpec)` pairs. Declaration order is significant -- it's
/// the order equality, ordering and hashing walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    pub fn new(name: impl Into<String>, fields: Vec<(&str, FieldSpec)>) -> Self {
        Schema {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(name, spec)| (name.to_string(), spec))
                .collect(),
        }
    }

    fn spec_for(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, spec)| spec)
    }
}

/// A schema-declared record instance.
///
/// Every field receives its [`FieldSpec::default`] on construction. Setting an
/// unknown name, or a value of the wrong shape, fails. Equality, ordering and
/// hashing are structural over the declared field set in declared order.
#[derive(Debug, Clone)]
pub struct Message {
    schema: Schema,
    values: BTreeMap<String, Value>,
}

impl Message {
    /// Construct a message with every declared field at its default value.
    pub fn new(schema: Schema) -> Self {
        let values = schema
            .fields
            .iter()
            .map(|(name, spec)| (name.clone(), spec.default()))
            .collect();
        Message { schema, values }
    }

    /// Construct with an initial set of field values, validating each.
    pub fn with_fields(
        schema: Schema,
        initial: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Result<Self, RpcError> {
        let mut message = Message::new(schema);
        for (name, value) in initial {
            message.set(name, value)?;
        }
        Ok(message)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Read a declared field. Fails if `name` isn't in the schema.
    pub fn get(&self, name: &str) -> Result<&Value, RpcError> {
        if self.schema.spec_for(name).is_none() {
            return Err(RpcError::Schema(format!("no such field `{name}`")));
        }
        Ok(self.values.get(name).expect("declared fields are always present"))
    }

    /// Write a declared field after validating its shape. Fails if `name` isn't
    /// in the schema, or if `value` doesn't match the field's spec.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), RpcError> {
        let spec = self
            .schema
            .spec_for(name)
            .ok_or_else(|| RpcError::Schema(format!("no such field `{name}`")))?;
        spec.validate(&value)?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Re-validate every declared field against its spec.
    pub fn validate(&self) -> Result<(), RpcError> {
        for (name, spec) in &self.schema.fields {
            let value = self
                .values
                .get(name)
                .ok_or_else(|| RpcError::Schema(format!("missing field `{name}`")))?;
            spec.validate(value)?;
        }
        Ok(())
    }

    /// Values in declared field order, the order equality/hash/ord walk.
    fn ordered_values(&self) -> Vec<&Value> {
        self.schema
            .fields
            .iter()
            .map(|(name, _)| self.values.get(name).expect("declared fields are always present"))
            .collect()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name == other.schema.name && self.ordered_values() == other.ordered_values()
    }
}
impl Eq for Message {}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Message {
    /// Lexicographic field-wise (SS4.2): compare declared field values in
    /// declared order, falling through to the next field on a tie. Each
    /// field compares on its actual value via [`Value`]'s `Ord`, not a
    /// formatted-string stand-in, so e.g. `Int(2) < Int(10)` holds.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.schema.name.cmp(&other.schema.name).then_with(|| self.ordered_values().cmp(&other.ordered_values()))
    }
}

impl Hash for Message {
    /// `hash(m) = xor of hash(m.field_i)` over declared fields, per SS4.2 -- order
    /// independent on purpose so that field reordering in a future schema
    /// revision doesn't change the hash of already-equal messages.
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut acc: u64 = 0;
        for value in self.ordered_values() {
            let mut h = DefaultHasher::new();
            format!("{value:?}").hash(&mut h);
            acc ^= h.finish();
        }
        acc.hash(state);
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.schema.name)?;
        for (i, (name, _)) in self.schema.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={:?}", self.values.get(name))?;
        }
        write!(f, "}}")
    }
}

/// Wire representation of a [`Message`]: just its field map. The schema itself is
/// not sent over the wire -- both peers are assumed to share the same compiled-in
/// [`Schema`] for a given method, the same way the codec assumes shared knowledge
/// of a message's declared fields.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageWire {
    pub fields: BTreeMap<String, Value>,
}

impl Message {
    pub fn to_wire(&self) -> MessageWire {
        MessageWire { fields: self.values.clone() }
    }

    pub fn from_wire(schema: Schema, wire: MessageWire) -> Result<Self, RpcError> {
        let mut message = Message::new(schema);
        for (name, value) in wire.fields {
            message.set(&name, value)?;
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_message_schema() -> Schema {
        Schema::new("TestMessage", vec![("str", FieldSpec::String), ("int", FieldSpec::Int)])
    }

    #[test]
    fn defaults_are_populated_on_construction() {
        let m = Message::new(test_message_schema());
        assert_eq!(m.get("str").unwrap(), &Value::String(String::new()));
        assert_eq!(m.get("int").unwrap(), &Value::Int(0));
    }

    #[test]
    fn unknown_field_read_and_write_fail() {
        let mut m = Message::new(test_message_schema());
        assert!(m.get("nope").is_err());
        assert!(m.set("nope", Value::Int(1)).is_err());
    }

    #[test]
    fn wrong_shape_assignment_fails() {
        let mut m = Message::new(test_message_schema());
        assert!(m.set("int", Value::String("x".into())).is_err());
    }

    #[test]
    fn equal_messages_hash_equal() {
        let a = Message::with_fields(
            test_message_schema(),
            vec![("str", Value::String("Hi there!".into())), ("int", Value::Int(0))],
        )
        .unwrap();
        let b = Message::with_fields(
            test_message_schema(),
            vec![("str", Value::String("Hi there!".into())), ("int", Value::Int(0))],
        )
        .unwrap();
        assert_eq!(a, b);

        let mut ha = DefaultHasher::new();
        a.hash(&mut ha);
        let mut hb = DefaultHasher::new();
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn validate_succeeds_for_well_formed_message() {
        let m = Message::with_fields(test_message_schema(), vec![("int", Value::Int(5))]).unwrap();
        assert!(m.validate().is_ok());
    }

    #[test]
    fn ordering_compares_int_fields_numerically_not_as_strings() {
        let low = Message::with_fields(
            test_message_schema(),
            vec![("str", Value::String("a".into())), ("int", Value::Int(2))],
        )
        .unwrap();
        let high = Message::with_fields(
            test_message_schema(),
            vec![("str", Value::String("a".into())), ("int", Value::Int(10))],
        )
        .unwrap();
        assert!(low < high, "2 should order before 10 even though \"2\" > \"10\" as strings");
    }
}
