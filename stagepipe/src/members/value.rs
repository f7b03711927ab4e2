//! Runtime values carried by stage members.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use super::TypeTag;

/// An opaque in-memory domain object (an image, a surface, a text document...).
///
/// The engine never looks inside the payload; it only matches objects by
/// their `kind` tag when piping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainObject {
    /// The object kind, matched against `TypeTag::Object`.
    pub kind: String,
    /// The file the object was read from, if any.
    pub source: Option<PathBuf>,
    /// Stage-defined content.
    pub payload: serde_json::Value,
}

impl DomainObject {
    /// Creates a new domain object with no source.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            source: None,
            payload,
        }
    }

    /// Sets the file the object came from.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A typed member value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(String),
    /// Boolean value.
    Bool(bool),
    /// Multi-valued member (arity other than one).
    List(Vec<Value>),
    /// Domain object.
    Object(DomainObject),
}

impl Value {
    /// Returns true if this value (or every element of a list) has the given type.
    #[must_use]
    pub fn matches(&self, tag: &TypeTag) -> bool {
        match (self, tag) {
            (Self::List(items), _) => items.iter().all(|item| item.matches(tag)),
            (Self::Int(_), TypeTag::Int)
            | (Self::Float(_), TypeTag::Float)
            | (Self::Str(_), TypeTag::Str)
            | (Self::Bool(_), TypeTag::Bool) => true,
            (Self::Object(object), TypeTag::Object(kind)) => &object.kind == kind,
            _ => false,
        }
    }

    /// Returns the value as an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as a bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the list elements.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the domain object.
    #[must_use]
    pub fn as_object(&self) -> Option<&DomainObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Returns true for values that count as "nothing set": empty strings and lists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Compares two values, treating ints and floats as numbers.
    #[must_use]
    pub fn loosely_equals(&self, other: &Self) -> bool {
        match (self.as_float(), other.as_float()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => self == other,
        }
    }

    /// Renders the value for descriptor defaults: lists are comma separated.
    #[must_use]
    pub fn descriptor_text(&self) -> String {
        match self {
            Self::List(items) => items
                .iter()
                .map(Self::descriptor_text)
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        }
    }
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Str(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{}", u8::from(*v)),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Object(object) => write!(f, "{}", object.kind),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<DomainObject> for Value {
    fn from(v: DomainObject) -> Self {
        Self::Object(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// The current values of a stage's members, keyed by member name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberValues {
    values: HashMap<String, Value>,
}

impl MemberValues {
    /// Creates an empty value set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a member value, returning the previous one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    /// Returns a member value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Removes a member value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Returns true if the member has a value.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Integer accessor.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Float accessor.
    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    /// String accessor.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Bool accessor.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Domain object accessor.
    #[must_use]
    pub fn get_object(&self, name: &str) -> Option<&DomainObject> {
        self.get(name).and_then(Value::as_object)
    }

    /// Number of set members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(name, value)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl FromIterator<(String, Value)> for MemberValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_matches_type() {
        assert!(Value::Int(3).matches(&TypeTag::Int));
        assert!(!Value::Int(3).matches(&TypeTag::Float));
        assert!(Value::from(vec![1.0, 2.0]).matches(&TypeTag::Float));

        let text = Value::from(DomainObject::new("text", serde_json::json!("abc")));
        assert!(text.matches(&TypeTag::Object("text".to_string())));
        assert!(!text.matches(&TypeTag::Object("image".to_string())));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::from(vec![1, 2, 3]).to_string(), "[1, 2, 3]");
        assert_eq!(Value::from(vec![1, 2, 3]).descriptor_text(), "1,2,3");
    }

    #[test]
    fn test_loose_numeric_equality() {
        assert!(Value::Int(3).loosely_equals(&Value::Float(3.0)));
        assert!(!Value::Int(3).loosely_equals(&Value::Str("3".into())));
        assert!(Value::from("a").loosely_equals(&Value::from("a")));
    }

    #[test]
    fn test_value_serialize() {
        let json = serde_json::to_value(Value::Int(4)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "int", "value": 4}));
    }
}
