//! Dynamically typed session values.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A value stored in a session.
///
/// Scalars are stored inline. Structured data is either a frozen
/// [`Value::Json`] document or a [`Value::Shared`] handle whose contents the
/// caller may keep mutating after it has been stored.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Present but empty.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Frozen structured data (arrays and objects).
    Json(serde_json::Value),
    /// Aliased structured data, see [`SharedValue`].
    Shared(SharedValue),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Json(_) => "json",
            Value::Shared(_) => "shared",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Detach the value from any caller-held alias.
    ///
    /// Shared handles are deep-copied into an owned snapshot; every other
    /// variant already owns its data.
    pub fn frozen(self) -> Value {
        match self {
            Value::Shared(shared) => Value::from(shared.snapshot()),
            other => other,
        }
    }

    /// Convert to a JSON document, snapshotting shared handles.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Json(v) => v.clone(),
            Value::Shared(shared) => shared.snapshot(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Shared(shared) => shared.snapshot().as_bool(),
            _ => None,
        }
    }

    /// Read as a 64-bit integer, parsing numeric strings.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            Value::Shared(shared) => Value::from(shared.snapshot()).to_i64(),
            _ => None,
        }
    }

    /// Read as a 32-bit integer; out-of-range values do not coerce.
    pub fn to_i32(&self) -> Option<i32> {
        self.to_i64().and_then(|i| i32::try_from(i).ok())
    }

    /// Read as a 64-bit float from floats, integers or numeric strings.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::String(s) => s.trim().parse().ok(),
            Value::Shared(shared) => Value::from(shared.snapshot()).to_f64(),
            _ => None,
        }
    }

    pub fn to_f32(&self) -> Option<f32> {
        match self {
            Value::String(s) => s.trim().parse().ok(),
            other => other.to_f64().map(|f| f as f32),
        }
    }

    /// Describe the value for diagnostics, e.g. `bool true`.
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::String(s) => format!("string {s:?}"),
            other => format!("{} {}", other.type_name(), other.to_json()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Shared(a), Value::Shared(b)) if a.ptr_eq(b) => true,
            _ => self.to_json() == other.to_json(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            structured => Value::Json(structured),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<SharedValue> for Value {
    fn from(value: SharedValue) -> Self {
        Value::Shared(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// A JSON document shared between the caller and the session.
///
/// Cloning the handle clones the reference, not the document, so a value
/// stored with [`Session::set`](crate::Session::set) keeps reflecting edits
/// made through the caller's copy.
#[derive(Debug, Clone, Default)]
pub struct SharedValue(Arc<RwLock<serde_json::Value>>);

impl SharedValue {
    pub fn new(value: serde_json::Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Deep copy of the current document.
    pub fn snapshot(&self) -> serde_json::Value {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate the document in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut serde_json::Value) -> R) -> R {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Whether both handles point at the same document.
    pub fn ptr_eq(&self, other: &SharedValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<serde_json::Value> for SharedValue {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}
