use std::collections::BTreeMap;
use std::fmt;

use crate::error::XmlRpcError;

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    /// `dateTime.iso8601`, kept verbatim.
    DateTime(String),
    Base64(Vec<u8>),
    Struct(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Nil,
}

impl Value {
    /// Returns the XML-RPC type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Double(_) => "double",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::Nil => "nil",
        }
    }

    /// Returns a struct member by name, or `None` for missing members and non-structs.
    pub fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.get(name),
            _ => None,
        }
    }

    /// Removes and converts a required struct member.
    pub fn take_member<T: FromValue>(&mut self, name: &str) -> Result<T, XmlRpcError> {
        let Value::Struct(members) = self else {
            return Err(XmlRpcError::Type(format!(
                "expected struct with member '{name}', got {}",
                self.type_name()
            )));
        };
        let value = members
            .remove(name)
            .ok_or_else(|| XmlRpcError::Type(format!("missing struct member '{name}'")))?;
        T::from_value(value)
            .map_err(|e| XmlRpcError::Type(format!("struct member '{name}': {e}")))
    }

    /// Removes and converts an optional struct member. `nil` counts as absent.
    pub fn take_optional<T: FromValue>(&mut self, name: &str) -> Result<Option<T>, XmlRpcError> {
        match self {
            Value::Struct(members) => match members.remove(name) {
                None | Some(Value::Nil) => Ok(None),
                Some(value) => T::from_value(value)
                    .map(Some)
                    .map_err(|e| XmlRpcError::Type(format!("struct member '{name}': {e}"))),
            },
            _ => Err(XmlRpcError::Type(format!(
                "expected struct with member '{name}', got {}",
                self.type_name()
            ))),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) | Value::DateTime(s) => write!(f, "{s:?}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Base64(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Struct(members) => write!(f, "{{{} members}}", members.len()),
            Value::Array(items) => write!(f, "[{} items]", items.len()),
            Value::Nil => write!(f, "nil"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Conversion from a decoded [`Value`] into a typed result.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, XmlRpcError>;
}

fn mismatch(expected: &str, got: &Value) -> XmlRpcError {
    XmlRpcError::Type(format!("expected {expected}, got {}", got.type_name()))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| XmlRpcError::Type(format!("{wide} does not fit in i32")))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch("array", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
