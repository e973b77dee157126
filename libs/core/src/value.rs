use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A protocol value carried by a primitive topic
///
/// Arrays are homogeneous by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    BooleanArray(Vec<bool>),
    IntegerArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
}

impl Value {
    /// The wire type tag matching this value's variant
    pub fn wire_type(&self) -> WireType {
        match self {
            Value::Boolean(_) => WireType::Boolean,
            Value::Integer(_) => WireType::Integer,
            Value::Double(_) => WireType::Double,
            Value::String(_) => WireType::String,
            Value::BooleanArray(_) => WireType::BooleanArray,
            Value::IntegerArray(_) => WireType::IntegerArray,
            Value::DoubleArray(_) => WireType::DoubleArray,
            Value::StringArray(_) => WireType::StringArray,
        }
    }

    pub fn is_array(&self) -> bool {
        self.wire_type().is_array()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Value::BooleanArray(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::IntegerArray(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::DoubleArray(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StringArray(v)
    }
}

/// Type tag announced for a topic
///
/// Renders to and parses from the protocol's type strings
/// (`"double"`, `"int[]"`, `"struct:Pose2d"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    Boolean,
    Integer,
    Double,
    String,
    BooleanArray,
    IntegerArray,
    DoubleArray,
    StringArray,
    /// Structured value encoded by a registered codec
    Struct(String),
}

impl WireType {
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            WireType::BooleanArray
                | WireType::IntegerArray
                | WireType::DoubleArray
                | WireType::StringArray
        )
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, WireType::Struct(_))
    }

    /// Element tag of an array type, or the type itself for scalars
    pub fn element(&self) -> WireType {
        match self {
            WireType::BooleanArray => WireType::Boolean,
            WireType::IntegerArray => WireType::Integer,
            WireType::DoubleArray => WireType::Double,
            WireType::StringArray => WireType::String,
            other => other.clone(),
        }
    }

    /// Array tag for a scalar element type, or the type itself otherwise
    pub fn array_of(&self) -> WireType {
        match self {
            WireType::Boolean => WireType::BooleanArray,
            WireType::Integer => WireType::IntegerArray,
            WireType::Double => WireType::DoubleArray,
            WireType::String => WireType::StringArray,
            other => other.clone(),
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireType::Boolean => f.write_str("boolean"),
            WireType::Integer => f.write_str("int"),
            WireType::Double => f.write_str("double"),
            WireType::String => f.write_str("string"),
            WireType::BooleanArray => f.write_str("boolean[]"),
            WireType::IntegerArray => f.write_str("int[]"),
            WireType::DoubleArray => f.write_str("double[]"),
            WireType::StringArray => f.write_str("string[]"),
            WireType::Struct(type_id) => write!(f, "struct:{}", type_id),
        }
    }
}

impl FromStr for WireType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tag = match s {
            "boolean" => WireType::Boolean,
            "int" => WireType::Integer,
            "double" => WireType::Double,
            "string" => WireType::String,
            "boolean[]" => WireType::BooleanArray,
            "int[]" => WireType::IntegerArray,
            "double[]" => WireType::DoubleArray,
            "string[]" => WireType::StringArray,
            other => match other.strip_prefix("struct:") {
                Some(type_id) if !type_id.is_empty() => WireType::Struct(type_id.to_string()),
                _ => return Err(Error::UnknownWireType(other.to_string())),
            },
        };
        Ok(tag)
    }
}

/// What travels through a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Value(Value),
    /// Codec-encoded bytes of a struct topic
    Struct { type_id: String, bytes: Vec<u8> },
}

impl Payload {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::Value(v) => Some(v),
            Payload::Struct { .. } => None,
        }
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            Payload::Value(v) => v.wire_type(),
            Payload::Struct { type_id, .. } => WireType::Struct(type_id.clone()),
        }
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Value(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Publish,
    Subscribe,
}

/// A named channel with a fixed wire type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub path: String,
    pub direction: Direction,
    pub wire_type: WireType,
}

impl Topic {
    pub fn publish(path: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            path: path.into(),
            direction: Direction::Publish,
            wire_type,
        }
    }

    pub fn subscribe(path: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            path: path.into(),
            direction: Direction::Subscribe,
            wire_type,
        }
    }
}
