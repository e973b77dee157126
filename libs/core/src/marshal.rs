//! Conversion between application values and protocol [`Value`]s.
//!
//! Application values are `serde_json::Value`s. Marshalling never fails:
//! shapes without a matching wire type degrade to their text form.

use serde_json::{Number, Value as Json};

use crate::value::{Value, WireType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Only lossless conversions (integer widening to double)
    Strict,
    /// Best effort: truncation and text conversion allowed
    Coerce,
}

/// Infer the wire type a topic should be created with for `native`
///
/// Arrays are typed by their first element; an empty array is `double[]`.
/// Anything without a primitive counterpart is `string`.
pub fn infer_wire_type(native: &Json) -> WireType {
    match native {
        Json::Array(items) => match items.first() {
            None => WireType::DoubleArray,
            Some(first) => scalar_type(first)
                .map(|t| t.array_of())
                .unwrap_or(WireType::StringArray),
        },
        other => scalar_type(other).unwrap_or(WireType::String),
    }
}

fn scalar_type(native: &Json) -> Option<WireType> {
    match native {
        Json::Bool(_) => Some(WireType::Boolean),
        Json::Number(n) if n.is_i64() => Some(WireType::Integer),
        Json::Number(_) => Some(WireType::Double),
        Json::String(_) => Some(WireType::String),
        _ => None,
    }
}

/// Encode an application value into exactly one protocol value
///
/// Arrays whose elements don't all convert to the first element's type are
/// encoded as a string array of each element's text form.
pub fn encode(native: &Json) -> Value {
    match native {
        Json::Array(items) => {
            let wire_type = infer_wire_type(native);
            convert_array(items.iter(), &wire_type.element(), Mode::Strict)
                .unwrap_or_else(|| Value::StringArray(items.iter().map(text).collect()))
        }
        other => match scalar_type(other) {
            Some(wire_type) => convert_scalar(other, &wire_type, Mode::Strict)
                .unwrap_or_else(|| Value::String(text(other))),
            None => Value::String(text(other)),
        },
    }
}

/// Encode an application value for a topic whose wire type is already fixed
///
/// Returns `None` when the value can't be coerced to `wire_type`
/// (e.g. a string published to an `int` topic).
pub fn encode_as(native: &Json, wire_type: &WireType) -> Option<Value> {
    match wire_type {
        WireType::Struct(_) => None,
        t if t.is_array() => match native {
            Json::Array(items) => convert_array(items.iter(), &t.element(), Mode::Coerce),
            scalar => convert_array(std::iter::once(scalar), &t.element(), Mode::Coerce),
        },
        t => match native {
            Json::Array(_) if *t == WireType::String => Some(Value::String(text(native))),
            Json::Array(_) => None,
            scalar => convert_scalar(scalar, t, Mode::Coerce),
        },
    }
}

/// Decode a protocol value into its application form
///
/// Non-finite doubles have no JSON representation and decode to `null`.
pub fn decode(value: &Value) -> Json {
    match value {
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        Value::Double(d) => double(*d),
        Value::String(s) => Json::String(s.clone()),
        Value::BooleanArray(items) => Json::Array(items.iter().map(|b| Json::Bool(*b)).collect()),
        Value::IntegerArray(items) => Json::Array(items.iter().map(|i| Json::from(*i)).collect()),
        Value::DoubleArray(items) => Json::Array(items.iter().map(|d| double(*d)).collect()),
        Value::StringArray(items) => {
            Json::Array(items.iter().map(|s| Json::String(s.clone())).collect())
        }
    }
}

fn double(d: f64) -> Json {
    Number::from_f64(d).map(Json::Number).unwrap_or(Json::Null)
}

/// Text form used by the string fallback
fn text(native: &Json) -> String {
    match native {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn convert_scalar(native: &Json, wire_type: &WireType, mode: Mode) -> Option<Value> {
    let value = match wire_type {
        WireType::Boolean => Value::Boolean(native.as_bool()?),
        WireType::Integer => Value::Integer(to_integer(native, mode)?),
        WireType::Double => Value::Double(native.as_f64()?),
        WireType::String => match (native, mode) {
            (Json::String(s), _) => Value::String(s.clone()),
            (other, Mode::Coerce) => Value::String(text(other)),
            (_, Mode::Strict) => return None,
        },
        _ => return None,
    };
    Some(value)
}

fn to_integer(native: &Json, mode: Mode) -> Option<i64> {
    if let Some(i) = native.as_i64() {
        return Some(i);
    }
    match mode {
        Mode::Strict => None,
        // `as` saturates at the i64 bounds
        Mode::Coerce => native.as_f64().filter(|d| d.is_finite()).map(|d| d.trunc() as i64),
    }
}

fn convert_array<'a>(
    items: impl Iterator<Item = &'a Json>,
    element: &WireType,
    mode: Mode,
) -> Option<Value> {
    let value = match element {
        WireType::Boolean => Value::BooleanArray(
            items
                .map(Json::as_bool)
                .collect::<Option<Vec<_>>>()?,
        ),
        WireType::Integer => Value::IntegerArray(
            items
                .map(|item| to_integer(item, mode))
                .collect::<Option<Vec<_>>>()?,
        ),
        WireType::Double => Value::DoubleArray(
            items
                .map(Json::as_f64)
                .collect::<Option<Vec<_>>>()?,
        ),
        WireType::String => Value::StringArray(
            items
                .map(|item| match (item, mode) {
                    (Json::String(s), _) => Some(s.clone()),
                    (other, Mode::Coerce) if !other.is_array() => Some(text(other)),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()?,
        ),
        _ => return None,
    };
    Some(value)
}
