use std::fmt;

use bytes::Bytes;

use crate::error::{Result, SchemaError};
use crate::field::FieldType;

/// A field value.
///
/// Integers travel in two lanes (`Int`, `UInt`); either lane may be stored
/// into any integer field whose range holds it. Decoding always produces the
/// lane matching the field's signedness.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    UInt(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Bytes(Bytes),
}

impl Value {
    /// Short variant name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
        }
    }

    pub(crate) fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(i128::from(*v)),
            Value::UInt(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// Render as JSON.
    ///
    /// Byte strings become text when they are UTF-8 once trailing NULs are
    /// dropped, and an array of numbers otherwise. Non-finite floats become
    /// `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(v) => serde_json::Value::from(*v),
            Value::UInt(v) => serde_json::Value::from(*v),
            Value::F32(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::F64(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Bytes(bytes) => match std::str::from_utf8(trim_nul(bytes)) {
                Ok(text) => serde_json::Value::String(text.to_string()),
                Err(_) => serde_json::Value::from(bytes.to_vec()),
            },
        }
    }

    /// Convert JSON into a value suited to `ty`.
    ///
    /// Only the JSON shape is checked here; range and width checks happen
    /// when the value is encoded.
    pub fn from_json(ty: FieldType, json: &serde_json::Value) -> Result<Self> {
        let mismatch = || SchemaError::Encoding {
            field: ty.to_string(),
            reason: format!("cannot read {json} as {ty}"),
        };

        let value = match ty {
            FieldType::F32 | FieldType::F64 => Value::F64(json.as_f64().ok_or_else(mismatch)?),
            FieldType::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
            FieldType::Bytes(_) => match json {
                serde_json::Value::String(text) => Value::from(text.as_str()),
                serde_json::Value::Array(items) => {
                    let bytes = items
                        .iter()
                        .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                        .collect::<Option<Vec<u8>>>()
                        .ok_or_else(mismatch)?;
                    Value::Bytes(Bytes::from(bytes))
                }
                _ => return Err(mismatch()),
            },
            _ => {
                if let Some(v) = json.as_u64() {
                    Value::UInt(v)
                } else if let Some(v) = json.as_i64() {
                    Value::Int(v)
                } else {
                    return Err(mismatch());
                }
            }
        };
        Ok(value)
    }

    /// Parse command-line text into a value suited to `ty`.
    pub fn parse(ty: FieldType, text: &str) -> Result<Self> {
        let mismatch = || SchemaError::Encoding {
            field: ty.to_string(),
            reason: format!("cannot parse {text:?} as {ty}"),
        };

        let value = match ty {
            FieldType::F32 | FieldType::F64 => {
                Value::F64(text.trim().parse::<f64>().map_err(|_| mismatch())?)
            }
            FieldType::Bool => match text.trim() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(mismatch()),
            },
            FieldType::Bytes(_) => Value::from(text),
            _ => {
                let text = text.trim();
                if let Ok(v) = text.parse::<u64>() {
                    Value::UInt(v)
                } else {
                    Value::Int(text.parse::<i64>().map_err(|_| mismatch())?)
                }
            }
        };
        Ok(value)
    }
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Floats compare by bit pattern, so `NaN == NaN` and `0.0 != -0.0`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Bytes(bytes) => match std::str::from_utf8(trim_nul(bytes)) {
                Ok(text) => write!(f, "{text:?}"),
                Err(_) => write!(f, "{:02x?}", bytes.as_ref()),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(u64::from(v))
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UInt(u64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v.as_bytes()))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}
