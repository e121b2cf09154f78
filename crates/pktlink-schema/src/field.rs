use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::value::Value;

/// Wire type of a single schema field.
///
/// Every type has a fixed width; multi-byte values are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// One byte; any nonzero value decodes as `true`.
    Bool,
    /// Fixed-length byte string, zero-padded on encode.
    Bytes(usize),
}

impl FieldType {
    /// Encoded width in bytes.
    pub fn width(&self) -> usize {
        match self {
            FieldType::I8 | FieldType::U8 | FieldType::Bool => 1,
            FieldType::I16 | FieldType::U16 => 2,
            FieldType::I32 | FieldType::U32 | FieldType::F32 => 4,
            FieldType::I64 | FieldType::U64 | FieldType::F64 => 8,
            FieldType::Bytes(len) => *len,
        }
    }

    /// Boundary the field starts on under [`Layout::Native`].
    pub fn alignment(&self) -> usize {
        match self {
            FieldType::Bool | FieldType::Bytes(_) => 1,
            other => other.width(),
        }
    }

    /// The value a freshly declared field holds.
    pub fn zero(&self) -> Value {
        match self {
            FieldType::I8 | FieldType::I16 | FieldType::I32 | FieldType::I64 => Value::Int(0),
            FieldType::U8 | FieldType::U16 | FieldType::U32 | FieldType::U64 => Value::UInt(0),
            FieldType::F32 => Value::F32(0.0),
            FieldType::F64 => Value::F64(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::Bytes(len) => Value::Bytes(Bytes::from(vec![0u8; *len])),
        }
    }

    /// Append `value` to `dst` in this type's encoding.
    ///
    /// On error nothing is written and the reason is returned.
    pub fn encode(&self, value: &Value, dst: &mut BytesMut) -> std::result::Result<(), String> {
        match (self, value) {
            (FieldType::F32, Value::F32(v)) => dst.put_f32_le(*v),
            (FieldType::F32, Value::F64(v)) => {
                let narrowed = *v as f32;
                if v.is_finite() && !narrowed.is_finite() {
                    return Err(format!("{v} overflows f32"));
                }
                dst.put_f32_le(narrowed);
            }
            (FieldType::F64, Value::F32(v)) => dst.put_f64_le(f64::from(*v)),
            (FieldType::F64, Value::F64(v)) => dst.put_f64_le(*v),
            (FieldType::Bool, Value::Bool(v)) => dst.put_u8(u8::from(*v)),
            (FieldType::Bytes(len), Value::Bytes(bytes)) => {
                if bytes.len() > *len {
                    return Err(format!("{} bytes do not fit in {len}", bytes.len()));
                }
                dst.put_slice(bytes);
                dst.put_bytes(0, len - bytes.len());
            }
            (ty, Value::Int(_) | Value::UInt(_)) if ty.is_integer() => {
                let wide = value
                    .as_i128()
                    .ok_or_else(|| format!("expected {ty}, got {}", value.kind()))?;
                let (min, max) = ty.range();
                if wide < min || wide > max {
                    return Err(format!("{wide} is out of range for {ty}"));
                }
                // Two's complement little-endian, truncated to the field width.
                dst.put_slice(&wide.to_le_bytes()[..ty.width()]);
            }
            (ty, value) => return Err(format!("expected {ty}, got {}", value.kind())),
        }
        Ok(())
    }

    /// Decode exactly `self.width()` bytes into the canonical value.
    pub fn decode(&self, src: &[u8]) -> Value {
        match self {
            FieldType::I8 => Value::Int(i64::from(src[0] as i8)),
            FieldType::U8 => Value::UInt(u64::from(src[0])),
            FieldType::I16 => Value::Int(i64::from(i16::from_le_bytes([src[0], src[1]]))),
            FieldType::U16 => Value::UInt(u64::from(u16::from_le_bytes([src[0], src[1]]))),
            FieldType::I32 => Value::Int(i64::from(i32::from_le_bytes(array(src)))),
            FieldType::U32 => Value::UInt(u64::from(u32::from_le_bytes(array(src)))),
            FieldType::I64 => Value::Int(i64::from_le_bytes(array(src))),
            FieldType::U64 => Value::UInt(u64::from_le_bytes(array(src))),
            FieldType::F32 => Value::F32(f32::from_le_bytes(array(src))),
            FieldType::F64 => Value::F64(f64::from_le_bytes(array(src))),
            FieldType::Bool => Value::Bool(src[0] != 0),
            FieldType::Bytes(len) => Value::Bytes(Bytes::copy_from_slice(&src[..*len])),
        }
    }

    fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::I8
                | FieldType::U8
                | FieldType::I16
                | FieldType::U16
                | FieldType::I32
                | FieldType::U32
                | FieldType::I64
                | FieldType::U64
        )
    }

    fn range(&self) -> (i128, i128) {
        match self {
            FieldType::I8 => (i8::MIN.into(), i8::MAX.into()),
            FieldType::U8 => (0, u8::MAX.into()),
            FieldType::I16 => (i16::MIN.into(), i16::MAX.into()),
            FieldType::U16 => (0, u16::MAX.into()),
            FieldType::I32 => (i32::MIN.into(), i32::MAX.into()),
            FieldType::U32 => (0, u32::MAX.into()),
            FieldType::I64 => (i64::MIN.into(), i64::MAX.into()),
            FieldType::U64 => (0, u64::MAX.into()),
            _ => (0, 0),
        }
    }
}

fn array<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&src[..N]);
    out
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::I8 => f.write_str("i8"),
            FieldType::U8 => f.write_str("u8"),
            FieldType::I16 => f.write_str("i16"),
            FieldType::U16 => f.write_str("u16"),
            FieldType::I32 => f.write_str("i32"),
            FieldType::U32 => f.write_str("u32"),
            FieldType::I64 => f.write_str("i64"),
            FieldType::U64 => f.write_str("u64"),
            FieldType::F32 => f.write_str("f32"),
            FieldType::F64 => f.write_str("f64"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Bytes(len) => write!(f, "bytes:{len}"),
        }
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s {
            "i8" => FieldType::I8,
            "u8" => FieldType::U8,
            "i16" => FieldType::I16,
            "u16" => FieldType::U16,
            "i32" => FieldType::I32,
            "u32" => FieldType::U32,
            "i64" => FieldType::I64,
            "u64" => FieldType::U64,
            "f32" => FieldType::F32,
            "f64" => FieldType::F64,
            "bool" => FieldType::Bool,
            other => {
                let len = other
                    .strip_prefix("bytes:")
                    .and_then(|len| len.parse::<usize>().ok())
                    .ok_or_else(|| SchemaError::UnknownType(other.to_string()))?;
                FieldType::Bytes(len)
            }
        };
        Ok(ty)
    }
}

/// How fields are placed within a payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Fields back to back with no padding.
    #[default]
    Packed,
    /// Each field starts on a multiple of its alignment, like a C struct.
    /// No trailing padding is added.
    Native,
}

impl Layout {
    /// Offset of a field of type `ty` appended after `end` bytes.
    pub fn place(&self, end: usize, ty: FieldType) -> usize {
        match self {
            Layout::Packed => end,
            Layout::Native => end.next_multiple_of(ty.alignment()),
        }
    }
}

/// A parsed struct-format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub layout: Layout,
    pub fields: Vec<FieldType>,
}

/// Parse a compact struct-format string such as `"iIcf12sd"`.
///
/// Codes: `b B h H i I l L q Q f d ? c s`, where `c` is a one-byte string and
/// `Ns` is an N-byte string. A count before any other code repeats it.
///
/// With no prefix or `@`, fields are natively aligned and `l`/`L` take the
/// width of the platform `long`. With `<` or `=`, fields are packed and
/// `l`/`L` are 4 bytes. Values are little-endian either way.
pub fn parse_format(format: &str) -> Result<Format> {
    let (layout, body) = match format.chars().next() {
        Some('<') | Some('=') => (Layout::Packed, &format[1..]),
        Some('@') => (Layout::Native, &format[1..]),
        _ => (Layout::Native, format),
    };
    let native_long = layout == Layout::Native && std::mem::size_of::<std::ffi::c_long>() == 8;

    let mut fields = Vec::new();
    let mut count: Option<usize> = None;

    for ch in body.chars() {
        if ch.is_whitespace() {
            continue;
        }
        if let Some(digit) = ch.to_digit(10) {
            let next = count
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|c| c.checked_add(digit as usize))
                .ok_or_else(|| SchemaError::InvalidFormat(format.to_string()))?;
            count = Some(next);
            continue;
        }

        let ty = match ch {
            'b' => FieldType::I8,
            'B' => FieldType::U8,
            'h' => FieldType::I16,
            'H' => FieldType::U16,
            'i' => FieldType::I32,
            'I' => FieldType::U32,
            'l' if native_long => FieldType::I64,
            'L' if native_long => FieldType::U64,
            'l' => FieldType::I32,
            'L' => FieldType::U32,
            'q' => FieldType::I64,
            'Q' => FieldType::U64,
            'f' => FieldType::F32,
            'd' => FieldType::F64,
            '?' => FieldType::Bool,
            'c' => FieldType::Bytes(1),
            's' => {
                fields.push(FieldType::Bytes(count.take().unwrap_or(1)));
                continue;
            }
            _ => return Err(SchemaError::InvalidFormat(format.to_string())),
        };
        let repeat = count.take().unwrap_or(1);
        fields.extend(std::iter::repeat(ty).take(repeat));
    }

    if count.is_some() {
        return Err(SchemaError::InvalidFormat(format.to_string()));
    }
    Ok(Format { layout, fields })
}
