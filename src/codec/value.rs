//! The value codec: one typed value to or from one engine slot.
//!
//! [`Value`] is the closed set of kinds the codec understands. Every kind maps
//! onto one of the engine's five storage classes:
//!
//! | kind                     | stored as                                 |
//! |--------------------------|-------------------------------------------|
//! | `Bool`                   | INTEGER, see [`BoolEncoding`]             |
//! | `I8` … `I64`, `U8` … `U64` | INTEGER (64-bit)                        |
//! | `F32`, `F64`             | REAL                                      |
//! | `Text`                   | TEXT                                      |
//! | `Blob`                   | BLOB                                      |
//! | `Timestamp`              | TEXT, `yyyyMMddHHmmss.SSS` UTC            |
//! | `Archive`                | BLOB holding a serialized compound value  |

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::config::BoolEncoding;
use crate::error::{Error, Result};

use super::timestamp::{format_timestamp, parse_timestamp, Timestamp};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// A compound value already serialized into the archive format.
    Archive(Vec<u8>),
}

/// The decode target requested from a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Text,
    Blob,
    Timestamp,
    Archive,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Bool => "bool",
            Kind::I8 => "i8",
            Kind::I16 => "i16",
            Kind::I32 => "i32",
            Kind::I64 => "i64",
            Kind::U8 => "u8",
            Kind::U16 => "u16",
            Kind::U32 => "u32",
            Kind::U64 => "u64",
            Kind::F32 => "f32",
            Kind::F64 => "f64",
            Kind::Text => "text",
            Kind::Blob => "blob",
            Kind::Timestamp => "timestamp",
            Kind::Archive => "archive",
        };
        f.write_str(name)
    }
}

impl Value {
    /// The kind this value decodes back as, `None` for `Null`.
    pub fn kind(&self) -> Option<Kind> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => Kind::Bool,
            Value::I8(_) => Kind::I8,
            Value::I16(_) => Kind::I16,
            Value::I32(_) => Kind::I32,
            Value::I64(_) => Kind::I64,
            Value::U8(_) => Kind::U8,
            Value::U16(_) => Kind::U16,
            Value::U32(_) => Kind::U32,
            Value::U64(_) => Kind::U64,
            Value::F32(_) => Kind::F32,
            Value::F64(_) => Kind::F64,
            Value::Text(_) => Kind::Text,
            Value::Blob(_) => Kind::Blob,
            Value::Timestamp(_) => Kind::Timestamp,
            Value::Archive(_) => Kind::Archive,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// ============================================================================
// Encode
// ============================================================================

/// Convert a value into the engine value bound to one parameter slot.
pub fn encode(value: &Value, bools: BoolEncoding) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(bools.encode(*b)),
        Value::I8(v) => SqlValue::Integer(i64::from(*v)),
        Value::I16(v) => SqlValue::Integer(i64::from(*v)),
        Value::I32(v) => SqlValue::Integer(i64::from(*v)),
        Value::I64(v) => SqlValue::Integer(*v),
        Value::U8(v) => SqlValue::Integer(i64::from(*v)),
        Value::U16(v) => SqlValue::Integer(i64::from(*v)),
        Value::U32(v) => SqlValue::Integer(i64::from(*v)),
        Value::U64(v) => SqlValue::Integer(i64::try_from(*v).map_err(|_| {
            Error::encode(format!("{v} exceeds the signed 64-bit integer range"))
        })?),
        Value::F32(v) => SqlValue::Real(f64::from(*v)),
        Value::F64(v) => SqlValue::Real(*v),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) | Value::Archive(b) => SqlValue::Blob(b.clone()),
        Value::Timestamp(t) => SqlValue::Text(format_timestamp(t)),
    })
}

// ============================================================================
// Decode
// ============================================================================

/// Read one engine value as `kind`.
///
/// NULL never decodes; callers check for it first.
pub fn decode(raw: ValueRef<'_>, kind: Kind) -> Result<Value> {
    if let ValueRef::Null = raw {
        return Err(Error::decode(format!("NULL cannot be read as {kind}")));
    }
    match kind {
        Kind::Bool => match raw {
            ValueRef::Integer(i) => Ok(Value::Bool(i != 0)),
            ValueRef::Real(f) => Ok(Value::Bool(f != 0.0)),
            other => Err(mismatch(other, kind)),
        },
        Kind::I8 => narrow(integer(raw, kind)?, kind).map(Value::I8),
        Kind::I16 => narrow(integer(raw, kind)?, kind).map(Value::I16),
        Kind::I32 => narrow(integer(raw, kind)?, kind).map(Value::I32),
        Kind::I64 => integer(raw, kind).map(Value::I64),
        Kind::U8 => narrow(integer(raw, kind)?, kind).map(Value::U8),
        Kind::U16 => narrow(integer(raw, kind)?, kind).map(Value::U16),
        Kind::U32 => narrow(integer(raw, kind)?, kind).map(Value::U32),
        Kind::U64 => narrow(integer(raw, kind)?, kind).map(Value::U64),
        Kind::F32 => real(raw, kind).map(|f| Value::F32(f as f32)),
        Kind::F64 => real(raw, kind).map(Value::F64),
        Kind::Text => match raw {
            ValueRef::Text(bytes) => utf8(bytes).map(Value::Text),
            ValueRef::Integer(i) => Ok(Value::Text(i.to_string())),
            ValueRef::Real(f) => Ok(Value::Text(f.to_string())),
            other => Err(mismatch(other, kind)),
        },
        Kind::Blob => match raw {
            ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Ok(Value::Blob(bytes.to_vec())),
            other => Err(mismatch(other, kind)),
        },
        Kind::Timestamp => match raw {
            ValueRef::Text(bytes) => parse_timestamp(&utf8(bytes)?).map(Value::Timestamp),
            // Rows written by the numeric binding hold the same digits as a number.
            ValueRef::Real(f) => parse_timestamp(&format!("{f:.3}")).map(Value::Timestamp),
            ValueRef::Integer(i) => parse_timestamp(&format!("{i}.000")).map(Value::Timestamp),
            other => Err(mismatch(other, kind)),
        },
        Kind::Archive => archive_bytes(raw).map(Value::Archive),
    }
}

/// The raw bytes of an archived compound value.
pub(crate) fn archive_bytes(raw: ValueRef<'_>) -> Result<Vec<u8>> {
    match raw {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Ok(bytes.to_vec()),
        other => Err(mismatch(other, Kind::Archive)),
    }
}

fn integer(raw: ValueRef<'_>, kind: Kind) -> Result<i64> {
    match raw {
        ValueRef::Integer(i) => Ok(i),
        ValueRef::Real(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(f as i64)
        }
        other => Err(mismatch(other, kind)),
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, kind: Kind) -> Result<T> {
    T::try_from(value).map_err(|_| Error::decode(format!("{value} is out of range for {kind}")))
}

fn real(raw: ValueRef<'_>, kind: Kind) -> Result<f64> {
    match raw {
        ValueRef::Real(f) => Ok(f),
        ValueRef::Integer(i) => Ok(i as f64),
        other => Err(mismatch(other, kind)),
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| Error::decode(format!("text is not valid UTF-8: {e}")))
}

fn mismatch(raw: ValueRef<'_>, kind: Kind) -> Error {
    Error::decode(format!("{} value cannot be read as {kind}", raw.data_type()))
}

// ============================================================================
// Conversions
// ============================================================================

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Text,
    Vec<u8> => Blob,
    DateTime<Utc> => Timestamp,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// serde
// ============================================================================

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::I8(v) => serializer.serialize_i8(*v),
            Value::I16(v) => serializer.serialize_i16(*v),
            Value::I32(v) => serializer.serialize_i32(*v),
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::U8(v) => serializer.serialize_u8(*v),
            Value::U16(v) => serializer.serialize_u16(*v),
            Value::U32(v) => serializer.serialize_u32(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::F32(v) => serializer.serialize_f32(*v),
            Value::F64(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Blob(v) | Value::Archive(v) => serializer.serialize_bytes(v),
            Value::Timestamp(v) => Timestamp(*v).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a scalar column value")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Value, D::Error> {
                Value::deserialize(d)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
                Ok(Value::I64(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
                Ok(Value::U64(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
                Ok(Value::F64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
                Ok(Value::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
                Ok(Value::Text(v))
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Value, E> {
                Ok(Value::Blob(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Value, E> {
                Ok(Value::Blob(v))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

/// A decoded value hands itself to a visitor, the way `serde_json::Value` does.
impl<'de> Deserializer<'de> for Value {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Value::Null => visitor.visit_unit(),
            Value::Bool(v) => visitor.visit_bool(v),
            Value::I8(v) => visitor.visit_i8(v),
            Value::I16(v) => visitor.visit_i16(v),
            Value::I32(v) => visitor.visit_i32(v),
            Value::I64(v) => visitor.visit_i64(v),
            Value::U8(v) => visitor.visit_u8(v),
            Value::U16(v) => visitor.visit_u16(v),
            Value::U32(v) => visitor.visit_u32(v),
            Value::U64(v) => visitor.visit_u64(v),
            Value::F32(v) => visitor.visit_f32(v),
            Value::F64(v) => visitor.visit_f64(v),
            Value::Text(v) => visitor.visit_string(v),
            Value::Blob(v) | Value::Archive(v) => visitor.visit_byte_buf(v),
            Value::Timestamp(v) => visitor.visit_string(format_timestamp(&v)),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct enum
        identifier ignored_any
    }
}
