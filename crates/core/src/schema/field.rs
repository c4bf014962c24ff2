//! Field definitions and type-directed value coercion

use crate::error::{Error, Result};
use crate::time::{TimeId, Timestamp};
use crate::value::{parse_hex_literal, Value};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Primitive column type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// ASCII text
    Ascii,
    /// UTF-8 text
    Varchar,
    /// UTF-8 text
    Text,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Bigint,
    /// Arbitrary precision integer (held as i64)
    Varint,
    /// Counter column
    Counter,
    /// Boolean
    Boolean,
    /// Decimal (held as f64)
    Decimal,
    /// 64-bit float
    Double,
    /// 32-bit float
    Float,
    /// Binary blob
    Blob,
    /// Point in time
    Timestamp,
    /// Unique identifier
    Uuid,
    /// Time-ordered unique identifier
    Timeuuid,
}

impl FieldType {
    /// CQL type name used in table definitions
    pub fn cql_name(&self) -> &'static str {
        match self {
            FieldType::Ascii => "ascii",
            FieldType::Varchar => "varchar",
            FieldType::Text => "text",
            FieldType::Int => "int",
            FieldType::Bigint => "bigint",
            FieldType::Varint => "varint",
            FieldType::Counter => "counter",
            FieldType::Boolean => "boolean",
            FieldType::Decimal => "decimal",
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Blob => "blob",
            FieldType::Timestamp => "timestamp",
            FieldType::Uuid => "uuid",
            FieldType::Timeuuid => "timeuuid",
        }
    }

    /// Whether inlined literals of this type are single-quoted
    pub fn is_quoted(&self) -> bool {
        matches!(
            self,
            FieldType::Ascii | FieldType::Varchar | FieldType::Text | FieldType::Timestamp
        )
    }

    /// Zero value of this type, used to compile statement templates
    pub fn empty_value(&self) -> Value {
        match self {
            FieldType::Ascii | FieldType::Varchar | FieldType::Text => Value::String(String::new()),
            FieldType::Int | FieldType::Bigint | FieldType::Varint | FieldType::Counter => Value::Int(0),
            FieldType::Boolean => Value::Bool(false),
            FieldType::Decimal | FieldType::Double | FieldType::Float => Value::Float(0.0),
            FieldType::Blob => Value::Bytes(Vec::new()),
            FieldType::Timestamp => Value::Timestamp(Timestamp::from_secs(0)),
            FieldType::Uuid => Value::Uuid(Uuid::nil()),
            FieldType::Timeuuid => Value::from(TimeId::now()),
        }
    }

    /// Whether values of this type embed a time usable for sharding
    pub fn is_time_ordered(&self) -> bool {
        matches!(self, FieldType::Timeuuid | FieldType::Timestamp)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cql_name())
    }
}

/// A named, typed field of an object definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field (column) name
    pub name: String,
    /// Column type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Every insert must supply this field
    #[serde(default)]
    pub required: bool,
}

impl Field {
    /// Optional field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Field {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    /// Mark the field as required on insert
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Convert a loosely typed value into this field's canonical variant.
    ///
    /// Strings are parsed into numbers, booleans, ids, timestamps and blobs;
    /// integers become timestamps (epoch millis) or floats where the type
    /// asks for it. `Null` always passes through.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let actual = value.type_name();
        let coerced = match self.field_type {
            FieldType::Ascii | FieldType::Varchar | FieldType::Text => match value {
                Value::String(s) => Some(Value::String(s)),
                Value::Int(i) => Some(Value::String(i.to_string())),
                Value::Float(f) => Some(Value::String(f.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                Value::Uuid(u) => Some(Value::String(u.to_string())),
                _ => None,
            },
            FieldType::Int
            | FieldType::Bigint
            | FieldType::Varint
            | FieldType::Counter => match value {
                Value::Int(i) => Some(Value::Int(i)),
                Value::Float(f) if f.fract() == 0.0 => Some(Value::Int(f as i64)),
                Value::String(ref s) => s.trim().parse::<i64>().ok().map(Value::Int),
                _ => None,
            },
            FieldType::Boolean => match value {
                Value::Bool(b) => Some(Value::Bool(b)),
                Value::Int(0) => Some(Value::Bool(false)),
                Value::Int(1) => Some(Value::Bool(true)),
                Value::String(ref s) => match s.trim() {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            FieldType::Decimal | FieldType::Double | FieldType::Float => match value {
                Value::Float(f) => Some(Value::Float(f)),
                Value::Int(i) => Some(Value::Float(i as f64)),
                Value::String(ref s) => s.trim().parse::<f64>().ok().map(Value::Float),
                _ => None,
            },
            FieldType::Blob => match value {
                Value::Bytes(b) => Some(Value::Bytes(b)),
                Value::String(ref s) => parse_hex_literal(s).map(Value::Bytes),
                _ => None,
            },
            FieldType::Timestamp => match value {
                Value::Timestamp(t) => Some(Value::Timestamp(t)),
                Value::Int(ms) if ms >= 0 => Some(Value::Timestamp(Timestamp::from_millis(ms as u64))),
                Value::String(ref s) => parse_timestamp(s).map(Value::Timestamp),
                _ => None,
            },
            FieldType::Uuid => match value {
                Value::Uuid(u) => Some(Value::Uuid(u)),
                Value::String(ref s) => Uuid::parse_str(s.trim()).ok().map(Value::Uuid),
                _ => None,
            },
            FieldType::Timeuuid => {
                let uuid = match value {
                    Value::Uuid(u) => Some(u),
                    Value::String(ref s) => Uuid::parse_str(s.trim()).ok(),
                    _ => None,
                };
                uuid.and_then(TimeId::from_uuid).map(Value::from)
            }
        };
        coerced.ok_or_else(|| {
            Error::invalid_value(&self.name, self.field_type.cql_name(), actual)
        })
    }
}

/// Epoch milliseconds or an RFC 3339 date-time
fn parse_timestamp(s: &str) -> Option<Timestamp> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Some(Timestamp::from_millis(ms));
    }
    let parsed = DateTime::parse_from_rfc3339(s).ok()?;
    let micros = parsed.timestamp_micros();
    (micros >= 0).then(|| Timestamp::from_micros(micros as u64))
}
