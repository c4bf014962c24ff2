//! Type-directed literal formatting
//!
//! Used only where a clause cannot be prepared and values are inlined into
//! the statement text. Text and timestamp fields are single-quoted; numeric,
//! boolean, identifier and blob values are not.

use chrono::{SecondsFormat, TimeZone, Utc};
use stratamap_core::{FieldType, Value};

/// Render `value` as a CQL literal for a column of `field_type`.
///
/// Without a declared type the value's own variant decides.
pub fn literal(field_type: Option<FieldType>, value: &Value) -> String {
    if value.is_null() {
        return "null".to_string();
    }
    let quoted = match field_type {
        Some(t) => t.is_quoted(),
        None => matches!(value, Value::String(_) | Value::Timestamp(_)),
    };
    let body = match value {
        Value::Timestamp(ts) => Utc
            .timestamp_millis_opt(ts.as_millis() as i64)
            .single()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| ts.as_millis().to_string()),
        other => other.to_string(),
    };
    if quoted {
        format!("'{}'", body.replace('\'', "''"))
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratamap_core::Timestamp;

    #[test]
    fn test_text_is_quoted_and_escaped() {
        assert_eq!(literal(Some(FieldType::Varchar), &Value::from("east")), "'east'");
        assert_eq!(literal(Some(FieldType::Text), &Value::from("o'neil")), "'o''neil'");
    }

    #[test]
    fn test_numbers_and_ids_are_bare() {
        assert_eq!(literal(Some(FieldType::Bigint), &Value::Int(777)), "777");
        let id = uuid::Uuid::new_v4();
        assert_eq!(literal(Some(FieldType::Uuid), &Value::Uuid(id)), id.to_string());
        assert_eq!(literal(None, &Value::Int(160)), "160");
    }

    #[test]
    fn test_timestamp_is_quoted_iso() {
        let ts = Value::Timestamp(Timestamp::from_millis(0));
        assert_eq!(literal(Some(FieldType::Timestamp), &ts), "'1970-01-01T00:00:00.000Z'");
    }

    #[test]
    fn test_null_literal() {
        assert_eq!(literal(Some(FieldType::Varchar), &Value::Null), "null");
    }
}
