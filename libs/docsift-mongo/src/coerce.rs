//! Value coercion: canonical tree values → BSON, identifier casting, date
//! parsing and regex escaping for `like` patterns.

use bson::Bson;
use bson::oid::ObjectId;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use docsift::Value;

use crate::CompileError;

/// True when the string has the exact shape of an ObjectId (24 hex chars).
#[must_use]
pub fn looks_like_object_id(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Convert a sanitized value to BSON without identifier coercion.
pub(crate) fn to_bson(v: &Value) -> Bson {
    match v {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else {
                // u64 beyond i64 range ends up here too; precision loss is
                // acceptable for a filter bound.
                Bson::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
    }
}

/// Convert a sanitized value to BSON, casting identifier-shaped strings to
/// `ObjectId` when `cast_ids` is set. Strings that do not look like an
/// identifier pass through untouched so the store can reject them naturally.
pub(crate) fn to_bson_cast(v: &Value, cast_ids: bool) -> Bson {
    if !cast_ids {
        return to_bson(v);
    }
    match v {
        Value::String(s) if looks_like_object_id(s) => match ObjectId::parse_str(s) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => Bson::String(s.clone()),
        },
        Value::Array(items) => Bson::Array(items.iter().map(|i| to_bson_cast(i, true)).collect()),
        other => to_bson(other),
    }
}

/// Parse a date operand for the `>date` / `<date` operators.
///
/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
///
/// # Errors
/// Returns [`CompileError::InvalidDate`] for non-string operands and
/// unparseable strings.
pub fn parse_date(v: &Value) -> Result<bson::DateTime, CompileError> {
    let Value::String(s) = v else {
        return Err(CompileError::InvalidDate(v.to_string()));
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(bson::DateTime::from_chrono(dt.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = date.and_time(NaiveTime::MIN).and_utc();
        return Ok(bson::DateTime::from_chrono(midnight));
    }
    Err(CompileError::InvalidDate(s.clone()))
}

/// Build the case-insensitive contains pattern for `like`, escaping every
/// regex metacharacter so the operand is matched literally.
#[must_use]
pub fn like_pattern(operand: &str) -> String {
    regex::escape(operand)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn object_id_shape_check() {
        assert!(looks_like_object_id("507f1f77bcf86cd799439011"));
        assert!(!looks_like_object_id("507f1f77bcf86cd79943901")); // 23 chars
        assert!(!looks_like_object_id("507f1f77bcf86cd79943901z")); // non-hex
        assert!(!looks_like_object_id("hello"));
    }

    #[test]
    fn cast_only_touches_identifier_shaped_strings() {
        let hex = Value::String("507f1f77bcf86cd799439011".to_owned());
        assert!(matches!(to_bson_cast(&hex, true), Bson::ObjectId(_)));
        assert_eq!(to_bson_cast(&hex, false), Bson::String("507f1f77bcf86cd799439011".to_owned()));

        let plain = Value::String("not-an-id".to_owned());
        assert_eq!(to_bson_cast(&plain, true), Bson::String("not-an-id".to_owned()));
    }

    #[test]
    fn numbers_map_to_int64_or_double() {
        assert_eq!(to_bson(&Value::Number(42.into())), Bson::Int64(42));
        let f = Value::Number(serde_json::Number::from_f64(1.5).unwrap());
        assert_eq!(to_bson(&f), Bson::Double(1.5));
    }

    #[test]
    fn date_parsing_accepts_rfc3339_and_plain_dates() {
        assert!(parse_date(&Value::String("2024-01-02T03:04:05Z".to_owned())).is_ok());
        assert!(parse_date(&Value::String("2024-01-02".to_owned())).is_ok());
        assert!(matches!(
            parse_date(&Value::String("yesterday".to_owned())),
            Err(CompileError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_date(&Value::Number(5.into())),
            Err(CompileError::InvalidDate(_))
        ));
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("a.b"), "a\\.b");
        assert_eq!(like_pattern("50% (off)"), "50% \\(off\\)");
        assert_eq!(like_pattern("plain"), "plain");
    }
}
