//! Typed literal wrappers

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use mql_plan::{Literal, TimeUnit};
use serde_json::{json, Value};

use crate::error::{Result, TranslateError};

pub fn translate_literal(literal: &Literal) -> Result<Value> {
    let value = match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => json!({ "$literal": b }),
        Literal::Integer(i) => json!({ "$literal": i }),
        Literal::BigInt(i) => json!({ "$numberLong": i.to_string() }),
        Literal::Double(d) => json!({ "$numberDouble": format_double(*d) }),
        Literal::Decimal(d) => json!({ "$numberDecimal": d }),
        Literal::String(s) => json!({ "$literal": s }),
        Literal::Date(text) | Literal::Timestamp(text) => {
            json!({ "$date": { "$numberLong": epoch_millis(text)?.to_string() } })
        }
        Literal::Interval { unit, value } => {
            json!({ "$numberLong": interval_millis(*unit, *value)?.to_string() })
        }
        Literal::Symbol(unit) => {
            return Err(TranslateError::unsupported("FLAG", format!("FLAG({})", unit.name())))
        }
    };
    Ok(value)
}

/// Extended-JSON text of a double
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d == f64::INFINITY {
        "Infinity".to_string()
    } else if d == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        format!("{:?}", d)
    }
}

/// Milliseconds since the Unix epoch of a DATE or TIMESTAMP literal (UTC)
pub fn epoch_millis(text: &str) -> Result<i64> {
    let text = text.trim();

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight).timestamp_millis());
        }
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&ts).timestamp_millis());
        }
    }

    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.timestamp_millis())
        .map_err(|_| TranslateError::TypeConversionUnsupported(format!("cannot read '{}' as a date", text)))
}

/// Day-time intervals become milliseconds; year-month intervals have no
/// fixed length and are rejected.
pub fn interval_millis(unit: TimeUnit, value: i64) -> Result<i64> {
    let factor: i64 = match unit {
        TimeUnit::Week => 7 * 86_400_000,
        TimeUnit::Day => 86_400_000,
        TimeUnit::Hour => 3_600_000,
        TimeUnit::Minute => 60_000,
        TimeUnit::Second => 1_000,
        TimeUnit::Millisecond => 1,
        other => {
            return Err(TranslateError::TypeConversionUnsupported(format!(
                "INTERVAL {} has no native equivalent",
                other.name()
            )))
        }
    };
    value.checked_mul(factor).ok_or_else(|| {
        TranslateError::TypeConversionUnsupported(format!(
            "INTERVAL '{}' {} overflows milliseconds",
            value,
            unit.name()
        ))
    })
}
