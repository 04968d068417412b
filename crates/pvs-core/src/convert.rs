// ── Live-data value conversion ──
//
// Push frames carry loosely typed JSON: numbers arrive as numbers or as
// strings ("12.0", "nan"), timestamps as epoch seconds or milliseconds
// depending on firmware. Everything is normalized to a `LiveValue` at
// write time so change detection compares like with like.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use strum::Display;

/// Declared type of a live-data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FieldKind {
    Numeric,
    Text,
    Timestamp,
}

/// A converted live-data scalar.
///
/// Equality follows numeric value, so `Int(12)` equals `Float(12.0)`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LiveValue {
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl PartialEq for LiveValue {
    #[allow(clippy::cast_precision_loss, clippy::as_conversions, clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => *a as f64 == *b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for LiveValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// Unit of the `time` field, decided once per connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TimestampFormat {
    #[default]
    Unknown,
    Seconds,
    Milliseconds,
}

/// Timestamps further ahead of "now" than this are not seconds.
const FUTURE_HORIZON: TimeDelta = TimeDelta::days(365);

/// Convert a raw frame value according to its declared kind.
///
/// `format` is consulted, and set on first use, for timestamp fields only.
pub fn convert(
    raw: &Value,
    kind: FieldKind,
    format: &mut TimestampFormat,
    now: DateTime<Utc>,
) -> Option<LiveValue> {
    if raw.is_null() {
        return None;
    }
    match kind {
        FieldKind::Text => Some(convert_text(raw)),
        FieldKind::Numeric => convert_numeric(raw),
        FieldKind::Timestamp => convert_timestamp(raw, format, now),
    }
}

fn convert_text(raw: &Value) -> LiveValue {
    match raw {
        Value::String(s) => LiveValue::Text(s.clone()),
        other => LiveValue::Text(other.to_string()),
    }
}

/// Strings are parsed, whole numbers become `Int`. Numbers pass through.
fn convert_numeric(raw: &Value) -> Option<LiveValue> {
    match raw {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("null") {
                return None;
            }
            let parsed = s.parse::<f64>().ok()?;
            Some(whole_or_float(parsed))
        }
        Value::Number(n) => n
            .as_i64()
            .map(LiveValue::Int)
            .or_else(|| n.as_f64().map(LiveValue::Float)),
        Value::Bool(b) => Some(LiveValue::Int(i64::from(*b))),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::as_conversions,
    clippy::float_cmp
)]
fn whole_or_float(value: f64) -> LiveValue {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        LiveValue::Int(value as i64)
    } else {
        LiveValue::Float(value)
    }
}

/// Epoch timestamp in seconds or milliseconds.
///
/// With an unknown format, a value more than a year ahead of `now` is
/// taken as milliseconds, anything else as seconds, and the choice is
/// cached in `format` before validation. Results that are negative or
/// more than a year in the future are rejected.
fn convert_timestamp(
    raw: &Value,
    format: &mut TimestampFormat,
    now: DateTime<Utc>,
) -> Option<LiveValue> {
    let epoch = integer_epoch(raw)?;
    let horizon = (now + FUTURE_HORIZON).timestamp();

    let millis = match *format {
        TimestampFormat::Milliseconds => epoch,
        TimestampFormat::Seconds => epoch.checked_mul(1000)?,
        TimestampFormat::Unknown => {
            if epoch > horizon {
                *format = TimestampFormat::Milliseconds;
                epoch
            } else {
                *format = TimestampFormat::Seconds;
                epoch.checked_mul(1000)?
            }
        }
    };

    if millis < 0 || millis > horizon.checked_mul(1000)? {
        return None;
    }
    DateTime::from_timestamp_millis(millis).map(LiveValue::Timestamp)
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn integer_epoch(raw: &Value) -> Option<i64> {
    match raw {
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < 9.2e18)
                .map(|f| f.trunc() as i64)
        }),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::float_cmp)]

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn numeric(raw: &Value) -> Option<LiveValue> {
        convert(raw, FieldKind::Numeric, &mut TimestampFormat::Unknown, now())
    }

    fn timestamp(raw: &Value, format: &mut TimestampFormat) -> Option<LiveValue> {
        convert(raw, FieldKind::Timestamp, format, now())
    }

    #[test]
    fn numeric_strings() {
        assert_eq!(numeric(&json!("12.0")), Some(LiveValue::Int(12)));
        assert!(matches!(numeric(&json!("12.0")), Some(LiveValue::Int(12))));
        assert!(matches!(numeric(&json!("12.5")), Some(LiveValue::Float(v)) if v == 12.5));
        assert!(matches!(numeric(&json!(" -3 ")), Some(LiveValue::Int(-3))));
        assert_eq!(numeric(&json!("1e3")), Some(LiveValue::Int(1000)));
    }

    #[test]
    fn numeric_absent_markers() {
        assert_eq!(numeric(&json!("nan")), None);
        assert_eq!(numeric(&json!("NaN")), None);
        assert_eq!(numeric(&json!("null")), None);
        assert_eq!(numeric(&json!("")), None);
        assert_eq!(numeric(&json!("abc")), None);
        assert_eq!(numeric(&Value::Null), None);
    }

    #[test]
    fn numbers_pass_through() {
        assert!(matches!(numeric(&json!(7)), Some(LiveValue::Int(7))));
        assert!(matches!(numeric(&json!(7.25)), Some(LiveValue::Float(v)) if v == 7.25));
        // A float that happens to be whole stays a float, but compares equal.
        assert!(matches!(numeric(&json!(7.0)), Some(LiveValue::Float(_))));
        assert_eq!(numeric(&json!(7.0)), Some(LiveValue::Int(7)));
    }

    #[test]
    fn text_fields() {
        let mut format = TimestampFormat::Unknown;
        assert_eq!(
            convert(&json!("islanded"), FieldKind::Text, &mut format, now()),
            Some(LiveValue::Text("islanded".into()))
        );
        assert_eq!(
            convert(&json!(3), FieldKind::Text, &mut format, now()),
            Some(LiveValue::Text("3".into()))
        );
        assert_eq!(convert(&Value::Null, FieldKind::Text, &mut format, now()), None);
    }

    #[test]
    fn int_and_float_compare_by_value() {
        assert_eq!(LiveValue::Int(12), LiveValue::Float(12.0));
        assert_ne!(LiveValue::Int(12), LiveValue::Float(12.5));
        assert_ne!(LiveValue::Int(1), LiveValue::Text("1".into()));
    }

    #[test]
    fn seconds_detected_and_cached() {
        let mut format = TimestampFormat::Unknown;
        let value = timestamp(&json!("1759999990"), &mut format);
        assert_eq!(format, TimestampFormat::Seconds);
        assert_eq!(
            value,
            Some(LiveValue::Timestamp(
                DateTime::from_timestamp(1_759_999_990, 0).unwrap()
            ))
        );
    }

    #[test]
    fn milliseconds_detected_and_cached() {
        let mut format = TimestampFormat::Unknown;
        let value = timestamp(&json!(1_759_999_990_500_i64), &mut format);
        assert_eq!(format, TimestampFormat::Milliseconds);
        assert_eq!(
            value,
            Some(LiveValue::Timestamp(
                DateTime::from_timestamp_millis(1_759_999_990_500).unwrap()
            ))
        );
    }

    #[test]
    fn cached_format_is_never_rederived() {
        let mut format = TimestampFormat::Unknown;
        timestamp(&json!(1_759_999_990), &mut format);
        assert_eq!(format, TimestampFormat::Seconds);

        // A millisecond value under a seconds cache lands far in the future.
        assert_eq!(timestamp(&json!(1_759_999_990_500_i64), &mut format), None);
        assert_eq!(format, TimestampFormat::Seconds);

        let mut format = TimestampFormat::Milliseconds;
        // Seconds under a milliseconds cache decode as early 1970.
        let value = timestamp(&json!(1_759_999_990), &mut format).unwrap();
        assert!(matches!(value, LiveValue::Timestamp(ts) if ts.timestamp() == 1_759_999));
        assert_eq!(format, TimestampFormat::Milliseconds);
    }

    #[test]
    fn rejected_timestamps_still_set_format() {
        let mut format = TimestampFormat::Unknown;
        assert_eq!(timestamp(&json!(-5), &mut format), None);
        assert_eq!(format, TimestampFormat::Seconds);
    }

    #[test]
    fn unparseable_timestamps_leave_format_unknown() {
        let mut format = TimestampFormat::Unknown;
        assert_eq!(timestamp(&json!("soon"), &mut format), None);
        assert_eq!(timestamp(&json!("12.5"), &mut format), None);
        assert_eq!(format, TimestampFormat::Unknown);
    }

    #[test]
    fn float_timestamps_truncate() {
        let mut format = TimestampFormat::Unknown;
        let value = timestamp(&json!(1_759_999_990.9), &mut format).unwrap();
        assert!(matches!(value, LiveValue::Timestamp(ts) if ts.timestamp() == 1_759_999_990));
    }
}
