//! Date default handling: accept the inputs `new Date(...)` accepts, emit `toISOString()` form.
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Interpret a date argument: an ISO-8601 / RFC 3339 string or epoch milliseconds.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| {
                n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64)
            })?;
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

/// `2024-01-02T03:04:05.000Z`, always UTC with millisecond precision.
pub fn to_iso_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize a date default to its ISO string, if it is one.
pub fn normalize(v: &Value) -> Option<String> {
    parse_timestamp(v).map(|ts| to_iso_string(&ts))
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Local-less forms are read as UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_and_millis_normalize_to_iso() {
        assert_eq!(normalize(&json!("2024-03-01")).as_deref(), Some("2024-03-01T00:00:00.000Z"));
        assert_eq!(
            normalize(&json!("2024-03-01T10:30:00+02:00")).as_deref(),
            Some("2024-03-01T08:30:00.000Z")
        );
        assert_eq!(normalize(&json!(0)).as_deref(), Some("1970-01-01T00:00:00.000Z"));
        assert_eq!(normalize(&json!(1700000000123_i64)).as_deref(), Some("2023-11-14T22:13:20.123Z"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(normalize(&json!("yesterday")), None);
        assert_eq!(normalize(&json!(true)), None);
        assert_eq!(normalize(&json!(1.5)), None);
    }
}
