//! Lenient timestamp parsing.
//!
//! The backend serializes naive UTC datetimes (`2024-05-01T12:30:00.123456`)
//! while other deployments emit RFC 3339. Both are accepted; anything else
//! becomes `None` instead of failing the whole payload.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// For `#[serde(deserialize_with = "...")]` on `Option<DateTime<Utc>>` fields.
pub fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_naive_backend_format() {
        let dt = parse_timestamp("2024-05-01T12:30:15.123456").expect("naive timestamp");
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.second(), 15);

        // No fractional seconds
        assert!(parse_timestamp("2024-05-01T12:30:15").is_some());
    }

    #[test]
    fn test_parse_rfc3339_converts_to_utc() {
        let dt = parse_timestamp("2024-05-01T12:30:00+02:00").expect("rfc3339 timestamp");
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
