//! Date/time helpers for stored timestamps.
//!
//! Timestamps are stored as UTC text in a fixed-width SQLite-friendly form
//! (`YYYY-MM-DD HH:MM:SS.ffffff`) so that string order equals time order.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

const DB_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format a UTC instant for storage.
pub fn to_db_string(dt: &DateTime<Utc>) -> String {
    dt.format(DB_FORMAT).to_string()
}

/// Parse a stored timestamp, with or without fractional seconds.
pub fn parse_db_string(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Convert a stored timestamp to RFC3339 for API responses.
///
/// e.g. `2024-01-15 10:30:00.000000` becomes `2024-01-15T10:30:00.000000Z`.
/// Text that does not parse is passed through with only the separator and
/// zone adjusted.
pub fn to_rfc3339(datetime_str: &str) -> String {
    match parse_db_string(datetime_str) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Micros, true),
        None => format!("{}Z", datetime_str.replace(' ', "T")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_to_db_string_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 5, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1500);

        assert_eq!(to_db_string(&a), "2024-01-05 03:04:05.000000");
        assert_eq!(to_db_string(&b), "2024-01-05 03:04:05.001500");
        assert!(to_db_string(&a) < to_db_string(&b));
    }

    #[test]
    fn test_parse_db_string() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(parse_db_string(&to_db_string(&dt)), Some(dt));
        assert_eq!(parse_db_string("2024-06-15 12:00:00"), Some(dt));
        assert_eq!(parse_db_string("yesterday"), None);
    }

    #[test]
    fn test_to_rfc3339() {
        assert_eq!(
            to_rfc3339("2024-01-15 10:30:00.000000"),
            "2024-01-15T10:30:00.000000Z"
        );
        assert_eq!(
            to_rfc3339("2024-01-15 10:30:00"),
            "2024-01-15T10:30:00.000000Z"
        );
        assert_eq!(
            to_rfc3339("2024-01-15 10:30:00.5"),
            "2024-01-15T10:30:00.500000Z"
        );
    }
}
