//! Normalization of `created_at` date strings to unix timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::types::RagstoreError;

/// Parses a date string into a unix timestamp in seconds.
///
/// Accepts RFC 3339, `YYYY-MM-DD` (interpreted as midnight UTC), and
/// `YYYY-MM-DD HH:MM:SS` (interpreted as UTC). Anything else is an
/// input-class error; callers on the storage path decide whether to
/// propagate (filters) or tolerate (metadata stamping).
pub fn to_unix_timestamp(value: &str) -> Result<i64, RagstoreError> {
    let trimmed = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp());
        }
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Ok(datetime.and_utc().timestamp());
    }

    Err(RagstoreError::InvalidInput(format!(
        "unrecognized date string '{trimmed}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_dates_as_midnight_utc() {
        assert_eq!(to_unix_timestamp("2021-01-21").unwrap(), 1_611_187_200);
        // Pre-epoch dates are negative timestamps.
        assert!(to_unix_timestamp("1929-10-28").unwrap() < 0);
    }

    #[test]
    fn parses_rfc3339_and_naive_datetimes() {
        assert_eq!(
            to_unix_timestamp("2009-01-03T18:15:05Z").unwrap(),
            1_231_006_505
        );
        assert_eq!(
            to_unix_timestamp("2009-01-03 18:15:05").unwrap(),
            1_231_006_505
        );
    }

    #[test]
    fn ordering_is_preserved_across_formats() {
        let older = to_unix_timestamp("2009-01-03").unwrap();
        let newer = to_unix_timestamp("2021-01-21T00:00:00Z").unwrap();
        assert!(older < newer);
    }

    #[test]
    fn rejects_unparseable_dates() {
        let err = to_unix_timestamp("next tuesday").unwrap_err();
        assert!(err.is_invalid_input());
    }
}
