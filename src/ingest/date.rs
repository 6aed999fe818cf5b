//! `As of Date` parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Date-only layouts accepted in the `As of Date` column, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%Y%m%d"];

/// Date-time layouts accepted in the `As of Date` column, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse an `As of Date` cell into a naive timestamp.
///
/// Returns `None` when no known layout matches. RFC 3339 values are
/// normalised to their naive UTC instant.
pub fn parse_as_of(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts);
        }
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.naive_utc())
}
