// EnrolSift - core/date.rs
//
// Date parsing, inclusive range matching, and month-of-year extraction.
// Core layer: pure logic, no I/O.
//
// One parsing routine serves every date-dependent facet so that epoch
// milliseconds and the many string shapes in the record source are handled
// identically everywhere. Date-only strings are interpreted as midnight UTC.

use crate::core::model::DateValue;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Date-only string formats tried in order after the `YYYY-MM-DD` fast path.
const DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%a %b %d %Y",
];

/// Naive date-time formats (interpreted as UTC).
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Browser `Date.toString()` output, e.g.
/// `Sun Sep 15 2024 00:00:00 GMT-0600 (Mountain Daylight Time)`.
fn browser_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z]{3} (?P<date>[A-Za-z]{3} \d{1,2} \d{4} \d{2}:\d{2}:\d{2}) GMT(?P<offset>[+-]\d{4})(?: \(.*\))?$",
        )
        .expect("browser date regex is valid")
    })
}

// =============================================================================
// DateRange
// =============================================================================

/// An optionally-bounded inclusive range of instants.
///
/// A range with neither bound set is inactive and matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// Range bounded by whole calendar days (midnight UTC on each side).
    pub fn days(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            from: from.map(start_of_day),
            to: to.map(start_of_day),
        }
    }

    /// Active iff either bound is set.
    pub fn is_active(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }
}

/// Test whether `date` falls within `range`.
///
/// Inactive ranges match everything, including absent dates. When active, an
/// absent or unparseable date never matches. Both ends are inclusive; the
/// upper bound is advanced by one calendar day before comparing, so anything
/// on the `to` day itself is included. A bound too close to the end of the
/// representable range to advance is treated as unbounded.
pub fn is_within_range(date: Option<&DateValue>, range: &DateRange) -> bool {
    if !range.is_active() {
        return true;
    }

    let Some(instant) = date.and_then(parse_date) else {
        return false;
    };

    if let Some(from) = range.from {
        if instant < from {
            return false;
        }
    }
    if let Some(advanced) = range.to.and_then(|to| to.checked_add_signed(Duration::days(1))) {
        if instant > advanced {
            return false;
        }
    }
    true
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a raw date into a UTC instant. Returns `None` when unparseable.
pub fn parse_date(value: &DateValue) -> Option<DateTime<Utc>> {
    match value {
        DateValue::EpochMillis(ms) => DateTime::from_timestamp_millis(*ms),
        DateValue::Text(s) => parse_date_str(s),
    }
}

/// Parse a textual date.
///
/// Accepted shapes: numeric epoch milliseconds, RFC 3339, RFC 2822, browser
/// `Date.toString()`, ISO date-times without zone, and the date-only formats
/// in `DATE_FORMATS`.
pub fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if s.bytes().all(|b| b.is_ascii_digit()) && s.len() > 8 {
        return s
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis);
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(start_of_day(d));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(caps) = browser_date_regex().captures(s) {
        let joined = format!("{} {}", &caps["date"], &caps["offset"]);
        if let Ok(dt) = DateTime::parse_from_str(&joined, "%b %d %Y %H:%M:%S %z") {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(start_of_day(d));
        }
    }

    None
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

// =============================================================================
// Month extraction
// =============================================================================

/// Two-digit month code (`"01"`..`"12"`) of a raw date.
///
/// Strings beginning `YYYY-MM` take a fast path that reads the month digits
/// directly and never shifts across a timezone boundary. Everything else goes
/// through [`parse_date`].
pub fn extract_month(value: &DateValue) -> Option<String> {
    if let DateValue::Text(s) = value {
        if let Some(month) = iso_month(s.trim()) {
            return Some(month.to_string());
        }
    }
    parse_date(value).map(|dt| dt.format("%m").to_string())
}

fn iso_month(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.len() < 7 || bytes[4] != b'-' {
        return None;
    }
    if !bytes[..4].iter().all(u8::is_ascii_digit) || !bytes[5..7].iter().all(u8::is_ascii_digit)
    {
        return None;
    }
    // A third digit means this is not a two-digit month (e.g. "2024-123").
    if bytes.get(7).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let month = &s[5..7];
    match month.parse::<u8>() {
        Ok(1..=12) => Some(month),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_inactive_range_matches_anything() {
        let range = DateRange::default();
        assert!(is_within_range(None, &range));
        assert!(is_within_range(Some(&DateValue::from("garbage")), &range));
    }

    #[test]
    fn test_upper_bound_is_inclusive_of_whole_day() {
        let range = DateRange::days(None, Some(day(2024, 1, 31)));
        assert!(is_within_range(Some(&DateValue::from("2024-01-31")), &range));
        assert!(is_within_range(
            Some(&DateValue::from("2024-01-31T23:59:59Z")),
            &range
        ));
        assert!(is_within_range(Some(&DateValue::from("2024-02-01")), &range));
        assert!(!is_within_range(
            Some(&DateValue::from("2024-02-01T00:00:00.001Z")),
            &range
        ));
        assert!(!is_within_range(Some(&DateValue::from("2024-02-02")), &range));
    }

    #[test]
    fn test_upper_bound_at_end_of_time_does_not_overflow() {
        let range = DateRange::new(None, Some(DateTime::<Utc>::MAX_UTC));
        assert!(is_within_range(Some(&DateValue::from("2024-01-31")), &range));

        let near_end = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let range = DateRange::new(Some(start_of_day(day(2024, 1, 1))), Some(near_end));
        assert!(is_within_range(Some(&DateValue::from("2024-06-30")), &range));
        assert!(!is_within_range(Some(&DateValue::from("2023-06-30")), &range));
    }

    #[test]
    fn test_lower_bound_is_inclusive() {
        let range = DateRange::days(Some(day(2024, 1, 1)), None);
        assert!(is_within_range(Some(&DateValue::from("2024-01-01")), &range));
        assert!(!is_within_range(Some(&DateValue::from("2023-12-31")), &range));
    }

    #[test]
    fn test_unparseable_or_absent_date_fails_active_range() {
        let range = DateRange::days(Some(day(2024, 1, 1)), Some(day(2024, 1, 31)));
        assert!(!is_within_range(Some(&DateValue::from("not a date")), &range));
        assert!(!is_within_range(None, &range));
    }

    #[test]
    fn test_epoch_millis_and_strings_agree() {
        let expected = start_of_day(day(2024, 9, 15));
        let ms = expected.timestamp_millis();
        assert_eq!(parse_date(&DateValue::EpochMillis(ms)), Some(expected));
        assert_eq!(parse_date(&DateValue::Text(ms.to_string())), Some(expected));
        assert_eq!(parse_date_str("2024-09-15"), Some(expected));
        assert_eq!(parse_date_str("09/15/2024"), Some(expected));
        assert_eq!(parse_date_str("September 15, 2024"), Some(expected));
        assert_eq!(parse_date_str("2024-09-15T00:00:00.000Z"), Some(expected));
        assert_eq!(parse_date_str("2024-09-15 00:00:00"), Some(expected));
    }

    #[test]
    fn test_browser_date_string_honours_offset() {
        let parsed =
            parse_date_str("Sun Sep 15 2024 00:00:00 GMT-0600 (Mountain Daylight Time)").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-09-15T06:00:00+00:00");
    }

    #[test]
    fn test_month_fast_path_and_fallback() {
        assert_eq!(extract_month(&DateValue::from("2024-09-15")).as_deref(), Some("09"));
        assert_eq!(
            extract_month(&DateValue::from("2024-10-02T23:30:00-07:00")).as_deref(),
            Some("10"),
            "fast path must not shift the month across a timezone"
        );
        assert_eq!(extract_month(&DateValue::from("March 3, 2024")).as_deref(), Some("03"));
        let ms = start_of_day(day(2024, 12, 1)).timestamp_millis();
        assert_eq!(extract_month(&DateValue::EpochMillis(ms)).as_deref(), Some("12"));
        assert_eq!(extract_month(&DateValue::from("2024-13-01")), None);
        assert_eq!(extract_month(&DateValue::from("soon")), None);
    }
}
