//! User-entered time windows. All times are UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Stop time used when the input cannot be understood.
pub const DEFAULT_SPAN_DAYS: i64 = 5;

/// `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` (midnight).
pub fn parse_time_input(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Stop time relative to `start`: `+N day(s)`, an absolute time accepted by
/// [`parse_time_input`], or `start + 5 days` for anything else.
pub fn parse_stop_time(start: DateTime<Utc>, text: &str) -> DateTime<Utc> {
    let text = text.trim();

    let fallback = start + Duration::days(DEFAULT_SPAN_DAYS);
    if let Some(days) = relative_days(text) {
        return Duration::try_days(days)
            .and_then(|span| start.checked_add_signed(span))
            .unwrap_or(fallback);
    }
    parse_time_input(text).unwrap_or(fallback)
}

/// `+3 days`, `+1day`, `+ 2 DAYS`.
fn relative_days(text: &str) -> Option<i64> {
    let rest = text.strip_prefix('+')?.trim_start();
    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let days: i64 = rest[..digits_end].parse().ok()?;
    let unit = rest[digits_end..].trim_start().to_ascii_lowercase();
    if unit.starts_with("day") {
        Some(days)
    } else {
        None
    }
}
