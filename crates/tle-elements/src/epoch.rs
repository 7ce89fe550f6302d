//! Epoch resolution
//!
//! TLE epochs are encoded as `YYDDD.DDDDDDDD`: a two-digit year followed by
//! the fractional day of year, where day `1.0` is January 1st 00:00:00 UTC.

use crate::{Result, TleError};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Two-digit years below this pivot belong to the 2000s.
pub const CENTURY_PIVOT: u32 = 57;

/// Sort key used for records whose epoch could not be resolved.
pub const EPOCH_SENTINEL: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

const MICROS_PER_DAY: f64 = 86_400_000_000.0;

/// Resolve a two-digit year and fractional day of year into a UTC timestamp.
pub fn resolve_epoch(two_digit_year: u32, day_of_year: f64) -> Result<DateTime<Utc>> {
    let raw = || format!("{:02}{}", two_digit_year, day_of_year);

    if two_digit_year > 99 {
        return Err(TleError::EpochParse {
            raw: raw(),
            reason: "year must have two digits".to_string(),
        });
    }
    if !day_of_year.is_finite() || !(1.0..367.0).contains(&day_of_year) {
        return Err(TleError::EpochParse {
            raw: raw(),
            reason: "day of year out of range".to_string(),
        });
    }

    let year = if two_digit_year < CENTURY_PIVOT {
        2000 + two_digit_year as i32
    } else {
        1900 + two_digit_year as i32
    };

    let base = Utc
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| TleError::EpochParse {
            raw: raw(),
            reason: format!("no January 1st for year {}", year),
        })?;

    let offset_us = ((day_of_year - 1.0) * MICROS_PER_DAY).round() as i64;
    Ok(base + Duration::microseconds(offset_us))
}

/// Parse the 14-character epoch field of line 1 (columns 19-32).
pub fn parse_epoch_field(field: &str) -> Result<DateTime<Utc>> {
    let trimmed = field.trim();
    let invalid = |reason: &str| TleError::EpochParse {
        raw: field.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.len() < 3 || !trimmed.is_ascii() {
        return Err(invalid("too short"));
    }

    let (year_str, day_str) = trimmed.split_at(2);
    let year: u32 = year_str
        .parse()
        .map_err(|_| invalid("year is not numeric"))?;
    let day: f64 = day_str
        .trim()
        .parse()
        .map_err(|_| invalid("day of year is not numeric"))?;

    resolve_epoch(year, day).map_err(|e| match e {
        TleError::EpochParse { reason, .. } => TleError::EpochParse {
            raw: field.to_string(),
            reason,
        },
        other => other,
    })
}

/// `YYYY-MM-DD HH:MM:SS`, the format used by the derived-parameter CSV.
pub fn format_epoch_utc(epoch: &DateTime<Utc>) -> String {
    epoch.format("%Y-%m-%d %H:%M:%S").to_string()
}
