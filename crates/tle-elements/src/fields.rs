//! Column slicing and numeric decoding for fixed-width TLE fields

use crate::{Line, Result, TleError};
use std::ops::Range;

/// Slice a 0-based, end-exclusive column range out of a line.
pub fn column(line: &str, which: Line, cols: Range<usize>) -> Result<&str> {
    line.get(cols.clone()).ok_or_else(|| TleError::MalformedLine {
        line: which,
        reason: format!("columns {}-{} are not addressable", cols.start + 1, cols.end),
    })
}

/// Plain signed decimal, e.g. `" 51.6416"` or `"-.00002182"`.
pub fn decimal(line: &str, which: Line, cols: Range<usize>, name: &str) -> Result<f64> {
    let raw = column(line, which, cols)?;
    let trimmed = raw.trim();
    // Normalise a bare sign before the point ("-.5", "+.5").
    let normalised = match trimmed.strip_prefix('-') {
        Some(rest) if rest.starts_with('.') => format!("-0{}", rest),
        _ => match trimmed.strip_prefix('+') {
            Some(rest) => rest.to_string(),
            None => trimmed.to_string(),
        },
    };
    normalised
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TleError::MalformedLine {
            line: which,
            reason: format!("{} {:?} is not a decimal", name, raw),
        })
}

/// Unsigned integer field, blanks allowed around the digits.
pub fn integer(line: &str, which: Line, cols: Range<usize>, name: &str) -> Result<u32> {
    let raw = column(line, which, cols)?;
    raw.trim().parse::<u32>().map_err(|_| TleError::MalformedLine {
        line: which,
        reason: format!("{} {:?} is not an integer", name, raw),
    })
}

/// Integer field that may be left blank; blank reads as zero.
pub fn integer_or_zero(line: &str, which: Line, cols: Range<usize>, name: &str) -> Result<u32> {
    let raw = column(line, which, cols.clone())?;
    if raw.trim().is_empty() {
        return Ok(0);
    }
    integer(line, which, cols, name)
}

/// Digits with an implied leading `0.`, as used by eccentricity (`0006703`).
pub fn implied_decimal(line: &str, which: Line, cols: Range<usize>, name: &str) -> Result<f64> {
    let raw = column(line, which, cols)?;
    let digits = raw.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TleError::MalformedLine {
            line: which,
            reason: format!("{} {:?} is not a digit string", name, raw),
        });
    }
    format!("0.{}", digits)
        .parse::<f64>()
        .map_err(|_| TleError::MalformedLine {
            line: which,
            reason: format!("{} {:?} is not a digit string", name, raw),
        })
}

/// `"0"`, `"00000"`, `"-0.0"`: a zero written without an exponent.
fn is_bare_zero(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    digits.contains('0') && digits.bytes().all(|b| b == b'0' || b == b'.')
}

/// Decode the pseudo-scientific notation used for B* and the second
/// derivative of mean motion: `[sign][mantissa digits][sign][exponent]`
/// with an implied decimal point before the mantissa.
///
/// `" 12345-3"` is `+0.12345e-3`, `"-11606-4"` is `-0.11606e-4`.
/// A bare zero decodes as `0.0`.
pub fn implied_exponent(raw: &str, field: &'static str) -> Result<f64> {
    let invalid = || TleError::ScientificNotation {
        field,
        raw: raw.to_string(),
    };

    let s = raw.trim();
    if is_bare_zero(s) {
        return Ok(0.0);
    }
    if s.len() < 3 || !s.is_ascii() {
        return Err(invalid());
    }

    let (sign, body) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };

    // Exponent is the trailing signed digit: "12345-3" -> ("12345", "-3").
    let split = body
        .rfind(|c: char| c == '-' || c == '+')
        .filter(|&i| i > 0)
        .ok_or_else(invalid)?;
    let (mantissa_digits, exponent_str) = body.split_at(split);

    if mantissa_digits.is_empty() || !mantissa_digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let exponent: i32 = exponent_str.parse().map_err(|_| invalid())?;
    let mantissa: f64 = format!("0.{}", mantissa_digits)
        .parse()
        .map_err(|_| invalid())?;

    Ok(sign * mantissa * 10f64.powi(exponent))
}
