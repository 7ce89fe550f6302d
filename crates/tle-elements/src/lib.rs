//! TLE Elements Library
//!
//! Fixed-column Two-Line Element codec, epoch resolution and the derived
//! orbital parameters exported alongside every archived element set.
//!
//! # Line layout
//!
//! ```text
//! 1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927
//! 2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537
//! ```
//!
//! Every numeric field is sliced by column, never tokenized on whitespace:
//! neighbouring fields are allowed to touch.

use thiserror::Error;

pub mod derived;
pub mod epoch;
pub mod fields;
pub mod record;
pub mod stream;

pub use derived::{
    apogee_altitude_km, orbital_period_minutes, perigee_altitude_km, semi_major_axis_km,
    DerivedParameterRow, CSV_HEADER,
};
pub use epoch::{format_epoch_utc, parse_epoch_field, resolve_epoch, EPOCH_SENTINEL};
pub use record::{checksum_digit, ParseOptions, TleRecord, TLE_LINE_LEN};
pub use stream::{group_by_norad, parse_stream, ParsedBatch, SkippedEntry};

/// Which of the two element lines a problem was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    One,
    Two,
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Line::One => write!(f, "line 1"),
            Line::Two => write!(f, "line 2"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TleError {
    #[error("Malformed {line}: {reason}")]
    MalformedLine { line: Line, reason: String },
    #[error("Truncated {line}: {len} usable characters, need 69")]
    TruncatedLine { line: Line, len: usize },
    #[error("Invalid epoch {raw:?}: {reason}")]
    EpochParse { raw: String, reason: String },
    #[error("Invalid {field} field {raw:?}")]
    ScientificNotation { field: &'static str, raw: String },
    #[error("NORAD ID mismatch: line 1 has {line1}, line 2 has {line2}")]
    NoradMismatch { line1: u32, line2: u32 },
    #[error("Checksum mismatch on {line}: expected {expected}, found {found}")]
    Checksum { line: Line, expected: u32, found: u32 },
}

pub type Result<T> = std::result::Result<T, TleError>;
