//! TLE record codec

use crate::epoch::{format_epoch_utc, parse_epoch_field, EPOCH_SENTINEL};
use crate::fields::{column, decimal, implied_decimal, implied_exponent, integer, integer_or_zero};
use crate::{Line, Result, TleError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Significant width of each element line, checksum included.
pub const TLE_LINE_LEN: usize = 69;

/// Knobs for the parts of the format that historical archives disagree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Reject the whole record when B* (or the second derivative of mean
    /// motion) cannot be decoded. When false the field reads as `0.0`.
    pub strict_bstar: bool,
    /// Validate the modulo-10 checksum in column 69 of both lines.
    pub verify_checksum: bool,
    /// Require the catalog number on line 2 to match line 1.
    pub require_matching_norad: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_bstar: true,
            verify_checksum: false,
            require_matching_norad: true,
        }
    }
}

impl ParseOptions {
    /// Options for re-reading archives we wrote ourselves: never drop a
    /// stored record over a drag term.
    pub fn lenient() -> Self {
        Self {
            strict_bstar: false,
            ..Self::default()
        }
    }
}

/// One element set for one object at one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TleRecord {
    pub norad_id: u32,
    pub classification: char,
    pub international_designator: String,
    /// `None` when the epoch field could not be resolved; such records sort
    /// first and are flagged by [`TleRecord::has_epoch_anomaly`].
    pub epoch: Option<DateTime<Utc>>,
    /// First derivative of mean motion (rev/day²).
    pub mean_motion_deriv_1: f64,
    /// Second derivative of mean motion (rev/day³), usually zero.
    pub mean_motion_deriv_2: f64,
    /// Drag term (1/earth radii).
    pub bstar: f64,
    pub ephemeris_type: u8,
    pub element_set_number: u32,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub eccentricity: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    pub mean_motion_rev_per_day: f64,
    pub revolution_number: u32,
    line1: String,
    line2: String,
}

/// Modulo-10 checksum over the first 68 columns: digits count at face
/// value, `-` counts as one, everything else as zero.
pub fn checksum_digit(line: &str) -> u32 {
    let sum: u32 = line
        .chars()
        .take(TLE_LINE_LEN - 1)
        .map(|c| match c {
            '0'..='9' => c.to_digit(10).unwrap_or(0),
            '-' => 1,
            _ => 0,
        })
        .sum();
    sum % 10
}

fn significant(raw: &str, which: Line) -> Result<&str> {
    let line = raw.trim_end_matches(['\r', '\n']);
    if !line.is_ascii() {
        return Err(TleError::MalformedLine {
            line: which,
            reason: "non-ASCII characters".to_string(),
        });
    }
    if line.len() < TLE_LINE_LEN {
        return Err(TleError::TruncatedLine {
            line: which,
            len: line.len(),
        });
    }
    Ok(&line[..TLE_LINE_LEN])
}

fn verify_checksum(line: &str, which: Line) -> Result<()> {
    let expected = checksum_digit(line);
    let found = line[TLE_LINE_LEN - 1..]
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .ok_or_else(|| TleError::MalformedLine {
            line: which,
            reason: "checksum column is not a digit".to_string(),
        })?;
    if expected != found {
        return Err(TleError::Checksum {
            line: which,
            expected,
            found,
        });
    }
    Ok(())
}

impl TleRecord {
    /// Parse with [`ParseOptions::default`].
    pub fn parse(line1: &str, line2: &str) -> Result<Self> {
        Self::parse_with(line1, line2, &ParseOptions::default())
    }

    pub fn parse_with(line1: &str, line2: &str, options: &ParseOptions) -> Result<Self> {
        let l1 = significant(line1, Line::One)?;
        let l2 = significant(line2, Line::Two)?;

        if !l1.starts_with("1 ") {
            return Err(TleError::MalformedLine {
                line: Line::One,
                reason: "does not start with \"1 \"".to_string(),
            });
        }
        if !l2.starts_with("2 ") {
            return Err(TleError::MalformedLine {
                line: Line::Two,
                reason: "does not start with \"2 \"".to_string(),
            });
        }

        if options.verify_checksum {
            verify_checksum(l1, Line::One)?;
            verify_checksum(l2, Line::Two)?;
        }

        let norad_id = integer(l1, Line::One, 2..7, "catalog number")?;
        let norad_id_2 = integer(l2, Line::Two, 2..7, "catalog number")?;
        if options.require_matching_norad && norad_id != norad_id_2 {
            return Err(TleError::NoradMismatch {
                line1: norad_id,
                line2: norad_id_2,
            });
        }

        let classification = column(l1, Line::One, 7..8)?
            .chars()
            .next()
            .filter(|c| !c.is_whitespace())
            .unwrap_or('U');
        let international_designator = column(l1, Line::One, 9..17)?.trim().to_string();

        let epoch_field = column(l1, Line::One, 18..32)?;
        let epoch = match parse_epoch_field(epoch_field) {
            Ok(epoch) => Some(epoch),
            Err(e) => {
                warn!("NORAD {}: {}; keeping record with unresolved epoch", norad_id, e);
                None
            }
        };

        let mean_motion_deriv_1 = decimal(l1, Line::One, 33..43, "first derivative")?;
        let mean_motion_deriv_2 = drag_style(
            column(l1, Line::One, 44..52)?,
            "second derivative",
            norad_id,
            options,
        )?;
        let bstar = drag_style(column(l1, Line::One, 53..61)?, "bstar", norad_id, options)?;

        let ephemeris_type = integer_or_zero(l1, Line::One, 62..63, "ephemeris type")? as u8;
        let element_set_number = integer_or_zero(l1, Line::One, 64..68, "element set")?;

        let inclination_deg = decimal(l2, Line::Two, 8..16, "inclination")?;
        let raan_deg = decimal(l2, Line::Two, 17..25, "raan")?;
        let eccentricity = implied_decimal(l2, Line::Two, 26..33, "eccentricity")?;
        let arg_perigee_deg = decimal(l2, Line::Two, 34..42, "argument of perigee")?;
        let mean_anomaly_deg = decimal(l2, Line::Two, 43..51, "mean anomaly")?;
        let mean_motion_rev_per_day = decimal(l2, Line::Two, 52..63, "mean motion")?;
        let revolution_number = integer_or_zero(l2, Line::Two, 63..68, "revolution number")?;

        if mean_motion_rev_per_day <= 0.0 {
            return Err(TleError::MalformedLine {
                line: Line::Two,
                reason: format!("mean motion {} is not positive", mean_motion_rev_per_day),
            });
        }

        Ok(Self {
            norad_id,
            classification,
            international_designator,
            epoch,
            mean_motion_deriv_1,
            mean_motion_deriv_2,
            bstar,
            ephemeris_type,
            element_set_number,
            inclination_deg,
            raan_deg,
            eccentricity,
            arg_perigee_deg,
            mean_anomaly_deg,
            mean_motion_rev_per_day,
            revolution_number,
            line1: l1.to_string(),
            line2: l2.to_string(),
        })
    }

    /// The two source lines, exactly as parsed.
    pub fn lines(&self) -> (&str, &str) {
        (&self.line1, &self.line2)
    }

    pub fn line1(&self) -> &str {
        &self.line1
    }

    pub fn line2(&self) -> &str {
        &self.line2
    }

    /// Archive serialisation: both lines, each terminated by `\n`.
    pub fn to_tle_text(&self) -> String {
        format!("{}\n{}\n", self.line1, self.line2)
    }

    /// Two records are duplicates when both raw lines are byte-identical.
    pub fn same_content(&self, other: &TleRecord) -> bool {
        self.line1 == other.line1 && self.line2 == other.line2
    }

    pub fn has_epoch_anomaly(&self) -> bool {
        self.epoch.is_none()
    }

    /// Chronological sort key; unresolved epochs sort first.
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.epoch.unwrap_or(EPOCH_SENTINEL)
    }

    /// `YYYY-MM-DD HH:MM:SS`, or an empty string for an unresolved epoch.
    pub fn epoch_utc(&self) -> String {
        self.epoch.as_ref().map(format_epoch_utc).unwrap_or_default()
    }

    /// Checksum digit stored in column 69 of the given line.
    pub fn stored_checksum(&self, which: Line) -> Option<u32> {
        let line = match which {
            Line::One => &self.line1,
            Line::Two => &self.line2,
        };
        line.get(TLE_LINE_LEN - 1..)?.chars().next()?.to_digit(10)
    }

    pub fn checksums_valid(&self) -> bool {
        self.stored_checksum(Line::One) == Some(checksum_digit(&self.line1))
            && self.stored_checksum(Line::Two) == Some(checksum_digit(&self.line2))
    }

    pub fn orbital_period_minutes(&self) -> f64 {
        crate::derived::orbital_period_minutes(self.mean_motion_rev_per_day)
    }
}

fn drag_style(raw: &str, field: &'static str, norad_id: u32, options: &ParseOptions) -> Result<f64> {
    match implied_exponent(raw, field) {
        Ok(value) => Ok(value),
        Err(e) if !options.strict_bstar => {
            warn!("NORAD {}: {}; using 0.0", norad_id, e);
            Ok(0.0)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    pub(crate) const ISS_L1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    pub(crate) const ISS_L2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    #[test]
    fn test_parse_reference_record() {
        let tle = TleRecord::parse(ISS_L1, ISS_L2).unwrap();

        assert_eq!(tle.norad_id, 25544);
        assert_eq!(tle.classification, 'U');
        assert_eq!(tle.international_designator, "98067A");
        assert_eq!(tle.epoch.unwrap().year(), 2008);
        assert_eq!(tle.mean_motion_deriv_1, -0.00002182);
        assert_eq!(tle.mean_motion_deriv_2, 0.0);
        assert!((tle.bstar - (-0.11606e-4)).abs() < 1e-18);
        assert_eq!(tle.ephemeris_type, 0);
        assert_eq!(tle.element_set_number, 292);
        assert_eq!(tle.inclination_deg, 51.6416);
        assert_eq!(tle.raan_deg, 247.4627);
        assert_eq!(tle.eccentricity, 0.0006703);
        assert_eq!(tle.arg_perigee_deg, 130.5360);
        assert_eq!(tle.mean_anomaly_deg, 325.0288);
        assert_eq!(tle.mean_motion_rev_per_day, 15.72125391);
        assert_eq!(tle.revolution_number, 56353);
        assert!(tle.checksums_valid());
    }

    #[test]
    fn test_raw_lines_round_trip() {
        let tle = TleRecord::parse(ISS_L1, ISS_L2).unwrap();
        assert_eq!(tle.lines(), (ISS_L1, ISS_L2));
        assert_eq!(tle.to_tle_text(), format!("{}\n{}\n", ISS_L1, ISS_L2));
    }

    #[test]
    fn test_trailing_junk_is_cut_at_column_69() {
        let long1 = format!("{}   \r\n", ISS_L1);
        let tle = TleRecord::parse(&long1, ISS_L2).unwrap();
        assert_eq!(tle.line1(), ISS_L1);
    }

    #[test]
    fn test_truncated_line() {
        let err = TleRecord::parse(&ISS_L1[..60], ISS_L2).unwrap_err();
        assert_eq!(err, TleError::TruncatedLine { line: Line::One, len: 60 });
    }

    #[test]
    fn test_swapped_lines_are_malformed() {
        assert!(matches!(
            TleRecord::parse(ISS_L2, ISS_L1),
            Err(TleError::MalformedLine { line: Line::One, .. })
        ));
    }

    #[test]
    fn test_bstar_policy() {
        let broken = ISS_L1.replace("-11606-4", "-11x06-4");

        let strict = TleRecord::parse(&broken, ISS_L2).unwrap_err();
        assert!(matches!(strict, TleError::ScientificNotation { field: "bstar", .. }));

        let lenient = TleRecord::parse_with(&broken, ISS_L2, &ParseOptions::lenient()).unwrap();
        assert_eq!(lenient.bstar, 0.0);
        assert_eq!(lenient.line1(), broken);
    }

    #[test]
    fn test_norad_mismatch() {
        let other = ISS_L2.replacen("25544", "25545", 1);
        assert_eq!(
            TleRecord::parse(ISS_L1, &other).unwrap_err(),
            TleError::NoradMismatch { line1: 25544, line2: 25545 }
        );

        let tolerant = ParseOptions {
            require_matching_norad: false,
            ..ParseOptions::default()
        };
        assert_eq!(TleRecord::parse_with(ISS_L1, &other, &tolerant).unwrap().norad_id, 25544);
    }

    #[test]
    fn test_checksum_only_checked_on_request() {
        let bad = format!("{}0", &ISS_L1[..68]);
        assert!(TleRecord::parse(&bad, ISS_L2).is_ok());

        let checked = ParseOptions {
            verify_checksum: true,
            ..ParseOptions::default()
        };
        assert_eq!(
            TleRecord::parse_with(&bad, ISS_L2, &checked).unwrap_err(),
            TleError::Checksum { line: Line::One, expected: 7, found: 0 }
        );
        assert!(TleRecord::parse_with(ISS_L1, ISS_L2, &checked).is_ok());
    }

    #[test]
    fn test_unresolved_epoch_is_kept() {
        let bad_epoch = ISS_L1.replace("08264.51782528", "08xxx.51782528");
        let tle = TleRecord::parse(&bad_epoch, ISS_L2).unwrap();
        assert!(tle.has_epoch_anomaly());
        assert_eq!(tle.sort_key(), EPOCH_SENTINEL);
        assert_eq!(tle.epoch_utc(), "");
    }

    #[test]
    fn test_epoch_utc_string() {
        let tle = TleRecord::parse(ISS_L1, ISS_L2).unwrap();
        assert_eq!(tle.epoch_utc(), "2008-09-20 12:25:40");
        assert!(tle.sort_key() > Utc.with_ymd_and_hms(2008, 9, 20, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_checksum_digit() {
        assert_eq!(checksum_digit(ISS_L1), 7);
        assert_eq!(checksum_digit(ISS_L2), 7);
    }

    #[test]
    fn test_stored_checksum() {
        let mut tle = TleRecord::parse(ISS_L1, ISS_L2).unwrap();
        assert_eq!(tle.stored_checksum(Line::One), Some(7));
        assert_eq!(tle.stored_checksum(Line::Two), Some(7));

        tle.line2 = format!("{}X", &ISS_L2[..68]);
        assert_eq!(tle.stored_checksum(Line::Two), None);
        assert!(!tle.checksums_valid());

        tle.line1 = "1 25544U".to_string();
        assert_eq!(tle.stored_checksum(Line::One), None);
        assert!(!tle.checksums_valid());
    }
}
