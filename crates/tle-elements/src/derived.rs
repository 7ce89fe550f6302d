//! Derived orbital parameters
//!
//! Kepler's third law applied to the mean motion of an element set. The
//! constants match the ones historical CSV exports were produced with, so
//! re-derived rows compare equal to archived ones.

use crate::record::TleRecord;
use serde::{Deserialize, Serialize};

/// Earth gravitational parameter (m³/s²).
pub const GM: f64 = 398600441800000.0;
/// Equatorial radius (km).
pub const EARTH_RADIUS_KM: f64 = 6378.137;
/// Truncated pi used by existing archives.
pub const PI: f64 = 3.14159265358979;
/// Radians per second for one revolution per day.
pub const TPI86: f64 = 2.0 * PI / 86400.0;

pub const CSV_HEADER: [&str; 11] = [
    "epoch_utc",
    "apogee_altitude",
    "perigee_altitude",
    "mean_motion",
    "mean_motion_deriv",
    "eccentricity",
    "inclination",
    "bstar",
    "semi_major_axis",
    "raan",
    "arg_perigee",
];

pub fn semi_major_axis_km(mean_motion_rev_per_day: f64) -> f64 {
    GM.powf(1.0 / 3.0) / (TPI86 * mean_motion_rev_per_day).powf(2.0 / 3.0) / 1000.0
}

pub fn apogee_altitude_km(mean_motion_rev_per_day: f64, eccentricity: f64) -> f64 {
    semi_major_axis_km(mean_motion_rev_per_day) * (1.0 + eccentricity) - EARTH_RADIUS_KM
}

pub fn perigee_altitude_km(mean_motion_rev_per_day: f64, eccentricity: f64) -> f64 {
    semi_major_axis_km(mean_motion_rev_per_day) * (1.0 - eccentricity) - EARTH_RADIUS_KM
}

pub fn orbital_period_minutes(mean_motion_rev_per_day: f64) -> f64 {
    1440.0 / mean_motion_rev_per_day
}

/// One line of `<norad_id>.csv`. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedParameterRow {
    pub epoch_utc: String,
    #[serde(rename = "apogee_altitude")]
    pub apogee_altitude_km: f64,
    #[serde(rename = "perigee_altitude")]
    pub perigee_altitude_km: f64,
    pub mean_motion: f64,
    pub mean_motion_deriv: f64,
    pub eccentricity: f64,
    #[serde(rename = "inclination")]
    pub inclination_deg: f64,
    pub bstar: f64,
    #[serde(rename = "semi_major_axis")]
    pub semi_major_axis_km: f64,
    #[serde(rename = "raan")]
    pub raan_deg: f64,
    #[serde(rename = "arg_perigee")]
    pub arg_perigee_deg: f64,
}

impl DerivedParameterRow {
    pub fn from_record(record: &TleRecord) -> Self {
        let n = record.mean_motion_rev_per_day;
        let e = record.eccentricity;
        Self {
            epoch_utc: record.epoch_utc(),
            apogee_altitude_km: apogee_altitude_km(n, e),
            perigee_altitude_km: perigee_altitude_km(n, e),
            mean_motion: n,
            mean_motion_deriv: record.mean_motion_deriv_1,
            eccentricity: e,
            inclination_deg: record.inclination_deg,
            bstar: record.bstar,
            semi_major_axis_km: semi_major_axis_km(n),
            raan_deg: record.raan_deg,
            arg_perigee_deg: record.arg_perigee_deg,
        }
    }
}
