//! TEME → ECEF → WGS84 geodetic

use crate::propagation::Trajectory;
use crate::GeodeticPosition;
use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::Serialize;
use std::f64::consts::PI;
use std::ops::Range;

/// WGS84 semi-major axis (km).
pub const WGS84_A: f64 = 6378.137;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257223563;
const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

const UNIX_EPOCH_JD: f64 = 2440587.5;
const J2000_JD: f64 = 2451545.0;

/// Greenwich mean sidereal time (IAU-82) in radians, `[0, 2π)`.
/// UTC stands in for UT1.
pub fn gmst(time: DateTime<Utc>) -> f64 {
    let unix_seconds = time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) * 1e-6;
    let jd = unix_seconds / 86400.0 + UNIX_EPOCH_JD;

    // Julian centuries from J2000.0
    let t = (jd - J2000_JD) / 36525.0;

    let gmst_sec = 67310.54841
        + (876600.0 * 3600.0 + 8640184.812866) * t
        + 0.093104 * t * t
        - 6.2e-6 * t * t * t;

    (gmst_sec / 240.0).to_radians().rem_euclid(2.0 * PI)
}

/// Rotate a TEME vector about Z by GMST.
pub fn teme_to_ecef(teme: &Vector3<f64>, gmst_rad: f64) -> Vector3<f64> {
    let (sin_theta, cos_theta) = gmst_rad.sin_cos();
    Vector3::new(
        cos_theta * teme.x + sin_theta * teme.y,
        -sin_theta * teme.x + cos_theta * teme.y,
        teme.z,
    )
}

/// Iterative inversion of ECEF (km) to WGS84 latitude, longitude, height.
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> GeodeticPosition {
    let p = ecef.x.hypot(ecef.y);
    let longitude = ecef.y.atan2(ecef.x).to_degrees();

    let mut lat = ecef.z.atan2(p * (1.0 - WGS84_E2));
    for _ in 0..10 {
        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        let next = (ecef.z + WGS84_E2 * n * sin_lat).atan2(p);
        let converged = (next - lat).abs() < 1e-12;
        lat = next;
        if converged {
            break;
        }
    }

    let (sin_lat, cos_lat) = lat.sin_cos();
    // Valid at the poles too, unlike p / cos(lat) - N.
    let altitude_km =
        p * cos_lat + ecef.z * sin_lat - WGS84_A * (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    GeodeticPosition {
        latitude: lat.to_degrees(),
        longitude: wrap_longitude(longitude),
        altitude_km,
    }
}

pub fn geodetic_to_ecef(pos: &GeodeticPosition) -> Vector3<f64> {
    let lat_rad = pos.latitude.to_radians();
    let lon_rad = pos.longitude.to_radians();
    let alt = pos.altitude_km;

    let n = WGS84_A / (1.0 - WGS84_E2 * lat_rad.sin().powi(2)).sqrt();

    Vector3::new(
        (n + alt) * lat_rad.cos() * lon_rad.cos(),
        (n + alt) * lat_rad.cos() * lon_rad.sin(),
        (n * (1.0 - WGS84_E2) + alt) * lat_rad.sin(),
    )
}

/// Wrap degrees into `[-180, 180)`.
pub fn wrap_longitude(degrees: f64) -> f64 {
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}

/// Sub-satellite points, one per trajectory sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeodeticTrack {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub altitudes: Vec<f64>,
}

impl GeodeticTrack {
    pub fn len(&self) -> usize {
        self.latitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latitudes.is_empty()
    }
}

pub fn to_geodetic(trajectory: &Trajectory) -> GeodeticTrack {
    let mut track = GeodeticTrack {
        latitudes: Vec::with_capacity(trajectory.len()),
        longitudes: Vec::with_capacity(trajectory.len()),
        altitudes: Vec::with_capacity(trajectory.len()),
    };

    for (time, position) in trajectory.times.iter().zip(&trajectory.positions) {
        let ecef = teme_to_ecef(position, gmst(*time));
        let point = ecef_to_geodetic(&ecef);
        track.latitudes.push(point.latitude);
        track.longitudes.push(point.longitude);
        track.altitudes.push(point.altitude_km);
    }

    track
}

/// Index runs to draw as separate polylines: a new run starts wherever
/// consecutive longitudes jump by more than 180°.
pub fn antimeridian_breaks(longitudes: &[f64]) -> Vec<Range<usize>> {
    if longitudes.is_empty() {
        return Vec::new();
    }

    let mut runs = Vec::new();
    let mut run_start = 0;
    for i in 1..longitudes.len() {
        if (longitudes[i] - longitudes[i - 1]).abs() > 180.0 {
            runs.push(run_start..i);
            run_start = i;
        }
    }
    runs.push(run_start..longitudes.len());
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::Propagator;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use tle_elements::TleRecord;

    #[test]
    fn test_gmst_at_j2000() {
        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        let degrees = gmst(j2000).to_degrees();
        assert!((degrees - 280.46061837).abs() < 1e-6, "got {}", degrees);
    }

    #[test]
    fn test_gmst_advances_one_sidereal_day() {
        let t = Utc.with_ymd_and_hms(2024, 2, 14, 0, 0, 0).unwrap();
        // 23h56m04.0905s later the sky has turned once.
        let later = t + Duration::milliseconds(86_164_091);
        let diff = (gmst(later) - gmst(t)).abs();
        assert!(diff < 1e-5 || (2.0 * PI - diff) < 1e-5);
    }

    #[test]
    fn test_teme_to_ecef_rotation() {
        let v = Vector3::new(7000.0, 0.0, 100.0);
        let rotated = teme_to_ecef(&v, PI / 2.0);
        assert!(rotated.x.abs() < 1e-9);
        assert!((rotated.y + 7000.0).abs() < 1e-9);
        assert_eq!(rotated.z, 100.0);
    }

    #[test]
    fn test_equator_and_pole() {
        let eq = ecef_to_geodetic(&Vector3::new(WGS84_A + 400.0, 0.0, 0.0));
        assert!(eq.latitude.abs() < 1e-9);
        assert!((eq.altitude_km - 400.0).abs() < 1e-6);

        let b = WGS84_A * (1.0 - WGS84_F);
        let pole = ecef_to_geodetic(&Vector3::new(0.0, 0.0, b + 10.0));
        assert!((pole.latitude - 90.0).abs() < 1e-9);
        assert!((pole.altitude_km - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(190.0), -170.0);
        assert_eq!(wrap_longitude(-190.0), 170.0);
        assert_eq!(wrap_longitude(45.0), 45.0);
        assert_eq!(wrap_longitude(540.0), -180.0);
    }

    #[test]
    fn test_antimeridian_breaks() {
        assert!(antimeridian_breaks(&[]).is_empty());
        assert_eq!(antimeridian_breaks(&[10.0, 20.0]), vec![0..2]);
        assert_eq!(
            antimeridian_breaks(&[170.0, 178.0, -176.0, -170.0, 179.0]),
            vec![0..2, 2..4, 4..5]
        );
    }

    #[test]
    fn test_iss_ground_track_stays_in_band() {
        let record = TleRecord::parse(
            "1 25544U 98067A   24045.50000000  .00016717  00000-0  10270-3 0  9995",
            "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.50000000439680",
        )
        .unwrap();
        let propagator = Propagator::new(&record).unwrap();
        let start = propagator.epoch();
        let trajectory = propagator
            .propagate(start, start + Duration::minutes(95), Duration::seconds(60))
            .unwrap();
        let track = to_geodetic(&trajectory);

        assert_eq!(track.len(), trajectory.len());
        for i in 0..track.len() {
            assert!(track.latitudes[i].abs() <= 52.5, "lat {}", track.latitudes[i]);
            assert!((-180.0..=180.0).contains(&track.longitudes[i]));
            assert!(
                track.altitudes[i] > 350.0 && track.altitudes[i] < 460.0,
                "alt {}",
                track.altitudes[i]
            );
        }
        // A full revolution reaches both sides of the inclination band.
        let max_lat = track.latitudes.iter().cloned().fold(f64::MIN, f64::max);
        assert!(max_lat > 50.0);
    }

    proptest! {
        #[test]
        fn geodetic_round_trip(lat in -89.9f64..89.9, lon in -179.9f64..179.9, alt in 0.0f64..40_000.0) {
            let pos = GeodeticPosition { latitude: lat, longitude: lon, altitude_km: alt };
            let back = ecef_to_geodetic(&geodetic_to_ecef(&pos));
            prop_assert!((back.latitude - lat).abs() < 1e-8);
            prop_assert!((back.longitude - lon).abs() < 1e-8);
            prop_assert!((back.altitude_km - alt).abs() < 1e-6);
        }
    }
}
