//! Orbital Mechanics Library
//!
//! SGP4 propagation of archived element sets, TEME to geodetic transforms
//! and ground-track segmentation around a reference time.

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ground_track;
pub mod propagation;
pub mod timespec;
pub mod transforms;

pub use ground_track::{closest_index, compute_ground_trace, GroundTrace, SegmentLabel, SegmentWindow};
pub use propagation::{default_window, orbital_period_minutes, propagate_all, Propagator, Trajectory};
pub use timespec::{parse_stop_time, parse_time_input};
pub use transforms::{antimeridian_breaks, to_geodetic, GeodeticTrack};

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("Propagation failed: {0}")]
    PropagationFailed(String),
    #[error("Invalid window: {0}")]
    InvalidWindow(String),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// TEME position (km) and velocity (km/s) at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub epoch: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}
