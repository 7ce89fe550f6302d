//! SGP4 propagation

use crate::{OrbitalError, Result, StateVector};
use chrono::{DateTime, Duration, Utc};
use nalgebra::Vector3;
use serde::Serialize;
use std::thread;
use tle_elements::TleRecord;
use tracing::debug;

/// Default sampling interval.
pub const DEFAULT_STEP_SECONDS: i64 = 60;

/// Samples of one propagation run, stored as parallel arrays.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Trajectory {
    pub norad_id: u32,
    pub times: Vec<DateTime<Utc>>,
    /// TEME positions (km).
    pub positions: Vec<Vector3<f64>>,
    /// TEME velocities (km/s).
    pub velocities: Vec<Vector3<f64>>,
    /// Samples the model could not produce.
    pub dropped: usize,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<StateVector> {
        Some(StateVector {
            position: *self.positions.get(index)?,
            velocity: *self.velocities.get(index)?,
            epoch: *self.times.get(index)?,
        })
    }
}

/// SGP4 model initialised once for one element set.
pub struct Propagator {
    norad_id: u32,
    epoch: DateTime<Utc>,
    constants: sgp4::Constants,
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator")
            .field("norad_id", &self.norad_id)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl Propagator {
    pub fn new(record: &TleRecord) -> Result<Self> {
        let (line1, line2) = record.lines();
        let elements = sgp4::Elements::from_tle(None, line1.as_bytes(), line2.as_bytes())
            .map_err(|e| OrbitalError::InvalidTle(format!("NORAD {}: {:?}", record.norad_id, e)))?;

        let constants = sgp4::Constants::from_elements(&elements)
            .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

        let epoch = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);

        Ok(Self {
            norad_id: record.norad_id,
            epoch,
            constants,
        })
    }

    pub fn norad_id(&self) -> u32 {
        self.norad_id
    }

    /// Epoch of the element set the model was built from.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// State at a single instant.
    pub fn position_at(&self, time: DateTime<Utc>) -> Result<StateVector> {
        let minutes_since_epoch =
            time.signed_duration_since(self.epoch).num_milliseconds() as f64 / 60_000.0;

        let prediction = self
            .constants
            .propagate(minutes_since_epoch)
            .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

        Ok(StateVector {
            position: Vector3::from(prediction.position),
            velocity: Vector3::from(prediction.velocity),
            epoch: time,
        })
    }

    /// Sample `start..=stop` every `step`. Samples the model rejects are
    /// counted in [`Trajectory::dropped`] and skipped.
    pub fn propagate(
        &self,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        step: Duration,
    ) -> Result<Trajectory> {
        if step <= Duration::zero() {
            return Err(OrbitalError::InvalidWindow(format!(
                "step must be positive, got {}s",
                step.num_seconds()
            )));
        }
        if stop < start {
            return Err(OrbitalError::InvalidWindow(format!(
                "stop {} is before start {}",
                stop, start
            )));
        }

        let mut trajectory = Trajectory {
            norad_id: self.norad_id,
            ..Trajectory::default()
        };

        let mut time = start;
        while time <= stop {
            match self.position_at(time) {
                Ok(state) => {
                    trajectory.times.push(time);
                    trajectory.positions.push(state.position);
                    trajectory.velocities.push(state.velocity);
                }
                Err(e) => {
                    debug!("NORAD {} at {}: {}", self.norad_id, time, e);
                    trajectory.dropped += 1;
                }
            }
            time += step;
        }

        Ok(trajectory)
    }
}

/// Orbital period from the mean motion of `record`.
pub fn orbital_period_minutes(record: &TleRecord) -> f64 {
    record.orbital_period_minutes()
}

/// Half an orbital period either side of `epoch`.
pub fn default_window(epoch: DateTime<Utc>, period_minutes: f64) -> (DateTime<Utc>, DateTime<Utc>) {
    let half = Duration::milliseconds((period_minutes * 30_000.0).round() as i64);
    (epoch - half, epoch + half)
}

/// Propagate every record over the same window on scoped worker threads.
/// Results come back in input order.
pub fn propagate_all(
    records: &[TleRecord],
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    step: Duration,
) -> Vec<(u32, Result<Trajectory>)> {
    if records.is_empty() {
        return Vec::new();
    }
    let workers = thread::available_parallelism().map_or(1, |n| n.get());
    let chunk_size = records.len().div_ceil(workers);

    thread::scope(|s| {
        let handles: Vec<_> = records
            .chunks(chunk_size)
            .map(|chunk| {
                s.spawn(move || {
                    chunk
                        .iter()
                        .map(|record| {
                            let result = Propagator::new(record)
                                .and_then(|p| p.propagate(start, stop, step));
                            (record.norad_id, result)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    vec![(0, Err(OrbitalError::PropagationFailed("worker panicked".to_string())))]
                })
            })
            .collect()
    })
}
