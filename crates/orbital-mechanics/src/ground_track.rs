//! Ground-track segmentation
//!
//! A ground trace is propagated over `[start, stop]` and every sample is
//! labelled relative to the window's midpoint:
//!
//! ```text
//! start ......... seg1_end ====== midpoint ====== seg2_end ......... stop
//!        Before (0)          Within (1)                  After (2)
//! ```

use crate::propagation::Propagator;
use crate::transforms::to_geodetic;
use crate::{OrbitalError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tle_elements::TleRecord;

/// Serialised as its numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
#[repr(u8)]
pub enum SegmentLabel {
    Before = 0,
    Within = 1,
    After = 2,
}

impl From<SegmentLabel> for u8 {
    fn from(label: SegmentLabel) -> u8 {
        label as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentWindow {
    pub midpoint: DateTime<Utc>,
    pub segment_1_end: DateTime<Utc>,
    pub segment_2_end: DateTime<Utc>,
}

impl SegmentWindow {
    pub fn new(
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        before: Duration,
        after: Duration,
    ) -> Result<Self> {
        if stop < start {
            return Err(OrbitalError::InvalidWindow(format!(
                "stop {} is before start {}",
                stop, start
            )));
        }
        if before < Duration::zero() || after < Duration::zero() {
            return Err(OrbitalError::InvalidWindow(
                "segment intervals must not be negative".to_string(),
            ));
        }

        let midpoint = start + (stop - start) / 2;
        Ok(Self {
            midpoint,
            segment_1_end: midpoint - before,
            segment_2_end: midpoint + after,
        })
    }

    /// Both boundaries belong to [`SegmentLabel::Within`].
    pub fn label(&self, time: DateTime<Utc>) -> SegmentLabel {
        if time < self.segment_1_end {
            SegmentLabel::Before
        } else if time <= self.segment_2_end {
            SegmentLabel::Within
        } else {
            SegmentLabel::After
        }
    }
}

/// Index of the sample nearest to `target`; the earliest index wins ties.
pub fn closest_index(times: &[DateTime<Utc>], target: DateTime<Utc>) -> Option<usize> {
    let mut best: Option<(usize, Duration)> = None;
    for (i, time) in times.iter().enumerate() {
        let diff = if *time >= target {
            *time - target
        } else {
            target - *time
        };
        match best {
            Some((_, min)) if diff >= min => {}
            _ => best = Some((i, diff)),
        }
    }
    best.map(|(i, _)| i)
}

/// Propagated, converted and labelled ground track of one element set.
#[derive(Debug, Clone, Serialize)]
pub struct GroundTrace {
    pub norad_id: u32,
    pub times: Vec<DateTime<Utc>>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub altitudes: Vec<f64>,
    pub segments: Vec<SegmentLabel>,
    pub window: SegmentWindow,
    /// Sample closest to the midpoint; `None` when nothing propagated.
    pub midpoint_index: Option<usize>,
    pub dropped: usize,
}

pub fn compute_ground_trace(
    record: &TleRecord,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    before: Duration,
    after: Duration,
    step: Duration,
) -> Result<GroundTrace> {
    let window = SegmentWindow::new(start, stop, before, after)?;
    let trajectory = Propagator::new(record)?.propagate(start, stop, step)?;
    let track = to_geodetic(&trajectory);

    let segments = trajectory.times.iter().map(|t| window.label(*t)).collect();
    let midpoint_index = closest_index(&trajectory.times, window.midpoint);

    Ok(GroundTrace {
        norad_id: record.norad_id,
        times: trajectory.times,
        latitudes: track.latitudes,
        longitudes: track.longitudes,
        altitudes: track.altitudes,
        segments,
        window,
        midpoint_index,
        dropped: trajectory.dropped,
    })
}
