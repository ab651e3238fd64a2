//! Joint trajectories and their velocity scaling.

use std::time::Duration;

use match_common::{Error, Result};

/// One sample of a joint trajectory.
///
/// `velocities` and `accelerations` are either empty (position-only waypoint) or hold one entry per joint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrajectoryPoint {
    pub time_from_start: Duration,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
}

impl TrajectoryPoint {
    pub fn new(
        time_from_start: Duration,
        positions: Vec<f64>,
        velocities: Vec<f64>,
        accelerations: Vec<f64>,
    ) -> Self {
        Self {
            time_from_start,
            positions,
            velocities,
            accelerations,
        }
    }
}

/// A time parameterized joint space trajectory, as handed back by a planner.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JointTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<TrajectoryPoint>,
}

impl JointTrajectory {
    pub fn new(joint_names: Vec<String>, points: Vec<TrajectoryPoint>) -> Self {
        Self {
            joint_names,
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Time from start of the last sample.
    pub fn duration(&self) -> Duration {
        self.points
            .last()
            .map(|p| p.time_from_start)
            .unwrap_or_default()
    }

    /// Whether samples are strictly increasing in time from start.
    pub fn is_time_ordered(&self) -> bool {
        self.points
            .windows(2)
            .all(|w| w[0].time_from_start < w[1].time_from_start)
    }
}

/// Rejects scale factors that are not strictly positive and finite.
pub fn validate_scale(scale: f64) -> Result<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidScale(scale))
    }
}

/// Uniformly re-time `trajectory` to run `scale` times as fast.
///
/// Times from start are divided by `scale`, velocities multiplied by `scale` and accelerations by
/// `scale²`, which keeps every sample consistent with the new timing. Position-only samples are
/// re-timed only. An empty trajectory comes back unchanged, though the scale is still checked.
pub fn scale_trajectory(mut trajectory: JointTrajectory, scale: f64) -> Result<JointTrajectory> {
    validate_scale(scale)?;

    let acceleration_scale = scale * scale;
    for point in &mut trajectory.points {
        point.time_from_start = scale_time(point.time_from_start, scale)?;
        point.velocities.iter_mut().for_each(|v| *v *= scale);
        point
            .accelerations
            .iter_mut()
            .for_each(|a| *a *= acceleration_scale);
    }
    Ok(trajectory)
}

fn scale_time(time_from_start: Duration, scale: f64) -> Result<Duration> {
    let nanos = (time_from_start.as_nanos() as f64 / scale).round();
    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        // Scale so small the trajectory would outlast a Duration
        return Err(Error::InvalidScale(scale));
    }
    Ok(Duration::from_nanos(nanos as u64))
}
