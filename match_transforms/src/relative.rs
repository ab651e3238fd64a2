//! Relative motion between poses, and re-expression of motion deltas across frames.
//!
//! A motion is naturally described in whatever frame makes it simple ("5cm forward along the
//! hand"), while the planner only accepts waypoints in its planning frame. The delta is computed
//! in its natural frame first and rotated into the planning frame second. Only the rotation of the
//! frame transform matters here: a delta is a difference vector, not a location.

use match_common::messages::std_msgs;
use match_common::{Orientation, Pose, Result};
use roslibrust_common::Publish;

use crate::{FrameResolver, LookupTime, LookupTransform};

/// The motion delta taking `current` onto `target`, both expressed in the same frame.
pub fn compute_relative_pose(target: &Pose, current: &Pose) -> Pose {
    *target - *current
}

/// Re-express a delta given in some source frame in a frame where the source frame has
/// orientation `frame_rotation`.
///
/// The translation is rotated into the new frame and the rotation is conjugated by the frame
/// rotation, so `delta + current` stays valid once both are in the new frame.
pub fn reexpress_delta(delta: &Pose, frame_rotation: &Orientation) -> Pose {
    Pose::new(
        frame_rotation.rotate(&delta.position),
        delta.orientation.expressed_in(frame_rotation),
    )
}

impl<L: LookupTransform, P: Publish<std_msgs::Bool>> FrameResolver<L, P> {
    /// Re-express `delta`, computed in `source_frame`, in `planning_frame`.
    ///
    /// Resolves the current rotation of `source_frame` within `planning_frame`, with the usual
    /// resync-and-retry on failure, and applies [reexpress_delta].
    pub async fn reexpress_delta_in_planning_frame(
        &self,
        delta: &Pose,
        source_frame: &str,
        planning_frame: &str,
    ) -> Result<Pose> {
        let transform = self
            .resolve_transform(planning_frame, source_frame, LookupTime::Now)
            .await?;
        let reexpressed = reexpress_delta(delta, &transform.rotation);
        log::debug!(
            "Delta {:?} in {source_frame} is {:?} in {planning_frame}",
            delta.position,
            reexpressed.position
        );
        Ok(reexpressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use match_common::Point3;
    use std::f64::consts::{FRAC_PI_2, PI};

    const TOL: f64 = 1e-9;

    #[test]
    fn relative_pose_of_translated_goal() {
        let goal = Pose::new(Point3::new(1.0, 0.0, 0.0), Orientation::new(1.0, 0.0, 0.0, 0.0));
        let current = Pose::identity();
        let delta = compute_relative_pose(&goal, &current);
        assert_eq!(delta, Pose::from_position(Point3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn forward_in_hand_frame_becomes_sideways_in_base_frame() {
        // Hand yawed a quarter turn relative to the base
        let hand_in_base = Orientation::from_yaw(FRAC_PI_2);
        let forward = Pose::from_position(Point3::new(0.05, 0.0, 0.0));
        let in_base = reexpress_delta(&forward, &hand_in_base);
        assert!(in_base
            .position
            .approx_eq(&Point3::new(0.0, 0.05, 0.0), TOL));
        assert!(in_base.orientation.approx_eq(&Orientation::identity(), TOL));
    }

    #[test]
    fn reexpressed_delta_reaches_reexpressed_target() {
        // Both poses known in a map frame, map rotated arbitrarily relative to the planning frame
        let map_in_planning = Orientation::from_axis_angle(Point3::new(0.2, -1.0, 0.5), 1.1);
        let current = Pose::new(
            Point3::new(0.4, 0.1, 0.7),
            Orientation::from_axis_angle(Point3::new(0.0, 1.0, 0.0), PI / 3.0),
        );
        let target = Pose::new(
            Point3::new(0.5, -0.2, 0.6),
            Orientation::from_axis_angle(Point3::new(1.0, 0.0, 1.0), 0.4),
        );

        let in_planning = |p: &Pose| {
            Pose::new(
                map_in_planning.rotate(&p.position),
                map_in_planning * p.orientation,
            )
        };

        let delta = reexpress_delta(&compute_relative_pose(&target, &current), &map_in_planning);
        let reached = delta + in_planning(&current);

        let expected = in_planning(&target);
        assert!(reached.approx_eq(&expected, TOL), "{reached:?} vs {expected:?}");
    }

    #[test]
    fn identity_frame_rotation_leaves_delta_unchanged() {
        let delta = Pose::planar(0.3, -0.1, 0.25);
        let same = reexpress_delta(&delta, &Orientation::identity());
        assert!(same.approx_eq(&delta, TOL));
    }
}
