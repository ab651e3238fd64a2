//! Arm motions on top of an external motion planner.
//!
//! Planning and execution are left to whatever implements [PlanningGroup]. [ArmMover] adds what
//! the planner does not do: relative motions given in arbitrary frames, velocity scaling of the
//! returned trajectories, and refusing to execute empty plans.

use std::future::Future;

use match_common::messages::std_msgs;
use match_common::{Error, Orientation, Pose, Result};
use match_transforms::{FrameResolver, LookupTime, LookupTransform};
use roslibrust_common::Publish;

use crate::config::RobotConfig;
use crate::trajectory::{scale_trajectory, validate_scale, JointTrajectory};

/// A planning group of a motion planner, such as a MoveIt move group.
///
/// Poses are in the group's planning frame.
pub trait PlanningGroup: Send + Sync {
    /// Current pose of the end effector.
    fn current_pose(&self) -> impl Future<Output = Result<Pose>> + Send;

    /// Plan to an end effector pose. An empty trajectory means no plan was found.
    fn plan_to_pose(&self, target: &Pose) -> impl Future<Output = Result<JointTrajectory>> + Send;

    /// Plan to a joint space goal. An empty trajectory means no plan was found.
    fn plan_to_joints(
        &self,
        target: &[f64],
    ) -> impl Future<Output = Result<JointTrajectory>> + Send;

    /// Plan a straight line path through `waypoints`, interpolated every `eef_step` meters.
    ///
    /// Returns the trajectory and the fraction of the path it covers.
    fn compute_cartesian_path(
        &self,
        waypoints: &[Pose],
        eef_step: f64,
    ) -> impl Future<Output = Result<(JointTrajectory, f64)>> + Send;

    /// Execute a trajectory and wait for it to finish. Returns whether execution succeeded.
    fn execute(&self, trajectory: &JointTrajectory) -> impl Future<Output = Result<bool>> + Send;

    /// Make sure no residual motion is left.
    fn stop(&self) -> impl Future<Output = Result<()>> + Send;

    fn clear_pose_targets(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Drives one arm through a [PlanningGroup], resolving frames with a [FrameResolver].
pub struct ArmMover<G, L, P>
where
    G: PlanningGroup,
    L: LookupTransform,
    P: Publish<std_msgs::Bool>,
{
    group: G,
    resolver: FrameResolver<L, P>,
    planning_frame: String,
    hand_frame: String,
    eef_step: f64,
}

impl<G, L, P> ArmMover<G, L, P>
where
    G: PlanningGroup,
    L: LookupTransform,
    P: Publish<std_msgs::Bool>,
{
    pub fn new(group: G, resolver: FrameResolver<L, P>, config: &RobotConfig) -> Self {
        Self {
            group,
            resolver,
            planning_frame: config.planning_frame(),
            hand_frame: config.hand_frame(),
            eef_step: config.eef_step,
        }
    }

    pub fn group(&self) -> &G {
        &self.group
    }

    pub fn resolver(&self) -> &FrameResolver<L, P> {
        &self.resolver
    }

    pub fn planning_frame(&self) -> &str {
        &self.planning_frame
    }

    /// Move the end effector to `target`, given in the planning frame, at `velocity_scale`
    /// times the planned speed.
    pub async fn move_pose(&self, target: &Pose, velocity_scale: f64) -> Result<()> {
        validate_scale(velocity_scale)?;
        let result = match self.group.plan_to_pose(target).await {
            Ok(plan) => self.execute_scaled(plan, velocity_scale, "pose motion").await,
            Err(e) => Err(e),
        };
        self.settle().await?;
        result
    }

    /// Move to a joint space goal at `velocity_scale` times the planned speed.
    pub async fn move_joints(&self, target: &[f64], velocity_scale: f64) -> Result<()> {
        validate_scale(velocity_scale)?;
        let result = match self.group.plan_to_joints(target).await {
            Ok(plan) => self.execute_scaled(plan, velocity_scale, "joint motion").await,
            Err(e) => Err(e),
        };
        self.settle().await?;
        result
    }

    /// Move the end effector in a straight line by `delta`, given in `in_frame`.
    ///
    /// The delta is rotated into the planning frame and applied to the current pose there.
    pub async fn move_lin(&self, delta: &Pose, velocity_scale: f64, in_frame: &str) -> Result<()> {
        validate_scale(velocity_scale)?;
        let delta = self
            .resolver
            .reexpress_delta_in_planning_frame(delta, in_frame, &self.planning_frame)
            .await?;

        let current = self.group.current_pose().await?;
        let waypoints = [current, delta + current];
        let (plan, fraction) = self
            .group
            .compute_cartesian_path(&waypoints, self.eef_step)
            .await?;
        if !plan.is_empty() && fraction < 1.0 {
            log::warn!(
                "Linear motion only covers {:.0}% of the requested path",
                fraction * 100.0
            );
        }
        self.execute_scaled(plan, velocity_scale, "linear motion")
            .await
    }

    /// Move the end effector in a straight line to `target`, given in `frame`.
    ///
    /// The remaining distance is measured from where the hand is in `frame` right now, so an
    /// offset between the planner's idea of the arm and the world does not accumulate.
    pub async fn move_pose_via_hand(
        &self,
        target: &Pose,
        frame: &str,
        velocity_scale: f64,
    ) -> Result<()> {
        let hand = self
            .resolver
            .pose_of(&self.hand_frame, frame, LookupTime::Now)
            .await?;
        let delta = *target - hand;
        log::debug!(
            "Hand at {:?} in {frame}, moving by {:?}",
            hand.position,
            delta.position
        );
        self.move_lin(&delta, velocity_scale, frame).await
    }

    async fn execute_scaled(
        &self,
        plan: JointTrajectory,
        velocity_scale: f64,
        motion: &str,
    ) -> Result<()> {
        if plan.is_empty() {
            log::info!("No plan found for {motion}");
            return Err(Error::NoPlanFound(motion.to_string()));
        }
        let plan = scale_trajectory(plan, velocity_scale)?;
        log::debug!(
            "Executing {motion}: {} points over {:?}",
            plan.len(),
            plan.duration()
        );
        if self.group.execute(&plan).await? {
            Ok(())
        } else {
            log::warn!("Execution of {motion} failed");
            Err(Error::ExecutionFailed(motion.to_string()))
        }
    }

    async fn settle(&self) -> Result<()> {
        self.group.stop().await?;
        self.group.clear_pose_targets().await
    }
}

/// Joint goal used when fewer than seven values are given.
pub const DEFAULT_JOINT_GOAL: [f64; 7] = [
    -0.09165325995045537,
    -0.1307664982896102,
    -0.08691672911214791,
    -1.2039535559629443,
    -0.058938511593474276,
    1.7850536203251945,
    -1.5727488613542584,
];

/// Goals for grasping an object, relative to the platform carrying it.
#[derive(Debug, Clone, PartialEq)]
pub struct GraspGoals {
    pub pre_grasp: Pose,
    pub grasp: Pose,
    /// Seven joint values for a seven axis arm.
    pub joint_goal: Vec<f64>,
}

impl Default for GraspGoals {
    fn default() -> Self {
        Self {
            pre_grasp: Pose::identity(),
            grasp: Pose::identity(),
            joint_goal: DEFAULT_JOINT_GOAL.to_vec(),
        }
    }
}

impl GraspGoals {
    pub fn new(pre_grasp: Pose, joint_goal: Vec<f64>, grasp: Pose) -> Self {
        let joint_goal = if joint_goal.len() < DEFAULT_JOINT_GOAL.len() {
            log::warn!(
                "Joint goal has {} values, using the default joint goal",
                joint_goal.len()
            );
            DEFAULT_JOINT_GOAL.to_vec()
        } else {
            joint_goal
        };
        Self {
            pre_grasp,
            grasp,
            joint_goal,
        }
    }

    /// The motion from `base` to `grab`, or to the pre-grasp pose when no grab pose is given.
    pub fn relative_goal(&self, base: &Pose, grab: Option<&Pose>) -> Pose {
        *grab.unwrap_or(&self.pre_grasp) - *base
    }

    /// `pose` seen from its own frame: the translation rotated back by the pose's orientation,
    /// and the inverse orientation.
    pub fn in_base_frame(pose: &Pose) -> Pose {
        let inverse: Orientation = pose.orientation.conjugate();
        Pose::new(inverse.rotate(&pose.position), inverse.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use match_common::Point3;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn short_joint_goal_falls_back_to_default() {
        let goals = GraspGoals::new(Pose::identity(), vec![0.0; 6], Pose::identity());
        assert_eq!(goals.joint_goal, DEFAULT_JOINT_GOAL.to_vec());

        let custom = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7];
        let goals = GraspGoals::new(Pose::identity(), custom.clone(), Pose::identity());
        assert_eq!(goals.joint_goal, custom);
    }

    #[test]
    fn relative_goal_defaults_to_pre_grasp() {
        let pre = Pose::from_position(Point3::new(0.5, 0.1, 0.3));
        let goals = GraspGoals::new(pre, vec![], Pose::identity());
        let base = Pose::from_position(Point3::new(0.1, 0.1, 0.1));

        let delta = goals.relative_goal(&base, None);
        assert!(delta.approx_eq(&Pose::from_position(Point3::new(0.4, 0.0, 0.2)), 1e-12));

        let grab = Pose::planar(1.0, 0.0, 0.3);
        let delta = goals.relative_goal(&base, Some(&grab));
        assert!((delta + base).approx_eq(&grab, 1e-12));
    }

    #[test]
    fn in_base_frame_undoes_the_rotation() {
        let pose = Pose::new(Point3::new(1.0, 0.0, 0.0), Orientation::from_yaw(FRAC_PI_2));
        let in_base = GraspGoals::in_base_frame(&pose);
        assert!(in_base
            .position
            .approx_eq(&Point3::new(0.0, -1.0, 0.0), 1e-12));
        assert!(in_base
            .orientation
            .approx_eq(&Orientation::from_yaw(-FRAC_PI_2), 1e-12));
    }
}
