//! Motion commands for a mobile manipulator: an arm on a mobile base.
//!
//! - [trajectory] re-times planned joint trajectories to run slower or faster
//! - [nav_goal] sends goals to the base's navigation stack and tracks when the next one may go out
//! - [arm] moves the arm to absolute or relative poses through an external motion planner
//! - [joints] follows the arm's joint states
//! - [config] names the topics and frames of one robot
//!
//! Frame lookups come from [match_transforms], pose arithmetic from [match_common].

pub mod arm;
pub mod config;
pub mod joints;
pub mod nav_goal;
pub mod trajectory;

pub use arm::{ArmMover, GraspGoals, PlanningGroup};
pub use config::RobotConfig;
pub use joints::{JointStateCache, JointStateMonitor};
pub use nav_goal::{NavGoalClient, NavGoalTracker};
pub use trajectory::{scale_trajectory, JointTrajectory, TrajectoryPoint};
