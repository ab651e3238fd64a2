//! Arm motion flows against a recording planning group and a transform buffer filled by hand.

use std::f64::consts::FRAC_PI_2;
use std::sync::Mutex;
use std::time::Duration;

use match_common::messages::geometry_msgs::{self, TransformStamped};
use match_common::messages::{std_msgs, Time};
use match_common::{Error, Orientation, Point3, Pose, Result};
use match_robots::{ArmMover, JointTrajectory, PlanningGroup, RobotConfig, TrajectoryPoint};
use match_transforms::{LookupTime, TfBuffer};
use roslibrust_mock::MockRos;

/// Stands in for the motion planner, answering every plan request with the same trajectory.
struct RecordingGroup {
    current: Pose,
    plan: JointTrajectory,
    execute_succeeds: bool,
    plan_fails: bool,
    calls: Mutex<Vec<&'static str>>,
    executed: Mutex<Vec<JointTrajectory>>,
    waypoints: Mutex<Vec<(Vec<Pose>, f64)>>,
}

impl RecordingGroup {
    fn new(current: Pose, plan: JointTrajectory) -> Self {
        Self {
            current,
            plan,
            execute_succeeds: true,
            plan_fails: false,
            calls: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            waypoints: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn planned(&self) -> Result<JointTrajectory> {
        if self.plan_fails {
            Err(Error::Unexpected(anyhow::anyhow!("Planner not reachable")))
        } else {
            Ok(self.plan.clone())
        }
    }
}

impl PlanningGroup for RecordingGroup {
    async fn current_pose(&self) -> Result<Pose> {
        self.record("current_pose");
        Ok(self.current)
    }

    async fn plan_to_pose(&self, _target: &Pose) -> Result<JointTrajectory> {
        self.record("plan_to_pose");
        self.planned()
    }

    async fn plan_to_joints(&self, _target: &[f64]) -> Result<JointTrajectory> {
        self.record("plan_to_joints");
        self.planned()
    }

    async fn compute_cartesian_path(
        &self,
        waypoints: &[Pose],
        eef_step: f64,
    ) -> Result<(JointTrajectory, f64)> {
        self.record("compute_cartesian_path");
        self.waypoints
            .lock()
            .unwrap()
            .push((waypoints.to_vec(), eef_step));
        Ok((self.plan.clone(), 1.0))
    }

    async fn execute(&self, trajectory: &JointTrajectory) -> Result<bool> {
        self.record("execute");
        self.executed.lock().unwrap().push(trajectory.clone());
        Ok(self.execute_succeeds)
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop");
        Ok(())
    }

    async fn clear_pose_targets(&self) -> Result<()> {
        self.record("clear_pose_targets");
        Ok(())
    }
}

fn one_point_plan() -> JointTrajectory {
    JointTrajectory::new(
        vec!["panda_joint1".to_string()],
        vec![TrajectoryPoint::new(
            Duration::from_secs(1),
            vec![0.2],
            vec![1.0],
            vec![1.0],
        )],
    )
}

fn static_transform(parent: &str, child: &str, pose: Pose) -> TransformStamped {
    TransformStamped {
        header: std_msgs::Header {
            seq: 0,
            stamp: Time::default(),
            frame_id: parent.to_string(),
        },
        child_frame_id: child.to_string(),
        transform: geometry_msgs::Transform {
            translation: pose.position.into(),
            rotation: pose.orientation.into(),
        },
    }
}

/// Map, arm base and hand, with the arm base turned a quarter turn in the map.
async fn arm_mover(
    group: RecordingGroup,
) -> ArmMover<RecordingGroup, TfBuffer, roslibrust_mock::MockPublisher<std_msgs::Bool>> {
    let ros = MockRos::new();
    let config = RobotConfig::default();
    let buffer = TfBuffer::new(&ros).await.unwrap();
    buffer
        .add_transform(
            static_transform(
                "map",
                &config.planning_frame(),
                Pose::new(Point3::new(1.0, 0.0, 0.0), Orientation::from_yaw(FRAC_PI_2)),
            ),
            true,
        )
        .await;
    buffer
        .add_transform(
            static_transform(
                &config.planning_frame(),
                &config.hand_frame(),
                Pose::new(Point3::new(0.3, 0.0, 0.5), Orientation::from_yaw(FRAC_PI_2)),
            ),
            true,
        )
        .await;
    let resolver = config.frame_resolver(&ros, buffer).await.unwrap();
    ArmMover::new(group, resolver, &config)
}

#[test_log::test(tokio::test)]
async fn test_move_pose_executes_scaled_plan() {
    let mover = arm_mover(RecordingGroup::new(Pose::identity(), one_point_plan())).await;

    mover
        .move_pose(&Pose::planar(0.4, 0.1, 0.0), 0.5)
        .await
        .unwrap();

    let group = mover.group();
    assert_eq!(
        group.calls(),
        vec!["plan_to_pose", "execute", "stop", "clear_pose_targets"]
    );
    let executed = group.executed.lock().unwrap();
    let point = &executed[0].points[0];
    assert_eq!(point.time_from_start, Duration::from_secs(2));
    assert_eq!(point.velocities, vec![0.5]);
    assert_eq!(point.accelerations, vec![0.25]);
    assert_eq!(point.positions, vec![0.2]);
}

#[test_log::test(tokio::test)]
async fn test_empty_plan_is_not_executed() {
    let mover = arm_mover(RecordingGroup::new(
        Pose::identity(),
        JointTrajectory::default(),
    ))
    .await;

    let err = mover.move_joints(&[0.0; 7], 1.0).await.unwrap_err();
    assert!(matches!(err, Error::NoPlanFound(_)));
    assert!(mover.group().executed.lock().unwrap().is_empty());
    assert_eq!(
        mover.group().calls(),
        vec!["plan_to_joints", "stop", "clear_pose_targets"]
    );

    let err = mover
        .move_lin(&Pose::from_position(Point3::new(0.0, 0.0, 0.1)), 1.0, "panda_hand")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoPlanFound(_)));
    assert!(mover.group().executed.lock().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_failed_execution_is_reported() {
    let mut group = RecordingGroup::new(Pose::identity(), one_point_plan());
    group.execute_succeeds = false;
    let mover = arm_mover(group).await;

    let err = mover.move_pose(&Pose::identity(), 1.0).await.unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed(_)));
    // No residual motion even after a failure
    assert!(mover.group().calls().contains(&"stop"));
}

#[test_log::test(tokio::test)]
async fn test_planning_error_still_settles_arm() {
    let mut group = RecordingGroup::new(Pose::identity(), one_point_plan());
    group.plan_fails = true;
    let mover = arm_mover(group).await;

    let err = mover.move_pose(&Pose::identity(), 1.0).await.unwrap_err();
    assert!(matches!(err, Error::Unexpected(_)));
    assert_eq!(
        mover.group().calls(),
        vec!["plan_to_pose", "stop", "clear_pose_targets"]
    );

    let err = mover.move_joints(&[0.0; 7], 1.0).await.unwrap_err();
    assert!(matches!(err, Error::Unexpected(_)));
    assert_eq!(
        mover.group().calls()[3..],
        ["plan_to_joints", "stop", "clear_pose_targets"]
    );
    assert!(mover.group().executed.lock().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_invalid_scale_rejected_before_planning() {
    let mover = arm_mover(RecordingGroup::new(Pose::identity(), one_point_plan())).await;

    for scale in [0.0, -0.5] {
        let err = mover.move_pose(&Pose::identity(), scale).await.unwrap_err();
        assert!(matches!(err, Error::InvalidScale(_)));
    }
    assert!(mover.group().calls().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_move_lin_in_hand_frame() {
    let current = Pose::new(Point3::new(0.3, 0.0, 0.5), Orientation::from_yaw(FRAC_PI_2));
    let mover = arm_mover(RecordingGroup::new(current, one_point_plan())).await;

    // Forward along the hand, which points along the arm base's y axis
    let forward = Pose::from_position(Point3::new(0.05, 0.0, 0.0));
    mover.move_lin(&forward, 0.5, "panda_hand").await.unwrap();

    let waypoints = mover.group().waypoints.lock().unwrap();
    let (path, eef_step) = &waypoints[0];
    assert_eq!(*eef_step, 0.01);
    assert_eq!(path[0], current);
    assert!(path[1].position.approx_eq(&Point3::new(0.3, 0.05, 0.5), 1e-6));
    assert!(path[1].orientation.approx_eq(&current.orientation, 1e-6));

    let executed = mover.group().executed.lock().unwrap();
    assert_eq!(executed[0].duration(), Duration::from_secs(2));
}

#[test_log::test(tokio::test)]
async fn test_move_pose_via_hand_in_map_frame() {
    let current = Pose::new(Point3::new(0.3, 0.0, 0.5), Orientation::from_yaw(FRAC_PI_2));
    let mover = arm_mover(RecordingGroup::new(current, one_point_plan())).await;

    // The hand sits at (1.0, 0.3, 0.5) in the map; ask for 10cm further along the map's y axis
    let hand_in_map = mover
        .resolver()
        .pose_of("panda_hand", "map", LookupTime::Now)
        .await
        .unwrap();
    assert!(hand_in_map
        .position
        .approx_eq(&Point3::new(1.0, 0.3, 0.5), 1e-6));

    let target = Pose::new(Point3::new(1.0, 0.4, 0.5), hand_in_map.orientation);
    mover.move_pose_via_hand(&target, "map", 1.0).await.unwrap();

    // Map y is the arm base's x
    let waypoints = mover.group().waypoints.lock().unwrap();
    let (path, _) = &waypoints[0];
    assert!(path[1].position.approx_eq(&Point3::new(0.4, 0.0, 0.5), 1e-6));
    assert!(path[1].orientation.approx_eq(&current.orientation, 1e-6));
}
