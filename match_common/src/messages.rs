//! ROS1 message types for the topics the motion stack publishes and subscribes to.
//!
//! These mirror what roslibrust's codegen would emit for the same `.msg` files, restricted to the
//! handful of types this stack needs so no ROS installation is required to build it.

use roslibrust_common::RosMessageType;
use serde::{Deserialize, Serialize};

// Full definitions, dependencies included, as sent in ROS1 connection headers.
// Each dependency block starts with a line of 80 '=' and names its type.

macro_rules! dependency {
    ($name:literal, $body:literal) => {
        concat!(
            "\n================================================================================\n",
            "MSG: ",
            $name,
            "\n",
            $body
        )
    };
}

macro_rules! header_msg {
    () => {
        dependency!(
            "std_msgs/Header",
            "uint32 seq\ntime stamp\nstring frame_id"
        )
    };
}

macro_rules! quaternion_msg {
    () => {
        dependency!(
            "geometry_msgs/Quaternion",
            "float64 x\nfloat64 y\nfloat64 z\nfloat64 w"
        )
    };
}

/// ROS1 `time` primitive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Time {
    pub secs: i32,
    pub nsecs: i32,
}

impl Time {
    /// Wall clock time, the equivalent of `ros::Time::now()` without sim time.
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: now.as_secs() as i32,
            nsecs: now.subsec_nanos() as i32,
        }
    }

    pub fn as_nanos(&self) -> u128 {
        (self.secs.max(0) as u128) * 1_000_000_000 + (self.nsecs.max(0) as u128)
    }
}

pub mod std_msgs {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Header {
        pub seq: u32,
        pub stamp: Time,
        pub frame_id: String,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Bool {
        pub data: bool,
    }

    impl RosMessageType for Bool {
        const ROS_TYPE_NAME: &'static str = "std_msgs/Bool";
        const MD5SUM: &'static str = "8b94c1b53db61fb6aed406028ad6332a";
        const DEFINITION: &'static str = "bool data";
    }
}

pub mod geometry_msgs {
    use super::*;
    use crate::geometry;

    #[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point {
        pub x: f64,
        pub y: f64,
        pub z: f64,
    }

    #[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3 {
        pub x: f64,
        pub y: f64,
        pub z: f64,
    }

    #[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Quaternion {
        pub x: f64,
        pub y: f64,
        pub z: f64,
        pub w: f64,
    }

    #[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Pose {
        pub position: Point,
        pub orientation: Quaternion,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PoseStamped {
        pub header: std_msgs::Header,
        pub pose: Pose,
    }

    impl RosMessageType for PoseStamped {
        const ROS_TYPE_NAME: &'static str = "geometry_msgs/PoseStamped";
        const MD5SUM: &'static str = "d3812c3cbc69362b77dc0b19b345f8f5";
        const DEFINITION: &'static str = concat!(
            "Header header\nPose pose",
            header_msg!(),
            dependency!(
                "geometry_msgs/Pose",
                "Point position\nQuaternion orientation"
            ),
            dependency!("geometry_msgs/Point", "float64 x\nfloat64 y\nfloat64 z"),
            quaternion_msg!(),
        );
    }

    #[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Transform {
        pub translation: Vector3,
        pub rotation: Quaternion,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TransformStamped {
        pub header: std_msgs::Header,
        pub child_frame_id: String,
        pub transform: Transform,
    }

    impl From<Point> for geometry::Point3 {
        fn from(p: Point) -> Self {
            geometry::Point3::new(p.x, p.y, p.z)
        }
    }

    impl From<geometry::Point3> for Point {
        fn from(p: geometry::Point3) -> Self {
            Point {
                x: p.x,
                y: p.y,
                z: p.z,
            }
        }
    }

    impl From<Vector3> for geometry::Point3 {
        fn from(v: Vector3) -> Self {
            geometry::Point3::new(v.x, v.y, v.z)
        }
    }

    impl From<geometry::Point3> for Vector3 {
        fn from(p: geometry::Point3) -> Self {
            Vector3 {
                x: p.x,
                y: p.y,
                z: p.z,
            }
        }
    }

    impl From<Quaternion> for geometry::Orientation {
        fn from(q: Quaternion) -> Self {
            geometry::Orientation::new(q.w, q.x, q.y, q.z)
        }
    }

    impl From<geometry::Orientation> for Quaternion {
        fn from(q: geometry::Orientation) -> Self {
            Quaternion {
                x: q.x,
                y: q.y,
                z: q.z,
                w: q.w,
            }
        }
    }

    impl From<Pose> for geometry::Pose {
        fn from(p: Pose) -> Self {
            geometry::Pose::new(p.position.into(), p.orientation.into())
        }
    }

    impl From<geometry::Pose> for Pose {
        fn from(p: geometry::Pose) -> Self {
            Pose {
                position: p.position.into(),
                orientation: p.orientation.into(),
            }
        }
    }
}

pub mod actionlib_msgs {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct GoalID {
        pub stamp: Time,
        pub id: String,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct GoalStatus {
        pub goal_id: GoalID,
        pub status: u8,
        pub text: String,
    }

    impl GoalStatus {
        pub const PENDING: u8 = 0;
        pub const ACTIVE: u8 = 1;
        pub const PREEMPTED: u8 = 2;
        pub const SUCCEEDED: u8 = 3;
        pub const ABORTED: u8 = 4;
        pub const REJECTED: u8 = 5;
        pub const PREEMPTING: u8 = 6;
        pub const RECALLING: u8 = 7;
        pub const RECALLED: u8 = 8;
        pub const LOST: u8 = 9;
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct GoalStatusArray {
        pub header: std_msgs::Header,
        pub status_list: Vec<GoalStatus>,
    }

    impl RosMessageType for GoalStatusArray {
        const ROS_TYPE_NAME: &'static str = "actionlib_msgs/GoalStatusArray";
        const MD5SUM: &'static str = "8b2b82f13216d0a8ea88bd3af735e619";
        const DEFINITION: &'static str = concat!(
            "Header header\nGoalStatus[] status_list",
            header_msg!(),
            dependency!(
                "actionlib_msgs/GoalStatus",
                "GoalID goal_id\n\
                 uint8 status\n\
                 uint8 PENDING=0\n\
                 uint8 ACTIVE=1\n\
                 uint8 PREEMPTED=2\n\
                 uint8 SUCCEEDED=3\n\
                 uint8 ABORTED=4\n\
                 uint8 REJECTED=5\n\
                 uint8 PREEMPTING=6\n\
                 uint8 RECALLING=7\n\
                 uint8 RECALLED=8\n\
                 uint8 LOST=9\n\
                 string text"
            ),
            dependency!("actionlib_msgs/GoalID", "time stamp\nstring id"),
        );
    }
}

pub mod sensor_msgs {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct JointState {
        pub header: std_msgs::Header,
        pub name: Vec<String>,
        pub position: Vec<f64>,
        pub velocity: Vec<f64>,
        pub effort: Vec<f64>,
    }

    impl RosMessageType for JointState {
        const ROS_TYPE_NAME: &'static str = "sensor_msgs/JointState";
        const MD5SUM: &'static str = "3066dcd76a6cfaef579bd0f34173e9fd";
        const DEFINITION: &'static str = concat!(
            "Header header\nstring[] name\nfloat64[] position\nfloat64[] velocity\nfloat64[] effort",
            header_msg!(),
        );
    }
}

pub mod tf2_msgs {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TFMessage {
        pub transforms: Vec<geometry_msgs::TransformStamped>,
    }

    impl RosMessageType for TFMessage {
        const ROS_TYPE_NAME: &'static str = "tf2_msgs/TFMessage";
        const MD5SUM: &'static str = "94810edda583a504dfda3829e70d7eec";
        const DEFINITION: &'static str = concat!(
            "geometry_msgs/TransformStamped[] transforms",
            dependency!(
                "geometry_msgs/TransformStamped",
                "Header header\nstring child_frame_id\nTransform transform"
            ),
            header_msg!(),
            dependency!(
                "geometry_msgs/Transform",
                "Vector3 translation\nQuaternion rotation"
            ),
            dependency!("geometry_msgs/Vector3", "float64 x\nfloat64 y\nfloat64 z"),
            quaternion_msg!(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{actionlib_msgs, geometry_msgs, sensor_msgs, tf2_msgs};
    use roslibrust_common::RosMessageType;
    use crate::geometry::{Orientation, Point3, Pose};

    #[test]
    fn pose_message_conversion_keeps_component_order() {
        let pose = Pose::new(
            Point3::new(1.0, 2.0, 3.0),
            Orientation::new(0.5, 0.5, -0.5, 0.5),
        );
        let msg: geometry_msgs::Pose = pose.into();
        assert_eq!(msg.orientation.w, 0.5);
        assert_eq!(msg.orientation.y, -0.5);
        assert_eq!(msg.position.z, 3.0);
        assert_eq!(Pose::from(msg), pose);
    }

    #[test]
    fn time_now_is_after_epoch() {
        let now = super::Time::now();
        assert!(now.secs > 0);
        assert!(now.as_nanos() > 0);
    }

    /// Names of the dependency blocks in a full definition, in order.
    fn dependencies(definition: &str) -> Vec<&str> {
        definition
            .split("\n================================================================================\n")
            .skip(1)
            .map(|block| {
                let first = block.lines().next().unwrap_or_default();
                first.strip_prefix("MSG: ").unwrap_or(first)
            })
            .collect()
    }

    #[test]
    fn definitions_carry_their_dependencies() {
        assert_eq!(
            dependencies(geometry_msgs::PoseStamped::DEFINITION),
            [
                "std_msgs/Header",
                "geometry_msgs/Pose",
                "geometry_msgs/Point",
                "geometry_msgs/Quaternion"
            ]
        );
        assert_eq!(
            dependencies(actionlib_msgs::GoalStatusArray::DEFINITION),
            [
                "std_msgs/Header",
                "actionlib_msgs/GoalStatus",
                "actionlib_msgs/GoalID"
            ]
        );
        assert_eq!(
            dependencies(sensor_msgs::JointState::DEFINITION),
            ["std_msgs/Header"]
        );
        assert_eq!(
            dependencies(tf2_msgs::TFMessage::DEFINITION),
            [
                "geometry_msgs/TransformStamped",
                "std_msgs/Header",
                "geometry_msgs/Transform",
                "geometry_msgs/Vector3",
                "geometry_msgs/Quaternion"
            ]
        );
        assert!(actionlib_msgs::GoalStatusArray::DEFINITION.contains("uint8 SUCCEEDED=3\n"));
        assert!(tf2_msgs::TFMessage::DEFINITION
            .starts_with("geometry_msgs/TransformStamped[] transforms\n"));
    }
}
