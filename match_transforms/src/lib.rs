//! Frame lookups and relative motion for the mobile manipulator.
//!
//! This crate provides:
//!
//! - [LookupTransform], the capability of answering "where is frame B in frame A at time t"
//! - [TfBuffer], an implementation of it fed by the `/tf` and `/tf_static` topics of any roslibrust backend
//! - [FrameResolver], which waits a bounded time for a lookup, publishes a clock resync request and retries once
//! - the relative motion calculator in [relative], turning absolute goals into deltas and re-expressing
//!   deltas in the planning frame
//!
//! # Example
//! ```no_run
//! use match_common::Pose;
//! use match_transforms::{FrameResolver, LookupTime, TfBuffer};
//! use roslibrust_common::TopicProvider;
//!
//! async fn example<T: TopicProvider + Clone + Send + Sync + 'static>(ros: T) -> match_common::Result<()>
//! where
//!     T::Subscriber<match_common::messages::tf2_msgs::TFMessage>: Send + 'static,
//! {
//!     let buffer = TfBuffer::new(&ros).await?;
//!     let resolver = FrameResolver::advertise(&ros, "/syncTime", buffer).await?;
//!
//!     // Move 5cm forward along the hand's own x axis
//!     let forward = Pose::from_position([0.05, 0.0, 0.0].into());
//!     let in_base = resolver
//!         .reexpress_delta_in_planning_frame(&forward, "panda_hand", "panda_link0")
//!         .await?;
//!     println!("{in_base:?}");
//!
//!     // Where the hand was last seen, however old that sample is
//!     let hand = resolver.pose_of("panda_hand", "map", LookupTime::Latest).await?;
//!     println!("{hand:?}");
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use match_common::{Orientation, Point3, Pose};

pub mod relative;
pub mod resolver;
pub mod tf_buffer;

pub use relative::*;
pub use resolver::*;
pub use tf_buffer::*;

// Re-export the timestamp type lookups are keyed on
pub use transforms::time::Timestamp;


/// Error types for transform buffer and lookup operations.
#[derive(thiserror::Error, Debug)]
pub enum TfError {
    #[error("Failed to subscribe to topic: {0}")]
    SubscriptionError(String),

    #[error("Transform lookup failed: {0}")]
    LookupError(String),

    #[error("ROS communication error: {0}")]
    RosError(#[from] roslibrust_common::Error),
}

impl From<TfError> for match_common::Error {
    fn from(e: TfError) -> Self {
        match e {
            TfError::RosError(e) => match_common::Error::Ros(e),
            other => match_common::Error::Unexpected(anyhow::Error::new(other)),
        }
    }
}

/// The translation and rotation of a source frame expressed in a target frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTransform {
    pub translation: Point3,
    pub rotation: Orientation,
}

impl FrameTransform {
    pub fn new(translation: Point3, rotation: Orientation) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The source frame's origin as a pose in the target frame.
    pub fn as_pose(&self) -> Pose {
        Pose::new(self.translation, self.rotation)
    }
}

/// Which moment a transform lookup asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupTime {
    /// The current time. Only answerable once a sample at or after it has arrived.
    #[default]
    Now,
    /// The newest moment for which every frame between source and target has data.
    ///
    /// Succeeds at once for a parked base whose localisation publishes rarely.
    Latest,
    At(Timestamp),
}

/// Anything able to answer transform queries between named frames.
///
/// A single call never waits: it either has the answer now or fails.
/// Waiting and retrying is [FrameResolver]'s job.
pub trait LookupTransform: Send + Sync {
    /// Look up the transform of `source_frame` expressed in `target_frame` at `time`.
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> impl Future<Output = Result<FrameTransform, TfError>> + Send;
}

impl<L: LookupTransform> LookupTransform for Arc<L> {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> impl Future<Output = Result<FrameTransform, TfError>> + Send {
        (**self).lookup_transform(target_frame, source_frame, time)
    }
}
