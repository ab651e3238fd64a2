//! # match_common
//! This crate provides the common types used throughout the mobile manipulator motion stack:
//! the pose primitives, the ROS message types exchanged with the middleware, and the shared error type.

/// The central error type used throughout the motion stack.
///
/// Every failure a motion command can report is one of these variants.
/// Nothing in the stack prints and continues; callers always get one of these back.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A frame lookup did not complete within the bounded wait, even after a clock resync and retry.
    #[error("Transform from {source_frame} to {target_frame} unavailable: {reason}")]
    TransformUnavailable {
        target_frame: String,
        source_frame: String,
        reason: String,
    },
    /// A trajectory was asked to be rescaled by a non-positive or non-finite factor.
    #[error("Invalid velocity scale factor: {0}")]
    InvalidScale(f64),
    /// The planner handed back a trajectory without any waypoints.
    #[error("No plan found: {0}")]
    NoPlanFound(String),
    /// A configured joint was missing from an incoming joint state sample.
    ///
    /// This is a wiring error and is never retried.
    #[error("Joint {0} not found in joint state")]
    JointNotFound(String),
    /// The executor reported that a trajectory could not be carried out.
    #[error("Trajectory execution failed: {0}")]
    ExecutionFailed(String),
    /// A shutdown was requested while waiting.
    #[error("Operation cancelled by shutdown request")]
    Cancelled,
    /// Configuration could not be loaded or did not validate.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Errors surfaced by the roslibrust backend in use.
    #[error("ROS communication error: {0}")]
    Ros(#[from] roslibrust_common::Error),
    /// Collaborators are free to return this error if it doesn't cleanly fit in the other categories.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Generic result type used throughout the motion stack.
pub type Result<T> = std::result::Result<T, Error>;

/// Point, orientation and pose values with the relative-motion algebra.
pub mod geometry;
pub use geometry::*;

/// Hand written ROS1 message types for the topics this stack touches.
pub mod messages;
