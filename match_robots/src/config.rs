//! Robot and middleware naming, loaded from TOML.
//!
//! Every field has a default, so a config file only needs to name what differs:
//!
//! ```toml
//! nav_prefix = "/miranda/mir"
//! arm_namespace = "/miranda/panda"
//!
//! [retry]
//! wait_timeout_secs = 2.0
//! ```

use std::path::Path;
use std::time::Duration;

use match_common::messages::std_msgs;
use match_common::{Error, Result};
use match_transforms::{FrameResolver, LookupTransform, RetryPolicy};
use roslibrust_common::TopicProvider;
use serde::{Deserialize, Serialize};

/// Absolute ROS names: slash separated segments, each starting with a letter.
const GLOBAL_NAME_PATTERN: &str = r"(?-u)^\/([A-Za-z][A-Za-z0-9_]*)(\/[A-Za-z][A-Za-z0-9_]*)*$";

/// Names and tuning for one mobile manipulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Namespace of the mobile base's navigation stack, e.g. `/miranda/mir`.
    pub nav_prefix: String,
    /// Namespace of the arm, e.g. `/miranda/panda`.
    pub arm_namespace: String,
    pub end_effector_link: String,
    /// Link whose frame the planner expects waypoints in.
    pub planning_link: String,
    pub map_frame: String,
    pub base_frame: String,
    /// Topic on which a clock resync is requested after a failed frame lookup.
    pub sync_topic: String,
    /// Order in which joint values are reported and commanded.
    pub joint_names: Vec<String>,
    /// Interpolation step of Cartesian paths, in meters.
    pub eef_step: f64,
    pub retry: RetrySettings,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            nav_prefix: String::new(),
            arm_namespace: String::new(),
            end_effector_link: "panda_hand".to_string(),
            planning_link: "panda_link0".to_string(),
            map_frame: "map".to_string(),
            base_frame: "mir/base_link".to_string(),
            sync_topic: "/syncTime".to_string(),
            joint_names: [
                "shoulder_pan_joint",
                "shoulder_lift_joint",
                "elbow_joint",
                "wrist_1_joint",
                "wrist_2_joint",
                "wrist_3_joint",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            eef_step: 0.01,
            retry: RetrySettings::default(),
        }
    }
}

/// The `[retry]` table, in seconds so it reads naturally in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub wait_timeout_secs: f64,
    pub poll_interval_secs: f64,
    pub resync_backoff_secs: f64,
    pub max_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            wait_timeout_secs: policy.wait_timeout.as_secs_f64(),
            poll_interval_secs: policy.poll_interval.as_secs_f64(),
            resync_backoff_secs: policy.resync_backoff.as_secs_f64(),
            max_retries: policy.max_retries,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy {
            wait_timeout: positive_duration("retry.wait_timeout_secs", self.wait_timeout_secs)?,
            poll_interval: positive_duration("retry.poll_interval_secs", self.poll_interval_secs)?,
            resync_backoff: positive_duration(
                "retry.resync_backoff_secs",
                self.resync_backoff_secs,
            )?,
            max_retries: self.max_retries,
        })
    }
}

fn positive_duration(field: &str, secs: f64) -> Result<Duration> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(Error::Config(format!(
            "{field} must be a positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| Error::Config(format!("{field}: {e}")))
}

/// Check a topic name, listing every rule it breaks.
fn validate_topic_name(name: &str) -> Result<()> {
    let mut failures = vec![];
    if !name.starts_with('/') {
        failures.push("must start with a '/'");
    }
    if name.contains(char::is_whitespace) {
        failures.push("must not contain whitespace");
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '/')
    {
        failures.push("must only contain alphanumeric characters, underscores and slashes");
    }
    if name.ends_with('/') {
        failures.push("must not end with a '/'");
    }
    let pattern = regex::Regex::new(GLOBAL_NAME_PATTERN)
        .map_err(|e| Error::Unexpected(anyhow::Error::new(e)))?;
    if failures.is_empty() && !pattern.is_match(name) {
        failures.push("every segment must start with a letter");
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid topic name {name}: {}",
            failures.join(", ")
        )))
    }
}

/// Topic names are always absolute, an empty namespace yields `/<name>`.
fn namespaced_topic(namespace: &str, name: &str) -> String {
    format!("{}/{name}", namespace.trim_end_matches('/'))
}

/// Frame ids carry no leading slash when there is no namespace.
fn namespaced_frame(namespace: &str, link: &str) -> String {
    let namespace = namespace.trim_matches('/');
    if namespace.is_empty() {
        link.to_string()
    } else {
        format!("{namespace}/{link}")
    }
}

impl RobotConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: RobotConfig =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        log::debug!("Loading robot config from {}", path.display());
        Self::from_toml_str(&contents)
    }

    pub fn with_nav_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.nav_prefix = prefix.into();
        self
    }

    pub fn with_arm_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.arm_namespace = namespace.into();
        self
    }

    pub fn with_joint_names(mut self, joint_names: Vec<String>) -> Self {
        self.joint_names = joint_names;
        self
    }

    pub fn with_sync_topic(mut self, topic: impl Into<String>) -> Self {
        self.sync_topic = topic.into();
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn goal_topic(&self) -> String {
        namespaced_topic(&self.nav_prefix, "move_base_simple/goal")
    }

    pub fn status_topic(&self) -> String {
        namespaced_topic(&self.nav_prefix, "move_base/status")
    }

    pub fn joint_states_topic(&self) -> String {
        namespaced_topic(&self.arm_namespace, "joint_states")
    }

    pub fn hand_frame(&self) -> String {
        namespaced_frame(&self.arm_namespace, &self.end_effector_link)
    }

    pub fn planning_frame(&self) -> String {
        namespaced_frame(&self.arm_namespace, &self.planning_link)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        self.retry.to_policy()
    }

    /// A [FrameResolver] requesting resyncs on [RobotConfig::sync_topic] and waiting
    /// as long as the `[retry]` table says.
    pub async fn frame_resolver<T, L>(
        &self,
        ros: &T,
        lookup: L,
    ) -> Result<FrameResolver<L, T::Publisher<std_msgs::Bool>>>
    where
        T: TopicProvider,
        L: LookupTransform,
    {
        let policy = self.retry_policy()?;
        log::debug!(
            "Frame lookups wait {:?} and retry {} times, resyncs go to {}",
            policy.wait_timeout,
            policy.max_retries,
            self.sync_topic
        );
        let resolver = FrameResolver::advertise(ros, &self.sync_topic, lookup).await?;
        Ok(resolver.with_policy(policy))
    }

    pub fn validate(&self) -> Result<()> {
        for topic in [
            self.goal_topic(),
            self.status_topic(),
            self.joint_states_topic(),
            self.sync_topic.clone(),
        ] {
            validate_topic_name(&topic)?;
        }
        if self.joint_names.is_empty() {
            return Err(Error::Config("joint_names must not be empty".to_string()));
        }
        if !(self.eef_step.is_finite() && self.eef_step > 0.0) {
            return Err(Error::Config(format!(
                "eef_step must be positive, got {}",
                self.eef_step
            )));
        }
        self.retry.to_policy()?;
        Ok(())
    }
}
