//! Bounded-wait frame resolution with a clock resync and retry.

use std::time::Duration;

use match_common::messages::std_msgs;
use match_common::{Error, Result};
use roslibrust_common::{Publish, TopicProvider};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::{FrameTransform, LookupTime, LookupTransform, Timestamp};

/// Smallest pause between two lookups while waiting.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long to wait for a transform, and how to recover when it does not show up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Bound on a single wait for a transform to become available.
    pub wait_timeout: Duration,
    /// Pause between lookups while waiting.
    pub poll_interval: Duration,
    /// Pause after requesting a clock resync before waiting again.
    pub resync_backoff: Duration,
    /// Number of resync-and-retry cycles after the first wait fails.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(4),
            poll_interval: Duration::from_millis(10),
            resync_backoff: Duration::from_millis(500),
            max_retries: 1,
        }
    }
}

enum WaitError {
    TimedOut(String),
    Cancelled,
}

/// Resolves transforms between frames, waiting a bounded time for them to become available.
///
/// When a wait times out the resolver publishes `true` on the resync topic, so whoever keeps the
/// robots' clocks aligned can resynchronize, backs off and tries again. With the default
/// [RetryPolicy] that happens exactly once before [Error::TransformUnavailable] is returned.
///
/// Waits are async and can be cut short through a shutdown signal, see [FrameResolver::with_shutdown].
pub struct FrameResolver<L: LookupTransform, P: Publish<std_msgs::Bool>> {
    lookup: L,
    sync_publisher: P,
    policy: RetryPolicy,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<L: LookupTransform, P: Publish<std_msgs::Bool>> FrameResolver<L, P> {
    pub fn new(lookup: L, sync_publisher: P) -> Self {
        Self {
            lookup,
            sync_publisher,
            policy: RetryPolicy::default(),
            shutdown: None,
        }
    }

    /// Create a resolver publishing resync requests on `sync_topic` of the given backend.
    ///
    /// The resolver starts out with [RetryPolicy::default]; `RobotConfig::frame_resolver` in
    /// `match_robots` applies a configured policy instead.
    pub async fn advertise<T>(
        ros: &T,
        sync_topic: &str,
        lookup: L,
    ) -> Result<FrameResolver<L, T::Publisher<std_msgs::Bool>>>
    where
        T: TopicProvider<Publisher<std_msgs::Bool> = P>,
    {
        let sync_publisher = ros.advertise::<std_msgs::Bool>(sync_topic).await?;
        Ok(FrameResolver::new(lookup, sync_publisher))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Any wait in progress returns [Error::Cancelled] once `true` is sent on the channel.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Resolve the transform of `source_frame` expressed in `target_frame`.
    ///
    /// [LookupTime::Now] is pinned when an attempt starts, so the wait lasts until a sample at
    /// or after that moment arrives. A retry after a resync pins a fresh timestamp.
    pub async fn resolve_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        at: LookupTime,
    ) -> Result<FrameTransform> {
        let mut retries = 0;
        loop {
            let time = match at {
                LookupTime::Now => LookupTime::At(Timestamp::now()),
                other => other,
            };
            let reason = match self.wait_for_transform(target_frame, source_frame, time).await {
                Ok(transform) => return Ok(transform),
                Err(WaitError::Cancelled) => return Err(Error::Cancelled),
                Err(WaitError::TimedOut(reason)) => reason,
            };

            if retries >= self.policy.max_retries {
                log::error!(
                    "Giving up on transform {source_frame} -> {target_frame} after {retries} retries: {reason}"
                );
                return Err(Error::TransformUnavailable {
                    target_frame: target_frame.to_string(),
                    source_frame: source_frame.to_string(),
                    reason,
                });
            }
            retries += 1;

            log::warn!(
                "Transform {source_frame} -> {target_frame} unavailable ({reason}), requesting time sync and retrying"
            );
            self.request_time_sync().await;
            self.pause(self.policy.resync_backoff).await?;
        }
    }

    /// The pose of `frame` in `reference_frame` at `time`.
    pub async fn pose_of(
        &self,
        frame: &str,
        reference_frame: &str,
        time: LookupTime,
    ) -> Result<match_common::Pose> {
        self.resolve_transform(reference_frame, frame, time)
            .await
            .map(|t| t.as_pose())
    }

    async fn wait_for_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> std::result::Result<FrameTransform, WaitError> {
        let deadline = Instant::now() + self.policy.wait_timeout;
        let shutdown = shutdown_requested(self.shutdown.clone());
        tokio::pin!(shutdown);

        loop {
            let reason = match self
                .lookup
                .lookup_transform(target_frame, source_frame, time)
                .await
            {
                Ok(transform) => return Ok(transform),
                Err(e) => e.to_string(),
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::TimedOut(reason));
            }
            let nap = self
                .policy
                .poll_interval
                .max(MIN_POLL_INTERVAL)
                .min(deadline - now);

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::debug!("Wait for {source_frame} -> {target_frame} cancelled");
                    return Err(WaitError::Cancelled);
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    async fn request_time_sync(&self) {
        // Best effort, the retry goes ahead whether or not anyone heard us
        if let Err(e) = self
            .sync_publisher
            .publish(&std_msgs::Bool { data: true })
            .await
        {
            log::warn!("Failed to publish time sync request: {e}");
        }
    }

    async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = shutdown_requested(self.shutdown.clone()) => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Resolves once shutdown is requested. Never resolves without a signal or once its sender is gone.
async fn shutdown_requested(shutdown: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = shutdown {
        let stopped = rx.wait_for(|stop| *stop).await.is_ok();
        if stopped {
            return;
        }
    }
    std::future::pending::<()>().await
}
