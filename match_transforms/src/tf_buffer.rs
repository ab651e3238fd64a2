//! Transform buffer fed from `/tf` and `/tf_static`.
//!
//! The buffer subscribes to both topics through any roslibrust backend and keeps a
//! `transforms::Registry` up to date, so lookups never touch the network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use abort_on_drop::ChildTask;
use match_common::messages::geometry_msgs::TransformStamped;
use match_common::messages::tf2_msgs::TFMessage;
use roslibrust_common::{Subscribe, TopicProvider};
use tokio::sync::RwLock;
use transforms::geometry::{Quaternion, Vector3};
use transforms::time::Timestamp;
use transforms::Registry;

use crate::{FrameTransform, LookupTime, LookupTransform, TfError};

/// How long to back off after a failed receive before listening again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Where a frame hangs in the tree and when it was last heard of.
#[derive(Debug, Clone)]
struct FrameLink {
    parent: String,
    /// Stamp of the newest sample, `None` for static frames.
    latest: Option<Timestamp>,
}

/// The registry plus the frame tree bookkeeping needed to answer "latest" lookups.
struct BufferState {
    registry: Registry,
    frames: HashMap<String, FrameLink>,
}

impl BufferState {
    fn new(buffer_duration: Duration) -> Self {
        Self {
            registry: Registry::new(buffer_duration),
            frames: HashMap::new(),
        }
    }

    fn insert(&mut self, stamped: TransformStamped, is_static: bool) {
        let transform = into_transform(stamped, is_static);
        let latest = if is_static {
            None
        } else {
            let previous = self
                .frames
                .get(&transform.child)
                .and_then(|link| link.latest);
            Some(previous.map_or(transform.timestamp, |t| t.max(transform.timestamp)))
        };
        self.frames.insert(
            transform.child.clone(),
            FrameLink {
                parent: transform.parent.clone(),
                latest,
            },
        );
        self.registry.add_transform(transform);
    }

    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> Result<FrameTransform, TfError> {
        let timestamp = match time {
            LookupTime::Now => Timestamp::now(),
            LookupTime::Latest => self.latest_common_time(target_frame, source_frame)?,
            LookupTime::At(timestamp) => timestamp,
        };
        self.registry
            .get_transform(target_frame, source_frame, timestamp)
            .map(|t| from_transform(&t))
            .map_err(|e| TfError::LookupError(e.to_string()))
    }

    /// The oldest of the newest stamps along the chain joining the two frames.
    ///
    /// Every link has data up to that moment. A chain of static links resolves to zero,
    /// which the registry answers from its static entries.
    fn latest_common_time(
        &self,
        target_frame: &str,
        source_frame: &str,
    ) -> Result<Timestamp, TfError> {
        let source_path = self.ancestry(source_frame);
        let target_path = self.ancestry(target_frame);
        let common = source_path
            .iter()
            .find(|frame| target_path.contains(frame))
            .ok_or_else(|| {
                TfError::LookupError(format!(
                    "{source_frame} and {target_frame} are not connected"
                ))
            })?;

        let links = source_path
            .iter()
            .take_while(|frame| *frame != common)
            .chain(target_path.iter().take_while(|frame| *frame != common));
        Ok(links
            .filter_map(|frame| self.frames.get(*frame).and_then(|link| link.latest))
            .min()
            .unwrap_or_else(Timestamp::zero))
    }

    /// `frame` followed by its parents up to the root of its tree.
    fn ancestry<'a>(&'a self, frame: &'a str) -> Vec<&'a str> {
        let mut path = vec![frame];
        let mut current = frame;
        while let Some(link) = self.frames.get(current) {
            // A cycle in the published tree would otherwise never end
            if path.contains(&link.parent.as_str()) {
                break;
            }
            current = &link.parent;
            path.push(current);
        }
        path
    }
}

/// A transform buffer kept current by background subscriptions to `/tf` and `/tf_static`.
///
/// Dropping the buffer stops both subscriptions.
pub struct TfBuffer {
    state: Arc<RwLock<BufferState>>,
    // We hold onto the tasks so they are aborted along with the buffer
    _tf_task: ChildTask<()>,
    _tf_static_task: ChildTask<()>,
}

impl TfBuffer {
    /// Create a new TfBuffer subscribed to /tf and /tf_static.
    ///
    /// Uses a default buffer duration of 10 seconds.
    pub async fn new<T>(ros: &T) -> Result<TfBuffer, TfError>
    where
        T: TopicProvider + Clone + Send + Sync + 'static,
        T::Subscriber<TFMessage>: Send + 'static,
    {
        Self::with_buffer_duration(ros, Duration::from_secs(10)).await
    }

    /// Create a new TfBuffer with a custom buffer duration.
    pub async fn with_buffer_duration<T>(
        ros: &T,
        buffer_duration: Duration,
    ) -> Result<TfBuffer, TfError>
    where
        T: TopicProvider + Clone + Send + Sync + 'static,
        T::Subscriber<TFMessage>: Send + 'static,
    {
        let state = Arc::new(RwLock::new(BufferState::new(buffer_duration)));

        let tf_subscriber = ros
            .subscribe::<TFMessage>("/tf")
            .await
            .map_err(|e| TfError::SubscriptionError(e.to_string()))?;

        let tf_static_subscriber = ros
            .subscribe::<TFMessage>("/tf_static")
            .await
            .map_err(|e| TfError::SubscriptionError(e.to_string()))?;

        let tf_task = tokio::spawn(Self::process_tf_messages(
            tf_subscriber,
            state.clone(),
            false,
        ));
        let tf_static_task = tokio::spawn(Self::process_tf_messages(
            tf_static_subscriber,
            state.clone(),
            true,
        ));

        log::debug!("Transform buffer listening on /tf and /tf_static");

        Ok(TfBuffer {
            state,
            _tf_task: tf_task.into(),
            _tf_static_task: tf_static_task.into(),
        })
    }

    /// Background tokio task to process incoming TF messages.
    async fn process_tf_messages<S: Subscribe<TFMessage>>(
        mut subscriber: S,
        state: Arc<RwLock<BufferState>>,
        is_static: bool,
    ) {
        let topic = if is_static { "/tf_static" } else { "/tf" };
        loop {
            match subscriber.next().await {
                Ok(msg) => {
                    let mut state = state.write().await;
                    for tf in msg.transforms {
                        log::trace!(
                            "Buffering {} -> {} from {topic}",
                            tf.header.frame_id,
                            tf.child_frame_id
                        );
                        state.insert(tf, is_static);
                    }
                }
                Err(e) => {
                    log::warn!("Error receiving {topic} message: {e}");
                    // Backends reconnect on their own, keep listening
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Insert a transform directly, without it arriving over a topic.
    ///
    /// Static transforms are stored with a zero timestamp and are valid at any time.
    pub async fn add_transform(&self, transform: TransformStamped, is_static: bool) {
        self.state.write().await.insert(transform, is_static);
    }

    /// Check if the frames are connected by data the buffer already holds.
    pub async fn can_transform(&self, target_frame: &str, source_frame: &str) -> bool {
        self.lookup_transform(target_frame, source_frame, LookupTime::Latest)
            .await
            .is_ok()
    }
}

impl LookupTransform for TfBuffer {
    async fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> Result<FrameTransform, TfError> {
        self.state
            .read()
            .await
            .lookup(target_frame, source_frame, time)
    }
}

fn into_transform(stamped: TransformStamped, is_static: bool) -> transforms::Transform {
    let timestamp = if is_static {
        Timestamp::zero()
    } else {
        Timestamp {
            t: stamped.header.stamp.as_nanos(),
        }
    };

    let translation = stamped.transform.translation;
    let rotation = stamped.transform.rotation;
    transforms::Transform {
        translation: Vector3::new(translation.x, translation.y, translation.z),
        rotation: Quaternion {
            w: rotation.w,
            x: rotation.x,
            y: rotation.y,
            z: rotation.z,
        },
        timestamp,
        parent: stamped.header.frame_id,
        child: stamped.child_frame_id,
    }
}

fn from_transform(transform: &transforms::Transform) -> FrameTransform {
    FrameTransform::new(
        match_common::Point3::new(
            transform.translation.x,
            transform.translation.y,
            transform.translation.z,
        ),
        match_common::Orientation::new(
            transform.rotation.w,
            transform.rotation.x,
            transform.rotation.y,
            transform.rotation.z,
        ),
    )
}
