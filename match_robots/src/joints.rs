//! Joint positions and velocities of the arm, in a fixed joint order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use abort_on_drop::ChildTask;
use match_common::messages::sensor_msgs::JointState;
use match_common::{Error, Result};
use roslibrust_common::{Subscribe, TopicProvider};

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Latest joint values, reordered from whatever order the driver publishes in.
#[derive(Debug, Clone, PartialEq)]
pub struct JointStateCache {
    joint_names: Vec<String>,
    positions: Vec<f64>,
    velocities: Vec<f64>,
    samples: u64,
}

impl JointStateCache {
    /// A cache reporting zeros for every joint until the first sample.
    pub fn new(joint_names: Vec<String>) -> Self {
        let n = joint_names.len();
        Self {
            joint_names,
            positions: vec![0.0; n],
            velocities: vec![0.0; n],
            samples: 0,
        }
    }

    /// Take in one sample. Either every configured joint is updated or none is.
    ///
    /// Drivers that do not report velocities leave the cached velocities untouched.
    pub fn ingest(&mut self, msg: &JointState) -> Result<()> {
        let mut positions = Vec::with_capacity(self.joint_names.len());
        let mut velocities = self.velocities.clone();

        for (i, name) in self.joint_names.iter().enumerate() {
            let index = msg
                .name
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| Error::JointNotFound(name.clone()))?;
            let position = msg.position.get(index).copied().ok_or_else(|| {
                anyhow::anyhow!(
                    "Joint state lists {} names but only {} positions",
                    msg.name.len(),
                    msg.position.len()
                )
            })?;
            positions.push(position);
            if let Some(velocity) = msg.velocity.get(index) {
                velocities[i] = *velocity;
            }
        }

        self.positions = positions;
        self.velocities = velocities;
        self.samples += 1;
        Ok(())
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }

    /// Number of samples taken in so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

struct JointFeed {
    cache: JointStateCache,
    fault: Option<String>,
}

impl JointFeed {
    fn cache(&self) -> Result<&JointStateCache> {
        match &self.fault {
            Some(joint) => Err(Error::JointNotFound(joint.clone())),
            None => Ok(&self.cache),
        }
    }
}

fn lock(feed: &Mutex<JointFeed>) -> MutexGuard<'_, JointFeed> {
    feed.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a [JointStateCache] current from a joint state topic.
///
/// A sample missing a configured joint means the joint list does not match the robot. The feed
/// stops at the first such sample and every read from then on reports [Error::JointNotFound].
pub struct JointStateMonitor {
    feed: Arc<Mutex<JointFeed>>,
    _task: ChildTask<()>,
}

impl JointStateMonitor {
    pub async fn new<T>(ros: &T, topic: &str, joint_names: Vec<String>) -> Result<Self>
    where
        T: TopicProvider,
        T::Subscriber<JointState>: Send + 'static,
    {
        let subscriber = ros.subscribe::<JointState>(topic).await?;
        let feed = Arc::new(Mutex::new(JointFeed {
            cache: JointStateCache::new(joint_names),
            fault: None,
        }));
        let task = tokio::spawn(process_joint_states(subscriber, feed.clone()));
        log::debug!("Monitoring joint states on {topic}");
        Ok(Self {
            feed,
            _task: task.into(),
        })
    }

    pub fn positions(&self) -> Result<Vec<f64>> {
        lock(&self.feed).cache().map(|c| c.positions.clone())
    }

    pub fn velocities(&self) -> Result<Vec<f64>> {
        lock(&self.feed).cache().map(|c| c.velocities.clone())
    }

    /// A consistent copy of positions and velocities from the same sample.
    pub fn snapshot(&self) -> Result<JointStateCache> {
        lock(&self.feed).cache().cloned()
    }
}

async fn process_joint_states<S: Subscribe<JointState>>(
    mut subscriber: S,
    feed: Arc<Mutex<JointFeed>>,
) {
    loop {
        let msg = match subscriber.next().await {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Error receiving joint state: {e}");
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                continue;
            }
        };
        let mut guard = lock(&feed);
        match guard.cache.ingest(&msg) {
            Ok(()) => {}
            Err(Error::JointNotFound(joint)) => {
                log::error!("Joint {joint} missing from joint states, no longer tracking");
                guard.fault = Some(joint);
                return;
            }
            Err(e) => log::warn!("Dropping malformed joint state: {e}"),
        }
    }
}
