//! Navigation goals for the mobile base, and tracking of when the base is free for the next one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use abort_on_drop::ChildTask;
use match_common::messages::actionlib_msgs::{GoalStatus, GoalStatusArray};
use match_common::messages::geometry_msgs::PoseStamped;
use match_common::messages::{std_msgs, Time};
use match_common::{Pose, Result};
use match_transforms::{FrameResolver, LookupTime, LookupTransform};
use roslibrust_common::{Publish, Subscribe, TopicProvider};

use crate::config::RobotConfig;

/// Status recorded when the navigation stack reports no goals at all.
pub const NO_ACTIVE_GOAL: u8 = 10;

/// Status codes at or above this one are terminal: succeeded, aborted, rejected and so on.
pub const TERMINAL_STATUS: u8 = GoalStatus::SUCCEEDED;

/// How long to back off after a failed receive before listening again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How often [NavGoalClient::wait_until_ready] checks the tracker.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavGoalPhase {
    /// No goal is outstanding on our side.
    IdleReady,
    /// A goal was sent and no status for a new goal id has arrived since.
    GoalPending,
}

/// The relevant content of one status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The status list was empty.
    NoGoals,
    Goal { id: String, status: u8 },
}

impl From<&GoalStatusArray> for StatusUpdate {
    fn from(msg: &GoalStatusArray) -> Self {
        match msg.status_list.first() {
            Some(goal) => StatusUpdate::Goal {
                id: goal.goal_id.id.clone(),
                status: goal.status,
            },
            None => StatusUpdate::NoGoals,
        }
    }
}

/// Decides whether a new navigation goal may be issued, from the status stream of the base.
///
/// Status arrives on its own schedule and repeats the same goal id many times over, so the
/// tracker only leaves [NavGoalPhase::GoalPending] once an id it has not seen before shows up.
/// Ready additionally requires the last status to be terminal, a fresh id alone may still be
/// pending or active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavGoalTracker {
    phase: NavGoalPhase,
    current_id: Option<String>,
    status: Option<u8>,
}

impl Default for NavGoalTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl NavGoalTracker {
    pub fn new() -> Self {
        Self {
            phase: NavGoalPhase::IdleReady,
            current_id: None,
            status: None,
        }
    }

    /// Record that a goal has gone out.
    pub fn goal_sent(&mut self) {
        self.phase = NavGoalPhase::GoalPending;
    }

    /// Put the tracker back to idle after a goal failed to go out.
    pub fn goal_abandoned(&mut self) {
        self.phase = NavGoalPhase::IdleReady;
    }

    /// Ingest one status update. Returns true if it carried a goal id not seen before.
    pub fn on_status(&mut self, update: StatusUpdate) -> bool {
        match update {
            StatusUpdate::NoGoals => {
                self.status = Some(NO_ACTIVE_GOAL);
                false
            }
            StatusUpdate::Goal { id, status } => {
                self.status = Some(status);
                if self.current_id.as_deref() == Some(id.as_str()) {
                    return false;
                }
                self.current_id = Some(id);
                self.phase = NavGoalPhase::IdleReady;
                true
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase == NavGoalPhase::IdleReady && self.status.is_some_and(|s| s >= TERMINAL_STATUS)
    }

    pub fn phase(&self) -> NavGoalPhase {
        self.phase
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    /// Last reported status code, `None` until the first status message.
    pub fn status(&self) -> Option<u8> {
        self.status
    }
}

/// The tracker is only ever touched in short critical sections, a panic in one leaves it usable.
fn lock(tracker: &Mutex<NavGoalTracker>) -> MutexGuard<'_, NavGoalTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sends navigation goals to the base and follows their status.
///
/// The status subscription runs as a background task for as long as the client lives.
pub struct NavGoalClient<P: Publish<PoseStamped>> {
    tracker: Arc<Mutex<NavGoalTracker>>,
    goal_publisher: P,
    map_frame: String,
    base_frame: String,
    _status_task: ChildTask<()>,
}

impl<P: Publish<PoseStamped>> NavGoalClient<P> {
    /// Advertise the goal topic and subscribe to the status topic named by `config`.
    pub async fn new<T>(ros: &T, config: &RobotConfig) -> Result<NavGoalClient<T::Publisher<PoseStamped>>>
    where
        T: TopicProvider<Publisher<PoseStamped> = P>,
        T::Subscriber<GoalStatusArray>: Send + 'static,
    {
        let goal_topic = config.goal_topic();
        let status_topic = config.status_topic();
        let goal_publisher = ros.advertise::<PoseStamped>(&goal_topic).await?;
        let status_subscriber = ros.subscribe::<GoalStatusArray>(&status_topic).await?;

        let tracker = Arc::new(Mutex::new(NavGoalTracker::new()));
        let status_task = tokio::spawn(process_status_messages(
            status_subscriber,
            tracker.clone(),
        ));

        log::info!("Navigation goals go to {goal_topic}, status from {status_topic}");

        Ok(NavGoalClient {
            tracker,
            goal_publisher,
            map_frame: config.map_frame.clone(),
            base_frame: config.base_frame.clone(),
            _status_task: status_task.into(),
        })
    }

    /// Publish `goal`, a pose in the map frame.
    ///
    /// The tracker turns pending before the goal is published, so a status racing the publish
    /// cannot be mistaken for this goal finishing.
    pub async fn send_goal(&self, goal: &Pose) -> Result<()> {
        lock(&self.tracker).goal_sent();

        let msg = PoseStamped {
            header: std_msgs::Header {
                seq: 0,
                stamp: Time::now(),
                frame_id: self.map_frame.clone(),
            },
            pose: (*goal).into(),
        };
        log::info!(
            "Sending navigation goal ({:.3}, {:.3}) in {}",
            goal.position.x,
            goal.position.y,
            self.map_frame
        );
        if let Err(e) = self.goal_publisher.publish(&msg).await {
            lock(&self.tracker).goal_abandoned();
            return Err(e.into());
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.tracker).is_ready()
    }

    /// A consistent copy of the tracker state.
    pub fn tracker(&self) -> NavGoalTracker {
        lock(&self.tracker).clone()
    }

    /// Wait up to `timeout` for the base to become ready. Returns whether it did.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let poll = async {
            while !self.is_ready() {
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    /// The pose of the base in the map frame, as of the newest localisation sample.
    ///
    /// A parked base whose localisation publishes rarely still answers at once.
    pub async fn robot_pose<L, Q>(&self, resolver: &FrameResolver<L, Q>) -> Result<Pose>
    where
        L: LookupTransform,
        Q: Publish<std_msgs::Bool>,
    {
        resolver
            .pose_of(&self.base_frame, &self.map_frame, LookupTime::Latest)
            .await
    }
}

/// Background tokio task feeding status messages into the tracker.
async fn process_status_messages<S: Subscribe<GoalStatusArray>>(
    mut subscriber: S,
    tracker: Arc<Mutex<NavGoalTracker>>,
) {
    loop {
        match subscriber.next().await {
            Ok(msg) => {
                let update = StatusUpdate::from(&msg);
                let mut tracker = lock(&tracker);
                if tracker.on_status(update) {
                    log::debug!(
                        "New navigation goal {:?} with status {:?}",
                        tracker.current_id(),
                        tracker.status()
                    );
                }
            }
            Err(e) => {
                log::warn!("Error receiving navigation status: {e}");
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(id: &str, status: u8) -> StatusUpdate {
        StatusUpdate::Goal {
            id: id.to_string(),
            status,
        }
    }

    #[test]
    fn send_then_new_terminal_goal() {
        let mut tracker = NavGoalTracker::new();
        assert_eq!(tracker.phase(), NavGoalPhase::IdleReady);
        assert_eq!(tracker.current_id(), None);

        tracker.goal_sent();
        assert!(!tracker.is_ready());

        assert!(tracker.on_status(goal("7", GoalStatus::SUCCEEDED)));
        assert!(tracker.is_ready());
        assert_eq!(tracker.current_id(), Some("7"));

        assert!(!tracker.on_status(goal("7", GoalStatus::SUCCEEDED)));
        assert!(tracker.is_ready());
        assert_eq!(tracker.current_id(), Some("7"));
    }

    #[test]
    fn duplicate_id_never_clears_pending() {
        let mut tracker = NavGoalTracker::new();
        tracker.on_status(goal("3", GoalStatus::ABORTED));
        assert!(tracker.is_ready());

        tracker.goal_sent();
        for status in [GoalStatus::SUCCEEDED, GoalStatus::ABORTED, GoalStatus::LOST] {
            assert!(!tracker.on_status(goal("3", status)));
            assert!(!tracker.is_ready());
        }
        assert_eq!(tracker.phase(), NavGoalPhase::GoalPending);
    }

    #[test]
    fn fresh_id_needs_terminal_status() {
        let mut tracker = NavGoalTracker::new();
        tracker.goal_sent();

        assert!(tracker.on_status(goal("8", GoalStatus::ACTIVE)));
        assert_eq!(tracker.phase(), NavGoalPhase::IdleReady);
        assert!(!tracker.is_ready());

        assert!(!tracker.on_status(goal("8", GoalStatus::SUCCEEDED)));
        assert!(tracker.is_ready());
    }

    #[test]
    fn empty_status_list_records_sentinel() {
        let mut tracker = NavGoalTracker::new();
        assert!(!tracker.is_ready(), "No status heard yet");

        assert!(!tracker.on_status(StatusUpdate::NoGoals));
        assert_eq!(tracker.status(), Some(NO_ACTIVE_GOAL));
        assert!(tracker.is_ready());

        tracker.goal_sent();
        tracker.on_status(StatusUpdate::NoGoals);
        assert_eq!(tracker.phase(), NavGoalPhase::GoalPending);
        assert!(!tracker.is_ready());
    }

    #[test]
    fn abandoned_goal_returns_to_idle() {
        let mut tracker = NavGoalTracker::new();
        tracker.on_status(goal("1", GoalStatus::SUCCEEDED));
        tracker.goal_sent();
        tracker.goal_abandoned();
        assert!(tracker.is_ready());
    }

    #[test]
    fn status_update_from_message() {
        let mut msg = GoalStatusArray::default();
        assert_eq!(StatusUpdate::from(&msg), StatusUpdate::NoGoals);

        msg.status_list.push(GoalStatus {
            goal_id: match_common::messages::actionlib_msgs::GoalID {
                stamp: Time::default(),
                id: "/move_base-1-12.5".to_string(),
            },
            status: GoalStatus::ACTIVE,
            text: String::new(),
        });
        assert_eq!(
            StatusUpdate::from(&msg),
            goal("/move_base-1-12.5", GoalStatus::ACTIVE)
        );
    }
}
