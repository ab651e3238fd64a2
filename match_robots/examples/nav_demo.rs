//! Drives a simulated base through a few navigation goals.
//!
//! The navigation stack is played by a task that answers every goal with an active status
//! followed by a succeeded one. Run with `RUST_LOG=debug` to follow the tracker.

use std::time::Duration;

use match_common::messages::actionlib_msgs::{GoalID, GoalStatus, GoalStatusArray};
use match_common::messages::geometry_msgs::PoseStamped;
use match_common::messages::Time;
use match_common::Pose;
use match_robots::{NavGoalClient, RobotConfig};
use roslibrust_common::{Publish, Subscribe, TopicProvider};
use roslibrust_mock::MockRos;

async fn simulated_base(ros: MockRos, config: RobotConfig) -> match_common::Result<()> {
    let mut goals = ros.subscribe::<PoseStamped>(&config.goal_topic()).await?;
    let status = ros
        .advertise::<GoalStatusArray>(&config.status_topic())
        .await?;
    status.publish(&GoalStatusArray::default()).await?;

    let mut count = 0;
    loop {
        let goal = goals.next().await?;
        count += 1;
        log::info!(
            "Base driving to ({:.1}, {:.1})",
            goal.pose.position.x,
            goal.pose.position.y
        );
        let id = format!("/move_base-{count}");
        for code in [GoalStatus::ACTIVE, GoalStatus::SUCCEEDED] {
            tokio::time::sleep(Duration::from_millis(200)).await;
            status
                .publish(&GoalStatusArray {
                    status_list: vec![GoalStatus {
                        goal_id: GoalID {
                            stamp: Time::now(),
                            id: id.clone(),
                        },
                        status: code,
                        text: String::new(),
                    }],
                    ..Default::default()
                })
                .await?;
        }
    }
}

#[tokio::main]
async fn main() -> match_common::Result<()> {
    env_logger::init();

    let ros = MockRos::new();
    let config = RobotConfig::default().with_nav_prefix("/miranda/mir");
    config.validate()?;

    let client = NavGoalClient::new(&ros, &config).await?;
    let _base = tokio::spawn(simulated_base(ros.clone(), config.clone()));

    let route = [
        Pose::planar(2.0, 0.0, 0.0),
        Pose::planar(2.0, 2.0, std::f64::consts::FRAC_PI_2),
        Pose::planar(0.0, 0.0, std::f64::consts::PI),
    ];
    for goal in route {
        if !client.wait_until_ready(Duration::from_secs(5)).await {
            log::error!("Base never became ready, giving up");
            break;
        }
        client.send_goal(&goal).await?;
    }
    if client.wait_until_ready(Duration::from_secs(5)).await {
        log::info!("Route finished");
    }
    Ok(())
}
