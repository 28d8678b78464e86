//! Refresh controller: starts a rolling instance refresh and waits for
//! it to reach a terminal state.
//!
//! Waiting is a sleep-then-recheck loop with no deadline. Whether a
//! terminal status counts as success is the caller's call; this layer
//! reports whichever terminal status it saw.

use std::sync::Arc;
use std::time::Duration;

use fleetroll_core::{RefreshId, RefreshPreferences, RefreshStatus};
use tracing::{debug, info};

use crate::control_plane::FleetClient;
use crate::error::DeployResult;
use crate::sleep::Sleeper;

/// What to do after observing a refresh status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    /// Not terminal yet; check again after the interval.
    Wait(Duration),
    /// Terminal status reached. Stop polling.
    Done(RefreshStatus),
}

/// Poll state for one refresh.
#[derive(Debug)]
pub struct RefreshTracker {
    interval: Duration,
    polls: u32,
    last: Option<RefreshStatus>,
}

impl RefreshTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            polls: 0,
            last: None,
        }
    }

    /// Record a status and decide whether to keep polling.
    pub fn observe(&mut self, status: RefreshStatus) -> PollAction {
        self.polls += 1;
        if self.last.as_ref() != Some(&status) {
            debug!(%status, polls = self.polls, "refresh status changed");
        }

        let action = if status.is_terminal() {
            PollAction::Done(status.clone())
        } else {
            PollAction::Wait(self.interval)
        };
        self.last = Some(status);
        action
    }

    /// Status queries observed so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn last_status(&self) -> Option<&RefreshStatus> {
        self.last.as_ref()
    }
}

#[derive(Clone)]
pub struct RefreshController {
    client: FleetClient,
    sleeper: Arc<dyn Sleeper>,
    poll_interval: Duration,
}

impl RefreshController {
    pub fn new(client: FleetClient, sleeper: Arc<dyn Sleeper>, poll_interval: Duration) -> Self {
        Self {
            client,
            sleeper,
            poll_interval,
        }
    }

    /// Start a rolling refresh of `group`.
    pub async fn start(
        &self,
        group: &str,
        preferences: &RefreshPreferences,
    ) -> DeployResult<RefreshId> {
        info!(
            %group,
            min_healthy = preferences.min_healthy_percentage,
            max_healthy = preferences.max_healthy_percentage,
            warmup_secs = preferences.instance_warmup,
            skip_matching = preferences.skip_matching,
            "starting instance refresh"
        );
        let refresh_id = self.client.start_refresh(group, preferences).await?;
        info!(%group, %refresh_id, "instance refresh started");
        Ok(refresh_id)
    }

    /// Poll until the refresh reaches `Successful`, `Failed` or `Cancelled`.
    pub async fn wait_until_terminal(
        &self,
        group: &str,
        refresh_id: &str,
    ) -> DeployResult<RefreshStatus> {
        info!(%group, %refresh_id, "waiting for instance refresh to complete");
        let mut tracker = RefreshTracker::new(self.poll_interval);

        loop {
            let status = self.client.describe_refresh(group, refresh_id).await?;
            match tracker.observe(status.clone()) {
                PollAction::Done(status) => {
                    info!(%group, %refresh_id, %status, polls = tracker.polls(), "instance refresh finished");
                    return Ok(status);
                }
                PollAction::Wait(interval) => {
                    info!(%group, %refresh_id, %status, "instance refresh in progress");
                    self.sleeper.sleep(interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use fleetroll_core::{Capacity, ControlPlaneError};

    use super::*;
    use crate::retry::{RetryConfig, RetryPolicy};
    use crate::sim::{FleetFixture, InMemoryControlPlane, Operation};
    use crate::sleep::RecordingSleeper;

    fn controller(
        cp: &Arc<InMemoryControlPlane>,
        sleeper: &RecordingSleeper,
    ) -> RefreshController {
        let client = FleetClient::new(
            cp.clone(),
            RetryPolicy::new(RetryConfig::default(), Arc::new(sleeper.clone())),
        );
        RefreshController::new(client, Arc::new(sleeper.clone()), Duration::from_secs(10))
    }

    #[test]
    fn tracker_stops_on_first_terminal_status() {
        let mut tracker = RefreshTracker::new(Duration::from_secs(10));
        assert_eq!(
            tracker.observe(RefreshStatus::Pending),
            PollAction::Wait(Duration::from_secs(10))
        );
        assert_eq!(
            tracker.observe(RefreshStatus::Cancelling),
            PollAction::Wait(Duration::from_secs(10))
        );
        assert_eq!(
            tracker.observe(RefreshStatus::Cancelled),
            PollAction::Done(RefreshStatus::Cancelled)
        );
        assert_eq!(tracker.polls(), 3);
        assert_eq!(tracker.last_status(), Some(&RefreshStatus::Cancelled));
    }

    #[test]
    fn unrecognized_status_keeps_polling() {
        let mut tracker = RefreshTracker::new(Duration::from_secs(10));
        let rollback = RefreshStatus::from("RollbackInProgress".to_string());

        assert_eq!(
            tracker.observe(rollback.clone()),
            PollAction::Wait(Duration::from_secs(10))
        );
        assert_eq!(tracker.last_status(), Some(&rollback));
    }

    #[tokio::test]
    async fn waits_through_statuses_it_does_not_know() {
        let fixture: FleetFixture = serde_json::from_str(
            r#"{
                "groups": [{
                    "name": "web",
                    "launch_config": { "config_id": "lc-web", "version": "1" },
                    "capacity": { "desired": 1, "min": 1, "max": 1 }
                }],
                "launch_configs": [{ "config_id": "lc-web", "versions": ["img-v1"] }],
                "refresh_script": ["Pending", "RollbackInProgress", "RollbackSuccessful", "Cancelled"]
            }"#,
        )
        .unwrap();
        let cp = Arc::new(InMemoryControlPlane::from_fixture(fixture));
        let sleeper = RecordingSleeper::new();
        let refresh = controller(&cp, &sleeper);

        let id = refresh
            .start("web", &RefreshPreferences::default())
            .await
            .unwrap();
        let status = refresh.wait_until_terminal("web", &id).await.unwrap();

        assert_eq!(status, RefreshStatus::Cancelled);
        assert_eq!(cp.count(Operation::DescribeRefresh), 4);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(10); 3]);
    }

    #[tokio::test]
    async fn waits_through_non_terminal_statuses() {
        let cp = Arc::new(
            InMemoryControlPlane::single_group("web", "img-v1", Capacity::new(1, 1, 1))
                .with_refresh_script(vec![
                    RefreshStatus::Pending,
                    RefreshStatus::InProgress,
                    RefreshStatus::InProgress,
                    RefreshStatus::Successful,
                ]),
        );
        let sleeper = RecordingSleeper::new();
        let refresh = controller(&cp, &sleeper);

        let id = refresh
            .start("web", &RefreshPreferences::default())
            .await
            .unwrap();
        let status = refresh.wait_until_terminal("web", &id).await.unwrap();

        assert_eq!(status, RefreshStatus::Successful);
        assert_eq!(cp.count(Operation::DescribeRefresh), 4);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(10); 3]);
    }

    #[tokio::test]
    async fn failed_refresh_is_reported_not_raised() {
        let cp = Arc::new(
            InMemoryControlPlane::single_group("web", "img-v1", Capacity::new(1, 1, 1))
                .with_refresh_script(vec![RefreshStatus::InProgress, RefreshStatus::Failed]),
        );
        let sleeper = RecordingSleeper::new();
        let refresh = controller(&cp, &sleeper);

        let id = refresh
            .start("web", &RefreshPreferences::default())
            .await
            .unwrap();
        let status = refresh.wait_until_terminal("web", &id).await.unwrap();

        assert_eq!(status, RefreshStatus::Failed);
        assert_eq!(cp.count(Operation::DescribeRefresh), 2);
    }

    #[tokio::test]
    async fn preferences_pass_through_unmodified() {
        let cp = Arc::new(InMemoryControlPlane::single_group(
            "web",
            "img-v1",
            Capacity::new(1, 1, 1),
        ));
        let prefs = RefreshPreferences {
            min_healthy_percentage: 50,
            max_healthy_percentage: 150,
            instance_warmup: 45,
            skip_matching: true,
        };

        let id = controller(&cp, &RecordingSleeper::new())
            .start("web", &prefs)
            .await
            .unwrap();

        assert_eq!(cp.refresh_preferences(&id), Some(prefs));
    }

    #[tokio::test]
    async fn transient_poll_failure_is_retried() {
        let cp = Arc::new(
            InMemoryControlPlane::single_group("web", "img-v1", Capacity::new(1, 1, 1))
                .with_refresh_script(vec![RefreshStatus::Successful]),
        );
        let sleeper = RecordingSleeper::new();
        let refresh = controller(&cp, &sleeper);
        let id = refresh
            .start("web", &RefreshPreferences::default())
            .await
            .unwrap();
        cp.fail_next(
            Operation::DescribeRefresh,
            ControlPlaneError::transient("describe_refresh", "throttled"),
            1,
        );

        let status = refresh.wait_until_terminal("web", &id).await.unwrap();

        assert_eq!(status, RefreshStatus::Successful);
        assert_eq!(cp.count(Operation::DescribeRefresh), 2);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn unknown_refresh_id_is_fatal() {
        let cp = Arc::new(InMemoryControlPlane::single_group(
            "web",
            "img-v1",
            Capacity::new(1, 1, 1),
        ));

        let err = controller(&cp, &RecordingSleeper::new())
            .wait_until_terminal("web", "refresh-missing")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }
}
