//! Launch configuration versioning and the group update.
//!
//! When the image changed, a new launch configuration version is
//! published from the current one with only the image replaced. The
//! version survives even if a later stage fails; nothing here deletes it.
//! Capacity (and the new version reference, if any) is then applied to
//! the group in one `update_group` call.

use fleetroll_core::{
    ConfigVersion, DeploymentTarget, FleetGroupSnapshot, GroupUpdate, LaunchConfigRef,
};
use tracing::info;

use crate::control_plane::FleetClient;
use crate::decision::{UpdateDecision, UpdateDecisionEngine};
use crate::error::DeployResult;

#[derive(Clone)]
pub struct LaunchConfigVersioner {
    client: FleetClient,
    decisions: UpdateDecisionEngine,
}

impl LaunchConfigVersioner {
    pub fn new(client: FleetClient) -> Self {
        Self {
            decisions: UpdateDecisionEngine::new(client.clone()),
            client,
        }
    }

    /// Bring the group in line with `target`.
    ///
    /// Returns `None` when nothing needed to change (and nothing was
    /// mutated), otherwise the launch configuration version now in
    /// effect: the new one if the image changed, else the group's
    /// existing version token.
    pub async fn apply(
        &self,
        snapshot: &FleetGroupSnapshot,
        target: &DeploymentTarget,
    ) -> DeployResult<Option<ConfigVersion>> {
        let current_image_id = match self.decisions.decide(snapshot, target).await? {
            UpdateDecision::NoUpdate => return Ok(None),
            UpdateDecision::Update { current_image_id } => current_image_id,
        };

        info!(group = %snapshot.name, "updating group with new settings");

        let lc = &snapshot.launch_config;
        let mut update = GroupUpdate {
            name: snapshot.name.clone(),
            capacity: target.capacity,
            launch_config: None,
        };
        let mut effective = lc.version.clone();

        if current_image_id != target.image_id {
            info!(
                group = %snapshot.name,
                launch_config = %lc,
                from = %current_image_id,
                to = %target.image_id,
                "image changed, publishing new launch configuration version"
            );
            let number = self
                .client
                .create_launch_config_version(&lc.config_id, &lc.version, &target.image_id)
                .await?;
            let version = ConfigVersion::Number(number);
            info!(
                config_id = %lc.config_id,
                %version,
                "launch configuration version published"
            );

            update.launch_config = Some(LaunchConfigRef {
                config_id: lc.config_id.clone(),
                version: version.clone(),
            });
            effective = version;
        }

        self.client.update_group(&update).await?;
        info!(
            group = %snapshot.name,
            capacity = %update.capacity,
            version = %effective,
            "group updated"
        );

        Ok(Some(effective))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fleetroll_core::{Capacity, ControlPlaneError};

    use super::*;
    use crate::retry::{RetryConfig, RetryPolicy};
    use crate::sim::{InMemoryControlPlane, Operation};
    use crate::sleep::RecordingSleeper;

    async fn setup(
        image: &str,
        capacity: Capacity,
    ) -> (Arc<InMemoryControlPlane>, LaunchConfigVersioner, FleetGroupSnapshot) {
        let cp = Arc::new(InMemoryControlPlane::single_group("web", image, capacity));
        let client = FleetClient::new(
            cp.clone(),
            RetryPolicy::new(RetryConfig::default(), Arc::new(RecordingSleeper::new())),
        );
        let snapshot = client.describe_group("web").await.unwrap();
        (cp, LaunchConfigVersioner::new(client), snapshot)
    }

    fn target(image: &str, capacity: Capacity) -> DeploymentTarget {
        DeploymentTarget {
            image_id: image.to_string(),
            capacity,
        }
    }

    #[tokio::test]
    async fn unchanged_target_mutates_nothing() {
        let cap = Capacity::new(1, 1, 1);
        let (cp, versioner, snapshot) = setup("img-v1", cap).await;

        let applied = versioner.apply(&snapshot, &target("img-v1", cap)).await.unwrap();

        assert_eq!(applied, None);
        assert!(cp.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn new_image_publishes_version_and_points_group_at_it() {
        let (cp, versioner, snapshot) = setup("img-v1", Capacity::new(1, 1, 1)).await;

        let applied = versioner
            .apply(&snapshot, &target("img-v2", Capacity::new(2, 2, 2)))
            .await
            .unwrap();

        assert_eq!(applied, Some(ConfigVersion::Number(2)));
        assert_eq!(
            cp.mutating_calls(),
            vec![Operation::CreateLaunchConfigVersion, Operation::UpdateGroup]
        );
        let updates = cp.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].capacity, Capacity::new(2, 2, 2));
        assert_eq!(
            updates[0].launch_config,
            Some(LaunchConfigRef {
                config_id: "lc-web".to_string(),
                version: ConfigVersion::Number(2),
            })
        );
        assert_eq!(cp.image_for("lc-web", &ConfigVersion::Number(2)).as_deref(), Some("img-v2"));
    }

    #[tokio::test]
    async fn capacity_only_change_keeps_existing_version() {
        let (cp, versioner, snapshot) = setup("img-v1", Capacity::new(1, 1, 1)).await;

        let applied = versioner
            .apply(&snapshot, &target("img-v1", Capacity::new(3, 1, 5)))
            .await
            .unwrap();

        assert_eq!(applied, Some(ConfigVersion::Latest));
        assert_eq!(cp.mutating_calls(), vec![Operation::UpdateGroup]);
        assert_eq!(cp.updates()[0].launch_config, None);
    }

    #[tokio::test]
    async fn image_only_change_still_updates_group() {
        let cap = Capacity::new(2, 1, 3);
        let (cp, versioner, snapshot) = setup("img-v1", cap).await;

        let applied = versioner.apply(&snapshot, &target("img-v2", cap)).await.unwrap();

        assert_eq!(applied, Some(ConfigVersion::Number(2)));
        let updates = cp.updates();
        assert_eq!(updates[0].capacity, cap);
        assert!(updates[0].launch_config.is_some());
    }

    #[tokio::test]
    async fn failed_group_update_leaves_published_version() {
        let (cp, versioner, snapshot) = setup("img-v1", Capacity::new(1, 1, 1)).await;
        cp.fail_next(
            Operation::UpdateGroup,
            ControlPlaneError::Other("validation error".to_string()),
            1,
        );

        let result = versioner
            .apply(&snapshot, &target("img-v2", Capacity::new(1, 1, 1)))
            .await;

        assert!(result.is_err());
        assert_eq!(cp.image_for("lc-web", &ConfigVersion::Latest).as_deref(), Some("img-v2"));
        assert!(cp.updates().is_empty());
    }
}
