//! Update decision: is there anything to deploy?
//!
//! The comparison set is exactly four fields: the image id bound to the
//! group's launch configuration, and desired/min/max capacity. Other
//! configuration drift is ignored.

use fleetroll_core::{DeploymentTarget, FleetGroupSnapshot, ImageId};
use tracing::{debug, info};

use crate::control_plane::FleetClient;
use crate::error::DeployResult;

/// Outcome of comparing a group against a deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Image and capacity already match. Nothing may be mutated.
    NoUpdate,
    /// Something differs; carries the image the group runs today.
    Update { current_image_id: ImageId },
}

impl UpdateDecision {
    /// Compare a snapshot (with its resolved image) against the target.
    pub fn compare(
        snapshot: &FleetGroupSnapshot,
        current_image_id: &str,
        target: &DeploymentTarget,
    ) -> Self {
        if current_image_id == target.image_id && snapshot.capacity == target.capacity {
            Self::NoUpdate
        } else {
            Self::Update {
                current_image_id: current_image_id.to_string(),
            }
        }
    }

    pub fn needs_update(&self) -> bool {
        matches!(self, Self::Update { .. })
    }
}

/// Resolves the group's current image and decides no-op vs. update.
#[derive(Clone)]
pub struct UpdateDecisionEngine {
    client: FleetClient,
}

impl UpdateDecisionEngine {
    pub fn new(client: FleetClient) -> Self {
        Self { client }
    }

    pub async fn decide(
        &self,
        snapshot: &FleetGroupSnapshot,
        target: &DeploymentTarget,
    ) -> DeployResult<UpdateDecision> {
        let lc = &snapshot.launch_config;
        let current_image_id = self
            .client
            .describe_launch_config_version(&lc.config_id, &lc.version)
            .await?;

        debug!(
            group = %snapshot.name,
            launch_config = %lc,
            current_image = %current_image_id,
            target_image = %target.image_id,
            current_capacity = %snapshot.capacity,
            target_capacity = %target.capacity,
            "resolved current image"
        );

        let decision = UpdateDecision::compare(snapshot, &current_image_id, target);
        if !decision.needs_update() {
            info!(
                group = %snapshot.name,
                "image id and desired/min/max capacity unchanged, no update required"
            );
        }
        Ok(decision)
    }
}
