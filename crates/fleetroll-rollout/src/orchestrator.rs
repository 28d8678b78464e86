//! Deployment orchestrator: sequences the stages of a rolling deployment.
//!
//! Stages run strictly in order and the first fatal error aborts the
//! run. Nothing is compensated: a launch configuration version published
//! before a failure stays published.

use std::sync::Arc;

use fleetroll_core::{
    ConfigVersion, DeployConfig, DeploymentTarget, RefreshId, RefreshPreferences, RefreshStatus,
    TimingConfig,
};
use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};

use crate::control_plane::{ControlPlane, FleetClient};
use crate::error::DeployResult;
use crate::reaper::StaleInstanceReaper;
use crate::refresh::RefreshController;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::sleep::Sleeper;
use crate::versioner::LaunchConfigVersioner;

/// How a deployment run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeploymentOutcome {
    /// Image and capacity already matched; nothing was mutated.
    NoUpdate,
    /// The group was updated, refreshed, and reaped.
    Rolled {
        version: ConfigVersion,
        refresh_id: RefreshId,
        refresh_status: RefreshStatus,
        /// Reaper passes that terminated at least one instance.
        reap_passes: u32,
    },
}

pub struct DeploymentOrchestrator {
    client: FleetClient,
    versioner: LaunchConfigVersioner,
    refresh: RefreshController,
    reaper: StaleInstanceReaper,
}

impl DeploymentOrchestrator {
    /// Wire every stage to one control plane and one sleeper.
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        timing: &TimingConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let retry = RetryPolicy::new(RetryConfig::from(timing), sleeper.clone());
        let client = FleetClient::new(control_plane, retry);

        Self {
            versioner: LaunchConfigVersioner::new(client.clone()),
            refresh: RefreshController::new(
                client.clone(),
                sleeper.clone(),
                timing.refresh_poll_interval(),
            ),
            reaper: StaleInstanceReaper::new(client.clone(), sleeper, timing.reap_poll_interval()),
            client,
        }
    }

    /// Run the deployment described by a config file.
    pub async fn run_config(&self, config: &DeployConfig) -> DeployResult<DeploymentOutcome> {
        self.run(&config.group, &config.target(), &config.instance_refresh)
            .await
    }

    pub async fn run(
        &self,
        group: &str,
        target: &DeploymentTarget,
        preferences: &RefreshPreferences,
    ) -> DeployResult<DeploymentOutcome> {
        let span = info_span!("deploy", %group, image = %target.image_id);

        async {
            info!("starting deployment");
            let result = self.run_stages(group, target, preferences).await;
            match &result {
                Ok(DeploymentOutcome::NoUpdate) => {
                    info!("no update required, deployment completed")
                }
                Ok(DeploymentOutcome::Rolled { version, .. }) => {
                    info!(%version, "deployment completed successfully")
                }
                Err(e) => error!(error = %e, "deployment aborted"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        group: &str,
        target: &DeploymentTarget,
        preferences: &RefreshPreferences,
    ) -> DeployResult<DeploymentOutcome> {
        let snapshot = self.client.describe_group(group).await?;
        info!(
            launch_config = %snapshot.launch_config,
            capacity = %snapshot.capacity,
            "fetched group details"
        );

        let Some(version) = self.versioner.apply(&snapshot, target).await? else {
            return Ok(DeploymentOutcome::NoUpdate);
        };
        info!(%version, "group now uses launch configuration version");

        let refresh_id = self.refresh.start(group, preferences).await?;
        let refresh_status = self.refresh.wait_until_terminal(group, &refresh_id).await?;
        if !refresh_status.is_successful() {
            warn!(%refresh_id, status = %refresh_status, "instance refresh ended without success");
        }

        let reap_passes = self.reaper.run(group).await?;

        Ok(DeploymentOutcome::Rolled {
            version,
            refresh_id,
            refresh_status,
            reap_passes,
        })
    }
}
