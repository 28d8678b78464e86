//! Stale instance reaper.
//!
//! After a refresh, any instance still attached to the group but not
//! `InService` (draining, launching, or otherwise in transition) is
//! stale. Each pass lists every instance, terminates the stale ones,
//! and sleeps before listing again. The loop ends the first time a
//! listing shows no stale instance for the group; it has no iteration
//! bound.

use std::sync::Arc;
use std::time::Duration;

use fleetroll_core::InstanceRecord;
use tracing::{debug, info};

use crate::control_plane::FleetClient;
use crate::error::DeployResult;
use crate::sleep::Sleeper;

/// Result of one list-and-terminate pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapPass {
    /// No stale instance left in the group.
    Converged,
    /// Terminate was requested for this many instances.
    Terminated(usize),
}

#[derive(Clone)]
pub struct StaleInstanceReaper {
    client: FleetClient,
    sleeper: Arc<dyn Sleeper>,
    poll_interval: Duration,
}

impl StaleInstanceReaper {
    pub fn new(client: FleetClient, sleeper: Arc<dyn Sleeper>, poll_interval: Duration) -> Self {
        Self {
            client,
            sleeper,
            poll_interval,
        }
    }

    /// Instances of `group` that are not `InService`.
    pub fn stale_instances<'a>(
        instances: &'a [InstanceRecord],
        group: &str,
    ) -> Vec<&'a InstanceRecord> {
        instances
            .iter()
            .filter(|i| i.group_name == group && !i.lifecycle_state.is_in_service())
            .collect()
    }

    /// List once and terminate whatever is stale.
    pub async fn pass(&self, group: &str) -> DeployResult<ReapPass> {
        let instances = self.client.list_instances().await?;
        let stale = Self::stale_instances(&instances, group);
        if stale.is_empty() {
            return Ok(ReapPass::Converged);
        }

        info!(%group, stale = stale.len(), "waiting for old instances to terminate");
        for instance in &stale {
            debug!(
                %group,
                instance = %instance.instance_id,
                state = %instance.lifecycle_state,
                "terminating stale instance"
            );
            self.client.terminate_instance(&instance.instance_id).await?;
        }
        Ok(ReapPass::Terminated(stale.len()))
    }

    /// Repeat passes until the group has no stale instance.
    ///
    /// Returns the number of passes that had to terminate something.
    pub async fn run(&self, group: &str) -> DeployResult<u32> {
        info!(%group, "verifying old instances are terminated");
        let mut passes = 0;

        loop {
            match self.pass(group).await? {
                ReapPass::Converged => {
                    info!(%group, passes, "old instances have been terminated");
                    return Ok(passes);
                }
                ReapPass::Terminated(_) => {
                    passes += 1;
                    self.sleeper.sleep(self.poll_interval).await;
                }
            }
        }
    }
}
