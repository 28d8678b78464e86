//! `fleetctl simulate`: run a full deployment against an in-memory fleet.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use fleetroll_core::DeployConfig;
use fleetroll_rollout::{
    DeploymentOrchestrator, DeploymentOutcome, FleetFixture, InMemoryControlPlane,
    RecordingSleeper, Sleeper, TokioSleeper,
};
use tracing::info;

pub async fn simulate(config: &Path, fleet: &Path, instant: bool) -> anyhow::Result<()> {
    let outcome = run(config, fleet, instant).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn run(config: &Path, fleet: &Path, instant: bool) -> anyhow::Result<DeploymentOutcome> {
    let config = DeployConfig::from_file(config)?;
    let fixture = FleetFixture::from_file(fleet)?;
    info!(region = %config.region, group = %config.group, "simulating deployment");

    let sleeper: Arc<dyn Sleeper> = if instant {
        Arc::new(RecordingSleeper::new())
    } else {
        Arc::new(TokioSleeper)
    };
    let control_plane = Arc::new(InMemoryControlPlane::from_fixture(fixture));
    let orchestrator = DeploymentOrchestrator::new(control_plane, &config.timing, sleeper);

    orchestrator
        .run_config(&config)
        .await
        .with_context(|| format!("deployment of {} failed", config.group))
}
