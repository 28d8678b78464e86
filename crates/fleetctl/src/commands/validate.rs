//! `fleetctl validate`: parse and check a deployment config.

use std::path::Path;

use fleetroll_core::DeployConfig;
use tracing::info;

pub fn validate(path: &Path) -> anyhow::Result<()> {
    let config = DeployConfig::from_file(path)?;
    info!(
        group = %config.group,
        image = %config.image_id,
        capacity = %config.capacity(),
        "config is valid"
    );
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
