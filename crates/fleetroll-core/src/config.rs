//! Deployment configuration file parser.
//!
//! The format is picked from the file extension: `.yaml`/`.yml`,
//! `.toml`, or `.json`. Field names follow the deployment config the
//! operators already keep (`auto_scaling_group` and `ami_id` are
//! accepted as aliases).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::types::{Capacity, DeploymentTarget, RefreshPreferences};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(alias = "aws_region")]
    pub region: String,
    #[serde(alias = "auto_scaling_group")]
    pub group: String,
    #[serde(alias = "ami_id")]
    pub image_id: String,
    pub desired_capacity: u32,
    pub min_size: u32,
    pub max_size: u32,
    /// Required. Handed to the refresh as written.
    pub instance_refresh: RefreshPreferences,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Retry and polling cadence. All values are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub retry_attempts: u32,
    pub retry_multiplier_secs: u64,
    pub retry_min_wait_secs: u64,
    pub retry_max_wait_secs: u64,
    pub refresh_poll_secs: u64,
    pub reap_poll_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_multiplier_secs: 1,
            retry_min_wait_secs: 2,
            retry_max_wait_secs: 10,
            refresh_poll_secs: 10,
            reap_poll_secs: 30,
        }
    }
}

impl TimingConfig {
    pub fn refresh_poll_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_poll_secs)
    }

    pub fn reap_poll_interval(&self) -> Duration {
        Duration::from_secs(self.reap_poll_secs)
    }
}

impl DeployConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let config = Self::parse(&content, ext)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(content: &str, ext: &str) -> anyhow::Result<Self> {
        let config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(content)?,
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => bail!("unsupported config format: {other:?}"),
        };
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.group.trim().is_empty() {
            bail!("group name must not be empty");
        }
        if self.image_id.trim().is_empty() {
            bail!("image id must not be empty");
        }
        if !(self.min_size <= self.desired_capacity && self.desired_capacity <= self.max_size) {
            bail!(
                "capacity must satisfy min <= desired <= max (got min={} desired={} max={})",
                self.min_size,
                self.desired_capacity,
                self.max_size
            );
        }

        let prefs = &self.instance_refresh;
        if prefs.min_healthy_percentage > 100 {
            bail!("min_healthy_percentage must be at most 100");
        }
        if !(100..=200).contains(&prefs.max_healthy_percentage) {
            bail!("max_healthy_percentage must be between 100 and 200");
        }
        if prefs.min_healthy_percentage > prefs.max_healthy_percentage {
            bail!("min_healthy_percentage must not exceed max_healthy_percentage");
        }

        if self.timing.retry_attempts == 0 {
            bail!("retry_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn capacity(&self) -> Capacity {
        Capacity::new(self.desired_capacity, self.min_size, self.max_size)
    }

    pub fn target(&self) -> DeploymentTarget {
        DeploymentTarget {
            image_id: self.image_id.clone(),
            capacity: self.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
aws_region: us-east-1
auto_scaling_group: web-asg
ami_id: ami-0abc
desired_capacity: 2
min_size: 1
max_size: 4
instance_refresh:
  min_healthy_percentage: 90
  max_healthy_percentage: 110
  instance_warmup: 60
  skip_matching: true
"#;

    #[test]
    fn parses_yaml_with_aliases() {
        let config = DeployConfig::parse(YAML, "yaml").unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.group, "web-asg");
        assert_eq!(config.image_id, "ami-0abc");
        assert_eq!(config.capacity(), Capacity::new(2, 1, 4));
        assert!(config.instance_refresh.skip_matching);
        assert_eq!(config.timing, TimingConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn parses_toml_with_timing_overrides() {
        let toml_str = r#"
region = "eu-west-1"
group = "api"
image_id = "img-2"
desired_capacity = 1
min_size = 1
max_size = 1

[instance_refresh]
min_healthy_percentage = 100
max_healthy_percentage = 200
instance_warmup = 30
skip_matching = false

[timing]
refresh_poll_secs = 5
"#;
        let config = DeployConfig::parse(toml_str, "toml").unwrap();
        assert_eq!(config.timing.refresh_poll_secs, 5);
        assert_eq!(config.timing.reap_poll_secs, 30);
        assert_eq!(
            config.instance_refresh,
            RefreshPreferences {
                min_healthy_percentage: 100,
                max_healthy_percentage: 200,
                instance_warmup: 30,
                skip_matching: false,
            }
        );
    }

    #[test]
    fn refresh_preferences_are_required() {
        let without = YAML.split("instance_refresh:").next().unwrap();
        let err = DeployConfig::parse(without, "yaml").unwrap_err();
        assert!(err.to_string().contains("instance_refresh"));
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(DeployConfig::parse(YAML, "ini").is_err());
    }

    #[test]
    fn rejects_inverted_capacity() {
        let mut config = DeployConfig::parse(YAML, "yaml").unwrap();
        config.desired_capacity = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min <= desired <= max"));
    }

    #[test]
    fn rejects_bad_healthy_percentages() {
        let mut config = DeployConfig::parse(YAML, "yaml").unwrap();
        config.instance_refresh.max_healthy_percentage = 250;
        assert!(config.validate().is_err());

        config.instance_refresh.max_healthy_percentage = 100;
        config.instance_refresh.min_healthy_percentage = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.yaml");
        std::fs::write(&path, YAML.replace("ami_id: ami-0abc", "ami_id: \"\"")).unwrap();

        let err = DeployConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("image id"));
    }
}
