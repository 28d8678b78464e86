//! Domain types for fleet groups, launch configurations, refreshes,
//! and instances.
//!
//! These are read-only views of control-plane state. Every query pulls
//! them fresh; nothing here is cached or persisted between runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name of a fleet group (unique key).
pub type GroupName = String;

/// Identifier of a launch configuration.
pub type ConfigId = String;

/// Machine image identifier.
pub type ImageId = String;

/// Identifier of a compute instance.
pub type InstanceId = String;

/// Opaque identifier returned when a refresh starts.
pub type RefreshId = String;

// ── Launch configuration ──────────────────────────────────────────

/// Version token of a launch configuration.
///
/// The control plane spells these as strings: either a literal version
/// number (`"3"`) or the symbolic `"$Latest"` marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConfigVersion {
    /// Whatever the highest published version is at query time.
    Latest,
    /// A specific published version (1-based).
    Number(u64),
}

impl ConfigVersion {
    pub const LATEST_TOKEN: &'static str = "$Latest";
}

impl fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str(Self::LATEST_TOKEN),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for ConfigVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == Self::LATEST_TOKEN {
            return Ok(Self::Latest);
        }
        s.parse::<u64>()
            .map(Self::Number)
            .map_err(|_| format!("invalid launch configuration version: {s:?}"))
    }
}

impl TryFrom<String> for ConfigVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConfigVersion> for String {
    fn from(value: ConfigVersion) -> Self {
        value.to_string()
    }
}

/// Reference from a fleet group to one launch configuration version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfigRef {
    /// Launch configuration the group launches instances from.
    pub config_id: ConfigId,
    /// Pinned version, or `$Latest`.
    pub version: ConfigVersion,
}

impl fmt::Display for LaunchConfigRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.config_id, self.version)
    }
}

// ── Fleet group ───────────────────────────────────────────────────

/// Desired/min/max instance counts of a fleet group.
///
/// `min <= desired <= max` is enforced by the control plane, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    /// Instances the group tries to keep running.
    pub desired: u32,
    /// Lower bound for scaling.
    pub min: u32,
    /// Upper bound for scaling.
    pub max: u32,
}

impl Capacity {
    pub fn new(desired: u32, min: u32, max: u32) -> Self {
        Self { desired, min, max }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "desired={} min={} max={}",
            self.desired, self.min, self.max
        )
    }
}

/// Immutable view of a fleet group's current configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetGroupSnapshot {
    /// Group name.
    pub name: GroupName,
    /// Launch configuration version new instances are built from.
    pub launch_config: LaunchConfigRef,
    /// Current desired/min/max counts.
    pub capacity: Capacity,
}

/// What a deployment wants the group to look like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    /// Image every instance should run after the rollout.
    pub image_id: ImageId,
    /// Capacity to apply to the group.
    pub capacity: Capacity,
}

/// A single mutating update to a fleet group.
///
/// `launch_config` is only set when a new configuration version was
/// published; otherwise the group keeps its current reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUpdate {
    /// Group to update.
    pub name: GroupName,
    /// Capacity to apply. Always sent.
    pub capacity: Capacity,
    /// New launch configuration reference, if one was published.
    pub launch_config: Option<LaunchConfigRef>,
}

// ── Instance refresh ──────────────────────────────────────────────

/// Preferences for a rolling instance refresh. Passed through to the
/// control plane unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPreferences {
    /// Share of capacity that must stay healthy during the refresh.
    pub min_healthy_percentage: u32,
    /// Ceiling on capacity (in percent) while replacements launch.
    pub max_healthy_percentage: u32,
    /// Warm-up time in seconds before a new instance counts as healthy.
    pub instance_warmup: u64,
    /// Skip instances already running the target configuration.
    pub skip_matching: bool,
}

impl Default for RefreshPreferences {
    fn default() -> Self {
        Self {
            min_healthy_percentage: 90,
            max_healthy_percentage: 100,
            instance_warmup: 300,
            skip_matching: false,
        }
    }
}

/// State of an in-flight instance refresh.
///
/// Statuses the provider adds later (rollbacks and the like) land in
/// `Other` and count as still in progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RefreshStatus {
    Pending,
    InProgress,
    Baking,
    Cancelling,
    Successful,
    Failed,
    Cancelled,
    Other(String),
}

impl RefreshStatus {
    /// `Successful`, `Failed` and `Cancelled` end a refresh.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed | Self::Cancelled)
    }

    pub fn is_successful(&self) -> bool {
        *self == Self::Successful
    }
}

impl From<String> for RefreshStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "InProgress" => Self::InProgress,
            "Baking" => Self::Baking,
            "Cancelling" => Self::Cancelling,
            "Successful" => Self::Successful,
            "Failed" => Self::Failed,
            "Cancelled" => Self::Cancelled,
            _ => Self::Other(value),
        }
    }
}

impl From<RefreshStatus> for String {
    fn from(value: RefreshStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Baking => "Baking",
            Self::Cancelling => "Cancelling",
            Self::Successful => "Successful",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

// ── Instances ─────────────────────────────────────────────────────

/// Lifecycle state of an instance attached to a fleet group.
///
/// Only `InService` matters to the reaper; every other state (known or
/// not) marks the instance as stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleState {
    InService,
    Pending,
    Terminating,
    Terminated,
    Other(String),
}

impl LifecycleState {
    pub fn is_in_service(&self) -> bool {
        *self == Self::InService
    }
}

impl From<String> for LifecycleState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "InService" => Self::InService,
            "Pending" => Self::Pending,
            "Terminating" => Self::Terminating,
            "Terminated" => Self::Terminated,
            _ => Self::Other(value),
        }
    }
}

impl From<LifecycleState> for String {
    fn from(value: LifecycleState) -> Self {
        value.to_string()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InService => f.write_str("InService"),
            Self::Pending => f.write_str("Pending"),
            Self::Terminating => f.write_str("Terminating"),
            Self::Terminated => f.write_str("Terminated"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// An instance as reported by the fleet-wide instance listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Group the instance is attached to.
    pub group_name: GroupName,
    /// Where the instance is in its lifecycle.
    pub lifecycle_state: LifecycleState,
}
