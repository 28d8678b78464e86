//! In-memory control plane.
//!
//! Models groups, versioned launch configurations, instances, and
//! refreshes behind a mutex. Used by the test suites and by
//! `fleetctl simulate` for dry runs. Refresh progress follows a scripted
//! status sequence, one status per `describe_refresh` call.
//!
//! Every call is recorded before any injected fault fires, so tests can
//! count attempts as well as successes.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use fleetroll_core::{
    Capacity, ConfigId, ConfigVersion, ControlPlaneError, ControlPlaneResult, FleetGroupSnapshot,
    GroupName, GroupUpdate, ImageId, InstanceId, InstanceRecord, LaunchConfigRef, LifecycleState,
    RefreshId, RefreshPreferences, RefreshStatus,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control_plane::ControlPlane;

/// Control-plane operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    DescribeGroup,
    DescribeLaunchConfigVersion,
    CreateLaunchConfigVersion,
    UpdateGroup,
    StartRefresh,
    DescribeRefresh,
    ListInstances,
    TerminateInstance,
}

impl Operation {
    /// Whether the operation changes control-plane state.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::CreateLaunchConfigVersion
                | Self::UpdateGroup
                | Self::StartRefresh
                | Self::TerminateInstance
        )
    }
}

/// Launch configuration with its published images, version 1 first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureLaunchConfig {
    pub config_id: ConfigId,
    pub versions: Vec<ImageId>,
}

/// Serializable starting state for an [`InMemoryControlPlane`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetFixture {
    #[serde(default)]
    pub groups: Vec<FleetGroupSnapshot>,
    #[serde(default)]
    pub launch_configs: Vec<FixtureLaunchConfig>,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
    /// Statuses each refresh walks through. Empty means the default
    /// `Pending → InProgress → Successful`.
    #[serde(default)]
    pub refresh_script: Vec<RefreshStatus>,
}

impl FleetFixture {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let fixture = serde_json::from_str(&content)
            .with_context(|| format!("parsing fleet fixture {}", path.display()))?;
        Ok(fixture)
    }
}

#[derive(Debug)]
struct Refresh {
    group: GroupName,
    preferences: RefreshPreferences,
    remaining: VecDeque<RefreshStatus>,
    current: RefreshStatus,
}

#[derive(Debug, Default)]
struct FleetState {
    groups: BTreeMap<GroupName, FleetGroupSnapshot>,
    launch_configs: BTreeMap<ConfigId, Vec<ImageId>>,
    instances: Vec<InstanceRecord>,
    refreshes: HashMap<RefreshId, Refresh>,
    refresh_script: Vec<RefreshStatus>,
    next_refresh: u64,
    next_instance: u64,
    faults: HashMap<Operation, VecDeque<ControlPlaneError>>,
    calls: Vec<Operation>,
    updates: Vec<GroupUpdate>,
    terminated: Vec<InstanceId>,
}

impl FleetState {
    fn resolve(&self, config_id: &str, version: &ConfigVersion) -> Option<&ImageId> {
        let versions = self.launch_configs.get(config_id)?;
        match version {
            ConfigVersion::Latest => versions.last(),
            ConfigVersion::Number(n) => {
                let index = usize::try_from(*n).ok()?.checked_sub(1)?;
                versions.get(index)
            }
        }
    }

    /// Replace a group's instances with a fresh generation.
    fn roll_generation(&mut self, group: &str) {
        let desired = self
            .groups
            .get(group)
            .map(|g| g.capacity.desired)
            .unwrap_or_default();

        for inst in self.instances.iter_mut().filter(|i| i.group_name == group) {
            inst.lifecycle_state = LifecycleState::Terminating;
        }
        for _ in 0..desired {
            self.next_instance += 1;
            self.instances.push(InstanceRecord {
                instance_id: format!("i-{group}-{:04}", self.next_instance),
                group_name: group.to_string(),
                lifecycle_state: LifecycleState::InService,
            });
        }
        debug!(%group, desired, "simulated new instance generation");
    }
}

/// A [`ControlPlane`] backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    state: Mutex<FleetState>,
}

impl InMemoryControlPlane {
    /// A control plane with no groups or configurations.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: FleetFixture) -> Self {
        let mut state = FleetState {
            refresh_script: fixture.refresh_script,
            instances: fixture.instances,
            ..Default::default()
        };
        for group in fixture.groups {
            state.groups.insert(group.name.clone(), group);
        }
        for lc in fixture.launch_configs {
            state.launch_configs.insert(lc.config_id, lc.versions);
        }
        state.next_instance = state.instances.len() as u64;

        Self {
            state: Mutex::new(state),
        }
    }

    /// One group `name` on `lc-<name>@$Latest` (a single version bound
    /// to `image_id`) with `desired` in-service instances.
    pub fn single_group(name: &str, image_id: &str, capacity: Capacity) -> Self {
        let config_id = format!("lc-{name}");
        let instances = (0..capacity.desired)
            .map(|i| InstanceRecord {
                instance_id: format!("i-{name}-{i:04}"),
                group_name: name.to_string(),
                lifecycle_state: LifecycleState::InService,
            })
            .collect();

        Self::from_fixture(FleetFixture {
            groups: vec![FleetGroupSnapshot {
                name: name.to_string(),
                launch_config: LaunchConfigRef {
                    config_id: config_id.clone(),
                    version: ConfigVersion::Latest,
                },
                capacity,
            }],
            launch_configs: vec![FixtureLaunchConfig {
                config_id,
                versions: vec![image_id.to_string()],
            }],
            instances,
            refresh_script: Vec::new(),
        })
    }

    /// Set the status sequence new refreshes walk through.
    pub fn with_refresh_script(self, script: Vec<RefreshStatus>) -> Self {
        self.lock().refresh_script = script;
        self
    }

    /// Attach additional instances.
    pub fn with_instances(self, instances: Vec<InstanceRecord>) -> Self {
        self.lock().instances.extend(instances);
        self
    }

    /// Make the next `times` calls of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: ControlPlaneError, times: usize) {
        let mut state = self.lock();
        let queue = state.faults.entry(operation).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Every call made so far, in order, including failed attempts.
    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.lock().calls.iter().filter(|c| **c == operation).count()
    }

    /// Mutating calls made so far, including failed attempts.
    pub fn mutating_calls(&self) -> Vec<Operation> {
        self.lock()
            .calls
            .iter()
            .copied()
            .filter(|c| c.is_mutating())
            .collect()
    }

    /// Group updates that were applied.
    pub fn updates(&self) -> Vec<GroupUpdate> {
        self.lock().updates.clone()
    }

    /// Instances terminated so far.
    pub fn terminated(&self) -> Vec<InstanceId> {
        self.lock().terminated.clone()
    }

    pub fn group(&self, name: &str) -> Option<FleetGroupSnapshot> {
        self.lock().groups.get(name).cloned()
    }

    pub fn image_for(&self, config_id: &str, version: &ConfigVersion) -> Option<ImageId> {
        self.lock().resolve(config_id, version).cloned()
    }

    pub fn refresh_preferences(&self, refresh_id: &str) -> Option<RefreshPreferences> {
        self.lock()
            .refreshes
            .get(refresh_id)
            .map(|r| r.preferences.clone())
    }

    pub fn instances(&self) -> Vec<InstanceRecord> {
        self.lock().instances.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and fire an injected fault, if any.
    fn enter(&self, operation: Operation) -> ControlPlaneResult<MutexGuard<'_, FleetState>> {
        let mut state = self.lock();
        state.calls.push(operation);
        if let Some(err) = state.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            debug!(?operation, error = %err, "injected fault");
            return Err(err);
        }
        Ok(state)
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn describe_group(&self, name: &str) -> ControlPlaneResult<FleetGroupSnapshot> {
        let state = self.enter(Operation::DescribeGroup)?;
        state
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| ControlPlaneError::NotFound(format!("fleet group {name}")))
    }

    async fn describe_launch_config_version(
        &self,
        config_id: &str,
        version: &ConfigVersion,
    ) -> ControlPlaneResult<ImageId> {
        let state = self.enter(Operation::DescribeLaunchConfigVersion)?;
        state.resolve(config_id, version).cloned().ok_or_else(|| {
            ControlPlaneError::NotFound(format!("launch configuration {config_id} version {version}"))
        })
    }

    async fn create_launch_config_version(
        &self,
        config_id: &str,
        source_version: &ConfigVersion,
        image_id: &str,
    ) -> ControlPlaneResult<u64> {
        let mut state = self.enter(Operation::CreateLaunchConfigVersion)?;
        if state.resolve(config_id, source_version).is_none() {
            return Err(ControlPlaneError::NotFound(format!(
                "launch configuration {config_id} version {source_version}"
            )));
        }
        let versions = state
            .launch_configs
            .get_mut(config_id)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("launch configuration {config_id}")))?;
        versions.push(image_id.to_string());
        Ok(versions.len() as u64)
    }

    async fn update_group(&self, update: &GroupUpdate) -> ControlPlaneResult<()> {
        let mut state = self.enter(Operation::UpdateGroup)?;
        if let Some(lc) = &update.launch_config {
            if state.resolve(&lc.config_id, &lc.version).is_none() {
                return Err(ControlPlaneError::NotFound(format!("launch configuration {lc}")));
            }
        }

        let group = state
            .groups
            .get_mut(&update.name)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("fleet group {}", update.name)))?;
        group.capacity = update.capacity;
        if let Some(lc) = &update.launch_config {
            group.launch_config = lc.clone();
        }
        state.updates.push(update.clone());
        Ok(())
    }

    async fn start_refresh(
        &self,
        name: &str,
        preferences: &RefreshPreferences,
    ) -> ControlPlaneResult<RefreshId> {
        let mut state = self.enter(Operation::StartRefresh)?;
        if !state.groups.contains_key(name) {
            return Err(ControlPlaneError::NotFound(format!("fleet group {name}")));
        }

        let remaining = if state.refresh_script.is_empty() {
            VecDeque::from([
                RefreshStatus::Pending,
                RefreshStatus::InProgress,
                RefreshStatus::Successful,
            ])
        } else {
            state.refresh_script.iter().cloned().collect()
        };

        state.next_refresh += 1;
        let refresh_id = format!("refresh-{:04}", state.next_refresh);
        state.refreshes.insert(
            refresh_id.clone(),
            Refresh {
                group: name.to_string(),
                preferences: preferences.clone(),
                remaining,
                current: RefreshStatus::Pending,
            },
        );
        Ok(refresh_id)
    }

    async fn describe_refresh(
        &self,
        name: &str,
        refresh_id: &str,
    ) -> ControlPlaneResult<RefreshStatus> {
        let mut state = self.enter(Operation::DescribeRefresh)?;
        let refresh = state
            .refreshes
            .get_mut(refresh_id)
            .filter(|r| r.group == name)
            .ok_or_else(|| {
                ControlPlaneError::NotFound(format!("instance refresh {refresh_id} for {name}"))
            })?;

        let was_terminal = refresh.current.is_terminal();
        if let Some(next) = refresh.remaining.pop_front() {
            refresh.current = next;
        }
        let status = refresh.current.clone();

        if status.is_successful() && !was_terminal {
            state.roll_generation(name);
        }
        Ok(status)
    }

    async fn list_instances(&self) -> ControlPlaneResult<Vec<InstanceRecord>> {
        let state = self.enter(Operation::ListInstances)?;
        Ok(state.instances.clone())
    }

    async fn terminate_instance(&self, instance_id: &str) -> ControlPlaneResult<()> {
        let mut state = self.enter(Operation::TerminateInstance)?;
        let before = state.instances.len();
        state.instances.retain(|i| i.instance_id != instance_id);
        if state.instances.len() < before {
            state.terminated.push(instance_id.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latest_tracks_newest_version() {
        let cp = InMemoryControlPlane::single_group("web", "img-v1", Capacity::new(1, 1, 1));

        let n = cp
            .create_launch_config_version("lc-web", &ConfigVersion::Latest, "img-v2")
            .await
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(cp.image_for("lc-web", &ConfigVersion::Latest).as_deref(), Some("img-v2"));
        assert_eq!(
            cp.image_for("lc-web", &ConfigVersion::Number(1)).as_deref(),
            Some("img-v1")
        );
        assert_eq!(cp.image_for("lc-web", &ConfigVersion::Number(0)), None);
    }

    #[tokio::test]
    async fn successful_refresh_rolls_a_new_generation() {
        let cp = InMemoryControlPlane::single_group("web", "img-v1", Capacity::new(2, 1, 2))
            .with_refresh_script(vec![RefreshStatus::Successful]);
        let id = cp
            .start_refresh("web", &RefreshPreferences::default())
            .await
            .unwrap();

        assert_eq!(
            cp.describe_refresh("web", &id).await.unwrap(),
            RefreshStatus::Successful
        );
        // Terminal status repeats without rolling again.
        assert_eq!(
            cp.describe_refresh("web", &id).await.unwrap(),
            RefreshStatus::Successful
        );

        let instances = cp.instances();
        let terminating = instances
            .iter()
            .filter(|i| i.lifecycle_state == LifecycleState::Terminating)
            .count();
        let in_service = instances
            .iter()
            .filter(|i| i.lifecycle_state.is_in_service())
            .count();
        assert_eq!((terminating, in_service), (2, 2));
    }

    #[tokio::test]
    async fn terminating_unknown_instance_is_noop() {
        let cp = InMemoryControlPlane::single_group("web", "img-v1", Capacity::new(1, 1, 1));
        cp.terminate_instance("i-missing").await.unwrap();
        assert!(cp.terminated().is_empty());
        assert_eq!(cp.instances().len(), 1);
    }

    #[tokio::test]
    async fn faults_fire_in_order_then_clear() {
        let cp = InMemoryControlPlane::empty();
        cp.fail_next(
            Operation::ListInstances,
            ControlPlaneError::transient("list_instances", "throttled"),
            2,
        );

        assert!(cp.list_instances().await.is_err());
        assert!(cp.list_instances().await.is_err());
        assert!(cp.list_instances().await.unwrap().is_empty());
        assert_eq!(cp.count(Operation::ListInstances), 3);
    }

    #[test]
    fn fixture_parses_from_json() {
        let json = r#"{
            "groups": [{
                "name": "web",
                "launch_config": { "config_id": "lc-web", "version": "1" },
                "capacity": { "desired": 2, "min": 1, "max": 3 }
            }],
            "launch_configs": [{ "config_id": "lc-web", "versions": ["img-v1"] }],
            "instances": [
                { "instance_id": "i-1", "group_name": "web", "lifecycle_state": "InService" }
            ]
        }"#;
        let fixture: FleetFixture = serde_json::from_str(json).unwrap();
        let cp = InMemoryControlPlane::from_fixture(fixture);

        let group = cp.group("web").unwrap();
        assert_eq!(group.launch_config.version, ConfigVersion::Number(1));
        assert_eq!(cp.image_for("lc-web", &group.launch_config.version).as_deref(), Some("img-v1"));
    }
}
