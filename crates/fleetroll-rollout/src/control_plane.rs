//! The remote control plane and the retrying client every stage uses.

use std::sync::Arc;

use async_trait::async_trait;
use fleetroll_core::{
    ConfigVersion, ControlPlaneError, ControlPlaneResult, FleetGroupSnapshot, GroupUpdate, ImageId,
    InstanceRecord, RefreshId, RefreshPreferences, RefreshStatus,
};

use crate::error::{DeployError, DeployResult};
use crate::retry::RetryPolicy;

/// Operations the cloud control plane exposes to a deployment.
///
/// Implementations bind these to a provider SDK. Errors must be
/// classified: throttling and transient faults as
/// [`ControlPlaneError::Transient`], missing resources as
/// [`ControlPlaneError::NotFound`].
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn describe_group(&self, name: &str) -> ControlPlaneResult<FleetGroupSnapshot>;

    /// Resolve the image id bound to a launch configuration version.
    async fn describe_launch_config_version(
        &self,
        config_id: &str,
        version: &ConfigVersion,
    ) -> ControlPlaneResult<ImageId>;

    /// Publish a copy of `source_version` with only the image replaced.
    /// Returns the new version number.
    async fn create_launch_config_version(
        &self,
        config_id: &str,
        source_version: &ConfigVersion,
        image_id: &str,
    ) -> ControlPlaneResult<u64>;

    async fn update_group(&self, update: &GroupUpdate) -> ControlPlaneResult<()>;

    /// Start a rolling refresh. Returns its id.
    async fn start_refresh(
        &self,
        name: &str,
        preferences: &RefreshPreferences,
    ) -> ControlPlaneResult<RefreshId>;

    async fn describe_refresh(
        &self,
        name: &str,
        refresh_id: &str,
    ) -> ControlPlaneResult<RefreshStatus>;

    /// Every instance attached to any fleet group.
    async fn list_instances(&self) -> ControlPlaneResult<Vec<InstanceRecord>>;

    async fn terminate_instance(&self, instance_id: &str) -> ControlPlaneResult<()>;
}

/// A [`ControlPlane`] with the retry policy applied to every call.
#[derive(Clone)]
pub struct FleetClient {
    inner: Arc<dyn ControlPlane>,
    retry: RetryPolicy,
}

impl FleetClient {
    pub fn new(inner: Arc<dyn ControlPlane>, retry: RetryPolicy) -> Self {
        Self { inner, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn describe_group(&self, name: &str) -> DeployResult<FleetGroupSnapshot> {
        let result = self
            .retry
            .run("describe_group", || self.inner.describe_group(name))
            .await;
        self.finish("describe_group", result)
    }

    pub async fn describe_launch_config_version(
        &self,
        config_id: &str,
        version: &ConfigVersion,
    ) -> DeployResult<ImageId> {
        let result = self
            .retry
            .run("describe_launch_config_version", || {
                self.inner.describe_launch_config_version(config_id, version)
            })
            .await;
        self.finish("describe_launch_config_version", result)
    }

    pub async fn create_launch_config_version(
        &self,
        config_id: &str,
        source_version: &ConfigVersion,
        image_id: &str,
    ) -> DeployResult<u64> {
        let result = self
            .retry
            .run("create_launch_config_version", || {
                self.inner
                    .create_launch_config_version(config_id, source_version, image_id)
            })
            .await;
        self.finish("create_launch_config_version", result)
    }

    pub async fn update_group(&self, update: &GroupUpdate) -> DeployResult<()> {
        let result = self
            .retry
            .run("update_group", || self.inner.update_group(update))
            .await;
        self.finish("update_group", result)
    }

    pub async fn start_refresh(
        &self,
        name: &str,
        preferences: &RefreshPreferences,
    ) -> DeployResult<RefreshId> {
        let result = self
            .retry
            .run("start_refresh", || self.inner.start_refresh(name, preferences))
            .await;
        self.finish("start_refresh", result)
    }

    pub async fn describe_refresh(
        &self,
        name: &str,
        refresh_id: &str,
    ) -> DeployResult<RefreshStatus> {
        let result = self
            .retry
            .run("describe_refresh", || {
                self.inner.describe_refresh(name, refresh_id)
            })
            .await;
        self.finish("describe_refresh", result)
    }

    pub async fn list_instances(&self) -> DeployResult<Vec<InstanceRecord>> {
        let result = self
            .retry
            .run("list_instances", || self.inner.list_instances())
            .await;
        self.finish("list_instances", result)
    }

    pub async fn terminate_instance(&self, instance_id: &str) -> DeployResult<()> {
        let result = self
            .retry
            .run("terminate_instance", || {
                self.inner.terminate_instance(instance_id)
            })
            .await;
        self.finish("terminate_instance", result)
    }

    fn finish<T>(&self, operation: &str, result: ControlPlaneResult<T>) -> DeployResult<T> {
        result.map_err(|e| DeployError::from_call(operation, self.retry.max_attempts(), e))
    }
}
