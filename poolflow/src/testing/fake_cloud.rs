//! An in-memory cloud control plane.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::GatewayError;
use crate::gateway::{
    AttachInstancesRequest, CloudGateway, CreateScalingConfigurationRequest,
    CreateScalingGroupRequest, DeleteScalingGroupRequest, DescribeClusterRequest,
    DescribeScalingInstancesRequest, EnableScalingGroupRequest,
};
use crate::model::ClusterTopology;

/// A gateway step that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeStep {
    /// Scaling group creation.
    CreateScalingGroup,
    /// Scaling configuration creation.
    CreateScalingConfiguration,
    /// Scaling group enablement.
    Enable,
    /// Instance listing.
    Describe,
    /// Scaling group deletion.
    Delete,
}

#[derive(Debug)]
struct ScalingGroup {
    name: String,
    min_size: usize,
    enabled: bool,
    polls_until_ready: usize,
    instance_ids: Vec<String>,
    describe_calls: usize,
}

#[derive(Debug, Default)]
struct State {
    groups: HashMap<String, ScalingGroup>,
    configurations: HashMap<String, (String, CreateScalingConfigurationRequest)>,
    clusters: HashMap<String, ClusterTopology>,
    failures: HashMap<(String, FakeStep), GatewayError>,
    panics: HashSet<(String, FakeStep)>,
    attach_failure: Option<GatewayError>,
    created_groups: Vec<CreateScalingGroupRequest>,
    deletes: Vec<DeleteScalingGroupRequest>,
    attaches: Vec<AttachInstancesRequest>,
    enables: usize,
    cluster_describes: usize,
}

/// A [`CloudGateway`] backed by in-memory state.
///
/// Scaling groups receive `min_size` instances when enabled (plus any
/// configured extras); the instances count as in service once the group has
/// been described `boot_polls` times. Failures can be injected per scaling
/// group name and step, and so can panics. Every call is recorded for
/// assertions.
#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<State>,
    boot_polls: usize,
    extra_instances: usize,
    never_ready: Vec<String>,
    latency: Option<Duration>,
}

impl FakeCloud {
    /// Creates an empty fake cloud where instances are ready immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of describe calls before a group's instances are in service.
    #[must_use]
    pub fn with_boot_polls(mut self, polls: usize) -> Self {
        self.boot_polls = polls;
        self
    }

    /// Launches this many instances beyond the minimum on enable.
    #[must_use]
    pub fn with_extra_instances(mut self, extra: usize) -> Self {
        self.extra_instances = extra;
        self
    }

    /// Adds a delay to every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Registers a cluster for describe and attach calls.
    #[must_use]
    pub fn with_cluster(self, cluster: ClusterTopology) -> Self {
        self.state
            .lock()
            .clusters
            .insert(cluster.cluster_id.clone(), cluster);
        self
    }

    /// Keeps the named scaling group's instances booting forever.
    #[must_use]
    pub fn never_ready(mut self, scaling_group_name: impl Into<String>) -> Self {
        self.never_ready.push(scaling_group_name.into());
        self
    }

    /// Makes `step` fail with an API error for the named scaling group.
    #[must_use]
    pub fn fail_step(
        self,
        scaling_group_name: impl Into<String>,
        step: FakeStep,
        code: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let error = GatewayError::api(code.clone(), format!("injected {code}"));
        self.state
            .lock()
            .failures
            .insert((scaling_group_name.into(), step), error);
        self
    }

    /// Makes `step` panic for the named scaling group, once.
    #[must_use]
    pub fn panic_step(self, scaling_group_name: impl Into<String>, step: FakeStep) -> Self {
        self.state
            .lock()
            .panics
            .insert((scaling_group_name.into(), step));
        self
    }

    /// Makes `attach_instances` fail.
    #[must_use]
    pub fn fail_attach(self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.state.lock().attach_failure =
            Some(GatewayError::api(code.clone(), format!("injected {code}")));
        self
    }

    /// Creates an enabled scaling group with ready instances; returns its id.
    pub fn seed_scaling_group(&self, name: impl Into<String>, instances: usize) -> String {
        let id = new_id("asg");
        let group = ScalingGroup {
            name: name.into(),
            min_size: instances,
            enabled: true,
            polls_until_ready: self.boot_polls,
            instance_ids: (0..instances).map(|_| new_id("i")).collect(),
            describe_calls: 0,
        };
        self.state.lock().groups.insert(id.clone(), group);
        id
    }

    /// Returns the scaling group creation requests received.
    #[must_use]
    pub fn created_groups(&self) -> Vec<CreateScalingGroupRequest> {
        self.state.lock().created_groups.clone()
    }

    /// Returns the names of scaling groups that currently exist.
    #[must_use]
    pub fn live_groups(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .groups
            .values()
            .map(|g| g.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Returns the stored configuration request for a configuration id.
    #[must_use]
    pub fn scaling_configuration(&self, config_id: &str) -> Option<CreateScalingConfigurationRequest> {
        self.state
            .lock()
            .configurations
            .get(config_id)
            .map(|(_, request)| request.clone())
    }

    /// Returns how often a scaling group was described.
    #[must_use]
    pub fn describe_calls(&self, scaling_group_id: &str) -> usize {
        self.state
            .lock()
            .groups
            .get(scaling_group_id)
            .map_or(0, |g| g.describe_calls)
    }

    /// Returns the delete requests received.
    #[must_use]
    pub fn delete_calls(&self) -> Vec<DeleteScalingGroupRequest> {
        self.state.lock().deletes.clone()
    }

    /// Returns the attach requests received.
    #[must_use]
    pub fn attach_calls(&self) -> Vec<AttachInstancesRequest> {
        self.state.lock().attaches.clone()
    }

    /// Returns the number of enable calls received.
    #[must_use]
    pub fn enable_calls(&self) -> usize {
        self.state.lock().enables
    }

    /// Returns the number of describe-cluster calls received.
    #[must_use]
    pub fn cluster_describes(&self) -> usize {
        self.state.lock().cluster_describes
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn injected(state: &mut State, name: &str, step: FakeStep) -> Result<(), GatewayError> {
        if state.panics.remove(&(name.to_string(), step)) {
            panic!("injected panic in {step:?} for {name}");
        }
        match state.failures.remove(&(name.to_string(), step)) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn new_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..12])
}

fn group_mut<'a>(state: &'a mut State, id: &str) -> Result<&'a mut ScalingGroup, GatewayError> {
    state
        .groups
        .get_mut(id)
        .ok_or_else(|| GatewayError::not_found("scaling group", id))
}

#[async_trait]
impl CloudGateway for FakeCloud {
    async fn create_scaling_group(
        &self,
        request: CreateScalingGroupRequest,
    ) -> Result<String, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.created_groups.push(request.clone());
        Self::injected(&mut state, &request.scaling_group_name, FakeStep::CreateScalingGroup)?;

        if request.min_size > request.max_size {
            return Err(GatewayError::api(
                "InvalidParameter",
                "MinSize must not exceed MaxSize",
            ));
        }

        let id = new_id("asg");
        state.groups.insert(
            id.clone(),
            ScalingGroup {
                name: request.scaling_group_name,
                min_size: request.min_size,
                enabled: false,
                polls_until_ready: 0,
                instance_ids: Vec::new(),
                describe_calls: 0,
            },
        );
        Ok(id)
    }

    async fn create_scaling_configuration(
        &self,
        request: CreateScalingConfigurationRequest,
    ) -> Result<String, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock();
        let name = group_mut(&mut state, &request.scaling_group_id)?.name.clone();
        Self::injected(&mut state, &name, FakeStep::CreateScalingConfiguration)?;

        let id = new_id("asc");
        state
            .configurations
            .insert(id.clone(), (request.scaling_group_id.clone(), request));
        Ok(id)
    }

    async fn enable_scaling_group(&self, request: EnableScalingGroupRequest) -> Result<(), GatewayError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.enables += 1;

        let owner = state
            .configurations
            .get(&request.active_scaling_configuration_id)
            .map(|(group, _)| group.clone())
            .ok_or_else(|| {
                GatewayError::not_found(
                    "scaling configuration",
                    request.active_scaling_configuration_id.clone(),
                )
            })?;
        if owner != request.scaling_group_id {
            return Err(GatewayError::api(
                "InvalidScalingConfigurationId",
                "configuration belongs to another scaling group",
            ));
        }

        let name = group_mut(&mut state, &request.scaling_group_id)?.name.clone();
        Self::injected(&mut state, &name, FakeStep::Enable)?;

        let booting = if self.never_ready.contains(&name) {
            usize::MAX
        } else {
            self.boot_polls
        };
        let extra = self.extra_instances;
        let group = group_mut(&mut state, &request.scaling_group_id)?;
        group.enabled = true;
        group.polls_until_ready = booting;
        group.instance_ids = (0..group.min_size + extra).map(|_| new_id("i")).collect();
        Ok(())
    }

    async fn describe_scaling_instances(
        &self,
        request: DescribeScalingInstancesRequest,
    ) -> Result<Vec<String>, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock();
        let name = group_mut(&mut state, &request.scaling_group_id)?.name.clone();
        Self::injected(&mut state, &name, FakeStep::Describe)?;

        let group = group_mut(&mut state, &request.scaling_group_id)?;
        group.describe_calls += 1;
        if !group.enabled {
            return Ok(Vec::new());
        }

        let in_service = group.polls_until_ready == 0;
        group.polls_until_ready = group.polls_until_ready.saturating_sub(1);

        if in_service || request.lifecycle_state.is_none() {
            Ok(group.instance_ids.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn delete_scaling_group(&self, request: DeleteScalingGroupRequest) -> Result<(), GatewayError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.deletes.push(request.clone());
        Self::injected(&mut state, &request.scaling_group_name, FakeStep::Delete)?;

        let id = state
            .groups
            .iter()
            .find(|(_, g)| g.name == request.scaling_group_name)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| {
                GatewayError::not_found("scaling group", request.scaling_group_name.clone())
            })?;

        if !request.force_delete && !state.groups[&id].instance_ids.is_empty() {
            return Err(GatewayError::api(
                "ScalingGroupNotEmpty",
                "scaling group still has instances",
            ));
        }

        state.groups.remove(&id);
        state.configurations.retain(|_, (group, _)| *group != id);
        Ok(())
    }

    async fn attach_instances(&self, request: AttachInstancesRequest) -> Result<ClusterTopology, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.attaches.push(request.clone());
        if let Some(error) = state.attach_failure.take() {
            return Err(error);
        }

        let cluster = state
            .clusters
            .get_mut(&request.cluster_id)
            .ok_or_else(|| GatewayError::not_found("cluster", request.cluster_id.clone()))?;
        cluster.state = Some("running".to_string());
        Ok(cluster.clone())
    }

    async fn describe_cluster(&self, request: DescribeClusterRequest) -> Result<ClusterTopology, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.cluster_describes += 1;
        state
            .clusters
            .get(&request.cluster_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("cluster", request.cluster_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_request(name: &str, min: usize, max: usize) -> CreateScalingGroupRequest {
        CreateScalingGroupRequest {
            endpoint: "ess.test".to_string(),
            region_id: "r1".to_string(),
            vswitch_id: "vsw".to_string(),
            min_size: min,
            max_size: max,
            scaling_group_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let cloud = FakeCloud::new().fail_step("asg-a", FakeStep::CreateScalingGroup, "QuotaExceeded");

        let err = cloud.create_scaling_group(group_request("asg-a", 1, 1)).await.unwrap_err();
        assert_eq!(err.to_string(), "QuotaExceeded: injected QuotaExceeded");

        assert!(cloud.create_scaling_group(group_request("asg-a", 1, 1)).await.is_ok());
        assert_eq!(cloud.created_groups().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_name_and_not_found() {
        let cloud = FakeCloud::new();
        cloud.seed_scaling_group("asg-a", 2);

        let request = DeleteScalingGroupRequest {
            endpoint: "ess.test".to_string(),
            region_id: "r1".to_string(),
            scaling_group_name: "asg-a".to_string(),
            force_delete: true,
        };
        assert!(cloud.delete_scaling_group(request.clone()).await.is_ok());
        assert!(cloud.live_groups().is_empty());

        let err = cloud.delete_scaling_group(request).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unforced_delete_refuses_group_with_instances() {
        let cloud = FakeCloud::new();
        cloud.seed_scaling_group("asg-a", 1);

        let err = cloud
            .delete_scaling_group(DeleteScalingGroupRequest {
                endpoint: "ess.test".to_string(),
                region_id: "r1".to_string(),
                scaling_group_name: "asg-a".to_string(),
                force_delete: false,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ScalingGroupNotEmpty"));
    }

    #[tokio::test]
    async fn test_lifecycle_filter_hides_booting_instances() {
        let cloud = FakeCloud::new().with_boot_polls(1);
        let id = cloud.seed_scaling_group("asg-a", 2);

        let request = |state: Option<&str>| DescribeScalingInstancesRequest {
            endpoint: "ess.test".to_string(),
            region_id: "r1".to_string(),
            scaling_group_id: id.clone(),
            lifecycle_state: state.map(String::from),
        };

        assert!(cloud.describe_scaling_instances(request(Some("InService"))).await.unwrap().is_empty());
        assert_eq!(cloud.describe_scaling_instances(request(Some("InService"))).await.unwrap().len(), 2);
        assert_eq!(cloud.describe_scaling_instances(request(None)).await.unwrap().len(), 2);
    }
}
