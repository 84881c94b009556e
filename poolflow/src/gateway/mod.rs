//! Cloud provisioning gateway.
//!
//! The gateway is the only component that talks to the cloud control plane.
//! Actions build requests here and get raw provider errors back.

mod requests;

pub use requests::{
    node_pool_tags, AttachInstancesRequest, CreateScalingConfigurationRequest,
    CreateScalingGroupRequest, DeleteScalingGroupRequest, DescribeClusterRequest,
    DescribeScalingInstancesRequest, EnableScalingGroupRequest, TAG_CLUSTER, TAG_CREATED,
    TAG_NODE_POOL,
};

use async_trait::async_trait;

use crate::errors::GatewayError;
use crate::model::ClusterTopology;

/// Narrow contract over the provider's autoscaling and cluster APIs.
///
/// Implementations must be safe to share between concurrently running
/// node-pool tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// Creates a scaling group and returns its id.
    async fn create_scaling_group(
        &self,
        request: CreateScalingGroupRequest,
    ) -> Result<String, GatewayError>;

    /// Creates a scaling configuration and returns its id.
    async fn create_scaling_configuration(
        &self,
        request: CreateScalingConfigurationRequest,
    ) -> Result<String, GatewayError>;

    /// Enables a scaling group with the given active configuration.
    async fn enable_scaling_group(&self, request: EnableScalingGroupRequest)
        -> Result<(), GatewayError>;

    /// Lists the instance ids of a scaling group.
    async fn describe_scaling_instances(
        &self,
        request: DescribeScalingInstancesRequest,
    ) -> Result<Vec<String>, GatewayError>;

    /// Deletes a scaling group by name.
    ///
    /// A forced delete also removes its configurations and instances.
    async fn delete_scaling_group(&self, request: DeleteScalingGroupRequest)
        -> Result<(), GatewayError>;

    /// Attaches instances to the cluster and returns the refreshed description.
    async fn attach_instances(
        &self,
        request: AttachInstancesRequest,
    ) -> Result<ClusterTopology, GatewayError>;

    /// Reads the current cluster description.
    async fn describe_cluster(
        &self,
        request: DescribeClusterRequest,
    ) -> Result<ClusterTopology, GatewayError>;
}
