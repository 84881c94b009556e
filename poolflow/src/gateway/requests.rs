//! Request construction for gateway calls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ProvisionerConfig;
use crate::model::{ClusterTopology, NodePoolSpec};

/// Tag marking resources created by this provisioner.
pub const TAG_CREATED: &str = "pipeline-created";
/// Tag carrying the owning cluster name.
pub const TAG_CLUSTER: &str = "pipeline-cluster";
/// Tag carrying the owning node pool name.
pub const TAG_NODE_POOL: &str = "pipeline-nodepool";

/// Builds the attribution tags for a node pool's scaling configuration.
#[must_use]
pub fn node_pool_tags(cluster_name: &str, node_pool: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TAG_CREATED.to_string(), "true".to_string()),
        (TAG_CLUSTER.to_string(), cluster_name.to_string()),
        (TAG_NODE_POOL.to_string(), node_pool.to_string()),
    ])
}

/// Creates a scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateScalingGroupRequest {
    /// Regional endpoint.
    pub endpoint: String,
    /// Region id.
    pub region_id: String,
    /// Network the instances join.
    pub vswitch_id: String,
    /// Minimum size.
    pub min_size: usize,
    /// Maximum size.
    pub max_size: usize,
    /// Scaling group name.
    pub scaling_group_name: String,
}

impl CreateScalingGroupRequest {
    /// Builds the request for a node pool.
    #[must_use]
    pub fn for_node_pool(
        config: &ProvisionerConfig,
        cluster: &ClusterTopology,
        pool: &NodePoolSpec,
    ) -> Self {
        Self {
            endpoint: config.endpoint(&cluster.region_id),
            region_id: cluster.region_id.clone(),
            vswitch_id: cluster.vswitch_id.clone(),
            min_size: pool.min_count,
            max_size: pool.max_count,
            scaling_group_name: pool
                .scaling_group_name(&config.scaling_group_name_prefix, &cluster.cluster_id),
        }
    }
}

/// Creates a scaling configuration bound to a scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateScalingConfigurationRequest {
    /// Regional endpoint.
    pub endpoint: String,
    /// Owning scaling group.
    pub scaling_group_id: String,
    /// Security group applied to instances.
    pub security_group_id: String,
    /// SSH key pair name.
    pub key_pair_name: String,
    /// Instance type.
    pub instance_type: String,
    /// System disk category.
    pub system_disk_category: String,
    /// Image id.
    pub image_id: String,
    /// Attribution tags.
    pub tags: BTreeMap<String, String>,
}

impl CreateScalingConfigurationRequest {
    /// Builds the request for a node pool whose scaling group exists.
    #[must_use]
    pub fn for_node_pool(
        config: &ProvisionerConfig,
        cluster: &ClusterTopology,
        pool: &NodePoolSpec,
        scaling_group_id: &str,
    ) -> Self {
        Self {
            endpoint: config.endpoint(&cluster.region_id),
            scaling_group_id: scaling_group_id.to_string(),
            security_group_id: cluster.security_group_id.clone(),
            key_pair_name: cluster.name.clone(),
            instance_type: pool.instance_type.clone(),
            system_disk_category: config.system_disk_category.clone(),
            image_id: config.image_id.clone(),
            tags: node_pool_tags(&cluster.name, &pool.name),
        }
    }
}

/// Enables a scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableScalingGroupRequest {
    /// Regional endpoint.
    pub endpoint: String,
    /// Scaling group to enable.
    pub scaling_group_id: String,
    /// Configuration to activate.
    pub active_scaling_configuration_id: String,
}

/// Lists instances of a scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeScalingInstancesRequest {
    /// Regional endpoint.
    pub endpoint: String,
    /// Region id.
    pub region_id: String,
    /// Scaling group to describe.
    pub scaling_group_id: String,
    /// Only list instances in this lifecycle state.
    pub lifecycle_state: Option<String>,
}

/// Deletes a scaling group by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteScalingGroupRequest {
    /// Regional endpoint.
    pub endpoint: String,
    /// Region id.
    pub region_id: String,
    /// Scaling group name.
    pub scaling_group_name: String,
    /// Also remove configurations and running instances.
    pub force_delete: bool,
}

/// Attaches instances to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachInstancesRequest {
    /// Target cluster.
    pub cluster_id: String,
    /// Instances to attach.
    pub instance_ids: Vec<String>,
}

/// Reads a cluster description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeClusterRequest {
    /// Target cluster.
    pub cluster_id: String,
}
