//! Node pools, cluster descriptions, and per-task outcomes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::config::ProvisionerConfig;
use crate::errors::{NodePoolFailure, ProvisionError};
use crate::events::EventSink;
use crate::gateway::CloudGateway;

/// A named group of homogeneous worker instances.
///
/// The identifier fields start empty and are filled in by the task that
/// provisions this pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolSpec {
    /// Unique name within an action.
    pub name: String,
    /// Minimum instance count.
    pub min_count: usize,
    /// Maximum instance count.
    pub max_count: usize,
    /// Provider instance type.
    pub instance_type: String,
    /// Scaling group assigned by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling_group_id: Option<String>,
    /// Scaling configuration assigned by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling_config_id: Option<String>,
    /// Realized running-instance count.
    #[serde(default)]
    pub count: usize,
}

impl NodePoolSpec {
    /// Creates a node pool that has not been provisioned yet.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        min_count: usize,
        max_count: usize,
        instance_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            min_count,
            max_count,
            instance_type: instance_type.into(),
            scaling_group_id: None,
            scaling_config_id: None,
            count: 0,
        }
    }

    /// Returns the deterministic scaling group name for this pool.
    #[must_use]
    pub fn scaling_group_name(&self, prefix: &str, cluster_id: &str) -> String {
        format!("{prefix}-{}-{cluster_id}", self.name)
    }

    pub(crate) fn validate(&self) -> Result<(), ProvisionError> {
        if self.name.is_empty() {
            return Err(ProvisionError::invalid_input("node pool name is empty"));
        }
        if self.min_count > self.max_count {
            return Err(ProvisionError::invalid_input(format!(
                "node pool {}: min count {} exceeds max count {}",
                self.name, self.min_count, self.max_count
            )));
        }
        if self.instance_type.is_empty() {
            return Err(ProvisionError::invalid_input(format!(
                "node pool {}: instance type is empty",
                self.name
            )));
        }
        Ok(())
    }
}

/// Validates a node-pool set before any task is launched.
pub(crate) fn validate_node_pools(pools: &[NodePoolSpec]) -> Result<(), ProvisionError> {
    let mut seen = HashSet::new();
    for pool in pools {
        pool.validate()?;
        if !seen.insert(pool.name.as_str()) {
            return Err(ProvisionError::invalid_input(format!(
                "duplicate node pool name: {}",
                pool.name
            )));
        }
    }
    Ok(())
}

/// Description of the target cluster.
///
/// The same shape flows into and out of an action so actions can be chained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    /// Provider cluster identifier.
    pub cluster_id: String,
    /// Cluster name.
    #[serde(default)]
    pub name: String,
    /// Region the cluster lives in.
    pub region_id: String,
    /// Zone the cluster lives in.
    #[serde(default)]
    pub zone_id: String,
    /// Network (vswitch) the nodes join.
    pub vswitch_id: String,
    /// Security group applied to the nodes.
    pub security_group_id: String,
    /// Provider-reported cluster state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl ClusterTopology {
    /// Checks that every field needed for provisioning is present.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let required = [
            ("cluster_id", &self.cluster_id),
            ("region_id", &self.region_id),
            ("vswitch_id", &self.vswitch_id),
            ("security_group_id", &self.security_group_id),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(field, _)| *field)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::invalid_input(format!(
                "cluster description is missing {}",
                missing.join(", ")
            )))
        }
    }
}

/// Read-only state shared by every provisioning task of one execution.
pub struct ClusterContext {
    /// The validated cluster description.
    pub cluster: ClusterTopology,
    /// The cloud gateway.
    pub gateway: Arc<dyn CloudGateway>,
    /// Provisioning settings.
    pub config: ProvisionerConfig,
    /// Lifecycle event sink.
    pub events: Arc<dyn EventSink>,
}

impl fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterContext")
            .field("cluster", &self.cluster)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The result reported by one node-pool task.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The pool reached its minimum size.
    Ready {
        /// The pool name.
        node_pool: String,
        /// In-service instances observed by the poller.
        instance_ids: Vec<String>,
    },
    /// The pool failed at some step.
    Failed(NodePoolFailure),
}

impl TaskOutcome {
    /// Returns the node pool this outcome belongs to.
    #[must_use]
    pub fn node_pool(&self) -> &str {
        match self {
            Self::Ready { node_pool, .. } => node_pool,
            Self::Failed(failure) => &failure.node_pool,
        }
    }

    /// Returns true for a successful outcome.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> ClusterTopology {
        ClusterTopology {
            cluster_id: "c1".to_string(),
            name: "demo".to_string(),
            region_id: "eu-central-1".to_string(),
            zone_id: "eu-central-1a".to_string(),
            vswitch_id: "vsw-1".to_string(),
            security_group_id: "sg-1".to_string(),
            state: None,
        }
    }

    #[test]
    fn test_scaling_group_name() {
        let pool = NodePoolSpec::new("pool-a", 1, 3, "ecs.sn1.large");
        assert_eq!(pool.scaling_group_name("asg", "c1"), "asg-pool-a-c1");
    }

    #[test]
    fn test_topology_validation_lists_missing_fields() {
        assert!(topology().validate().is_ok());

        let mut topo = topology();
        topo.vswitch_id.clear();
        topo.security_group_id.clear();

        let err = topo.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("vswitch_id"));
        assert!(message.contains("security_group_id"));
    }

    #[test]
    fn test_node_pool_validation() {
        assert!(validate_node_pools(&[]).is_ok());
        assert!(validate_node_pools(&[NodePoolSpec::new("a", 1, 1, "t")]).is_ok());
        assert!(validate_node_pools(&[NodePoolSpec::new("a", 3, 1, "t")]).is_err());
        assert!(validate_node_pools(&[NodePoolSpec::new("", 1, 1, "t")]).is_err());

        let duplicates = [NodePoolSpec::new("a", 1, 1, "t"), NodePoolSpec::new("a", 1, 2, "t")];
        let err = validate_node_pools(&duplicates).unwrap_err();
        assert!(err.to_string().contains("duplicate node pool name: a"));
    }

    #[test]
    fn test_node_pool_serde_skips_unassigned_ids() {
        let pool = NodePoolSpec::new("a", 1, 2, "t");
        let value = serde_json::to_value(&pool).unwrap();
        assert!(value.get("scaling_group_id").is_none());

        let restored: NodePoolSpec = serde_json::from_value(value).unwrap();
        assert_eq!(restored, pool);
    }
}
