//! Best-effort deletion of every node pool an action may have created.
//!
//! Pools are addressed by their deterministic scaling group name, so pools
//! whose ids were never assigned are swept the same way as provisioned ones.

use serde_json::json;
use tracing::{info, warn};

use crate::config::ProvisionerConfig;
use crate::errors::RollbackFailure;
use crate::events::{self, EventSink};
use crate::gateway::{CloudGateway, DeleteScalingGroupRequest};
use crate::model::NodePoolSpec;

/// Where the swept node pools live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackTarget {
    /// Owning cluster.
    pub cluster_id: String,
    /// Region of the scaling groups.
    pub region_id: String,
}

/// Deletes the scaling group of every pool, continuing past failures.
///
/// A group that no longer exists counts as deleted. All other delete errors
/// are returned together once every pool has been attempted.
pub async fn rollback_node_pools(
    gateway: &dyn CloudGateway,
    config: &ProvisionerConfig,
    target: &RollbackTarget,
    pools: &[NodePoolSpec],
    sink: &dyn EventSink,
) -> Result<(), RollbackFailure> {
    if pools.is_empty() {
        return Ok(());
    }

    sink.emit(
        events::ROLLBACK_STARTED,
        events::payload(json!({
            "cluster_id": target.cluster_id,
            "node_pools": pools.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        })),
    );

    let mut failures = Vec::new();

    for pool in pools {
        let scaling_group_name =
            pool.scaling_group_name(&config.scaling_group_name_prefix, &target.cluster_id);
        info!(
            region = %target.region_id,
            node_pool = %pool.name,
            scaling_group = %scaling_group_name,
            "Deleting node pool"
        );

        let request = DeleteScalingGroupRequest {
            endpoint: config.endpoint(&target.region_id),
            region_id: target.region_id.clone(),
            scaling_group_name: scaling_group_name.clone(),
            force_delete: true,
        };

        match gateway.delete_scaling_group(request).await {
            Ok(()) => {
                sink.emit(
                    events::ROLLBACK_NODE_POOL_DELETED,
                    events::payload(json!({"node_pool": pool.name, "scaling_group": scaling_group_name})),
                );
            }
            Err(e) if e.is_not_found() => {
                info!(node_pool = %pool.name, "Scaling group already absent");
                sink.emit(
                    events::ROLLBACK_NODE_POOL_DELETED,
                    events::payload(json!({
                        "node_pool": pool.name,
                        "scaling_group": scaling_group_name,
                        "absent": true,
                    })),
                );
            }
            Err(e) => {
                warn!(node_pool = %pool.name, error = %e, "Could not delete node pool");
                sink.emit(
                    events::ROLLBACK_NODE_POOL_FAILED,
                    events::payload(json!({"node_pool": pool.name, "error": e.to_string()})),
                );
                failures.push((pool.name.clone(), e));
            }
        }
    }

    sink.emit(
        events::ROLLBACK_COMPLETED,
        events::payload(json!({
            "cluster_id": target.cluster_id,
            "failed": failures.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
        })),
    );

    if failures.is_empty() {
        Ok(())
    } else {
        Err(RollbackFailure { failures })
    }
}
