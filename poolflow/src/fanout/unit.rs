//! The provisioning sequence for a single node pool.

use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{GatewayOperation, NodePoolError, NodePoolFailure};
use crate::events::{self, EventSink};
use crate::gateway::{
    CreateScalingConfigurationRequest, CreateScalingGroupRequest, EnableScalingGroupRequest,
};
use crate::model::{ClusterContext, NodePoolSpec, TaskOutcome};
use crate::poller::ReadinessPoller;

use super::group::panic_message;

/// A node pool handed back by its task together with the task's outcome.
#[derive(Debug)]
pub struct ProvisionedPool {
    /// The pool with whatever ids were assigned before the task ended.
    pub pool: NodePoolSpec,
    /// What the task reported.
    pub outcome: TaskOutcome,
}

/// Runs create group, create configuration, enable, and wait, in that order.
///
/// Stops at the first failing step. Nothing is cleaned up here; that is the
/// action's rollback. A panicking step is reported as a failure and the ids
/// assigned before it are kept.
pub async fn provision_node_pool(ctx: Arc<ClusterContext>, mut pool: NodePoolSpec) -> ProvisionedPool {
    ctx.events.emit(
        events::NODE_POOL_STARTED,
        events::payload(json!({
            "cluster": ctx.cluster.name,
            "node_pool": pool.name,
            "min_count": pool.min_count,
            "max_count": pool.max_count,
        })),
    );

    let steps = AssertUnwindSafe(run_steps(&ctx, &mut pool))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(NodePoolError::Panicked(panic_message(payload))));

    let outcome = match steps {
        Ok(instance_ids) => {
            ctx.events.emit(
                events::NODE_POOL_READY,
                events::payload(json!({
                    "node_pool": pool.name,
                    "scaling_group_id": pool.scaling_group_id,
                    "count": pool.count,
                })),
            );
            TaskOutcome::Ready {
                node_pool: pool.name.clone(),
                instance_ids,
            }
        }
        Err(cause) => {
            warn!(
                cluster = %ctx.cluster.name,
                node_pool = %pool.name,
                error = %cause,
                "Node pool provisioning failed"
            );
            ctx.events.emit(
                events::NODE_POOL_FAILED,
                events::payload(json!({
                    "node_pool": pool.name,
                    "scaling_group_id": pool.scaling_group_id,
                    "error": cause.to_string(),
                })),
            );
            TaskOutcome::Failed(NodePoolFailure::new(pool.name.clone(), cause))
        }
    };

    ProvisionedPool { pool, outcome }
}

async fn run_steps(ctx: &ClusterContext, pool: &mut NodePoolSpec) -> Result<Vec<String>, NodePoolError> {
    let cluster = &ctx.cluster;
    let config = &ctx.config;

    info!(
        region = %cluster.region_id,
        zone = %cluster.zone_id,
        node_pool = %pool.name,
        instance_type = %pool.instance_type,
        "Creating scaling group"
    );
    let scaling_group_id = ctx
        .gateway
        .create_scaling_group(CreateScalingGroupRequest::for_node_pool(config, cluster, pool))
        .await
        .map_err(|e| NodePoolError::gateway(GatewayOperation::CreateScalingGroup, e))?;
    pool.scaling_group_id = Some(scaling_group_id.clone());
    info!(node_pool = %pool.name, scaling_group_id = %scaling_group_id, "Scaling group created");
    emit_step(ctx.events.as_ref(), events::NODE_POOL_SCALING_GROUP_CREATED, pool);

    let scaling_config_id = ctx
        .gateway
        .create_scaling_configuration(CreateScalingConfigurationRequest::for_node_pool(
            config,
            cluster,
            pool,
            &scaling_group_id,
        ))
        .await
        .map_err(|e| NodePoolError::gateway(GatewayOperation::CreateScalingConfiguration, e))?;
    pool.scaling_config_id = Some(scaling_config_id.clone());
    info!(
        node_pool = %pool.name,
        scaling_group_id = %scaling_group_id,
        scaling_config_id = %scaling_config_id,
        "Scaling configuration created"
    );
    emit_step(ctx.events.as_ref(), events::NODE_POOL_SCALING_CONFIGURATION_CREATED, pool);

    ctx.gateway
        .enable_scaling_group(EnableScalingGroupRequest {
            endpoint: config.endpoint(&cluster.region_id),
            scaling_group_id: scaling_group_id.clone(),
            active_scaling_configuration_id: scaling_config_id,
        })
        .await
        .map_err(|e| NodePoolError::gateway(GatewayOperation::EnableScalingGroup, e))?;
    emit_step(ctx.events.as_ref(), events::NODE_POOL_ENABLED, pool);

    let poller = ReadinessPoller::new(ctx.gateway.clone(), config.clone());
    let instance_ids = poller
        .wait_for_instances(&cluster.region_id, &scaling_group_id, pool.min_count)
        .await?;
    pool.count = instance_ids.len();

    Ok(instance_ids)
}

fn emit_step(sink: &dyn EventSink, event_type: &str, pool: &NodePoolSpec) {
    sink.emit(
        event_type,
        events::payload(json!({
            "node_pool": pool.name,
            "scaling_group_id": pool.scaling_group_id,
            "scaling_config_id": pool.scaling_config_id,
        })),
    );
}
