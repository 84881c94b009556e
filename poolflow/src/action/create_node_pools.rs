//! The node-pool creation action.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, Instrument, Span};

use super::Action;
use crate::aggregate::OutcomeAggregator;
use crate::config::ProvisionerConfig;
use crate::errors::{GatewayOperation, ProvisionError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::fanout::provision_all;
use crate::gateway::{AttachInstancesRequest, CloudGateway, DescribeClusterRequest};
use crate::model::{validate_node_pools, ClusterContext, ClusterTopology, NodePoolSpec};
use crate::rollback::{rollback_node_pools, RollbackTarget};

const NAME: &str = "CreateNodePoolsAction";

/// Creates every node pool of a cluster concurrently and attaches the
/// resulting instances.
///
/// On failure the action reports every failing pool at once and leaves the
/// cleanup to [`Action::undo`], which sweeps all declared pools once any
/// provisioning task has been launched.
///
/// Provisioning runs in a supervisor task that outlives a dropped `execute`
/// future. `undo` waits for that task before sweeping, so no scaling group
/// can be created after the sweep.
pub struct CreateNodePoolsAction {
    target: RollbackTarget,
    node_pools: Arc<Mutex<Vec<NodePoolSpec>>>,
    in_flight: Mutex<Option<watch::Receiver<bool>>>,
    gateway: Arc<dyn CloudGateway>,
    config: ProvisionerConfig,
    events: Arc<dyn EventSink>,
}

impl CreateNodePoolsAction {
    /// Creates the action for a cluster in a region.
    #[must_use]
    pub fn new(
        cluster_id: impl Into<String>,
        region_id: impl Into<String>,
        node_pools: Vec<NodePoolSpec>,
        gateway: Arc<dyn CloudGateway>,
    ) -> Self {
        Self {
            target: RollbackTarget {
                cluster_id: cluster_id.into(),
                region_id: region_id.into(),
            },
            node_pools: Arc::new(Mutex::new(node_pools)),
            in_flight: Mutex::new(None),
            gateway,
            config: ProvisionerConfig::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the provisioner configuration.
    #[must_use]
    pub fn with_config(mut self, config: ProvisionerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the lifecycle event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns a snapshot of the node pools, including any ids assigned by
    /// the last execution.
    #[must_use]
    pub fn node_pools(&self) -> Vec<NodePoolSpec> {
        self.node_pools.lock().clone()
    }

    /// Returns the cluster and region this action provisions into.
    #[must_use]
    pub const fn target(&self) -> &RollbackTarget {
        &self.target
    }

    fn validate(&self, input: &ClusterTopology, pools: &[NodePoolSpec]) -> Result<(), ProvisionError> {
        input.validate()?;
        if input.cluster_id != self.target.cluster_id {
            return Err(ProvisionError::invalid_input(format!(
                "cluster description is for {}, action targets {}",
                input.cluster_id, self.target.cluster_id
            )));
        }
        if input.region_id != self.target.region_id {
            return Err(ProvisionError::invalid_input(format!(
                "cluster description is in region {}, action targets {}",
                input.region_id, self.target.region_id
            )));
        }
        validate_node_pools(pools)?;
        self.config.validate()
    }

    async fn provision(&self, input: ClusterTopology, pools: Vec<NodePoolSpec>) -> Result<ClusterTopology, ProvisionError> {
        let started = Instant::now();
        let names: Vec<String> = pools.iter().map(|p| p.name.clone()).collect();

        info!(
            node_pools = pools.len(),
            max_wait_secs = self.config.poll.max_wait().as_secs(),
            "Provisioning node pools"
        );
        self.events.emit(
            events::ACTION_STARTED,
            events::payload(json!({
                "action": NAME,
                "cluster_id": self.target.cluster_id,
                "node_pools": names,
            })),
        );

        let ctx = Arc::new(ClusterContext {
            cluster: input,
            gateway: self.gateway.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
        });

        let (done, finished) = watch::channel(false);
        *self.in_flight.lock() = Some(finished);

        let node_pools = self.node_pools.clone();
        let supervisor = tokio::spawn(
            async move {
                let fan_out = provision_all(ctx, pools).await;
                *node_pools.lock() = fan_out.pools;
                let _ = done.send(true);
                fan_out.outcomes
            }
            .instrument(Span::current()),
        );

        // A lost supervisor leaves every pool unreported.
        let outcomes = supervisor.await.unwrap_or_else(|e| {
            error!(error = %e, "Node pool supervisor did not finish");
            Vec::new()
        });

        let mut aggregator = OutcomeAggregator::new(names);
        aggregator.record_all(outcomes);

        let instance_ids = match aggregator.finish() {
            Ok(ids) => ids,
            Err(composite) => {
                error!(
                    failed = composite.len(),
                    error = %composite,
                    "Node pool provisioning failed"
                );
                self.events.emit(
                    events::ACTION_FAILED,
                    events::payload(json!({
                        "action": NAME,
                        "cluster_id": self.target.cluster_id,
                        "failed": composite.node_pools(),
                        "error": composite.to_string(),
                        "duration_ms": started.elapsed().as_millis() as u64,
                    })),
                );
                return Err(composite.into());
            }
        };

        info!(instances = instance_ids.len(), "Attaching instances to cluster");
        let attached = instance_ids.len();
        let cluster = self
            .gateway
            .attach_instances(AttachInstancesRequest {
                cluster_id: self.target.cluster_id.clone(),
                instance_ids,
            })
            .await
            .map_err(|e| ProvisionError::gateway(GatewayOperation::AttachInstances, e))?;

        self.events.emit(
            events::ACTION_COMPLETED,
            events::payload(json!({
                "action": NAME,
                "cluster_id": self.target.cluster_id,
                "instances": attached,
                "duration_ms": started.elapsed().as_millis() as u64,
            })),
        );

        Ok(cluster)
    }
}

impl fmt::Debug for CreateNodePoolsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateNodePoolsAction")
            .field("target", &self.target)
            .field("node_pools", &*self.node_pools.lock())
            .field("launched", &self.in_flight.lock().is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for CreateNodePoolsAction {
    fn name(&self) -> &str {
        NAME
    }

    async fn execute(&self, input: ClusterTopology) -> Result<ClusterTopology, ProvisionError> {
        let pools = self.node_pools();
        self.validate(&input, &pools)?;

        let span = tracing::info_span!(
            "execute",
            action = NAME,
            cluster_id = %self.target.cluster_id,
            region = %self.target.region_id,
        );

        if pools.is_empty() {
            info!(cluster_id = %self.target.cluster_id, "No node pools declared");
            return self
                .gateway
                .describe_cluster(DescribeClusterRequest {
                    cluster_id: self.target.cluster_id.clone(),
                })
                .instrument(span)
                .await
                .map_err(|e| ProvisionError::gateway(GatewayOperation::DescribeCluster, e));
        }

        self.provision(input, pools).instrument(span).await
    }

    async fn undo(&self) -> Result<(), ProvisionError> {
        let in_flight = self.in_flight.lock().clone();
        let Some(mut finished) = in_flight else {
            info!(cluster_id = %self.target.cluster_id, "Nothing was provisioned, skipping undo");
            return Ok(());
        };

        let span = tracing::info_span!(
            "undo",
            action = NAME,
            cluster_id = %self.target.cluster_id,
            region = %self.target.region_id,
        );

        if !*finished.borrow() {
            info!(parent: &span, "Waiting for in-flight node pool tasks");
        }
        // A dropped sender means the supervisor is gone; sweep regardless.
        let _ = finished.wait_for(|done| *done).instrument(span.clone()).await;

        let pools = self.node_pools();

        rollback_node_pools(
            self.gateway.as_ref(),
            &self.config,
            &self.target,
            &pools,
            self.events.as_ref(),
        )
        .instrument(span)
        .await
        .map_err(ProvisionError::from)
    }
}
