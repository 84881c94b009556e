//! Concurrent per-node-pool provisioning.
//!
//! This module provides:
//! - OutcomeGroup, a task group that never cancels and always reports
//! - The create/configure/enable/wait sequence run for each node pool
//! - `provision_all`, which runs one sequence per pool and joins them

mod group;
mod unit;

pub use group::{OutcomeGroup, Report};
pub use unit::{provision_node_pool, ProvisionedPool};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::errors::{NodePoolError, NodePoolFailure};
use crate::model::{ClusterContext, NodePoolSpec, TaskOutcome};

/// Node pools and task outcomes after every task has reported.
#[derive(Debug)]
pub struct FanOut {
    /// The pools in their original order, carrying assigned ids.
    pub pools: Vec<NodePoolSpec>,
    /// One outcome per reporting task, in completion order.
    pub outcomes: Vec<TaskOutcome>,
}

/// Provisions every node pool concurrently and waits for all of them.
///
/// Each pool is moved into its own task and handed back with its outcome.
/// Panics inside the provisioning steps come back as failed outcomes with
/// the pool's assigned ids intact; a pool whose task was lost entirely comes
/// back as it went in.
pub async fn provision_all(ctx: Arc<ClusterContext>, pools: Vec<NodePoolSpec>) -> FanOut {
    let mut group = OutcomeGroup::new();
    for pool in &pools {
        group.spawn(pool.name.clone(), provision_node_pool(ctx.clone(), pool.clone()));
    }

    let mut returned: HashMap<String, NodePoolSpec> = HashMap::with_capacity(pools.len());
    let mut outcomes = Vec::with_capacity(pools.len());

    for report in group.join().await {
        match report.result {
            Ok(ProvisionedPool { pool, outcome }) => {
                returned.insert(pool.name.clone(), pool);
                outcomes.push(outcome);
            }
            Err(message) => {
                error!(node_pool = %report.name, panic = %message, "Node pool task panicked");
                outcomes.push(TaskOutcome::Failed(NodePoolFailure::new(
                    report.name,
                    NodePoolError::Panicked(message),
                )));
            }
        }
    }

    let pools = pools
        .into_iter()
        .map(|pool| returned.remove(&pool.name).unwrap_or(pool))
        .collect();

    FanOut { pools, outcomes }
}
