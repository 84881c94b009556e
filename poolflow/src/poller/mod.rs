//! Readiness polling for scaling groups.
//!
//! The provider only exposes synchronous describe calls, so readiness is
//! observed by re-querying at an interval until enough instances are in
//! service or the attempt budget runs out.

mod backoff;

pub use backoff::{BackoffState, BackoffStrategy, JitterStrategy};

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ProvisionerConfig;
use crate::errors::{GatewayOperation, NodePoolError};
use crate::gateway::{CloudGateway, DescribeScalingInstancesRequest};

/// Waits for a scaling group to reach a minimum number of in-service instances.
pub struct ReadinessPoller {
    gateway: Arc<dyn CloudGateway>,
    config: ProvisionerConfig,
}

impl ReadinessPoller {
    /// Creates a poller using the given gateway and settings.
    #[must_use]
    pub fn new(gateway: Arc<dyn CloudGateway>, config: ProvisionerConfig) -> Self {
        Self { gateway, config }
    }

    /// Polls until at least `min_count` instances are in service.
    ///
    /// Returns the instance ids observed on the successful attempt, which may
    /// be more than `min_count`. A failing describe call is returned as is.
    pub async fn wait_for_instances(
        &self,
        region_id: &str,
        scaling_group_id: &str,
        min_count: usize,
    ) -> Result<Vec<String>, NodePoolError> {
        let poll = &self.config.poll;
        let max_attempts = poll.max_attempts.max(1);
        let mut backoff = BackoffState::new();
        let mut last_count = 0;

        info!(
            region = %region_id,
            scaling_group_id = %scaling_group_id,
            min_count,
            "Waiting for scaling instances"
        );

        for attempt in 1..=max_attempts {
            let request = DescribeScalingInstancesRequest {
                endpoint: self.config.endpoint(region_id),
                region_id: region_id.to_string(),
                scaling_group_id: scaling_group_id.to_string(),
                lifecycle_state: self.config.lifecycle_state.clone(),
            };

            let instance_ids = self
                .gateway
                .describe_scaling_instances(request)
                .await
                .map_err(|e| NodePoolError::gateway(GatewayOperation::DescribeScalingInstances, e))?;

            last_count = instance_ids.len();
            if last_count >= min_count {
                info!(
                    scaling_group_id = %scaling_group_id,
                    count = last_count,
                    attempt,
                    "Scaling instances ready"
                );
                return Ok(instance_ids);
            }

            if attempt < max_attempts {
                let delay = backoff.next_delay(poll);
                debug!(
                    scaling_group_id = %scaling_group_id,
                    attempt,
                    observed = last_count,
                    expected = min_count,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scaling instances not ready, polling again"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(NodePoolError::Timeout {
            scaling_group_id: scaling_group_id.to_string(),
            last_count,
            expected: min_count,
            attempts: max_attempts,
        })
    }
}

impl std::fmt::Debug for ReadinessPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessPoller")
            .field("poll", &self.config.poll)
            .finish_non_exhaustive()
    }
}
