//! Error types for node-pool provisioning.
//!
//! Failures are attributed to the node pool that produced them and are only
//! ever surfaced after every provisioning task has reported.

use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type returned by provisioning actions.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The action input or configuration does not have the expected shape.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The provisioner configuration could not be loaded or is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A gateway call made by the action itself (not by a node-pool task) failed.
    #[error("{operation} failed: {source}")]
    Gateway {
        /// The gateway operation that failed.
        operation: GatewayOperation,
        /// The underlying gateway error.
        #[source]
        source: GatewayError,
    },

    /// One or more node pools failed to provision.
    #[error("{0}")]
    Composite(#[from] CompositeFailure),

    /// One or more node pools could not be deleted during rollback.
    #[error("{0}")]
    Rollback(#[from] RollbackFailure),
}

impl ProvisionError {
    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates an action-level gateway error.
    #[must_use]
    pub fn gateway(operation: GatewayOperation, source: GatewayError) -> Self {
        Self::Gateway { operation, source }
    }

    /// Returns the composite failure, if this is one.
    #[must_use]
    pub fn as_composite(&self) -> Option<&CompositeFailure> {
        match self {
            Self::Composite(composite) => Some(composite),
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::InvalidInput(_) => {
                map.insert("type".to_string(), json!("InvalidInput"));
            }
            Self::Config(_) => {
                map.insert("type".to_string(), json!("Config"));
            }
            Self::Gateway { operation, source } => {
                map.insert("type".to_string(), json!("Gateway"));
                map.insert("operation".to_string(), json!(operation.as_str()));
                map.insert("cause".to_string(), json!(source.to_string()));
            }
            Self::Composite(composite) => {
                map.insert("type".to_string(), json!("Composite"));
                map.insert(
                    "failures".to_string(),
                    json!(composite
                        .iter()
                        .map(|f| json!({
                            "node_pool": f.node_pool,
                            "cause": f.cause.to_string(),
                        }))
                        .collect::<Vec<_>>()),
                );
            }
            Self::Rollback(rollback) => {
                map.insert("type".to_string(), json!("Rollback"));
                map.insert(
                    "failures".to_string(),
                    json!(rollback
                        .failures
                        .iter()
                        .map(|(pool, err)| json!({
                            "node_pool": pool,
                            "cause": err.to_string(),
                        }))
                        .collect::<Vec<_>>()),
                );
            }
        }

        map.insert("message".to_string(), json!(self.to_string()));
        map
    }
}

/// Errors surfaced by the cloud provisioning gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider rejected the request (quota, validation, auth).
    #[error("{code}: {message}")]
    Api {
        /// Provider error code.
        code: String,
        /// Provider error message.
        message: String,
    },

    /// The request never produced a provider answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The addressed resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Resource kind, e.g. "scaling group".
        resource: &'static str,
        /// Identifier or name used in the lookup.
        id: String,
    },

    /// Opaque SDK error.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Creates a provider API error.
    #[must_use]
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Returns true if the resource was already gone.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Gateway operations, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    /// Create a scaling group.
    CreateScalingGroup,
    /// Create a scaling configuration.
    CreateScalingConfiguration,
    /// Enable a scaling group.
    EnableScalingGroup,
    /// Describe the instances of a scaling group.
    DescribeScalingInstances,
    /// Delete a scaling group.
    DeleteScalingGroup,
    /// Attach instances to the cluster.
    AttachInstances,
    /// Describe the cluster.
    DescribeCluster,
}

impl GatewayOperation {
    /// Returns a stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateScalingGroup => "create_scaling_group",
            Self::CreateScalingConfiguration => "create_scaling_configuration",
            Self::EnableScalingGroup => "enable_scaling_group",
            Self::DescribeScalingInstances => "describe_scaling_instances",
            Self::DeleteScalingGroup => "delete_scaling_group",
            Self::AttachInstances => "attach_instances",
            Self::DescribeCluster => "describe_cluster",
        }
    }
}

impl fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single node pool failed to provision.
#[derive(Debug, Error)]
pub enum NodePoolError {
    /// A gateway call for this node pool failed.
    #[error("could not {}: {source}", .step.describe())]
    Gateway {
        /// The provisioning step that failed.
        step: GatewayOperation,
        /// The underlying gateway error.
        #[source]
        source: GatewayError,
    },

    /// The readiness poller ran out of attempts.
    #[error(
        "timed out waiting for scaling group {scaling_group_id}: \
         {last_count} of {expected} instances in service after {attempts} attempts"
    )]
    Timeout {
        /// The scaling group being polled.
        scaling_group_id: String,
        /// The last observed in-service count.
        last_count: usize,
        /// The requested minimum.
        expected: usize,
        /// Number of describe calls made.
        attempts: usize,
    },

    /// The provisioning task panicked.
    #[error("provisioning task panicked: {0}")]
    Panicked(String),

    /// The provisioning task exited without reporting an outcome.
    #[error("provisioning task did not report an outcome")]
    Unreported,
}

impl GatewayOperation {
    const fn describe(self) -> &'static str {
        match self {
            Self::CreateScalingGroup => "create scaling group",
            Self::CreateScalingConfiguration => "create scaling configuration",
            Self::EnableScalingGroup => "enable scaling group",
            Self::DescribeScalingInstances => "describe scaling instances",
            Self::DeleteScalingGroup => "delete scaling group",
            Self::AttachInstances => "attach instances",
            Self::DescribeCluster => "describe cluster",
        }
    }
}

impl NodePoolError {
    /// Wraps a gateway error raised at the given step.
    #[must_use]
    pub fn gateway(step: GatewayOperation, source: GatewayError) -> Self {
        Self::Gateway { step, source }
    }
}

/// A failure attributed to one node pool.
#[derive(Debug, Error)]
#[error("{node_pool}: {cause}")]
pub struct NodePoolFailure {
    /// The failing node pool.
    pub node_pool: String,
    /// The underlying cause.
    #[source]
    pub cause: NodePoolError,
}

impl NodePoolFailure {
    /// Creates a new node-pool failure.
    #[must_use]
    pub fn new(node_pool: impl Into<String>, cause: NodePoolError) -> Self {
        Self {
            node_pool: node_pool.into(),
            cause,
        }
    }
}

/// An ordered collection of node-pool failures.
///
/// Non-empty if and only if provisioning failed.
#[derive(Debug, Default)]
pub struct CompositeFailure {
    failures: Vec<NodePoolFailure>,
}

impl CompositeFailure {
    /// Creates an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failure.
    pub fn push(&mut self, failure: NodePoolFailure) {
        self.failures.push(failure);
    }

    /// Returns true if no failures were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Iterates over the failures in order.
    pub fn iter(&self) -> std::slice::Iter<'_, NodePoolFailure> {
        self.failures.iter()
    }

    /// Returns the names of the failing node pools.
    #[must_use]
    pub fn node_pools(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.node_pool.as_str()).collect()
    }

    /// Returns `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub(crate) fn sort_by_key<K: Ord>(&mut self, f: impl FnMut(&NodePoolFailure) -> K) {
        self.failures.sort_by_key(f);
    }
}

impl fmt::Display for CompositeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} node pool(s) failed: ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeFailure {}

impl IntoIterator for CompositeFailure {
    type Item = NodePoolFailure;
    type IntoIter = std::vec::IntoIter<NodePoolFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.into_iter()
    }
}

impl<'a> IntoIterator for &'a CompositeFailure {
    type Item = &'a NodePoolFailure;
    type IntoIter = std::slice::Iter<'a, NodePoolFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.iter()
    }
}

/// Delete failures collected during a rollback sweep.
#[derive(Debug, Error)]
#[error("rollback incomplete for {}", .failures.iter().map(|(pool, err)| format!("{pool} ({err})")).collect::<Vec<_>>().join(", "))]
pub struct RollbackFailure {
    /// Node pool name with the delete error it produced.
    pub failures: Vec<(String, GatewayError)>,
}
