//! Lifecycle events emitted by provisioning actions.
//!
//! Events complement the tracing output with machine-readable payloads that
//! a workflow runner can forward to its own telemetry.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// The action started executing.
pub const ACTION_STARTED: &str = "action.started";
/// The action finished without error.
pub const ACTION_COMPLETED: &str = "action.completed";
/// The action returned an error.
pub const ACTION_FAILED: &str = "action.failed";
/// A node-pool task started.
pub const NODE_POOL_STARTED: &str = "node_pool.started";
/// A scaling group was created for a node pool.
pub const NODE_POOL_SCALING_GROUP_CREATED: &str = "node_pool.scaling_group_created";
/// A scaling configuration was created for a node pool.
pub const NODE_POOL_SCALING_CONFIGURATION_CREATED: &str =
    "node_pool.scaling_configuration_created";
/// A node pool's scaling group was enabled.
pub const NODE_POOL_ENABLED: &str = "node_pool.enabled";
/// A node pool reached its minimum size.
pub const NODE_POOL_READY: &str = "node_pool.ready";
/// A node-pool task failed.
pub const NODE_POOL_FAILED: &str = "node_pool.failed";
/// A rollback sweep started.
pub const ROLLBACK_STARTED: &str = "rollback.started";
/// A node pool was deleted during rollback.
pub const ROLLBACK_NODE_POOL_DELETED: &str = "rollback.node_pool_deleted";
/// A node pool could not be deleted during rollback.
pub const ROLLBACK_NODE_POOL_FAILED: &str = "rollback.node_pool_failed";
/// A rollback sweep finished.
pub const ROLLBACK_COMPLETED: &str = "rollback.completed";

/// Builds an event payload, stamping it with the current time.
#[must_use]
pub fn payload(mut data: serde_json::Value) -> Option<serde_json::Value> {
    if let Some(map) = data.as_object_mut() {
        map.insert(
            "timestamp".to_string(),
            serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }
    Some(data)
}
