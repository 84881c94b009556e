//! Action trait and implementations.
//!
//! Actions are the units of work a provisioning workflow chains together.
//! Each one can run forward once and compensate its own effects.

mod create_node_pools;

pub use create_node_pools::CreateNodePoolsAction;

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;
use tracing::{info, warn};

use crate::errors::ProvisionError;
use crate::model::ClusterTopology;

/// Trait for provisioning actions.
///
/// The same cluster description flows in and out so a workflow runner can
/// feed one action's output into the next.
#[async_trait]
pub trait Action: Send + Sync + Debug {
    /// Returns the name of the action.
    fn name(&self) -> &str;

    /// Runs the forward step.
    ///
    /// Called at most once per provisioning attempt; retrying is up to the
    /// workflow runner.
    ///
    /// # Arguments
    ///
    /// * `input` - The cluster description produced by the previous step
    ///
    /// # Returns
    ///
    /// The cluster description for the next step.
    async fn execute(&self, input: ClusterTopology) -> Result<ClusterTopology, ProvisionError>;

    /// Compensates whatever `execute` did, even if it only partly ran or
    /// never ran.
    async fn undo(&self) -> Result<(), ProvisionError>;
}

/// An execute failure, together with the outcome of the undo that followed it.
#[derive(Debug, Error)]
#[error("{action} failed: {execute}")]
pub struct ActionFailure {
    /// The failing action's name.
    pub action: String,
    /// Why execute failed.
    #[source]
    pub execute: ProvisionError,
    /// The undo error, if undo did not complete cleanly.
    pub undo: Option<ProvisionError>,
}

/// Executes an action and undoes it if execute fails.
pub async fn execute_or_undo(
    action: &dyn Action,
    input: ClusterTopology,
) -> Result<ClusterTopology, ActionFailure> {
    match action.execute(input).await {
        Ok(output) => Ok(output),
        Err(execute) => {
            info!(action = %action.name(), error = %execute, "Execute failed, undoing");
            let undo = action.undo().await.err();
            if let Some(ref e) = undo {
                warn!(action = %action.name(), error = %e, "Undo did not complete cleanly");
            }
            Err(ActionFailure {
                action: action.name().to_string(),
                execute,
                undo,
            })
        }
    }
}
