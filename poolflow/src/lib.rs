//! # Poolflow
//!
//! Node-pool provisioning for managed Kubernetes clusters, packaged as a
//! compensable action for an external workflow runner.
//!
//! Poolflow provides:
//!
//! - **Action contract**: a named forward step plus its compensating undo
//! - **Concurrent fan-out**: one provisioning task per node pool, always joined
//! - **Readiness polling**: bounded waits on an eventually-consistent control plane
//! - **Failure aggregation**: every failing node pool is reported, not just the first
//! - **Rollback**: a best-effort sweep over every declared node pool
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use poolflow::prelude::*;
//!
//! let action = CreateNodePoolsAction::new(
//!     "c-123",
//!     "cn-hangzhou",
//!     vec![NodePoolSpec::new("workers", 2, 4, "ecs.g6.large")],
//!     gateway,
//! );
//!
//! match action.execute(cluster).await {
//!     Ok(cluster) => println!("cluster is {:?}", cluster.state),
//!     Err(err) => {
//!         eprintln!("{err}");
//!         action.undo().await?;
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod action;
pub mod aggregate;
pub mod config;
pub mod errors;
pub mod events;
pub mod fanout;
pub mod gateway;
pub mod model;
pub mod observability;
pub mod poller;
pub mod rollback;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::{execute_or_undo, Action, ActionFailure, CreateNodePoolsAction};
    pub use crate::config::{PollConfig, ProvisionerConfig};
    pub use crate::errors::{
        CompositeFailure, GatewayError, GatewayOperation, NodePoolError, NodePoolFailure,
        ProvisionError, RollbackFailure,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::gateway::CloudGateway;
    pub use crate::model::{ClusterTopology, NodePoolSpec};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::poller::{BackoffStrategy, JitterStrategy};
}
