//! Testing utilities for provisioning actions.
//!
//! This module provides:
//! - An in-memory cloud gateway with failure injection
//! - Call recording for asserting what an action did

mod fake_cloud;

pub use fake_cloud::{FakeCloud, FakeStep};
