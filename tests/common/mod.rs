//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod recorders;

use std::time::Duration;

/// How long integration tests wait for the engine worker to drain.
pub fn drain_timeout() -> Duration {
    Duration::from_secs(5)
}
