// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared boundary types for the scheduler/bus/container subsystems.
//!
//! The self-describing tagged-value data model (signed/unsigned integers of
//! four widths, floats, bool, string, blob, ordered map, fixed-length array)
//! is an external collaborator: this crate only consumes the shape of that
//! interface, standing in with [`Value`], a reference-counted `serde_json`
//! document. Swapping in the real tagged-value crate later only touches this
//! module.

#![forbid(unsafe_code)]

use std::sync::Arc;

/// A publish/subscribe payload or component configuration value.
///
/// Cloning is cheap (`Arc` refcount bump) so the bus can hand the same
/// payload to every matching subscriber without copying.
pub type Value = Arc<serde_json::Value>;

/// Wraps a [`serde_json::Value`] in the shared refcounted payload type.
pub fn value(v: serde_json::Value) -> Value {
    Arc::new(v)
}

/// Errors shared across the scheduler, bus, and container crates.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A lock was poisoned by a panicking thread holding it.
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),
    /// Configuration JSON failed to parse or was missing a required field.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The operation named a component/subscription/schedule that does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Attempted to register something under a name already in use.
    #[error("duplicate: {0}")]
    Duplicate(String),
}

/// Result alias used throughout the runtime crates.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Initializes the process-wide `log` subscriber exactly once.
///
/// Library crates never call this themselves (per the logging ambient-stack
/// convention, only binaries/test harnesses install a subscriber); it is
/// exposed here so integration tests and the `runtime` crate share one
/// implementation instead of each hand-rolling `env_logger::init()`.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_clone_is_cheap_refcount_bump() {
        let v = value(serde_json::json!({"a": 1}));
        let v2 = v.clone();
        assert_eq!(Arc::strong_count(&v), 2);
        assert_eq!(v, v2);
    }
}
