//! Shared domain types for Conductor.
//!
//! Task and execution state machines, the persisted execution snapshot,
//! audit entries, configuration, and the storage error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
