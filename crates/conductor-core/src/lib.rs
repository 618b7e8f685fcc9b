//! Workflow engine and storage port traits for Conductor.
//!
//! This crate defines the engine and the "ports" (repository traits) that the
//! infrastructure layer implements. It depends only on `conductor-types`,
//! never on `conductor-infra` or any database crate.

pub mod repository;
pub mod workflow;
