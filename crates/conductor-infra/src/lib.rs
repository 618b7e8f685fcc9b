//! Infrastructure layer for Conductor.
//!
//! Contains implementations of the ports defined in `conductor-core`: the
//! SQLite execution store, the `config.toml` loader, data directory
//! resolution, and the shell-command task action used by the CLI.

pub mod config;
pub mod filesystem;
pub mod process;
pub mod sqlite;
