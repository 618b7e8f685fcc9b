//! Observability for Conductor: subscriber setup and span export.

pub mod tracing_setup;
