//! Observability wiring for Quorum.

pub mod tracing_setup;
