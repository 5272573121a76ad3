//! Logging setup for the command-line binary.
//!
//! Library code only emits `tracing` events; this module installs the
//! subscriber that renders them on stderr.

mod config;
mod tracing_setup;

pub use config::TracingConfig;
pub use tracing_setup::{TracingGuard, init_tracing};
