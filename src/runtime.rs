//! Runtime glue that wires configuration, progress tracking, telemetry, fatal
//! error capture, and runner orchestration.

pub mod config;
pub mod fatal;
pub mod progress;
pub mod runner;
pub mod telemetry;
