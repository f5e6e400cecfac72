//! Runtime glue: configuration, telemetry, run states, fatal error capture,
//! and the signal-aware runner.

pub mod config;
pub mod fatal;
pub mod file;
pub mod runner;
pub mod state;
pub mod telemetry;
