//! Hook surface, engine configuration, fatal error capture, telemetry and the
//! signal-driven runner.

pub mod config;
pub mod fatal;
pub mod hooks;
pub mod runner;
pub mod telemetry;
