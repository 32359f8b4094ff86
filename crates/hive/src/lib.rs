//! Hive - Event-driven automation host
//!
//! This crate wires the runtime together:
//! - configuration loading via [`config`]
//! - the bus, the hive, chains and event logging via [`app`]
//! - bundled plugins via `hive_bees`

// Re-export core crates
pub use hive_bees;
pub use hive_runtime;
pub use hive_types;

pub mod app;
pub mod config;
