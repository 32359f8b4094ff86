//! Hive Types - Core data model for the bee plugin protocol
//!
//! This crate contains the pure data structures shared by the runtime, the
//! bundled bees and the host:
//!
//! - [`Value`] / [`ValueType`]: tagged values over the supported semantic types
//! - [`Placeholder`] / [`Placeholders`]: named values plus the option binder
//! - Option, action and event descriptors published by bee factories
//! - [`Action`] and [`Event`] messages

mod descriptor;
mod message;
mod placeholder;
mod value;

pub use descriptor::*;
pub use message::*;
pub use placeholder::*;
pub use value::*;
