//! Hive Runtime - Bee lifecycle, factory registry and event bus
//!
//! # Lifecycle
//!
//! A bee moves through `Constructed → Configured → Running → Stopped`:
//! - the [`FactoryRegistry`] builds it from a [`BeeFactory`]
//! - `reload_options` binds its configuration (also while running)
//! - `run` hands it an [`EventSender`] for the shared [`EventBus`]
//! - `action` handles invocations, possibly many at once
//! - `stop` tears it down
//!
//! The [`Hive`] owns the registry, the bus and every running bee, and routes
//! actions to them. [`ChainRunner`] turns events into follow-up actions.

pub use hive_types;

mod bee;
mod bus;
mod chain;
mod factory;
mod hive;

pub use bee::*;
pub use bus::*;
pub use chain::*;
pub use factory::*;
pub use hive::*;
