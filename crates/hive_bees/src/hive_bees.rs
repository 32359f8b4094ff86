//! Hive Bees - Bundled plugin types
//!
//! - `htmlextractbee`: fetches a web page and emits its title and metadata
//! - `twitterbee`: tweets, follows and unfollows, and reports new mentions
//!
//! Call [`register_all`] once at startup, before any bee is spawned.

mod htmlextract;
mod twitter;

pub use htmlextract::*;
pub use twitter::*;

use std::sync::Arc;

use hive_runtime::{FactoryRegistry, FactoryResult};

/// Register every bundled factory with their default HTTP clients
pub fn register_all(registry: &FactoryRegistry) -> FactoryResult<()> {
    registry.register(Arc::new(HtmlExtractFactory::new()))?;
    registry.register(Arc::new(TwitterBeeFactory::new()))?;
    Ok(())
}
