//! Factory Registry
//!
//! Maps plugin type ids to bee constructors. The registry is built explicitly
//! at startup and shared by reference; each bundled plugin registers its
//! factory exactly once before any dispatch.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hive_types::{ActionDescriptor, EventDescriptor, OptionDescriptor, Placeholders, duplicate_option};
use serde::Serialize;

use crate::bee::{Bee, BeeError, BeeResult};

// ─────────────────────────────────────────────────────────────────────────────
// Bee Factory Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Per-plugin-type constructor and descriptor publisher
pub trait BeeFactory: Send + Sync + 'static {
    /// Stable plugin type identifier
    fn id(&self) -> &str;

    /// Display name, also used as descriptor namespace
    fn name(&self) -> &str;

    /// What this plugin does
    fn description(&self) -> &str;

    /// Image filename for this plugin
    fn image(&self) -> String {
        format!("{}.png", self.id())
    }

    /// Preferred logo background colour
    fn logo_color(&self) -> &str;

    /// Options available to configure a bee
    fn options(&self) -> Vec<OptionDescriptor> {
        Vec::new()
    }

    /// Actions a bee accepts
    fn actions(&self) -> Vec<ActionDescriptor> {
        Vec::new()
    }

    /// Events a bee may emit
    fn events(&self) -> Vec<EventDescriptor> {
        Vec::new()
    }

    /// Build a bee configured with the supplied options
    fn new_bee(&self, name: &str, description: &str, options: Placeholders)
    -> BeeResult<Arc<dyn Bee>>;
}

/// Serializable summary of a factory's descriptors
#[derive(Debug, Clone, Serialize)]
pub struct FactoryInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: String,
    pub logo_color: String,
    pub options: Vec<OptionDescriptor>,
    pub actions: Vec<ActionDescriptor>,
    pub events: Vec<EventDescriptor>,
}

impl FactoryInfo {
    /// Capture a factory's metadata
    pub fn from_factory(factory: &dyn BeeFactory) -> Self {
        Self {
            id: factory.id().to_string(),
            name: factory.name().to_string(),
            description: factory.description().to_string(),
            image: factory.image(),
            logo_color: factory.logo_color().to_string(),
            options: factory.options(),
            actions: factory.actions(),
            events: factory.events(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the factory registry
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown plugin type: {0}")]
    UnknownFactory(String),

    #[error("Plugin type already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid descriptors in {factory}: {reason}")]
    InvalidDescriptor { factory: String, reason: String },

    #[error("Failed to construct {factory} bee: {source}")]
    Construction {
        factory: String,
        #[source]
        source: BeeError,
    },
}

/// Result type for registry operations
pub type FactoryResult<T> = Result<T, FactoryError>;

/// Check a factory's descriptors for duplicate names
///
/// Option names must be unique within the configuration list and within each
/// action or event; action names and event names must be unique per factory.
pub fn validate_descriptors(factory: &dyn BeeFactory) -> FactoryResult<()> {
    let invalid = |reason: String| FactoryError::InvalidDescriptor {
        factory: factory.id().to_string(),
        reason,
    };

    if let Some(name) = duplicate_option(&factory.options()) {
        return Err(invalid(format!("duplicate option '{name}'")));
    }

    let mut action_names = HashSet::new();
    for action in factory.actions() {
        if let Some(name) = duplicate_option(&action.options) {
            return Err(invalid(format!(
                "duplicate option '{name}' in action '{}'",
                action.name
            )));
        }
        if !action_names.insert(action.name.clone()) {
            return Err(invalid(format!("duplicate action '{}'", action.name)));
        }
    }

    let mut event_names = HashSet::new();
    for event in factory.events() {
        if let Some(name) = duplicate_option(&event.options) {
            return Err(invalid(format!(
                "duplicate option '{name}' in event '{}'",
                event.name
            )));
        }
        if !event_names.insert(event.name.clone()) {
            return Err(invalid(format!("duplicate event '{}'", event.name)));
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Table of registered plugin types
///
/// Re-registering an id is rejected and keeps the original factory.
pub struct FactoryRegistry {
    factories: DashMap<String, Arc<dyn BeeFactory>>,
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Create a new registry wrapped in an Arc
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a factory under its id
    pub fn register(&self, factory: Arc<dyn BeeFactory>) -> FactoryResult<()> {
        validate_descriptors(factory.as_ref())?;

        match self.factories.entry(factory.id().to_string()) {
            Entry::Occupied(entry) => Err(FactoryError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::info!(factory = %factory.id(), name = %factory.name(), "Registered bee factory");
                entry.insert(factory);
                Ok(())
            }
        }
    }

    /// Get a factory by id
    pub fn lookup(&self, id: &str) -> FactoryResult<Arc<dyn BeeFactory>> {
        self.factories
            .get(id)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| FactoryError::UnknownFactory(id.to_string()))
    }

    /// Build a bee from the factory registered under `id`
    pub fn new_bee(
        &self,
        id: &str,
        name: &str,
        description: &str,
        options: Placeholders,
    ) -> FactoryResult<Arc<dyn Bee>> {
        let factory = self.lookup(id)?;
        factory
            .new_bee(name, description, options)
            .map_err(|source| FactoryError::Construction {
                factory: id.to_string(),
                source,
            })
    }

    /// Check if a factory is registered
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.factories.iter().map(|f| f.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Metadata for every registered factory, sorted by id
    pub fn infos(&self) -> Vec<FactoryInfo> {
        let mut infos: Vec<_> = self
            .factories
            .iter()
            .map(|f| FactoryInfo::from_factory(f.value().as_ref()))
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
