//! Runtime messages: actions sent to bees and events emitted by them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::placeholder::Placeholders;
use crate::value::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Action
// ─────────────────────────────────────────────────────────────────────────────

/// An invocation addressed to one bee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Name of the target bee instance
    pub bee: String,
    /// Action name, matched against the factory's action descriptors
    pub name: String,
    /// Invocation parameters
    #[serde(default)]
    pub options: Placeholders,
}

impl Action {
    /// Create an action with no parameters
    pub fn new(bee: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bee: bee.into(),
            name: name.into(),
            options: Placeholders::new(),
        }
    }

    /// Add a parameter
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.set(name, value);
        self
    }

    /// Replace all parameters
    pub fn with_options(mut self, options: Placeholders) -> Self {
        self.options = options;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event
// ─────────────────────────────────────────────────────────────────────────────

/// A notification emitted by a bee onto the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Name of the emitting bee instance
    pub bee: String,
    /// Event name, documented by the factory's event descriptors
    pub name: String,
    /// Payload
    #[serde(default)]
    pub options: Placeholders,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(bee: impl Into<String>, name: impl Into<String>, options: Placeholders) -> Self {
        Self {
            bee: bee.into(),
            name: name.into(),
            options,
            timestamp: Utc::now(),
        }
    }

    /// Routing key in the form `<bee>/<event>`
    pub fn key(&self) -> String {
        format!("{}/{}", self.bee, self.name)
    }

    /// Get a payload value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.options.value(name)
    }

    /// Get a payload string (strings and URLs)
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }
}
