//! Option, action and event descriptors
//!
//! Descriptors are static metadata a bee factory publishes once at startup.
//! They drive validation at the configuration boundary: raw values are coerced
//! to the declared types and mandatory options are checked before anything
//! reaches a bee's binder.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::placeholder::{Placeholder, Placeholders};
use crate::value::{Value, ValueConversionError, ValueType};

// ─────────────────────────────────────────────────────────────────────────────
// Option Descriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Declares one configuration or parameter slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    /// Option name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Declared semantic type
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Whether the option must be supplied
    #[serde(default)]
    pub mandatory: bool,
    /// Value used when the option is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl OptionDescriptor {
    /// Create an optional slot
    pub fn new(name: impl Into<String>, description: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            value_type,
            mandatory: false,
            default: None,
        }
    }

    /// Mark the slot as mandatory
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Add a default value
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Action / Event Descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// Declares an action a bee accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Presentation namespace (usually the factory's display name)
    pub namespace: String,
    /// Action name, unique per factory
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Accepted parameters
    #[serde(default)]
    pub options: Vec<OptionDescriptor>,
}

/// Declares an event a bee may emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    /// Presentation namespace (usually the factory's display name)
    pub namespace: String,
    /// Event name, unique per factory
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Payload fields
    #[serde(default)]
    pub options: Vec<OptionDescriptor>,
}

macro_rules! descriptor_builder {
    ($ty:ty) => {
        impl $ty {
            /// Create a descriptor with no options
            pub fn new(
                namespace: impl Into<String>,
                name: impl Into<String>,
                description: impl Into<String>,
            ) -> Self {
                Self {
                    namespace: namespace.into(),
                    name: name.into(),
                    description: description.into(),
                    options: Vec::new(),
                }
            }

            /// Add an option
            pub fn with_option(mut self, option: OptionDescriptor) -> Self {
                self.options.push(option);
                self
            }

            /// Get an option descriptor by name
            pub fn option(&self, name: &str) -> Option<&OptionDescriptor> {
                self.options.iter().find(|o| o.name == name)
            }
        }
    };
}

descriptor_builder!(ActionDescriptor);
descriptor_builder!(EventDescriptor);

/// First option name that appears more than once, if any
pub fn duplicate_option(options: &[OptionDescriptor]) -> Option<&str> {
    let mut seen = HashSet::new();
    for option in options {
        if !seen.insert(option.name.as_str()) {
            return Some(option.name.as_str());
        }
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised at the configuration/invocation boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing mandatory option: {0}")]
    MissingMandatory(String),

    #[error("Option '{name}' is not a valid {expected}: {source}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        #[source]
        source: ValueConversionError,
    },
}

/// Coerce raw name → JSON values into placeholders using declared types
///
/// Options with a descriptor are converted to the declared type; options
/// without one keep their inferred type. Order follows the descriptor list,
/// followed by undeclared options in key order.
pub fn coerce_options(
    descriptors: &[OptionDescriptor],
    raw: &BTreeMap<String, serde_json::Value>,
) -> Result<Placeholders, ValidationError> {
    let mut out = Placeholders::new();

    for desc in descriptors {
        if let Some(value) = raw.get(&desc.name) {
            let value = Value::from_json(value.clone(), desc.value_type).map_err(|source| {
                ValidationError::TypeMismatch {
                    name: desc.name.clone(),
                    expected: desc.value_type,
                    source,
                }
            })?;
            out.push(Placeholder::new(desc.name.clone(), value));
        }
    }

    for (name, value) in raw {
        if descriptors.iter().all(|d| &d.name != name) {
            tracing::debug!(option = %name, "Option has no descriptor, keeping inferred type");
            out.push(Placeholder::new(name.clone(), Value::infer(value.clone())));
        }
    }

    Ok(out)
}

/// Append declared defaults for absent options
pub fn apply_defaults(descriptors: &[OptionDescriptor], options: &mut Placeholders) {
    for desc in descriptors {
        if let Some(default) = &desc.default {
            if !options.contains(&desc.name) {
                options.push(Placeholder::new(desc.name.clone(), default.clone()));
            }
        }
    }
}

/// Check placeholders against descriptors
///
/// Every mandatory option must be present, and every declared option that is
/// present must be convertible to its declared type. Undeclared options are
/// allowed.
pub fn validate_options(
    descriptors: &[OptionDescriptor],
    options: &Placeholders,
) -> Result<(), ValidationError> {
    for desc in descriptors {
        match options.value(&desc.name) {
            Some(value) => {
                value
                    .convert(desc.value_type)
                    .map_err(|source| ValidationError::TypeMismatch {
                        name: desc.name.clone(),
                        expected: desc.value_type,
                        source,
                    })?;
            }
            None if desc.mandatory => {
                return Err(ValidationError::MissingMandatory(desc.name.clone()));
            }
            None => {}
        }
    }
    Ok(())
}
