//! Placeholders and the option binder
//!
//! A [`Placeholder`] is a named [`Value`]. An ordered [`Placeholders`] sequence
//! is used for bee configuration, action parameters and event payloads.

use serde::{Deserialize, Serialize};

use crate::value::{FromValue, Value};

/// A named, typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    /// Placeholder name (unique within one sequence by convention)
    pub name: String,
    /// Typed value
    pub value: Value,
}

impl Placeholder {
    /// Create a new placeholder
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered sequence of placeholders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Placeholders(Vec<Placeholder>);

impl Placeholders {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder-style append
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(Placeholder::new(name, value));
        self
    }

    /// Append a placeholder, keeping any earlier entry with the same name
    pub fn push(&mut self, placeholder: Placeholder) {
        self.0.push(placeholder);
    }

    /// Replace the first entry with this name, or append if there is none
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Placeholder { name, value }),
        }
    }

    /// First placeholder with the given name
    pub fn get(&self, name: &str) -> Option<&Placeholder> {
        self.0.iter().find(|p| p.name == name)
    }

    /// Value of the first placeholder with the given name
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|p| &p.value)
    }

    /// Check whether a placeholder with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bind the first placeholder named `name` into `dest`
    ///
    /// Returns `true` when `dest` was written. A missing placeholder leaves
    /// `dest` untouched, so its prior value acts as the default. A value that
    /// cannot be converted to the destination type also leaves `dest`
    /// untouched and is only logged.
    pub fn bind<T: FromValue>(&self, name: &str, dest: &mut T) -> bool {
        let Some(placeholder) = self.get(name) else {
            return false;
        };

        match T::from_value(&placeholder.value) {
            Ok(v) => {
                *dest = v;
                true
            }
            Err(e) => {
                tracing::debug!(option = %name, error = %e, "Skipping option with incompatible value");
                false
            }
        }
    }

    /// Names in sequence order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|p| p.name.as_str())
    }

    /// Iterate over placeholders in order
    pub fn iter(&self) -> std::slice::Iter<'_, Placeholder> {
        self.0.iter()
    }

    /// Number of placeholders
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the sequence is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a flat JSON object (first entry wins for duplicate names)
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for p in &self.0 {
            if !obj.contains_key(&p.name) {
                obj.insert(p.name.clone(), p.value.clone().into());
            }
        }
        serde_json::Value::Object(obj)
    }
}

impl From<Vec<Placeholder>> for Placeholders {
    fn from(v: Vec<Placeholder>) -> Self {
        Self(v)
    }
}

impl FromIterator<Placeholder> for Placeholders {
    fn from_iter<I: IntoIterator<Item = Placeholder>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Placeholders {
    type Item = Placeholder;
    type IntoIter = std::vec::IntoIter<Placeholder>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Placeholders {
    type Item = &'a Placeholder;
    type IntoIter = std::slice::Iter<'a, Placeholder>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_matching_names() {
        let options = Placeholders::new()
            .with("url", "http://example.com")
            .with("retries", 3)
            .with("verbose", true);

        let mut url = String::new();
        let mut retries = 0i64;
        let mut verbose = false;

        assert!(options.bind("url", &mut url));
        assert!(options.bind("retries", &mut retries));
        assert!(options.bind("verbose", &mut verbose));

        assert_eq!(url, "http://example.com");
        assert_eq!(retries, 3);
        assert!(verbose);
    }

    #[test]
    fn test_bind_empty_keeps_defaults() {
        let options = Placeholders::new();

        let mut url = "default".to_string();
        let mut retries = 5i64;

        assert!(!options.bind("url", &mut url));
        assert!(!options.bind("retries", &mut retries));

        assert_eq!(url, "default");
        assert_eq!(retries, 5);
    }

    #[test]
    fn test_bind_mismatch_is_soft() {
        let options = Placeholders::new().with("retries", "many");

        let mut retries = 2i64;
        assert!(!options.bind("retries", &mut retries));
        assert_eq!(retries, 2);
    }

    #[test]
    fn test_bind_uses_first_match() {
        let options = Placeholders::new().with("name", "first").with("name", "second");

        let mut name = String::new();
        options.bind("name", &mut name);
        assert_eq!(name, "first");
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut options = Placeholders::new().with("a", 1).with("b", 2);
        options.set("a", 10);
        options.set("c", 3);

        assert_eq!(options.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(options.value("a"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_to_json() {
        let options = Placeholders::new()
            .with("title", "Example")
            .with("count", 2);

        assert_eq!(
            options.to_json(),
            serde_json::json!({"title": "Example", "count": 2})
        );
    }
}
