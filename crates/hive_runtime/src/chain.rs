//! Chains
//!
//! A chain reacts to one kind of event by dispatching a list of actions.
//! String options of a chain action may reference the triggering event's
//! placeholders as `{{.name}}`.

use std::collections::BTreeMap;
use std::sync::Arc;

use hive_types::{Action, Event, Placeholder, Placeholders, Value};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::bus::EventFilter;
use crate::hive::Hive;

// ─────────────────────────────────────────────────────────────────────────────
// Chain Definition
// ─────────────────────────────────────────────────────────────────────────────

/// The event a chain listens for
///
/// Both fields accept `*` wildcards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub bee: String,
    pub name: String,
}

/// An action a chain dispatches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainAction {
    pub bee: String,
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Binds an event to follow-up actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub event: ChainEvent,
    #[serde(default)]
    pub actions: Vec<ChainAction>,
}

impl Chain {
    /// Bus filter pattern for the chain's event
    pub fn pattern(&self) -> String {
        format!("{}/{}", self.event.bee, self.event.name)
    }

    /// Check whether an event triggers this chain
    pub fn matches(&self, event: &Event) -> bool {
        EventFilter::new([self.pattern()]).matches(event)
    }

    /// Build the actions for a triggering event
    pub fn build_actions(&self, event: &Event) -> Vec<Action> {
        self.actions
            .iter()
            .map(|action| {
                let options: Placeholders = action
                    .options
                    .iter()
                    .map(|(name, raw)| Placeholder::new(name.clone(), render_value(raw, &event.options)))
                    .collect();
                Action::new(&action.bee, &action.name).with_options(options)
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Templating
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve a raw chain option against an event's placeholders
///
/// A string consisting of exactly one reference takes the referenced value
/// with its type intact. Other strings are rendered as text.
fn render_value(raw: &serde_json::Value, placeholders: &Placeholders) -> Value {
    let serde_json::Value::String(template) = raw else {
        return Value::infer(raw.clone());
    };

    let trimmed = template.trim();
    if let Some(name) = sole_reference(trimmed) {
        if let Some(value) = placeholders.value(name) {
            return value.clone();
        }
    }

    Value::String(render(template, placeholders))
}

/// The placeholder name when `s` is exactly one `{{.name}}` reference
fn sole_reference(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    inner.trim().strip_prefix('.').map(str::trim)
}

/// Substitute every `{{.name}}` reference in `template`
///
/// Unknown names render as an empty string. Text between braces that is not
/// a reference is kept verbatim.
pub fn render(template: &str, placeholders: &Placeholders) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        match after[..end].trim().strip_prefix('.') {
            Some(name) => {
                if let Some(value) = placeholders.value(name.trim()) {
                    out.push_str(&value.to_string());
                }
            }
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Chain Runner
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatches chain actions for events on the hive's bus
pub struct ChainRunner {
    hive: Arc<Hive>,
    chains: Vec<Chain>,
}

impl ChainRunner {
    pub fn new(hive: Arc<Hive>, chains: Vec<Chain>) -> Self {
        Self { hive, chains }
    }

    /// Subscribe to the bus and start the runner task
    ///
    /// Every action is dispatched on its own task so the subscription keeps
    /// draining while bees work. The task ends when the bus shuts down.
    pub fn spawn(self) -> JoinHandle<()> {
        let filter = EventFilter::new(self.chains.iter().map(Chain::pattern));
        let mut subscription = self.hive.bus().subscribe(filter);
        tracing::info!(chains = self.chains.len(), "Chain runner started");

        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                for chain in self.chains.iter().filter(|c| c.matches(&event)) {
                    tracing::debug!(chain = %chain.name, event = %event.key(), "Chain triggered");

                    for action in chain.build_actions(&event) {
                        let hive = Arc::clone(&self.hive);
                        let chain_name = chain.name.clone();
                        tokio::spawn(async move {
                            let bee = action.bee.clone();
                            let name = action.name.clone();
                            if let Err(e) = hive.dispatch(action).await {
                                tracing::warn!(
                                    chain = %chain_name,
                                    bee = %bee,
                                    action = %name,
                                    error = %e,
                                    "Chain action failed"
                                );
                            }
                        });
                    }
                }
            }
            tracing::debug!("Chain runner stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_chain() -> Chain {
        Chain {
            name: "share-links".to_string(),
            description: String::new(),
            event: ChainEvent {
                bee: "extractor".to_string(),
                name: "info_extracted".to_string(),
            },
            actions: vec![ChainAction {
                bee: "twitter".to_string(),
                name: "tweet".to_string(),
                options: BTreeMap::from([
                    (
                        "status".to_string(),
                        serde_json::json!("Reading: {{.title}} ({{ .domain }})"),
                    ),
                    ("link".to_string(), serde_json::json!("{{.final_url}}")),
                    ("count".to_string(), serde_json::json!(3)),
                ]),
            }],
        }
    }

    fn extracted() -> Event {
        Event::new(
            "extractor",
            "info_extracted",
            Placeholders::new()
                .with("title", "Example Article")
                .with("domain", "example.com")
                .with("final_url", Value::url("http://example.com/a").unwrap()),
        )
    }

    #[test]
    fn test_render_substitutes_references() {
        let placeholders = Placeholders::new().with("a", "x").with("n", 2);
        assert_eq!(render("{{.a}}-{{ .n }}", &placeholders), "x-2");
        assert_eq!(render("missing: [{{.zzz}}]", &placeholders), "missing: []");
        assert_eq!(render("{{not a ref}} {{.a", &placeholders), "{{not a ref}} {{.a");
        assert_eq!(render("plain", &placeholders), "plain");
    }

    #[test]
    fn test_matches_with_wildcards() {
        let mut chain = link_chain();
        assert!(chain.matches(&extracted()));
        assert!(!chain.matches(&Event::new("other", "info_extracted", Placeholders::new())));

        chain.event.bee = "*".to_string();
        assert!(chain.matches(&Event::new("other", "info_extracted", Placeholders::new())));
    }

    #[test]
    fn test_build_actions() {
        let actions = link_chain().build_actions(&extracted());
        assert_eq!(actions.len(), 1);

        let action = &actions[0];
        assert_eq!(action.bee, "twitter");
        assert_eq!(
            action.options.value("status").and_then(|v| v.as_str()),
            Some("Reading: Example Article (example.com)")
        );
        assert_eq!(
            action.options.value("link"),
            Some(&Value::url("http://example.com/a").unwrap())
        );
        assert_eq!(action.options.value("count"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_chain_from_toml() {
        let chain: Chain = toml::from_str(
            r#"
            name = "echo"
            [event]
            bee = "a"
            name = "ping"
            [[actions]]
            bee = "b"
            name = "pong"
            options = { text = "{{.text}}" }
            "#,
        )
        .unwrap();

        assert_eq!(chain.pattern(), "a/ping");
        assert_eq!(chain.actions[0].options["text"], serde_json::json!("{{.text}}"));
    }
}
