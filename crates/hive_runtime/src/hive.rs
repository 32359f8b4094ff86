//! Hive
//!
//! Owns the factory registry, the event bus and every running bee. Raw
//! configuration is coerced and validated against the factory's descriptors
//! here, before any bee sees it, and actions are routed to bees by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hive_types::{Action, Placeholders, ValidationError, apply_defaults, coerce_options, validate_options};
use serde::{Deserialize, Serialize};

use crate::bee::{Bee, BeeError, BeeState};
use crate::bus::EventBus;
use crate::factory::{BeeFactory, FactoryError, FactoryRegistry};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration of one bee instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeeConfig {
    /// Unique instance name
    pub name: String,
    /// Factory id to build the bee from
    pub class: String,
    #[serde(default)]
    pub description: String,
    /// Raw option values, coerced to the declared types on spawn
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl BeeConfig {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            description: String::new(),
            options: BTreeMap::new(),
        }
    }

    /// Add a raw option value
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }
}

/// Summary of a running bee
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeeInfo {
    pub name: String,
    pub class: String,
    pub description: String,
    pub state: BeeState,
}

// ─────────────────────────────────────────────────────────────────────────────
// Hive Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the hive
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HiveError {
    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Bee(#[from] BeeError),

    #[error("Invalid options for {bee}: {source}")]
    InvalidOptions {
        bee: String,
        #[source]
        source: ValidationError,
    },

    #[error("Unknown bee: {0}")]
    UnknownBee(String),

    #[error("Bee already running: {0}")]
    BeeAlreadyRunning(String),
}

/// Result type for hive operations
pub type HiveResult<T> = Result<T, HiveError>;

// ─────────────────────────────────────────────────────────────────────────────
// Hive
// ─────────────────────────────────────────────────────────────────────────────

/// A bee together with the factory that built it
struct RunningBee {
    bee: Arc<dyn Bee>,
    factory: Arc<dyn BeeFactory>,
}

/// Host runtime for bees
///
/// All operations take `&self`. Map entries are cloned out before any bee
/// method is awaited, so actions on one bee or many run in parallel.
pub struct Hive {
    registry: Arc<FactoryRegistry>,
    bus: Arc<EventBus>,
    bees: DashMap<String, RunningBee>,
}

impl Hive {
    /// Create a hive over a populated registry and a running bus
    pub fn new(registry: Arc<FactoryRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            registry,
            bus,
            bees: DashMap::new(),
        }
    }

    /// Create a new hive wrapped in an Arc
    pub fn new_shared(registry: Arc<FactoryRegistry>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self::new(registry, bus))
    }

    /// The shared event bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The factory registry
    pub fn registry(&self) -> &Arc<FactoryRegistry> {
        &self.registry
    }

    /// Build, configure and start a bee
    pub async fn spawn(&self, config: BeeConfig) -> HiveResult<Arc<dyn Bee>> {
        if self.bees.contains_key(&config.name) {
            return Err(HiveError::BeeAlreadyRunning(config.name));
        }

        let factory = self.registry.lookup(&config.class)?;
        let options = prepare_options(&config.name, factory.as_ref(), &config.options)?;

        let bee = self
            .registry
            .new_bee(&config.class, &config.name, &config.description, options)?;
        bee.run(self.bus.sender()).await?;

        let inserted = match self.bees.entry(config.name.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(RunningBee {
                    bee: Arc::clone(&bee),
                    factory,
                });
                true
            }
        };

        if !inserted {
            // Lost a race with a concurrent spawn of the same name
            let _ = bee.stop().await;
            return Err(HiveError::BeeAlreadyRunning(config.name));
        }

        tracing::info!(bee = %config.name, class = %config.class, "Bee started");
        Ok(bee)
    }

    /// Route an action to its bee
    ///
    /// Declared actions get their defaults applied and mandatory parameters
    /// checked before the bee is called.
    pub async fn dispatch(&self, mut action: Action) -> HiveResult<Placeholders> {
        let (bee, factory) = self.lookup(&action.bee)?;

        if let Some(desc) = factory.actions().into_iter().find(|a| a.name == action.name) {
            apply_defaults(&desc.options, &mut action.options);
            validate_options(&desc.options, &action.options).map_err(|source| {
                HiveError::InvalidOptions {
                    bee: action.bee.clone(),
                    source,
                }
            })?;
        }

        let bee_name = action.bee.clone();
        let action_name = action.name.clone();
        tracing::debug!(bee = %bee_name, action = %action_name, "Dispatching action");

        match bee.action(action).await {
            Ok(out) => Ok(out),
            Err(e) => {
                if matches!(e, BeeError::UnknownAction { .. }) {
                    tracing::error!(bee = %bee_name, action = %action_name, "Unknown action triggered");
                } else {
                    tracing::warn!(bee = %bee_name, action = %action_name, error = %e, "Action failed");
                }
                Err(e.into())
            }
        }
    }

    /// Rebind a running bee's configuration
    pub fn reload(&self, name: &str, raw: &BTreeMap<String, serde_json::Value>) -> HiveResult<()> {
        let (bee, factory) = self.lookup(name)?;
        let options = prepare_options(name, factory.as_ref(), raw)?;
        bee.reload_options(options)?;
        tracing::info!(bee = %name, "Bee options reloaded");
        Ok(())
    }

    /// Stop and remove a bee
    pub async fn stop(&self, name: &str) -> HiveResult<()> {
        let running = self
            .bees
            .remove(name)
            .map(|(_, v)| v)
            .ok_or_else(|| HiveError::UnknownBee(name.to_string()))?;

        running.bee.stop().await?;
        tracing::info!(bee = %name, "Bee stopped");
        Ok(())
    }

    /// Stop every bee
    pub async fn shutdown_all(&self) {
        tracing::info!(count = self.bees.len(), "Stopping all bees");

        let names: Vec<String> = self.bees.iter().map(|e| e.key().clone()).collect();
        let running: Vec<Arc<dyn Bee>> = names
            .iter()
            .filter_map(|name| self.bees.remove(name).map(|(_, v)| v.bee))
            .collect();

        let results = futures::future::join_all(running.iter().map(|bee| bee.stop())).await;
        for (bee, result) in running.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(bee = %bee.name(), error = %e, "Bee failed to stop cleanly");
            }
        }
    }

    /// Get a running bee by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Bee>> {
        self.bees.get(name).map(|b| Arc::clone(&b.bee))
    }

    /// Summaries of all running bees, sorted by name
    pub fn list(&self) -> Vec<BeeInfo> {
        let mut infos: Vec<_> = self
            .bees
            .iter()
            .map(|entry| {
                let core = entry.value().bee.core();
                BeeInfo {
                    name: core.name().to_string(),
                    class: core.class().to_string(),
                    description: core.description().to_string(),
                    state: core.state(),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of running bees
    pub fn len(&self) -> usize {
        self.bees.len()
    }

    /// Check if no bees are running
    pub fn is_empty(&self) -> bool {
        self.bees.is_empty()
    }

    fn lookup(&self, name: &str) -> HiveResult<(Arc<dyn Bee>, Arc<dyn BeeFactory>)> {
        self.bees
            .get(name)
            .map(|b| (Arc::clone(&b.bee), Arc::clone(&b.factory)))
            .ok_or_else(|| HiveError::UnknownBee(name.to_string()))
    }
}

/// Coerce, default and validate raw options for a bee
fn prepare_options(
    bee: &str,
    factory: &dyn BeeFactory,
    raw: &BTreeMap<String, serde_json::Value>,
) -> HiveResult<Placeholders> {
    let descriptors = factory.options();
    let invalid = |source| HiveError::InvalidOptions {
        bee: bee.to_string(),
        source,
    };

    let mut options = coerce_options(&descriptors, raw).map_err(invalid)?;
    apply_defaults(&descriptors, &mut options);
    validate_options(&descriptors, &options).map_err(invalid)?;
    Ok(options)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bee::{BeeCore, BeeResult};
    use crate::bus::{BusConfig, EventFilter};
    use async_trait::async_trait;
    use hive_types::{ActionDescriptor, EventDescriptor, OptionDescriptor, ValueType};
    use parking_lot::RwLock;
    use tokio::sync::Barrier;
    use tokio_test::assert_ok;

    struct GreeterBee {
        core: BeeCore,
        greeting: RwLock<String>,
        barrier: Arc<Barrier>,
    }

    #[async_trait]
    impl Bee for GreeterBee {
        fn core(&self) -> &BeeCore {
            &self.core
        }

        fn reload_options(&self, options: Placeholders) -> BeeResult<()> {
            let mut greeting = self.greeting.read().clone();
            options.bind("greeting", &mut greeting);
            *self.greeting.write() = greeting;
            self.core.set_options(options);
            Ok(())
        }

        async fn action(&self, action: Action) -> BeeResult<Placeholders> {
            match action.name.as_str() {
                "greet" => {
                    let mut name = String::new();
                    action.options.bind("name", &mut name);
                    let greeting = self.greeting.read().clone();
                    let text = format!("{greeting} {name}");

                    self.core
                        .emit("greeted", Placeholders::new().with("text", text.clone()))
                        .await?;
                    Ok(Placeholders::new().with("text", text))
                }
                "wait" => {
                    self.barrier.wait().await;
                    Ok(Placeholders::new())
                }
                _ => Err(self.core.unknown_action(&action)),
            }
        }
    }

    struct GreeterFactory {
        barrier: Arc<Barrier>,
    }

    impl BeeFactory for GreeterFactory {
        fn id(&self) -> &str {
            "greeterbee"
        }

        fn name(&self) -> &str {
            "Greeter"
        }

        fn description(&self) -> &str {
            "Greets people"
        }

        fn logo_color(&self) -> &str {
            "#123456"
        }

        fn options(&self) -> Vec<OptionDescriptor> {
            vec![
                OptionDescriptor::new("greeting", "Greeting word", ValueType::String)
                    .with_default("hello"),
                OptionDescriptor::new("token", "Secret token", ValueType::String).mandatory(),
            ]
        }

        fn actions(&self) -> Vec<ActionDescriptor> {
            vec![
                ActionDescriptor::new("Greeter", "greet", "Greets someone").with_option(
                    OptionDescriptor::new("name", "Who to greet", ValueType::String).mandatory(),
                ),
                ActionDescriptor::new("Greeter", "wait", "Waits for a partner action"),
            ]
        }

        fn events(&self) -> Vec<EventDescriptor> {
            vec![
                EventDescriptor::new("Greeter", "greeted", "A greeting was made")
                    .with_option(OptionDescriptor::new("text", "Greeting text", ValueType::String)),
            ]
        }

        fn new_bee(
            &self,
            name: &str,
            description: &str,
            options: Placeholders,
        ) -> BeeResult<Arc<dyn Bee>> {
            let bee = GreeterBee {
                core: BeeCore::new(name, self.id(), description),
                greeting: RwLock::new(String::new()),
                barrier: Arc::clone(&self.barrier),
            };
            bee.reload_options(options)?;
            Ok(Arc::new(bee))
        }
    }

    fn test_hive() -> Hive {
        let registry = FactoryRegistry::new_shared();
        registry
            .register(Arc::new(GreeterFactory {
                barrier: Arc::new(Barrier::new(2)),
            }))
            .unwrap();
        Hive::new(registry, EventBus::new_shared(BusConfig::default()))
    }

    fn greeter(name: &str) -> BeeConfig {
        BeeConfig::new(name, "greeterbee").with_option("token", "secret")
    }

    #[tokio::test]
    async fn test_spawn_applies_defaults() {
        let hive = test_hive();
        let bee = assert_ok!(hive.spawn(greeter("g1")).await);

        assert_eq!(bee.state(), BeeState::Running);
        let options = bee.core().options();
        assert_eq!(options.value("greeting").and_then(|v| v.as_str()), Some("hello"));
        assert_eq!(hive.list()[0].class, "greeterbee");
    }

    #[tokio::test]
    async fn test_spawn_missing_mandatory_option() {
        let hive = test_hive();
        let result = hive.spawn(BeeConfig::new("g1", "greeterbee")).await;

        let Err(err) = result else {
            panic!("spawn without the mandatory token must fail");
        };
        assert_eq!(
            err,
            HiveError::InvalidOptions {
                bee: "g1".to_string(),
                source: ValidationError::MissingMandatory("token".to_string()),
            }
        );
        assert!(hive.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_rejects_bad_type() {
        let hive = test_hive();
        let config = greeter("g1").with_option("greeting", serde_json::json!({"a": 1}));
        let result = hive.spawn(config).await;
        assert!(matches!(
            result,
            Err(HiveError::InvalidOptions {
                source: ValidationError::TypeMismatch { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_spawn_unknown_class_and_duplicate_name() {
        let hive = test_hive();

        let result = hive.spawn(BeeConfig::new("x", "nonexistent-id")).await;
        assert!(matches!(
            result,
            Err(HiveError::Factory(FactoryError::UnknownFactory(_)))
        ));

        assert_ok!(hive.spawn(greeter("g1")).await);
        let result = hive.spawn(greeter("g1")).await;
        assert!(matches!(result, Err(HiveError::BeeAlreadyRunning(name)) if name == "g1"));
    }

    #[tokio::test]
    async fn test_dispatch_emits_event() {
        let hive = test_hive();
        let mut sub = hive.bus().subscribe(EventFilter::new(["g1/greeted"]));
        hive.spawn(greeter("g1")).await.unwrap();

        let out = hive
            .dispatch(Action::new("g1", "greet").with_option("name", "bob"))
            .await
            .unwrap();
        assert_eq!(out.value("text").and_then(|v| v.as_str()), Some("hello bob"));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.get_str("text"), Some("hello bob"));
    }

    #[tokio::test]
    async fn test_dispatch_validates_action_options() {
        let hive = test_hive();
        hive.spawn(greeter("g1")).await.unwrap();

        let result = hive.dispatch(Action::new("g1", "greet")).await;
        assert_eq!(
            result,
            Err(HiveError::InvalidOptions {
                bee: "g1".to_string(),
                source: ValidationError::MissingMandatory("name".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_dispatch_unknown_bee_and_action() {
        let hive = test_hive();
        hive.spawn(greeter("g1")).await.unwrap();

        let result = hive.dispatch(Action::new("nobody", "greet")).await;
        assert_eq!(result, Err(HiveError::UnknownBee("nobody".to_string())));

        let result = hive.dispatch(Action::new("g1", "shout")).await;
        assert_eq!(
            result,
            Err(HiveError::Bee(BeeError::UnknownAction {
                bee: "g1".to_string(),
                action: "shout".to_string(),
            }))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_dispatch_on_one_bee() {
        let hive = Arc::new(test_hive());
        hive.spawn(greeter("g1")).await.unwrap();

        // Each "wait" blocks until a second one arrives at the barrier
        let h1 = {
            let hive = Arc::clone(&hive);
            tokio::spawn(async move { hive.dispatch(Action::new("g1", "wait")).await })
        };
        let h2 = {
            let hive = Arc::clone(&hive);
            tokio::spawn(async move { hive.dispatch(Action::new("g1", "wait")).await })
        };

        let both = tokio::time::timeout(Duration::from_secs(5), async { (h1.await, h2.await) })
            .await
            .expect("actions on one bee did not run concurrently");
        assert!(both.0.unwrap().is_ok());
        assert!(both.1.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_reload_rebinds_options() {
        let hive = test_hive();
        hive.spawn(greeter("g1")).await.unwrap();

        let raw = BTreeMap::from([
            ("token".to_string(), serde_json::json!("secret")),
            ("greeting".to_string(), serde_json::json!("hey")),
        ]);
        hive.reload("g1", &raw).unwrap();

        let out = hive
            .dispatch(Action::new("g1", "greet").with_option("name", "amy"))
            .await
            .unwrap();
        assert_eq!(out.value("text").and_then(|v| v.as_str()), Some("hey amy"));
        assert_eq!(hive.get("g1").unwrap().state(), BeeState::Running);
    }

    #[tokio::test]
    async fn test_stop_and_shutdown_all() {
        let hive = test_hive();
        let g1 = hive.spawn(greeter("g1")).await.unwrap();
        let g2 = hive.spawn(greeter("g2")).await.unwrap();
        hive.spawn(greeter("g3")).await.unwrap();

        hive.stop("g1").await.unwrap();
        assert_eq!(g1.state(), BeeState::Stopped);
        assert_eq!(hive.stop("g1").await, Err(HiveError::UnknownBee("g1".to_string())));
        assert_eq!(hive.len(), 2);

        hive.shutdown_all().await;
        assert!(hive.is_empty());
        assert_eq!(g2.state(), BeeState::Stopped);
    }
}
