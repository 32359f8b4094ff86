//! Application wiring
//!
//! Starts the bus, the hive, the chain runner and the event log from a
//! [`HiveConfig`], and tears them down again in order.

use std::collections::HashSet;
use std::sync::Arc;

use hive_runtime::{ChainRunner, EventBus, EventFilter, FactoryRegistry, Hive};
use tokio::task::JoinHandle;

use crate::config::HiveConfig;

/// A running hive with its background tasks
pub struct App {
    hive: Arc<Hive>,
    chain_runner: JoinHandle<()>,
    event_log: JoinHandle<()>,
}

impl App {
    /// Start everything described by `config`
    ///
    /// Chains and the event log subscribe before any bee runs, so no early
    /// event is missed. A bee that fails to spawn is logged and skipped.
    pub async fn start(config: HiveConfig, registry: Arc<FactoryRegistry>) -> Self {
        let bus = EventBus::new_shared(config.bus.clone());
        let hive = Hive::new_shared(registry, bus);

        check_chains(&config);
        let chain_runner = ChainRunner::new(Arc::clone(&hive), config.chains).spawn();
        let event_log = spawn_event_log(hive.bus());

        for bee in config.bees {
            let name = bee.name.clone();
            if let Err(e) = hive.spawn(bee).await {
                tracing::error!(bee = %name, error = %e, "Failed to start bee");
            }
        }

        let bees = hive.list();
        if bees.is_empty() {
            tracing::info!("No bees running");
        } else {
            for bee in &bees {
                tracing::info!(bee = %bee.name, class = %bee.class, state = %bee.state, "Bee ready");
            }
        }

        Self {
            hive,
            chain_runner,
            event_log,
        }
    }

    /// The running hive
    pub fn hive(&self) -> &Arc<Hive> {
        &self.hive
    }

    /// Stop every bee, then drain and close the bus
    pub async fn shutdown(self) {
        tracing::info!("Shutting down hive");
        self.hive.shutdown_all().await;
        self.hive.bus().shutdown().await;

        if let Err(e) = self.chain_runner.await {
            tracing::warn!(error = ?e, "Chain runner ended abnormally");
        }
        if let Err(e) = self.event_log.await {
            tracing::warn!(error = ?e, "Event log ended abnormally");
        }
        tracing::info!("Hive shutdown complete");
    }
}

/// Warn about chains that point at bees the configuration never starts
fn check_chains(config: &HiveConfig) {
    let bees: HashSet<&str> = config.bees.iter().map(|b| b.name.as_str()).collect();

    for chain in &config.chains {
        for action in &chain.actions {
            if !bees.contains(action.bee.as_str()) {
                tracing::warn!(chain = %chain.name, bee = %action.bee, "Chain targets an unknown bee");
            }
        }
    }
}

/// Log every event on the bus until it shuts down
fn spawn_event_log(bus: &EventBus) -> JoinHandle<()> {
    let mut subscription = bus.subscribe(EventFilter::all());

    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            tracing::info!(bee = %event.bee, event = %event.name, "Event");
            tracing::debug!(bee = %event.bee, event = %event.name, payload = %event.options.to_json(), "Event payload");
        }
    })
}
