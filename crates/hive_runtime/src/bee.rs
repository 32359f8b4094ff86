//! The bee runtime contract
//!
//! Every plugin instance implements [`Bee`]. Shared bookkeeping (identity,
//! current options, the event sender and lifecycle state) lives in
//! [`BeeCore`], which bee implementations embed.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use hive_types::{Action, Event, Placeholders};
use parking_lot::RwLock;

use crate::bus::EventSender;

// ─────────────────────────────────────────────────────────────────────────────
// Bee Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors a bee can raise
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BeeError {
    /// The action name is not one the bee handles
    #[error("Unknown action triggered in {bee}: {action}")]
    UnknownAction { bee: String, action: String },

    #[error("Bee not running: {0}")]
    NotRunning(String),

    #[error("Invalid options for {bee}: {reason}")]
    InvalidOptions { bee: String, reason: String },

    #[error("Event bus closed")]
    BusClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for bee operations
pub type BeeResult<T> = Result<T, BeeError>;

// ─────────────────────────────────────────────────────────────────────────────
// Bee State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a bee
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum BeeState {
    /// Built by its factory, no options bound yet
    Constructed = 0,
    /// Options bound at least once
    Configured = 1,
    /// `run` was called; the bee may emit events
    Running = 2,
    /// Torn down
    Stopped = 3,
}

impl BeeState {
    /// Convert from u8
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Constructed,
            1 => Self::Configured,
            2 => Self::Running,
            _ => Self::Stopped,
        }
    }

    /// Check if the bee is running
    pub fn is_running(&self) -> bool {
        *self == BeeState::Running
    }
}

impl std::fmt::Display for BeeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeeState::Constructed => write!(f, "constructed"),
            BeeState::Configured => write!(f, "configured"),
            BeeState::Running => write!(f, "running"),
            BeeState::Stopped => write!(f, "stopped"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bee Core
// ─────────────────────────────────────────────────────────────────────────────

/// State shared by every bee implementation
pub struct BeeCore {
    name: String,
    class: String,
    description: String,
    options: RwLock<Placeholders>,
    events: RwLock<Option<EventSender>>,
    state: AtomicU8,
}

impl BeeCore {
    /// Create the core of a freshly constructed bee
    pub fn new(
        name: impl Into<String>,
        class: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            description: description.into(),
            options: RwLock::new(Placeholders::new()),
            events: RwLock::new(None),
            state: AtomicU8::new(BeeState::Constructed as u8),
        }
    }

    /// Instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Factory id this bee was built from
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Instance description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current lifecycle state
    pub fn state(&self) -> BeeState {
        BeeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Store a new set of options
    ///
    /// Moves a constructed bee to `Configured`; a running bee stays running.
    pub fn set_options(&self, options: Placeholders) {
        *self.options.write() = options;
        let _ = self.state.compare_exchange(
            BeeState::Constructed as u8,
            BeeState::Configured as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Snapshot of the current options
    pub fn options(&self) -> Placeholders {
        self.options.read().clone()
    }

    /// Store the event sender and mark the bee running
    pub fn start(&self, events: EventSender) {
        *self.events.write() = Some(events);
        self.state.store(BeeState::Running as u8, Ordering::SeqCst);
        tracing::debug!(bee = %self.name, class = %self.class, "Bee running");
    }

    /// Drop the event sender and mark the bee stopped
    pub fn stop(&self) {
        self.events.write().take();
        self.state.store(BeeState::Stopped as u8, Ordering::SeqCst);
        tracing::debug!(bee = %self.name, "Bee stopped");
    }

    /// Emit an event from this bee
    ///
    /// Waits while the bus is full. Callers must not hold locks their own
    /// action handlers need while awaiting this.
    pub async fn emit(&self, name: impl Into<String>, options: Placeholders) -> BeeResult<()> {
        // Clone the sender so no lock is held while the bus applies backpressure
        let sender = self
            .events
            .read()
            .clone()
            .ok_or_else(|| BeeError::NotRunning(self.name.clone()))?;

        sender
            .send(Event::new(&self.name, name, options))
            .await
            .map_err(|_| BeeError::BusClosed)
    }

    /// The error for an action this bee does not handle
    pub fn unknown_action(&self, action: &Action) -> BeeError {
        BeeError::UnknownAction {
            bee: self.name.clone(),
            action: action.name.clone(),
        }
    }
}

impl std::fmt::Debug for BeeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeeCore")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("state", &self.state())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bee Trait
// ─────────────────────────────────────────────────────────────────────────────

/// The contract every plugin instance implements
///
/// All methods take `&self`: the host may call `action` concurrently with
/// other actions and with `reload_options`, so implementations synchronise
/// their own shared resources.
#[async_trait]
pub trait Bee: Send + Sync + 'static {
    /// Shared bookkeeping
    fn core(&self) -> &BeeCore;

    /// Instance name
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Current lifecycle state
    fn state(&self) -> BeeState {
        self.core().state()
    }

    /// Bind a new configuration
    ///
    /// Called once by the factory after construction and again on hot reload.
    fn reload_options(&self, options: Placeholders) -> BeeResult<()>;

    /// Start the bee
    ///
    /// Must return promptly. Bees with background work spawn it here.
    async fn run(&self, events: EventSender) -> BeeResult<()> {
        self.core().start(events);
        Ok(())
    }

    /// Handle one action
    ///
    /// Unknown action names return [`BeeError::UnknownAction`]. Failures of
    /// external integrations are not errors: the bee simply emits nothing.
    async fn action(&self, action: Action) -> BeeResult<Placeholders>;

    /// Tear the bee down
    async fn stop(&self) -> BeeResult<()> {
        self.core().stop();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusConfig, EventBus, EventFilter};

    struct EchoBee {
        core: BeeCore,
    }

    #[async_trait]
    impl Bee for EchoBee {
        fn core(&self) -> &BeeCore {
            &self.core
        }

        fn reload_options(&self, options: Placeholders) -> BeeResult<()> {
            self.core.set_options(options);
            Ok(())
        }

        async fn action(&self, action: Action) -> BeeResult<Placeholders> {
            match action.name.as_str() {
                "echo" => {
                    self.core.emit("echoed", action.options.clone()).await?;
                    Ok(action.options)
                }
                _ => Err(self.core.unknown_action(&action)),
            }
        }
    }

    fn echo_bee() -> EchoBee {
        EchoBee {
            core: BeeCore::new("echo", "echobee", "Echoes actions"),
        }
    }

    #[test]
    fn test_state_transitions() {
        let bee = echo_bee();
        assert_eq!(bee.state(), BeeState::Constructed);

        bee.reload_options(Placeholders::new().with("a", 1)).unwrap();
        assert_eq!(bee.state(), BeeState::Configured);
        assert_eq!(bee.core().options().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_while_running_keeps_running() {
        let bus = EventBus::new(BusConfig::default());
        let bee = echo_bee();
        bee.reload_options(Placeholders::new()).unwrap();
        bee.run(bus.sender()).await.unwrap();

        bee.reload_options(Placeholders::new().with("a", 2)).unwrap();
        assert_eq!(bee.state(), BeeState::Running);

        bee.stop().await.unwrap();
        assert_eq!(bee.state(), BeeState::Stopped);
    }

    #[tokio::test]
    async fn test_emit_before_run_fails() {
        let bee = echo_bee();
        let result = bee.core().emit("x", Placeholders::new()).await;
        assert_eq!(result, Err(BeeError::NotRunning("echo".to_string())));
    }

    #[tokio::test]
    async fn test_unknown_action_is_typed_and_silent() {
        let bus = EventBus::new(BusConfig::default());
        let mut sub = bus.subscribe(EventFilter::all());
        let bee = echo_bee();
        bee.run(bus.sender()).await.unwrap();

        let result = bee.action(Action::new("echo", "shout")).await;
        assert_eq!(
            result,
            Err(BeeError::UnknownAction {
                bee: "echo".to_string(),
                action: "shout".to_string(),
            })
        );

        // Nothing reached the bus
        bus.shutdown().await;
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_action_emits_event() {
        let bus = EventBus::new(BusConfig::default());
        let mut sub = bus.subscribe(EventFilter::all());
        let bee = echo_bee();
        bee.run(bus.sender()).await.unwrap();

        let out = bee
            .action(Action::new("echo", "echo").with_option("msg", "hi"))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.key(), "echo/echoed");
        assert_eq!(event.get_str("msg"), Some("hi"));
    }
}
