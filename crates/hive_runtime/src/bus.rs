//! Event Bus
//!
//! One shared, ordered conduit from every bee to every subscriber.
//!
//! Bees send through cloned [`EventSender`]s into a single bounded queue. A
//! dispatcher task pops events in order and forwards each one to the bounded
//! queue of every matching [`Subscription`]. Both hops wait for capacity, so a
//! slow subscriber slows senders down instead of losing events, and events
//! from one sender reach every subscriber in the order they were sent.
//!
//! A subscriber whose queue stays full for longer than the stall timeout is
//! evicted: its subscription ends after the events already queued for it, and
//! delivery to everyone else resumes. Shutdown drains under the same bound.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use hive_types::Event;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use wildmatch::WildMatch;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration & Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Queue sizes for the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Capacity of the shared inbound queue
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Capacity of each subscriber's queue
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,

    /// How long a full subscriber queue may block delivery before the
    /// subscriber is evicted, in milliseconds
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

fn default_capacity() -> usize {
    1024
}

fn default_subscriber_capacity() -> usize {
    256
}

fn default_stall_timeout_ms() -> u64 {
    30_000
}

impl BusConfig {
    /// Stall timeout as a [`Duration`]
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms.max(1))
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

/// Errors from the event bus
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("Event bus closed")]
    Closed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Sender
// ─────────────────────────────────────────────────────────────────────────────

/// A handle bees use to put events on the bus
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Send an event, waiting while the bus is full
    pub async fn send(&self, event: Event) -> Result<(), BusError> {
        self.tx.send(event).await.map_err(|_| BusError::Closed)
    }

    /// Check whether the bus has shut down
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscriptions
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selects events by `<bee>/<event>` key
///
/// Patterns are wildcard matches:
/// - `*` matches everything
/// - `extractor/*` matches every event of the `extractor` bee
/// - `*/mention` matches `mention` events from any bee
#[derive(Debug, Clone)]
pub struct EventFilter {
    patterns: Vec<WildMatch>,
}

impl EventFilter {
    /// Match every event
    pub fn all() -> Self {
        Self::new(["*"])
    }

    /// Match events whose key matches any of the patterns
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns.into_iter().map(|p| WildMatch::new(p.as_ref())).collect(),
        }
    }

    /// Check whether an event passes this filter
    pub fn matches(&self, event: &Event) -> bool {
        let key = event.key();
        self.patterns.iter().any(|p| p.matches(&key))
    }
}

/// A subscriber's end of the bus
///
/// Dropping it leaves the bus; the dispatcher prunes closed queues.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Subscription identifier, usable with [`EventBus::unsubscribe`]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the subscription was removed or the bus shut down
    /// and all queued events were received.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

struct Subscriber {
    filter: EventFilter,
    tx: mpsc::Sender<Event>,
}

type Subscribers = Arc<DashMap<SubscriptionId, Subscriber>>;

// ─────────────────────────────────────────────────────────────────────────────
// Event Bus
// ─────────────────────────────────────────────────────────────────────────────

/// The shared publish/subscribe bus, owned by the host
pub struct EventBus {
    tx: mpsc::Sender<Event>,
    subscribers: Subscribers,
    shutdown: Arc<Notify>,
    closed: Arc<RwLock<bool>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    subscriber_capacity: usize,
}

impl EventBus {
    /// Create the bus and start its dispatcher task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: BusConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let subscribers: Subscribers = Arc::new(DashMap::new());
        let shutdown = Arc::new(Notify::new());
        let closed = Arc::new(RwLock::new(false));

        let dispatcher = tokio::spawn(run_dispatcher(
            rx,
            Arc::clone(&subscribers),
            Arc::clone(&shutdown),
            Arc::clone(&closed),
            config.stall_timeout(),
        ));

        Self {
            tx,
            subscribers,
            shutdown,
            closed,
            dispatcher: Mutex::new(Some(dispatcher)),
            subscriber_capacity: config.subscriber_capacity.max(1),
        }
    }

    /// Create a new bus wrapped in an Arc
    pub fn new_shared(config: BusConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Get a sender handle for a bee
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Publish an event directly (host-originated events)
    pub async fn publish(&self, event: Event) -> Result<(), BusError> {
        self.sender().send(event).await
    }

    /// Join the bus
    ///
    /// The subscription only sees events dispatched after this call. On a bus
    /// that has shut down the subscription is already closed.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        let id = SubscriptionId::new();

        // Held while inserting so the dispatcher cannot clear the map in between
        let closed = self.closed.read();
        if *closed {
            tracing::debug!(subscription = %id, "Subscribed to a closed bus");
            return Subscription { id, rx };
        }
        self.subscribers.insert(id, Subscriber { filter, tx });
        drop(closed);

        tracing::debug!(subscription = %id, "Subscriber joined");
        Subscription { id, rx }
    }

    /// Leave the bus
    ///
    /// Events already queued for the subscription can still be received.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscription = %id, "Subscriber left");
        }
        removed
    }

    /// Number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Close the bus
    ///
    /// Further sends fail with [`BusError::Closed`]. Events already queued are
    /// still delivered before the dispatcher exits and subscriptions end; a
    /// subscriber that stops reading is evicted after the stall timeout.
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = ?e, "Event dispatcher panicked");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

async fn run_dispatcher(
    mut rx: mpsc::Receiver<Event>,
    subscribers: Subscribers,
    shutdown: Arc<Notify>,
    closed: Arc<RwLock<bool>>,
    stall_timeout: Duration,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                tracing::debug!("Event bus shutting down");
                rx.close();
                while let Some(event) = rx.recv().await {
                    deliver(&subscribers, event, stall_timeout).await;
                }
                break;
            }

            event = rx.recv() => match event {
                Some(event) => deliver(&subscribers, event, stall_timeout).await,
                None => break,
            },
        }
    }

    *closed.write() = true;
    subscribers.clear();
    tracing::debug!("Event dispatcher stopped");
}

/// Forward one event to every matching subscriber, in subscription order
async fn deliver(subscribers: &Subscribers, event: Event, stall_timeout: Duration) {
    // Snapshot the targets so no map shard lock is held across an await
    let targets: Vec<(SubscriptionId, mpsc::Sender<Event>)> = subscribers
        .iter()
        .filter(|entry| entry.value().filter.matches(&event))
        .map(|entry| (*entry.key(), entry.value().tx.clone()))
        .collect();

    tracing::trace!(event = %event.key(), targets = targets.len(), "Dispatching event");

    for (id, tx) in targets {
        match tokio::time::timeout(stall_timeout, tx.send(event.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                subscribers.remove(&id);
                tracing::debug!(subscription = %id, "Pruned closed subscriber");
            }
            Err(_) => {
                subscribers.remove(&id);
                tracing::warn!(
                    subscription = %id,
                    event = %event.key(),
                    timeout_ms = stall_timeout.as_millis() as u64,
                    "Evicted subscriber that stopped reading"
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hive_types::Placeholders;
    use std::time::Duration;

    fn event(bee: &str, name: &str, seq: i64) -> Event {
        Event::new(bee, name, Placeholders::new().with("seq", seq))
    }

    fn seq(event: &Event) -> i64 {
        event.get("seq").and_then(|v| v.as_i64()).unwrap()
    }

    #[test]
    fn test_filter_patterns() {
        let e = event("extractor", "info_extracted", 0);
        assert!(EventFilter::all().matches(&e));
        assert!(EventFilter::new(["extractor/*"]).matches(&e));
        assert!(EventFilter::new(["*/info_extracted"]).matches(&e));
        assert!(!EventFilter::new(["twitter/*"]).matches(&e));
        assert!(EventFilter::new(["twitter/*", "extractor/info_extracted"]).matches(&e));
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new(BusConfig::default());
        let mut a = bus.subscribe(EventFilter::all());
        let mut b = bus.subscribe(EventFilter::all());

        bus.publish(event("bee", "ping", 1)).await.unwrap();

        assert_eq!(seq(&a.recv().await.unwrap()), 1);
        assert_eq!(seq(&b.recv().await.unwrap()), 1);
    }

    #[tokio::test]
    async fn test_filtered_subscriber_skips_other_events() {
        let bus = EventBus::new(BusConfig::default());
        let mut only_twitter = bus.subscribe(EventFilter::new(["twitter/*"]));

        bus.publish(event("extractor", "info_extracted", 1)).await.unwrap();
        bus.publish(event("twitter", "mention", 2)).await.unwrap();

        assert_eq!(seq(&only_twitter.recv().await.unwrap()), 2);
    }

    #[tokio::test]
    async fn test_per_sender_fifo_under_backpressure() {
        // Tiny queues so senders block while the subscriber lags behind
        let bus = EventBus::new(BusConfig {
            capacity: 2,
            subscriber_capacity: 1,
            ..BusConfig::default()
        });
        let mut sub = bus.subscribe(EventFilter::all());

        let mut producers = Vec::new();
        for bee in ["a", "b", "c"] {
            let sender = bus.sender();
            producers.push(tokio::spawn(async move {
                for i in 0..50 {
                    sender.send(event(bee, "tick", i)).await.unwrap();
                }
            }));
        }

        let mut last = std::collections::HashMap::new();
        for _ in 0..150 {
            let e = sub.recv().await.unwrap();
            let prev = last.insert(e.bee.clone(), seq(&e));
            if let Some(prev) = prev {
                assert!(seq(&e) > prev, "events from {} out of order", e.bee);
            }
        }

        for p in producers {
            p.await.unwrap();
        }
        assert_eq!(last.len(), 3);
        assert!(last.values().all(|&s| s == 49));
    }

    #[tokio::test]
    async fn test_unsubscribe_and_drop_leave_bus() {
        let bus = EventBus::new(BusConfig::default());
        let a = bus.subscribe(EventFilter::all());
        let b = bus.subscribe(EventFilter::all());
        assert_eq!(bus.subscriber_count(), 2);

        assert!(bus.unsubscribe(a.id()));
        assert!(!bus.unsubscribe(a.id()));
        assert_eq!(bus.subscriber_count(), 1);

        // Dropped subscriptions are pruned on the next delivery
        drop(b);
        bus.publish(event("bee", "ping", 1)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while bus.subscriber_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_closes() {
        let bus = EventBus::new(BusConfig::default());
        let mut sub = bus.subscribe(EventFilter::all());
        let sender = bus.sender();

        sender.send(event("bee", "last", 7)).await.unwrap();
        bus.shutdown().await;

        assert_eq!(seq(&sub.recv().await.unwrap()), 7);
        assert!(sub.recv().await.is_none());
        assert_eq!(sender.send(event("bee", "late", 8)).await, Err(BusError::Closed));
        assert!(sender.is_closed());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_is_closed() {
        let bus = EventBus::new(BusConfig::default());
        bus.shutdown().await;

        let mut sub = bus.subscribe(EventFilter::all());
        let next = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("subscription on a closed bus must end");
        assert!(next.is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }

    fn stalling_config() -> BusConfig {
        BusConfig {
            capacity: 2,
            subscriber_capacity: 1,
            stall_timeout_ms: 50,
        }
    }

    #[tokio::test]
    async fn test_stuck_subscriber_is_evicted() {
        let bus = EventBus::new(stalling_config());
        let mut stuck = bus.subscribe(EventFilter::new(["a/*"]));
        let mut other = bus.subscribe(EventFilter::new(["b/*"]));

        for i in 0..3 {
            bus.publish(event("a", "x", i)).await.unwrap();
        }
        bus.publish(event("b", "y", 9)).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(2), other.recv())
            .await
            .expect("unrelated subscriber must not stall behind a stuck one")
            .unwrap();
        assert_eq!(seq(&got), 9);
        assert_eq!(bus.subscriber_count(), 1);

        // The evicted subscription keeps what was queued, then ends
        assert_eq!(seq(&stuck.recv().await.unwrap()), 0);
        assert!(stuck.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_completes_with_stuck_subscriber() {
        let bus = EventBus::new(stalling_config());
        let _stuck = bus.subscribe(EventFilter::all());
        let sender = bus.sender();

        sender.send(event("a", "x", 1)).await.unwrap();
        sender.send(event("a", "x", 2)).await.unwrap();
        sender.send(event("a", "x", 3)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), bus.shutdown())
            .await
            .expect("shutdown must finish even if a subscriber never reads");
        assert!(sender.is_closed());
    }
}
