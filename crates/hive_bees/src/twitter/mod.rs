//! Twitter Bee
//!
//! Tweets, follows and unfollows on request, and reports new mentions of the
//! account while running.

mod api;

pub use api::*;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hive_runtime::{Bee, BeeCore, BeeError, BeeFactory, BeeResult, EventSender};
use hive_types::{
    Action, ActionDescriptor, Event, EventDescriptor, OptionDescriptor, Placeholders, Value,
    ValueType,
};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const FACTORY_ID: &str = "twitterbee";
const FACTORY_NAME: &str = "Twitter";

/// Default interval between mention polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

type ApiSlot = Arc<RwLock<Option<Arc<dyn TwitterApi>>>>;

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Builds [`TwitterBee`]s
pub struct TwitterBeeFactory {
    api: Option<Arc<dyn TwitterApi>>,
    poll_interval: Duration,
}

impl Default for TwitterBeeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TwitterBeeFactory {
    /// Bees talk to the Twitter HTTP API with their configured credentials
    pub fn new() -> Self {
        Self {
            api: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Bees use `api` regardless of their credentials
    pub fn with_api(api: Arc<dyn TwitterApi>) -> Self {
        Self {
            api: Some(api),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn build(&self, name: &str, description: &str) -> TwitterBee {
        TwitterBee {
            core: BeeCore::new(name, FACTORY_ID, description),
            credentials: RwLock::new(Credentials::default()),
            api: Arc::new(RwLock::new(self.api.clone())),
            fixed_api: self.api.is_some(),
            poll_interval: self.poll_interval,
            poller: Mutex::new(None),
        }
    }
}

fn string_option(name: &str, description: &str) -> OptionDescriptor {
    OptionDescriptor::new(name, description, ValueType::String)
}

fn url_option(name: &str, description: &str) -> OptionDescriptor {
    OptionDescriptor::new(name, description, ValueType::Url)
}

/// An event carrying the author, text and URL of a tweet
fn tweet_event(name: &str, description: &str) -> EventDescriptor {
    EventDescriptor::new(FACTORY_NAME, name, description)
        .with_option(string_option("username", "Twitter handle of the tweet's author"))
        .with_option(string_option("text", "Text content of the tweet"))
        .with_option(url_option("url", "URL of the tweet"))
}

impl BeeFactory for TwitterBeeFactory {
    fn id(&self) -> &str {
        FACTORY_ID
    }

    fn name(&self) -> &str {
        FACTORY_NAME
    }

    fn description(&self) -> &str {
        "Tweets and reacts to events in your Twitter timeline"
    }

    fn logo_color(&self) -> &str {
        "#00abec"
    }

    fn options(&self) -> Vec<OptionDescriptor> {
        vec![
            string_option("consumer_key", "Consumer key for Twitter API"),
            string_option("consumer_secret", "Consumer secret for Twitter API"),
            string_option("access_token", "Access token for Twitter API"),
            string_option("access_token_secret", "API secret for Twitter API"),
        ]
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![
            ActionDescriptor::new(FACTORY_NAME, "tweet", "Posts a new tweet").with_option(
                string_option("status", "Text of the status to tweet").mandatory(),
            ),
            ActionDescriptor::new(FACTORY_NAME, "follow", "Follows another user").with_option(
                string_option("username", "Twitter handle of the user you want to follow")
                    .mandatory(),
            ),
            ActionDescriptor::new(FACTORY_NAME, "unfollow", "Unfollows another user").with_option(
                string_option("username", "Twitter handle of the user you want to unfollow")
                    .mandatory(),
            ),
        ]
    }

    fn events(&self) -> Vec<EventDescriptor> {
        vec![
            EventDescriptor::new(
                FACTORY_NAME,
                "direct_message",
                "is triggered when someone sends you a direct message",
            )
            .with_option(string_option("username", "Twitter handle of the DM's author"))
            .with_option(string_option("text", "Text content of the DM")),
            EventDescriptor::new(FACTORY_NAME, "tweeted", "is triggered when you tweeted something")
                .with_option(string_option("text", "Text content of the tweet"))
                .with_option(url_option("url", "URL of the tweet")),
            tweet_event("tweet", "is triggered whenever someone you follow tweets"),
            tweet_event("mention", "is triggered whenever someone mentions you"),
            tweet_event("retweeted", "is triggered when someone retweets one of your tweets"),
            tweet_event("retweet", "is triggered when someone you follow retweets a tweet"),
            tweet_event("liked", "is triggered when someone likes one of your tweets"),
            tweet_event("like", "is triggered when someone you follow likes a tweet"),
            tweet_event("unliked", "is triggered when someone unlikes one of your tweets"),
            tweet_event("unlike", "is triggered when someone you follow unlikes a tweet"),
        ]
    }

    fn new_bee(&self, name: &str, description: &str, options: Placeholders) -> BeeResult<Arc<dyn Bee>> {
        let bee = self.build(name, description);
        bee.reload_options(options)?;
        Ok(Arc::new(bee))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bee
// ─────────────────────────────────────────────────────────────────────────────

/// A bee acting for one Twitter account
pub struct TwitterBee {
    core: BeeCore,
    credentials: RwLock<Credentials>,
    api: ApiSlot,
    /// The API was supplied by the factory and survives reloads
    fixed_api: bool,
    poll_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TwitterBee {
    /// Currently bound credentials
    pub fn credentials(&self) -> Credentials {
        self.credentials.read().clone()
    }

    fn current_api(&self) -> Option<Arc<dyn TwitterApi>> {
        let api = self.api.read().clone();
        if api.is_none() {
            tracing::warn!(bee = %self.core.name(), "No Twitter client configured");
        }
        api
    }

    async fn tweet(&self, action: &Action) -> BeeResult<()> {
        let mut status = String::new();
        action.options.bind("status", &mut status);
        let Some(api) = self.current_api() else {
            return Ok(());
        };

        match api.tweet(&status).await {
            Ok(tweet) => {
                tracing::info!(bee = %self.core.name(), url = %tweet.url, "Tweeted");
                let payload = Placeholders::new()
                    .with("text", tweet.text)
                    .with("url", Value::Url(tweet.url));
                self.core.emit("tweeted", payload).await
            }
            Err(e) => {
                tracing::warn!(bee = %self.core.name(), error = %e, "Failed to tweet");
                Ok(())
            }
        }
    }

    async fn follow(&self, action: &Action, follow: bool) -> BeeResult<()> {
        let mut username = String::new();
        action.options.bind("username", &mut username);
        let Some(api) = self.current_api() else {
            return Ok(());
        };

        let result = if follow {
            api.follow(&username).await
        } else {
            api.unfollow(&username).await
        };
        match result {
            Ok(()) => tracing::info!(bee = %self.core.name(), user = %username, follow, "Updated follow"),
            Err(e) => {
                tracing::warn!(bee = %self.core.name(), user = %username, error = %e, "Failed to update follow")
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Bee for TwitterBee {
    fn core(&self) -> &BeeCore {
        &self.core
    }

    fn reload_options(&self, options: Placeholders) -> BeeResult<()> {
        let mut credentials = self.credentials.read().clone();
        options.bind("consumer_key", &mut credentials.consumer_key);
        options.bind("consumer_secret", &mut credentials.consumer_secret);
        options.bind("access_token", &mut credentials.access_token);
        options.bind("access_token_secret", &mut credentials.access_token_secret);

        // Without an access token there is no client, so the poller stays idle
        if !self.fixed_api {
            let api: Option<Arc<dyn TwitterApi>> = if credentials.access_token.is_empty() {
                tracing::warn!(bee = %self.core.name(), "No access token, Twitter client disabled");
                None
            } else {
                let api = HttpTwitterApi::new(&credentials, DEFAULT_API_TIMEOUT)
                    .map_err(|e| BeeError::Internal(e.to_string()))?;
                Some(Arc::new(api))
            };
            *self.api.write() = api;
        }

        *self.credentials.write() = credentials;
        self.core.set_options(options);
        Ok(())
    }

    async fn run(&self, events: EventSender) -> BeeResult<()> {
        self.core.start(events.clone());

        let poller = tokio::spawn(poll_mentions(
            self.core.name().to_string(),
            Arc::clone(&self.api),
            events,
            self.poll_interval,
        ));
        if let Some(previous) = self.poller.lock().replace(poller) {
            previous.abort();
        }
        Ok(())
    }

    async fn action(&self, action: Action) -> BeeResult<Placeholders> {
        match action.name.as_str() {
            "tweet" => self.tweet(&action).await?,
            "follow" => self.follow(&action, true).await?,
            "unfollow" => self.follow(&action, false).await?,
            _ => return Err(self.core.unknown_action(&action)),
        }
        Ok(Placeholders::new())
    }

    async fn stop(&self) -> BeeResult<()> {
        if let Some(poller) = self.poller.lock().take() {
            poller.abort();
        }
        self.core.stop();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mention Poller
// ─────────────────────────────────────────────────────────────────────────────

/// Emit `mention` events for mentions newer than the first poll
async fn poll_mentions(bee: String, api: ApiSlot, events: EventSender, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut since_id: Option<String> = None;
    let mut primed = false;

    loop {
        ticker.tick().await;

        let current = api.read().clone();
        let Some(client) = current else {
            continue;
        };

        let mentions = match client.mentions(since_id.as_deref()).await {
            Ok(mentions) => mentions,
            Err(e) => {
                tracing::warn!(bee = %bee, error = %e, "Failed to poll mentions");
                continue;
            }
        };

        if let Some(newest) = mentions.last() {
            since_id = Some(newest.id.clone());
        }

        // The first poll only marks where new mentions start
        if !primed {
            primed = true;
            tracing::debug!(bee = %bee, since_id = ?since_id, "Mention poller primed");
            continue;
        }

        for mention in mentions {
            let payload = Placeholders::new()
                .with("username", mention.username)
                .with("text", mention.text)
                .with("url", Value::Url(mention.url));

            if events.send(Event::new(&bee, "mention", payload)).await.is_err() {
                tracing::debug!(bee = %bee, "Event bus closed, mention poller exiting");
                return;
            }
        }
    }
}
