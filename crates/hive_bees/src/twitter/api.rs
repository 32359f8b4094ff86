//! Twitter API client
//!
//! [`HttpTwitterApi`] talks to the v2 REST API using the account's user
//! access token as a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

const API_BASE: &str = "https://api.twitter.com/2";

/// Default request timeout for API calls
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors from the Twitter API
#[derive(Debug, thiserror::Error)]
pub enum TwitterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Twitter API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("Missing access token")]
    MissingCredentials,
}

/// Result type for Twitter API calls
pub type TwitterResult<T> = Result<T, TwitterError>;

/// OAuth credentials bound from bee options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

/// A tweet as seen by the bee
#[derive(Debug, Clone, PartialEq)]
pub struct Tweet {
    pub id: String,
    /// Author handle
    pub username: String,
    pub text: String,
    pub url: String,
}

impl Tweet {
    /// Public URL of a tweet
    pub fn status_url(username: &str, id: &str) -> String {
        format!("https://twitter.com/{username}/status/{id}")
    }
}

/// Operations the Twitter bee needs
#[async_trait]
pub trait TwitterApi: Send + Sync + 'static {
    /// Post a status as the authenticated user
    async fn tweet(&self, status: &str) -> TwitterResult<Tweet>;

    async fn follow(&self, username: &str) -> TwitterResult<()>;

    async fn unfollow(&self, username: &str) -> TwitterResult<()>;

    /// Mentions newer than `since_id`, oldest first
    async fn mentions(&self, since_id: Option<&str>) -> TwitterResult<Vec<Tweet>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<UserData>,
}

#[derive(Debug, Clone, Deserialize)]
struct UserData {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Client
// ─────────────────────────────────────────────────────────────────────────────

/// Twitter v2 REST client
pub struct HttpTwitterApi {
    client: Client,
    token: String,
    me: OnceCell<UserData>,
}

impl HttpTwitterApi {
    pub fn new(credentials: &Credentials, timeout: Duration) -> TwitterResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("HiveBot/0.1")
            .build()?;
        Ok(Self {
            client,
            token: credentials.access_token.clone(),
            me: OnceCell::new(),
        })
    }

    fn request(&self, method: Method, path: &str) -> TwitterResult<RequestBuilder> {
        if self.token.is_empty() {
            return Err(TwitterError::MissingCredentials);
        }
        Ok(self
            .client
            .request(method, format!("{API_BASE}{path}"))
            .bearer_auth(&self.token))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> TwitterResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|e| e.detail.or(e.title))
                .unwrap_or(body);
            return Err(TwitterError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// The authenticated user, looked up once
    async fn me(&self) -> TwitterResult<&UserData> {
        self.me.get_or_try_init(|| self.fetch_me()).await
    }

    async fn fetch_me(&self) -> TwitterResult<UserData> {
        let envelope: Envelope<UserData> =
            self.send(self.request(Method::GET, "/users/me")?).await?;
        envelope
            .data
            .ok_or_else(|| TwitterError::UnknownUser("me".to_string()))
    }

    async fn user_id(&self, username: &str) -> TwitterResult<String> {
        let envelope: Envelope<UserData> = self
            .send(self.request(Method::GET, &format!("/users/by/username/{username}"))?)
            .await?;
        envelope
            .data
            .map(|u| u.id)
            .ok_or_else(|| TwitterError::UnknownUser(username.to_string()))
    }
}

#[async_trait]
impl TwitterApi for HttpTwitterApi {
    async fn tweet(&self, status: &str) -> TwitterResult<Tweet> {
        let me = self.me().await?;
        let envelope: Envelope<TweetData> = self
            .send(
                self.request(Method::POST, "/tweets")?
                    .json(&serde_json::json!({ "text": status })),
            )
            .await?;

        let data = envelope.data.ok_or_else(|| TwitterError::Api {
            status: 200,
            message: "response carried no tweet".to_string(),
        })?;

        Ok(Tweet {
            url: Tweet::status_url(&me.username, &data.id),
            id: data.id,
            username: me.username.clone(),
            text: data.text,
        })
    }

    async fn follow(&self, username: &str) -> TwitterResult<()> {
        let username = normalize_username(username)?;
        let me = self.me().await?;
        let target = self.user_id(username).await?;
        let _: serde_json::Value = self
            .send(
                self.request(Method::POST, &format!("/users/{}/following", me.id))?
                    .json(&serde_json::json!({ "target_user_id": target })),
            )
            .await?;
        Ok(())
    }

    async fn unfollow(&self, username: &str) -> TwitterResult<()> {
        let username = normalize_username(username)?;
        let me = self.me().await?;
        let target = self.user_id(username).await?;
        let _: serde_json::Value = self
            .send(self.request(Method::DELETE, &format!("/users/{}/following/{target}", me.id))?)
            .await?;
        Ok(())
    }

    async fn mentions(&self, since_id: Option<&str>) -> TwitterResult<Vec<Tweet>> {
        let me = self.me().await?;
        let mut query = vec![
            ("expansions", "author_id".to_string()),
            ("user.fields", "username".to_string()),
        ];
        if let Some(since_id) = since_id {
            query.push(("since_id", since_id.to_string()));
        }

        let envelope: Envelope<Vec<TweetData>> = self
            .send(
                self.request(Method::GET, &format!("/users/{}/mentions", me.id))?
                    .query(&query),
            )
            .await?;

        Ok(into_tweets(envelope))
    }
}

/// Strip a leading `@` and check the handle is safe to put in a URL path
///
/// Handles are 1 to 15 ASCII letters, digits or underscores.
fn normalize_username(username: &str) -> TwitterResult<&str> {
    let handle = username.trim().trim_start_matches('@');
    let valid = (1..=15).contains(&handle.len())
        && handle.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(handle)
    } else {
        Err(TwitterError::InvalidUsername(username.to_string()))
    }
}

/// Resolve authors and order mentions oldest first
fn into_tweets(envelope: Envelope<Vec<TweetData>>) -> Vec<Tweet> {
    let users = envelope.includes.users;
    let mut tweets: Vec<Tweet> = envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|t| {
            let username = t
                .author_id
                .as_deref()
                .and_then(|id| users.iter().find(|u| u.id == id))
                .map(|u| u.username.clone())
                .unwrap_or_default();
            Tweet {
                url: Tweet::status_url(&username, &t.id),
                id: t.id,
                username,
                text: t.text,
            }
        })
        .collect();
    tweets.reverse();
    tweets
}
