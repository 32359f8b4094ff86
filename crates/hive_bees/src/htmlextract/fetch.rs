//! Page fetching and metadata extraction

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

/// Default request timeout for page fetches
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors while fetching a page
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),
}

/// Result type for page fetches
pub type FetchResult<T> = Result<T, FetchError>;

/// A downloaded page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: Url,
    pub html: String,
}

/// Source of HTML pages
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Fetcher
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches pages over HTTP(S) with reqwest
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent("Mozilla/5.0 (compatible; HiveBot/0.1)")
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let response = self.client.get(parsed).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let final_url = response.url().clone();
        let html = response.text().await?;
        Ok(FetchedPage { final_url, html })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata pulled out of a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageInfo {
    pub title: String,
    pub domain: String,
    pub top_image: String,
    pub final_url: String,
    pub meta_description: String,
    pub meta_keywords: String,
}

/// Cut a URL out of free text
///
/// Starts at the first `http` and ends before the next space. Text without
/// `http` is returned unchanged.
pub fn trim_url(text: &str) -> &str {
    let Some(start) = text.find("http") else {
        return text;
    };
    let url = &text[start..];
    match url.find(' ') {
        Some(end) => &url[..end],
        None => url,
    }
}

/// Extract title, image and meta tags from a page
pub fn extract_metadata(html: &str, final_url: &Url) -> PageInfo {
    let document = Html::parse_document(html);

    let get_meta = |key: &str| -> Option<String> {
        let selector =
            Selector::parse(&format!(r#"meta[property="{key}"], meta[name="{key}"]"#)).ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let title = get_meta("og:title")
        .or_else(|| {
            let selector = Selector::parse("title").ok()?;
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>())
        })
        .unwrap_or_default()
        .replace('\n', " ")
        .trim()
        .to_string();

    let top_image = get_meta("og:image")
        .or_else(|| get_meta("twitter:image"))
        .map(|src| resolve_image(&src, final_url))
        .unwrap_or_default();

    PageInfo {
        title,
        domain: final_url.host_str().unwrap_or_default().to_string(),
        top_image,
        final_url: final_url.to_string(),
        meta_description: get_meta("description")
            .or_else(|| get_meta("og:description"))
            .unwrap_or_default(),
        meta_keywords: get_meta("keywords").unwrap_or_default(),
    }
}

/// Absolute image URL, blank for inline data images
fn resolve_image(src: &str, base: &Url) -> String {
    let resolved = match base.join(src) {
        Ok(url) if url.scheme() == "data" => return String::new(),
        Ok(url) => url.to_string(),
        Err(_) => src.to_string(),
    };

    if resolved.starts_with("http://data:image") {
        String::new()
    } else {
        resolved
    }
}
