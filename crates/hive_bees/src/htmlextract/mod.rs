//! HTML Extractor Bee
//!
//! Fetches the page a piece of text links to and emits `info_extracted` with
//! the page's title and metadata.

mod fetch;

pub use fetch::*;

use std::sync::Arc;

use async_trait::async_trait;
use hive_runtime::{Bee, BeeCore, BeeError, BeeFactory, BeeResult};
use hive_types::{
    Action, ActionDescriptor, EventDescriptor, OptionDescriptor, Placeholders, Value, ValueType,
};

const FACTORY_ID: &str = "htmlextractbee";
const FACTORY_NAME: &str = "HTML Extractor";

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Builds [`HtmlExtractBee`]s
pub struct HtmlExtractFactory {
    fetcher: Option<Arc<dyn PageFetcher>>,
}

impl Default for HtmlExtractFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlExtractFactory {
    /// Bees fetch pages over HTTP
    pub fn new() -> Self {
        Self { fetcher: None }
    }

    /// Bees fetch pages through `fetcher`
    pub fn with_fetcher(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher: Some(fetcher),
        }
    }
}

impl BeeFactory for HtmlExtractFactory {
    fn id(&self) -> &str {
        FACTORY_ID
    }

    fn name(&self) -> &str {
        FACTORY_NAME
    }

    fn description(&self) -> &str {
        "Extracts information from URLs"
    }

    fn logo_color(&self) -> &str {
        "#ffffff"
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![
            ActionDescriptor::new(FACTORY_NAME, "extract", "Extracts information from a URL")
                .with_option(
                    OptionDescriptor::new("url", "The URL to extract information from", ValueType::String)
                        .mandatory(),
                ),
        ]
    }

    fn events(&self) -> Vec<EventDescriptor> {
        let text = |name: &str, description: &str| {
            OptionDescriptor::new(name, description, ValueType::String)
        };
        let url = |name: &str, description: &str| OptionDescriptor::new(name, description, ValueType::Url);

        vec![
            EventDescriptor::new(FACTORY_NAME, "info_extracted", "Information has been extracted")
                .with_option(text("title", "Title of the website"))
                .with_option(text("domain", "Domain of the website"))
                .with_option(url("top_image", "URL of the most prominent image"))
                .with_option(url("final_url", "URL after redirects"))
                .with_option(text("meta_description", "Meta description of the website"))
                .with_option(text("meta_keywords", "Meta keywords of the website")),
        ]
    }

    fn new_bee(&self, name: &str, description: &str, options: Placeholders) -> BeeResult<Arc<dyn Bee>> {
        let fetcher: Arc<dyn PageFetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(
                HttpFetcher::new(DEFAULT_FETCH_TIMEOUT)
                    .map_err(|e| BeeError::Internal(e.to_string()))?,
            ),
        };

        let bee = HtmlExtractBee {
            core: BeeCore::new(name, FACTORY_ID, description),
            fetcher,
        };
        bee.reload_options(options)?;
        Ok(Arc::new(bee))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bee
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts metadata from linked web pages
pub struct HtmlExtractBee {
    core: BeeCore,
    fetcher: Arc<dyn PageFetcher>,
}

impl HtmlExtractBee {
    async fn extract(&self, action: &Action) -> BeeResult<()> {
        let mut text = String::new();
        action.options.bind("url", &mut text);
        let url = trim_url(&text);

        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(bee = %self.core.name(), url = %url, error = %e, "Failed to fetch page");
                return Ok(());
            }
        };

        let info = extract_metadata(&page.html, &page.final_url);
        if info.title.is_empty() {
            tracing::debug!(bee = %self.core.name(), url = %url, "Page has no title, nothing extracted");
            return Ok(());
        }

        let payload = Placeholders::new()
            .with("title", info.title)
            .with("domain", info.domain)
            .with("top_image", Value::Url(info.top_image))
            .with("final_url", Value::Url(info.final_url))
            .with("meta_description", info.meta_description)
            .with("meta_keywords", info.meta_keywords);

        self.core.emit("info_extracted", payload).await
    }
}

#[async_trait]
impl Bee for HtmlExtractBee {
    fn core(&self) -> &BeeCore {
        &self.core
    }

    fn reload_options(&self, options: Placeholders) -> BeeResult<()> {
        self.core.set_options(options);
        Ok(())
    }

    async fn action(&self, action: Action) -> BeeResult<Placeholders> {
        match action.name.as_str() {
            "extract" => {
                self.extract(&action).await?;
                Ok(Placeholders::new())
            }
            _ => Err(self.core.unknown_action(&action)),
        }
    }
}
