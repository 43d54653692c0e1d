//! Run configuration: which sources to scrape and how politely.
//!
//! Configuration is read from an optional YAML file. Without one, the run
//! uses the built-in source list returned by [`HarvestConfig::builtin`].
//!
//! ```yaml
//! user_agent: "listing_harvest/0.1"
//! request_timeout_secs: 30
//! sources:
//!   - id: realestateinnepal.com
//!     strategy: realestateinnepal
//!     base_url: https://www.realestateinnepal.com/
//!     search_path: "search-result/page/{page}/?location=kathmandu"
//!     pages: 2
//!     min_interval_ms: 2000
//! ```

use crate::error::{Result, ScrapeError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

/// Placeholder replaced by the 1-based page number in `search_path`.
pub const PAGE_PLACEHOLDER: &str = "{page}";

#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    pub sources: Vec<SourceConfig>,
}

/// Read-only description of one source, shared by every page of its run.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Identifier stamped on every listing from this source.
    pub id: String,
    /// Registry key of the extraction strategy.
    pub strategy: String,
    pub base_url: Url,
    /// Listing path template relative to `base_url`.
    #[serde(default)]
    pub search_path: String,
    /// Maximum number of pages to visit.
    #[serde(default = "default_pages")]
    pub pages: usize,
    /// Minimum delay between two requests to this source.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Upper bound of random extra delay added to each wait.
    #[serde(default)]
    pub jitter_ms: u64,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_pages() -> usize {
    1
}
fn default_min_interval_ms() -> u64 {
    2000
}

impl SourceConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    /// URLs of the configured pages, in visiting order, without duplicates.
    ///
    /// A `search_path` without `{page}` gets the page number appended, except
    /// an empty path, which means the base URL itself is the only listing page.
    pub fn page_urls(&self) -> Result<Vec<Url>> {
        let mut urls: Vec<Url> = Vec::with_capacity(self.pages);
        for page in 1..=self.pages {
            let path = if self.search_path.is_empty() {
                String::new()
            } else if self.search_path.contains(PAGE_PLACEHOLDER) {
                self.search_path.replace(PAGE_PLACEHOLDER, &page.to_string())
            } else {
                format!("{}{}", self.search_path, page)
            };
            let url = self.base_url.join(&path).map_err(|e| {
                ScrapeError::Config(format!("source {}: bad search path {path:?}: {e}", self.id))
            })?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }
}

impl HarvestConfig {
    /// The sources the project was originally built around.
    pub fn builtin() -> Self {
        let source = |id: &str, strategy: &str, base: &str, path: &str, pages| SourceConfig {
            id: id.to_string(),
            strategy: strategy.to_string(),
            base_url: Url::parse(base).expect("built-in base URL is valid"),
            search_path: path.to_string(),
            pages,
            min_interval_ms: default_min_interval_ms(),
            jitter_ms: 0,
        };
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            sources: vec![
                source(
                    "realestateinnepal.com",
                    "realestateinnepal",
                    "https://www.realestateinnepal.com/",
                    "search-result/page/{page}/?location=kathmandu",
                    2,
                ),
                source(
                    "realestate.com.au/dubai",
                    "realestate-au-dubai",
                    "https://www.realestate.com.au/international/ae/dubai",
                    "",
                    3,
                ),
            ],
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load from `path`, or fall back to [`HarvestConfig::builtin`].
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let text = tokio::fs::read_to_string(p).await.map_err(|e| {
                    ScrapeError::Config(format!("cannot read {}: {e}", p.display()))
                })?;
                let config = Self::from_yaml(&text)?;
                info!(sources = config.sources.len(), "Loaded configuration file");
                Ok(config)
            }
            None => {
                info!("No configuration file given; using built-in sources");
                Ok(Self::builtin())
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Keep only the sources named in `ids`; an empty filter keeps all.
    pub fn retain_sources(&mut self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = ids.iter().find(|id| !self.sources.iter().any(|s| &s.id == *id)) {
            return Err(ScrapeError::Config(format!("unknown source {unknown:?}")));
        }
        self.sources.retain(|s| ids.contains(&s.id));
        Ok(())
    }

    pub fn override_min_interval(&mut self, millis: u64) {
        for source in &mut self.sources {
            source.min_interval_ms = millis;
        }
    }

    /// Structural checks that do not need the strategy registry.
    pub fn validate(&self) -> Result<()> {
        for (i, source) in self.sources.iter().enumerate() {
            if source.id.trim().is_empty() {
                return Err(ScrapeError::Config(format!("source #{i} has an empty id")));
            }
            if source.pages == 0 {
                return Err(ScrapeError::Config(format!("source {} has pages = 0", source.id)));
            }
            if !matches!(source.base_url.scheme(), "http" | "https") {
                return Err(ScrapeError::Config(format!(
                    "source {} base_url must be http(s)",
                    source.id
                )));
            }
            if self.sources[..i].iter().any(|s| s.id == source.id) {
                return Err(ScrapeError::Config(format!("duplicate source id {}", source.id)));
            }
        }
        Ok(())
    }
}
