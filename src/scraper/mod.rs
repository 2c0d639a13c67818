//! Content scrapers: one per content kind

use anyhow::Result;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::models::{Candidate, ContentKind};

pub mod image;
pub mod pdf;
pub mod video;

pub use image::ImageScraper;
pub use pdf::PdfScraper;
pub use video::{VideoScraper, YtDlp};

/// Source of candidates for one content kind.
///
/// `find` returns a lazy, finite stream of at most `limit` candidates. Upstream
/// failures are logged and end the stream early; they never surface as errors.
pub trait ContentScraper: Send + Sync {
    fn kind(&self) -> ContentKind;

    fn find<'a>(&'a self, keyword: &'a str, limit: usize) -> BoxStream<'a, Candidate>;

    /// Download the payload of a candidate that passed deduplication, before it is stored.
    ///
    /// Called only when a storage relay will take the payload. `None` marks the
    /// candidate as failed. Kinds whose payload the relay fetches from the URL keep
    /// the default, which passes the candidate through.
    fn fetch_media<'a>(&'a self, candidate: Candidate) -> BoxFuture<'a, Option<Candidate>> {
        future::ready(Some(candidate)).boxed()
    }
}

/// Shared HTTP client for search services
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// Truncate on a char boundary
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Scrapers registered by content kind
#[derive(Clone, Default)]
pub struct ScraperSet {
    scrapers: HashMap<ContentKind, Arc<dyn ContentScraper>>,
}

impl ScraperSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the PDF, image and video scrapers from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client(&config.scraping.user_agent, config.scraping.request_timeout())?;

        let set = Self::new()
            .with(Arc::new(PdfScraper::new(client.clone(), &config.pdf)))
            .with(Arc::new(ImageScraper::new(client, &config.image)))
            .with(Arc::new(VideoScraper::from_config(&config.video)));

        info!("🔌 Registered scrapers: {:?}", set.kinds());
        Ok(set)
    }

    /// Register a scraper, replacing any previous one for the same kind
    pub fn with(mut self, scraper: Arc<dyn ContentScraper>) -> Self {
        self.scrapers.insert(scraper.kind(), scraper);
        self
    }

    pub fn get(&self, kind: ContentKind) -> Option<Arc<dyn ContentScraper>> {
        self.scrapers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ContentKind) -> bool {
        self.scrapers.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ContentKind> {
        let mut kinds: Vec<ContentKind> = self.scrapers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
