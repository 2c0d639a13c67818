use anyhow::{anyhow, Result};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{truncate, ContentScraper};
use crate::config::ImageConfig;
use crate::models::{Candidate, ContentKind};

const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

/// Pause between result pages
const PAGE_DELAY: Duration = Duration::from_millis(1500);

/// Metadata Bing embeds in the `m` attribute of each result link
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct BingImage {
    /// Image URL
    #[serde(default)]
    pub murl: String,
    /// Page title
    #[serde(default)]
    pub t: String,
    #[serde(default)]
    pub desc: String,
    /// Page URL
    #[serde(default)]
    pub purl: String,
}

/// Extract result metadata from a Bing async results page
pub fn parse_results(html: &str) -> Vec<BingImage> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.iusc") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|link| link.value().attr("m"))
        .filter_map(|m| serde_json::from_str::<BingImage>(m).ok())
        .filter(|image| !image.murl.is_empty())
        .collect()
}

fn has_image_extension(url: &str) -> bool {
    let lower = url.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Host without a leading `www.`, lower-cased
fn bare_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Image search over Bing's async results endpoint
pub struct ImageScraper {
    client: reqwest::Client,
    config: ImageConfig,
}

impl ImageScraper {
    pub fn new(client: reqwest::Client, config: &ImageConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    fn is_excluded_domain(&self, url: &str) -> bool {
        let Some(host) = bare_host(url) else {
            return false;
        };
        self.config
            .excluded_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
    }

    fn contains_blocked_term(&self, image: &BingImage) -> bool {
        let text = format!("{} {} {}", image.t, image.desc, image.purl).to_lowercase();
        self.config.blocked_terms.iter().any(|term| text.contains(term.as_str()))
    }

    /// Enough keyword terms appear in title, description or page URL
    fn is_relevant(&self, keyword: &str, image: &BingImage) -> bool {
        if image.t.is_empty() {
            return true;
        }
        let text = format!("{} {} {}", image.t, image.desc, image.purl).to_lowercase();
        let terms: Vec<String> = keyword.split_whitespace().map(str::to_lowercase).collect();
        let matches = terms.iter().filter(|term| text.contains(term.as_str())).count();
        let required = if terms.len() > 2 { 2 } else { 1 };
        matches >= required
    }

    /// Apply the relevance filters and build a candidate
    pub fn accept(&self, keyword: &str, image: BingImage) -> Option<Candidate> {
        if !has_image_extension(&image.murl) {
            return None;
        }
        if self.is_excluded_domain(&image.murl)
            || (!image.purl.is_empty() && self.is_excluded_domain(&image.purl))
        {
            debug!("🚫 Excluded domain: {}", image.murl);
            return None;
        }
        if self.contains_blocked_term(&image) {
            debug!("🚫 Blocked term in result: {}", image.murl);
            return None;
        }
        if self.config.require_keyword_match && !self.is_relevant(keyword, &image) {
            return None;
        }

        let title = if image.t.is_empty() {
            keyword.to_string()
        } else {
            truncate(&image.t, 200)
        };
        Some(
            Candidate::new(ContentKind::Image, image.murl, title)
                .with_description(truncate(&image.desc, 500)),
        )
    }

    fn page_url(&self, keyword: &str, page: usize) -> String {
        format!(
            "{}?q={}&first={}&count={}&adlt=off",
            self.config.endpoint,
            urlencoding::encode(keyword),
            page * self.config.images_per_page,
            self.config.images_per_page
        )
    }

    async fn fetch_page(&self, keyword: &str, page: usize) -> Result<Vec<BingImage>> {
        if page > 0 {
            tokio::time::sleep(PAGE_DELAY).await;
        }

        let response = self.client.get(self.page_url(keyword, page)).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Bing returned {}", response.status()));
        }
        let html = response.text().await?;
        Ok(parse_results(&html))
    }
}

impl ContentScraper for ImageScraper {
    fn kind(&self) -> ContentKind {
        ContentKind::Image
    }

    fn find<'a>(&'a self, keyword: &'a str, limit: usize) -> BoxStream<'a, Candidate> {
        stream::iter(0..self.config.max_pages)
            .then(move |page| async move {
                match self.fetch_page(keyword, page).await {
                    Ok(results) => results,
                    Err(e) => {
                        warn!("⚠️ Image page {} for '{}' failed: {}", page + 1, keyword, e);
                        Vec::new()
                    }
                }
            })
            // An empty or failed page ends the search
            .take_while(|results| future::ready(!results.is_empty()))
            .flat_map(stream::iter)
            .filter_map(move |image| future::ready(self.accept(keyword, image)))
            .scan(HashSet::new(), |seen, candidate| {
                let fresh = seen.insert(candidate.url.clone());
                future::ready(Some(fresh.then_some(candidate)))
            })
            .filter_map(future::ready)
            .take(limit)
            .boxed()
    }
}
