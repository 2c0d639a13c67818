use anyhow::{anyhow, Result};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::{truncate, ContentScraper};
use crate::config::PdfConfig;
use crate::models::{Candidate, ContentKind};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaSearchRequest<'a> {
    query: &'a str,
    num_results: usize,
}

#[derive(Debug, Deserialize)]
struct ExaSearchResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    url: Option<String>,
    title: Option<String>,
    text: Option<String>,
}

/// Strip query and fragment; keep only direct links to `.pdf` files
pub fn clean_pdf_url(url: &str) -> Option<String> {
    let clean = url.split(['?', '#']).next().unwrap_or_default();
    if clean.starts_with("http") && clean.to_lowercase().ends_with(".pdf") {
        Some(clean.to_string())
    } else {
        None
    }
}

/// PDF search through the Exa API
pub struct PdfScraper {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    query_variations: Vec<String>,
}

impl PdfScraper {
    pub fn new(client: reqwest::Client, config: &PdfConfig) -> Self {
        match config.api_key {
            Some(_) => info!("✅ PDF scraper initialized with Exa API"),
            None => warn!("⚠️ PDF scraper: EXA_API_KEY not configured, PDF search disabled"),
        }

        Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            query_variations: config.query_variations.clone(),
        }
    }

    async fn search(&self, api_key: &str, query: &str, num_results: usize) -> Result<Vec<ExaResult>> {
        let request = ExaSearchRequest { query, num_results };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Exa API error {}: {}", status, text));
        }

        let body: ExaSearchResponse = response.json().await?;
        Ok(body.results)
    }

    /// Results of one query variation; failures yield nothing
    async fn query(&self, api_key: &str, keyword: &str, query: String, num_results: usize) -> Vec<Candidate> {
        debug!("📝 Exa query: '{}'", query);

        match self.search(api_key, &query, num_results).await {
            Ok(results) => results
                .into_iter()
                .filter_map(|r| {
                    let url = clean_pdf_url(r.url.as_deref()?)?;
                    let title = r
                        .title
                        .filter(|t| !t.trim().is_empty())
                        .map(|t| truncate(&t, 200))
                        .unwrap_or_else(|| keyword.to_string());
                    let description = r.text.map(|t| truncate(&t, 500)).unwrap_or_default();
                    Some(Candidate::new(ContentKind::Pdf, url, title).with_description(description))
                })
                .collect(),
            Err(e) => {
                warn!("⚠️ Exa query '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }
}

impl ContentScraper for PdfScraper {
    fn kind(&self) -> ContentKind {
        ContentKind::Pdf
    }

    fn find<'a>(&'a self, keyword: &'a str, limit: usize) -> BoxStream<'a, Candidate> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("⚠️ Skipping PDF search for '{}': no Exa API key", keyword);
            return stream::empty().boxed();
        };
        let num_results = limit * 3;

        // Variations are queried one at a time, only while more candidates are wanted
        stream::iter(self.query_variations.iter())
            .then(move |suffix| {
                self.query(api_key, keyword, format!("{} {}", keyword, suffix), num_results)
            })
            .flat_map(stream::iter)
            .scan(HashSet::new(), |seen, candidate| {
                let fresh = seen.insert(candidate.url.clone());
                future::ready(Some(fresh.then_some(candidate)))
            })
            .filter_map(future::ready)
            .take(limit)
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_pdf_url() {
        assert_eq!(
            clean_pdf_url("https://a.org/report.PDF?download=1#page=3"),
            Some("https://a.org/report.PDF".to_string())
        );
        assert_eq!(clean_pdf_url("https://a.org/report.html"), None);
        assert_eq!(clean_pdf_url("ftp://a.org/report.pdf"), None);
        assert_eq!(clean_pdf_url("https://a.org/view?file=x.pdf"), None);
    }

    #[test]
    fn test_exa_request_shape() {
        let body = serde_json::to_value(ExaSearchRequest {
            query: "solar panels filetype:pdf",
            num_results: 6,
        })
        .unwrap();
        assert_eq!(body["numResults"], 6);
        assert_eq!(body["query"], "solar panels filetype:pdf");
    }

    #[test]
    fn test_exa_response_tolerates_missing_fields() {
        let body: ExaSearchResponse =
            serde_json::from_str(r#"{"results":[{"url":"https://a.org/x.pdf"},{"title":"no url"}]}"#)
                .unwrap();
        assert_eq!(body.results.len(), 2);
        assert!(body.results[1].url.is_none());

        let empty: ExaSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.results.is_empty());
    }

    #[tokio::test]
    async fn test_no_api_key_yields_nothing() {
        let scraper = PdfScraper::new(reqwest::Client::new(), &PdfConfig::default());
        let found: Vec<Candidate> = scraper.find("solar panels", 2).collect().await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_nothing() {
        let config = PdfConfig {
            api_key: Some("test-key".to_string()),
            endpoint: "http://127.0.0.1:9/search".to_string(),
            ..PdfConfig::default()
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();
        let scraper = PdfScraper::new(client, &config);

        let found: Vec<Candidate> = scraper.find("solar panels", 2).collect().await;
        assert!(found.is_empty());
    }
}
