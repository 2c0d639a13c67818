//! Resumability: splits requested keywords into new and already scraped, per source file

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::db::ItemStore;
use crate::error::StoreResult;
use crate::models::KeywordSet;

/// Key used to compare keywords: whitespace collapsed, trimmed, lower-cased
pub fn comparison_key(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Outcome of resolving one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub source_file: String,
    pub new_keywords: Vec<String>,
    pub skipped_keywords: Vec<String>,
    pub all_already_scraped: bool,
}

/// A keyword scheduled for scraping, with the file it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedKeyword {
    pub keyword: String,
    pub source_file: String,
}

/// The effective work of a task after flattening and resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPlan {
    /// Keywords still to scrape, in submission order
    pub keywords: Vec<PlannedKeyword>,
    pub skipped_keywords_count: usize,
    /// Source files in submission order, including those left with no new keywords
    pub source_files: Vec<String>,
}

impl TaskPlan {
    pub fn new_keywords_count(&self) -> usize {
        self.keywords.len()
    }

    /// At least one keyword was skipped because it was already scraped
    pub fn resumable_mode(&self) -> bool {
        self.skipped_keywords_count > 0
    }

    pub fn all_keywords_scraped(&self) -> bool {
        self.keywords.is_empty() && self.skipped_keywords_count > 0
    }
}

/// Flatten keyword sets into `(keyword, source_file)` pairs.
///
/// Keywords are trimmed; blanks are dropped, as are later repeats of a
/// comparison key (the first file to list a keyword keeps it).
pub fn flatten(keyword_sets: &[KeywordSet]) -> Vec<PlannedKeyword> {
    let mut seen = HashSet::new();
    let mut flattened = Vec::new();

    for set in keyword_sets {
        for raw in &set.keywords {
            let keyword = raw.trim();
            if keyword.is_empty() {
                continue;
            }
            if seen.insert(comparison_key(keyword)) {
                flattened.push(PlannedKeyword {
                    keyword: keyword.to_string(),
                    source_file: set.source_file.clone(),
                });
            }
        }
    }

    flattened
}

#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn ItemStore>,
}

impl Resolver {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, source_file: &str, requested: &[String]) -> StoreResult<Resolution> {
        let already: HashSet<String> = self
            .store
            .keywords_for_source(source_file)
            .await?
            .iter()
            .map(|k| comparison_key(k))
            .collect();

        let (skipped_keywords, new_keywords): (Vec<String>, Vec<String>) = requested
            .iter()
            .cloned()
            .partition(|k| already.contains(&comparison_key(k)));

        Ok(Resolution {
            source_file: source_file.to_string(),
            all_already_scraped: new_keywords.is_empty() && !requested.is_empty(),
            new_keywords,
            skipped_keywords,
        })
    }

    /// Flatten the submission and resolve every source file in it
    pub async fn plan(&self, keyword_sets: &[KeywordSet]) -> StoreResult<TaskPlan> {
        let flattened = flatten(keyword_sets);

        let mut source_files: Vec<String> = Vec::new();
        for set in keyword_sets {
            if !source_files.contains(&set.source_file) {
                source_files.push(set.source_file.clone());
            }
        }

        let mut skipped: HashSet<(String, String)> = HashSet::new();
        for source_file in &source_files {
            let requested: Vec<String> = flattened
                .iter()
                .filter(|p| &p.source_file == source_file)
                .map(|p| p.keyword.clone())
                .collect();
            if requested.is_empty() {
                continue;
            }

            let resolution = self.resolve(source_file, &requested).await?;
            if !resolution.skipped_keywords.is_empty() {
                info!(
                    "🔁 {}: {} new, {} already scraped",
                    source_file,
                    resolution.new_keywords.len(),
                    resolution.skipped_keywords.len()
                );
            }
            for keyword in resolution.skipped_keywords {
                skipped.insert((source_file.clone(), comparison_key(&keyword)));
            }
        }

        let skipped_keywords_count = skipped.len();
        let keywords = flattened
            .into_iter()
            .filter(|p| !skipped.contains(&(p.source_file.clone(), comparison_key(&p.keyword))))
            .collect();

        Ok(TaskPlan {
            keywords,
            skipped_keywords_count,
            source_files,
        })
    }
}
