/// Keyword Harvester
///
/// Collects PDFs, images and videos for lists of keywords, deduplicates them
/// against everything already stored, and tracks resumable harvesting tasks.

pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod resume;
pub mod scraper;
pub mod state;
pub mod storage;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder};
pub use crate::db::{ItemPage, ItemStore, MemoryStore, PgStore};
pub use crate::dedup::{Admission, DedupGate};
pub use crate::error::{HarvestError, RelayError, StoreError};
pub use crate::models::{Candidate, ContentKind, KeywordSet, ScrapedItem, StorageRef};
pub use crate::orchestrator::{ItemListing, SubmitReceipt, TaskOrchestrator};
pub use crate::resume::{Resolver, TaskPlan};
pub use crate::scraper::{ContentScraper, ScraperSet};
pub use crate::state::{ProgressStore, TaskProgress, TaskStatus, TaskSummary};
pub use crate::storage::{DisabledRelay, S3Relay, StorageRelay};
