//! Persistence of scraped items

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::models::{ContentKind, NewItem, ScrapedItem, StorageRef};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One page of items, newest first, with the unpaged total
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPage {
    pub items: Vec<ScrapedItem>,
    pub total: u64,
}

/// Relational store for scraped items.
///
/// Implementations enforce uniqueness of `(url, kind)` and of `content_hash`,
/// reporting violations as `StoreError::Duplicate`.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn url_exists(&self, kind: ContentKind, url: &str) -> StoreResult<bool>;

    async fn hash_exists(&self, content_hash: &str) -> StoreResult<bool>;

    async fn insert(&self, item: NewItem) -> StoreResult<ScrapedItem>;

    async fn attach_storage(&self, id: i64, storage: &StorageRef) -> StoreResult<()>;

    /// Distinct keywords already stored for a source file
    async fn keywords_for_source(&self, source_file: &str) -> StoreResult<Vec<String>>;

    /// Items of one task, or of every task when `task_id` is `None`.
    /// A `limit` of 0 means no limit.
    async fn list_items(
        &self,
        task_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<ItemPage>;

    /// Distinct source files of a task's items, in first-seen order
    async fn source_files_for_task(&self, task_id: &str) -> StoreResult<Vec<String>>;

    /// Delete every item, returning how many were removed
    async fn clear(&self) -> StoreResult<u64>;
}
