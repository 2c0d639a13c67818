use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ItemPage, ItemStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{ContentKind, NewItem, ScrapedItem, StorageRef};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    items: Vec<ScrapedItem>,
}

/// In-process item store with the same uniqueness rules as the Postgres table
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of every item in insertion order
    pub async fn all(&self) -> Vec<ScrapedItem> {
        self.inner.read().await.items.clone()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn url_exists(&self, kind: ContentKind, url: &str) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.items.iter().any(|i| i.kind == kind && i.url == url))
    }

    async fn hash_exists(&self, content_hash: &str) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.items.iter().any(|i| i.content_hash == content_hash))
    }

    async fn insert(&self, item: NewItem) -> StoreResult<ScrapedItem> {
        let mut inner = self.inner.write().await;

        if inner
            .items
            .iter()
            .any(|i| (i.kind == item.kind && i.url == item.url) || i.content_hash == item.content_hash)
        {
            return Err(StoreError::Duplicate(format!("{} {}", item.kind, item.url)));
        }

        inner.next_id += 1;
        let stored = ScrapedItem::from_new(inner.next_id, item, Utc::now());
        inner.items.push(stored.clone());
        debug!("💾 Stored item #{}: {}", stored.id, stored.url);
        Ok(stored)
    }

    async fn attach_storage(&self, id: i64, storage: &StorageRef) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let item = inner
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| StoreError::Rejected(format!("no item with id {}", id)))?;

        item.storage_key = Some(storage.key.clone());
        item.storage_url = storage.url.clone();
        Ok(())
    }

    async fn keywords_for_source(&self, source_file: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut keywords: Vec<String> = Vec::new();
        for item in inner.items.iter().filter(|i| i.source_file == source_file) {
            if !keywords.contains(&item.keyword) {
                keywords.push(item.keyword.clone());
            }
        }
        Ok(keywords)
    }

    async fn list_items(
        &self,
        task_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<ItemPage> {
        let inner = self.inner.read().await;

        let mut matching: Vec<&ScrapedItem> = inner
            .items
            .iter()
            .filter(|i| task_id.map_or(true, |t| i.task_id == t))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let take = if limit == 0 { usize::MAX } else { limit };
        let items = matching
            .into_iter()
            .skip(offset)
            .take(take)
            .cloned()
            .collect();

        Ok(ItemPage { items, total })
    }

    async fn source_files_for_task(&self, task_id: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut files: Vec<String> = Vec::new();
        for item in inner.items.iter().filter(|i| i.task_id == task_id) {
            if !files.contains(&item.source_file) {
                files.push(item.source_file.clone());
            }
        }
        Ok(files)
    }

    async fn clear(&self) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let removed = inner.items.len() as u64;
        inner.items.clear();
        Ok(removed)
    }
}
