//! Task orchestration: submission, background keyword processing and queries

use anyhow::Result;
use futures::future::join_all;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, ScrapingConfig};
use crate::db::{ItemPage, ItemStore, MemoryStore, PgStore};
use crate::dedup::{Admission, DedupGate};
use crate::error::{HarvestError, StoreError};
use crate::models::{Candidate, ContentKind, KeywordSet, NewItem, ScrapedItem};
use crate::resume::{flatten, PlannedKeyword, Resolver};
use crate::scraper::{ContentScraper, ScraperSet};
use crate::state::{KindCounts, ProgressStore, TaskProgress, TaskSummary};
use crate::storage::{DisabledRelay, Payload, RelayRequest, S3Relay, StorageRelay};

/// Returned synchronously by `submit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub task_id: String,
    pub total_keywords: usize,
    pub resumable_mode: bool,
    pub new_keywords_count: usize,
    pub skipped_keywords_count: usize,
    pub all_keywords_scraped: bool,
    pub source_files: Vec<String>,
}

/// Item query: every item, one task's items, or nothing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemListing {
    pub task_id: Option<String>,
    pub all_items: bool,
    /// 0 means no limit
    pub limit: usize,
    pub offset: usize,
}

impl ItemListing {
    pub fn all() -> Self {
        Self {
            all_items: true,
            ..Self::default()
        }
    }

    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::default()
        }
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Coordinates harvesting tasks.
///
/// Cloning is cheap; clones share the store, progress records and worker pool.
#[derive(Clone)]
pub struct TaskOrchestrator {
    store: Arc<dyn ItemStore>,
    relay: Arc<dyn StorageRelay>,
    scrapers: ScraperSet,
    gate: DedupGate,
    resolver: Resolver,
    progress: ProgressStore,
    limits: ScrapingConfig,
    worker_semaphore: Arc<Semaphore>,
}

impl TaskOrchestrator {
    pub fn new(
        config: &Config,
        store: Arc<dyn ItemStore>,
        relay: Arc<dyn StorageRelay>,
        scrapers: ScraperSet,
    ) -> Self {
        info!(
            "🔧 Initializing orchestrator with {} workers",
            config.pool.max_concurrent_tasks
        );

        Self {
            gate: DedupGate::new(store.clone()),
            resolver: Resolver::new(store.clone()),
            store,
            relay,
            scrapers,
            progress: ProgressStore::new(config.progress.retention()),
            limits: config.scraping.clone(),
            worker_semaphore: Arc::new(Semaphore::new(config.pool.max_concurrent_tasks)),
        }
    }

    /// Wire up store, relay and scrapers from configuration.
    /// `in_memory` forces the in-process store even when a database is configured.
    pub async fn from_config(config: &Config, in_memory: bool) -> Result<Self> {
        let store: Arc<dyn ItemStore> = match (&config.database.url, in_memory) {
            (Some(url), false) => Arc::new(PgStore::connect(url, &config.database).await?),
            _ => {
                info!("🧠 Using in-memory item store");
                Arc::new(MemoryStore::new())
            }
        };

        let relay: Arc<dyn StorageRelay> = if config.storage.enabled {
            Arc::new(S3Relay::from_config(&config.storage)?)
        } else {
            Arc::new(DisabledRelay)
        };

        Ok(Self::new(config, store, relay, ScraperSet::from_config(config)?))
    }

    pub fn progress_store(&self) -> &ProgressStore {
        &self.progress
    }

    /// Validate, resolve and queue a task. The keyword loop runs in the background.
    pub async fn submit(
        &self,
        keyword_sets: Vec<KeywordSet>,
        kinds: &[ContentKind],
    ) -> Result<SubmitReceipt, HarvestError> {
        let mut selected: Vec<ContentKind> = Vec::new();
        for kind in kinds {
            if !selected.contains(kind) {
                selected.push(*kind);
            }
        }

        if selected.is_empty() {
            return Err(HarvestError::InvalidSubmission(
                "at least one content kind must be selected".to_string(),
            ));
        }
        if let Some(kind) = selected.iter().find(|k| !self.scrapers.contains(**k)) {
            return Err(HarvestError::ScraperMissing(*kind));
        }
        if flatten(&keyword_sets).is_empty() {
            return Err(HarvestError::InvalidSubmission(
                "no non-blank keywords submitted".to_string(),
            ));
        }

        let plan = self.resolver.plan(&keyword_sets).await?;
        let task_id = Uuid::new_v4().to_string();
        let progress = TaskProgress::new(task_id.clone(), &plan, &selected);

        let receipt = SubmitReceipt {
            task_id: task_id.clone(),
            total_keywords: progress.total_keywords,
            resumable_mode: progress.resumable_mode,
            new_keywords_count: progress.new_keywords_count,
            skipped_keywords_count: progress.skipped_keywords_count,
            all_keywords_scraped: progress.all_keywords_scraped,
            source_files: plan.source_files.clone(),
        };

        self.progress.create(progress).await;

        if plan.all_keywords_scraped() {
            info!(
                "✅ Task {}: all {} keywords already scraped, nothing to do",
                task_id, plan.skipped_keywords_count
            );
            self.progress.complete(&task_id).await;
            return Ok(receipt);
        }

        info!(
            "📥 Task {} queued: {} keywords ({} skipped), kinds {:?}",
            task_id,
            plan.new_keywords_count(),
            plan.skipped_keywords_count,
            selected
        );

        let orchestrator = self.clone();
        let semaphore = Arc::clone(&self.worker_semaphore);
        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    orchestrator
                        .progress
                        .fail(&task_id, HarvestError::WorkerPoolClosed.to_string())
                        .await;
                    return;
                }
            };
            orchestrator.run_task(&task_id, &plan.keywords, &selected).await;
        });

        Ok(receipt)
    }

    /// Process keywords one at a time; kinds within a keyword run concurrently
    async fn run_task(&self, task_id: &str, keywords: &[PlannedKeyword], kinds: &[ContentKind]) {
        let start_time = Instant::now();
        self.progress.mark_processing(task_id).await;
        info!("🚀 Task {} processing {} keywords", task_id, keywords.len());

        for (index, planned) in keywords.iter().enumerate() {
            self.progress.set_keyword(task_id, &planned.keyword).await;
            info!(
                "🔍 Keyword {}/{}: '{}' ({})",
                index + 1,
                keywords.len(),
                planned.keyword,
                planned.source_file
            );

            let results = join_all(
                kinds
                    .iter()
                    .map(|kind| self.harvest_kind(task_id, planned, *kind)),
            )
            .await;

            let mut counts = KindCounts::default();
            let mut fatal = None;
            for (kind, (accepted, fault)) in kinds.iter().zip(results) {
                counts.add(*kind, accepted);
                if fatal.is_none() {
                    fatal = fault;
                }
            }

            if let Some(e) = fatal {
                error!("❌ Task {} failed on '{}': {}", task_id, planned.keyword, e);
                self.progress.fail_keyword(task_id, counts, e.to_string()).await;
                return;
            }

            debug!(
                "📊 '{}': {} pdf, {} image, {} video",
                planned.keyword, counts.pdf, counts.image, counts.youtube
            );
            self.progress.record_keyword(task_id, counts).await;
        }

        self.progress.complete(task_id).await;

        let total = self
            .progress
            .get(task_id)
            .await
            .map(|p| p.counts().total())
            .unwrap_or_default();
        info!(
            "🎉 Task {} completed: {} items in {:.1}s",
            task_id,
            total,
            start_time.elapsed().as_secs_f64()
        );
    }

    /// Stream candidates for one kind until `limit` are accepted or the ceiling is reached.
    ///
    /// Returns the number of items stored, together with the fatal store error that
    /// stopped the kind early, if any. Items stored before the error are counted.
    async fn harvest_kind(
        &self,
        task_id: &str,
        planned: &PlannedKeyword,
        kind: ContentKind,
    ) -> (usize, Option<StoreError>) {
        let Some(scraper) = self.scrapers.get(kind) else {
            return (0, None);
        };
        let limit = self.limits.limit_for(kind);
        let ceiling = limit * self.limits.candidate_oversample;

        let mut candidates = scraper.find(&planned.keyword, ceiling);
        let mut accepted = 0;
        while accepted < limit {
            let Some(candidate) = candidates.next().await else {
                break;
            };
            let (item, candidate) = match self.accept(task_id, planned, scraper.as_ref(), candidate).await {
                Ok(Some(stored)) => stored,
                Ok(None) => continue,
                Err(e) => return (accepted, Some(e)),
            };

            accepted += 1;
            if let Err(e) = self.relay_payload(&item, &candidate).await {
                return (accepted, Some(e));
            }
        }

        if accepted < limit {
            debug!(
                "'{}': only {}/{} {} items found",
                planned.keyword, accepted, limit, kind
            );
        }
        (accepted, None)
    }

    /// Gate, download and persist one candidate.
    /// Returns the stored item, or `None` when the candidate was skipped.
    async fn accept(
        &self,
        task_id: &str,
        planned: &PlannedKeyword,
        scraper: &dyn ContentScraper,
        candidate: Candidate,
    ) -> Result<Option<(ScrapedItem, Candidate)>, StoreError> {
        let content_hash = match self.gate.admit(&candidate).await? {
            Admission::Accepted { content_hash } => content_hash,
            Admission::Rejected(_) => return Ok(None),
        };

        // Payloads are only worth downloading when the relay will take them
        let candidate = if self.relay.is_enabled() {
            let url = candidate.url.clone();
            match scraper.fetch_media(candidate).await {
                Some(candidate) => candidate,
                None => {
                    warn!("⚠️ Could not download {}, skipping", url);
                    return Ok(None);
                }
            }
        } else {
            candidate
        };

        let new_item = NewItem {
            keyword: planned.keyword.clone(),
            source_file: planned.source_file.clone(),
            kind: candidate.kind,
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            description: candidate.description.clone(),
            content_hash,
            task_id: task_id.to_string(),
        };

        let item = match self.store.insert(new_item).await {
            Ok(item) => item,
            Err(StoreError::Duplicate(_)) => {
                debug!("⏭️ Lost insert race for {}", candidate.url);
                return Ok(None);
            }
            Err(StoreError::Rejected(reason)) => {
                warn!("⚠️ Store rejected {}: {}", candidate.url, reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        info!("✅ Saved {} item #{}: {}", item.kind, item.id, item.url);
        Ok(Some((item, candidate)))
    }

    /// Relay failures are logged only; the item stays without a storage reference
    async fn relay_payload(&self, item: &ScrapedItem, candidate: &Candidate) -> Result<(), StoreError> {
        if !self.relay.is_enabled() {
            return Ok(());
        }

        let payload = match (&candidate.media, item.kind) {
            (Some(media), _) => Payload::File(media.path()),
            // The watch page is not the video
            (None, ContentKind::Video) => return Ok(()),
            (None, _) => Payload::Remote,
        };

        let request = RelayRequest {
            item_id: item.id,
            kind: item.kind,
            keyword: &item.keyword,
            url: &item.url,
            task_id: &item.task_id,
            payload,
        };

        match self.relay.put(&request).await {
            Ok(storage) => match self.store.attach_storage(item.id, &storage).await {
                Ok(()) => debug!("☁️ Item #{} stored as {}", item.id, storage.key),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("⚠️ Could not record storage key for item #{}: {}", item.id, e),
            },
            Err(e) => warn!("⚠️ Storage relay failed for item #{}: {}", item.id, e),
        }
        Ok(())
    }

    pub async fn get_progress(&self, task_id: &str) -> Result<TaskProgress, HarvestError> {
        self.progress
            .get(task_id)
            .await
            .ok_or_else(|| HarvestError::TaskNotFound(task_id.to_string()))
    }

    /// Poll until the task reaches a terminal state
    pub async fn wait_for(
        &self,
        task_id: &str,
        poll_interval: Duration,
    ) -> Result<TaskProgress, HarvestError> {
        loop {
            let progress = self.get_progress(task_id).await?;
            if progress.status.is_terminal() {
                return Ok(progress);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Items newest first. Stored payloads get a fresh download URL.
    pub async fn list_items(&self, listing: ItemListing) -> Result<ItemPage, HarvestError> {
        let task_filter = match (&listing.task_id, listing.all_items) {
            (_, true) => None,
            (Some(task_id), false) => Some(task_id.as_str()),
            (None, false) => return Ok(ItemPage::default()),
        };

        let mut page = self
            .store
            .list_items(task_filter, listing.limit, listing.offset)
            .await?;

        for item in page.items.iter_mut() {
            let Some(key) = &item.storage_key else {
                continue;
            };
            match self.relay.presign(key).await {
                Ok(url) => item.storage_url = Some(url),
                Err(e) => debug!("No download URL for {}: {}", key, e),
            }
        }

        Ok(page)
    }

    /// Source files of a task: as submitted while the task is tracked, otherwise from its items
    pub async fn list_source_files(&self, task_id: &str) -> Result<Vec<String>, HarvestError> {
        if let Some(progress) = self.progress.get(task_id).await {
            return Ok(progress.files);
        }
        Ok(self.store.source_files_for_task(task_id).await?)
    }

    pub async fn list_tasks(&self) -> Vec<TaskSummary> {
        self.progress
            .list()
            .await
            .iter()
            .map(TaskSummary::from)
            .collect()
    }

    /// Delete every stored item
    pub async fn clear_items(&self) -> Result<u64, HarvestError> {
        let removed = self.store.clear().await?;
        info!("🗑️ Cleared {} items", removed);
        Ok(removed)
    }
}
