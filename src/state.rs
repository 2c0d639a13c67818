use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::ContentKind;
use crate::resume::TaskPlan;

/// Lifecycle of a harvesting task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, waiting for a worker slot
    Pending,
    Processing,
    Completed,
    Error(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error(_))
    }
}

/// Items accepted per content kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub pdf: usize,
    pub image: usize,
    pub youtube: usize,
}

impl KindCounts {
    pub fn add(&mut self, kind: ContentKind, n: usize) {
        match kind {
            ContentKind::Pdf => self.pdf += n,
            ContentKind::Image => self.image += n,
            ContentKind::Video => self.youtube += n,
        }
    }

    pub fn get(&self, kind: ContentKind) -> usize {
        match kind {
            ContentKind::Pdf => self.pdf,
            ContentKind::Image => self.image,
            ContentKind::Video => self.youtube,
        }
    }

    pub fn total(&self) -> usize {
        self.pdf + self.image + self.youtube
    }
}

/// Progress record of one task, as returned to pollers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: String,

    #[serde(flatten)]
    pub status: TaskStatus,

    /// Keyword being processed, or the last one processed
    pub keyword: Option<String>,

    /// Keywords fully processed so far
    pub current_keyword_index: usize,

    pub total_keywords: usize,

    pub pdf_count: usize,
    pub image_count: usize,
    pub youtube_count: usize,

    pub resumable_mode: bool,
    pub new_keywords_count: usize,
    pub skipped_keywords_count: usize,
    pub all_keywords_scraped: bool,

    /// Source files submitted with the task
    pub files: Vec<String>,

    pub kinds: Vec<ContentKind>,

    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskProgress {
    /// A `Pending` record for a resolved plan
    pub fn new(task_id: String, plan: &TaskPlan, kinds: &[ContentKind]) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            keyword: None,
            current_keyword_index: 0,
            total_keywords: plan.new_keywords_count(),
            pdf_count: 0,
            image_count: 0,
            youtube_count: 0,
            resumable_mode: plan.resumable_mode(),
            new_keywords_count: plan.new_keywords_count(),
            skipped_keywords_count: plan.skipped_keywords_count,
            all_keywords_scraped: plan.all_keywords_scraped(),
            files: plan.source_files.clone(),
            kinds: kinds.to_vec(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn counts(&self) -> KindCounts {
        KindCounts {
            pdf: self.pdf_count,
            image: self.image_count,
            youtube: self.youtube_count,
        }
    }

    fn finish(&mut self, status: TaskStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    fn expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        if !self.status.is_terminal() {
            return false;
        }
        match self.finished_at {
            Some(finished) => (now - finished).to_std().unwrap_or_default() >= retention,
            None => false,
        }
    }
}

/// Short form of a task for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    #[serde(flatten)]
    pub status: TaskStatus,
    pub current_keyword_index: usize,
    pub total_keywords: usize,
    pub items_found: usize,
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&TaskProgress> for TaskSummary {
    fn from(progress: &TaskProgress) -> Self {
        Self {
            task_id: progress.task_id.clone(),
            status: progress.status.clone(),
            current_keyword_index: progress.current_keyword_index,
            total_keywords: progress.total_keywords,
            items_found: progress.counts().total(),
            files: progress.files.clone(),
            created_at: progress.created_at,
        }
    }
}

/// Process-wide task progress, shared between the orchestrator and pollers.
///
/// Terminal records older than the retention period are evicted when a new
/// task is created or `evict_expired` is called.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    tasks: Arc<RwLock<HashMap<String, TaskProgress>>>,
    retention: Duration,
}

impl ProgressStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub async fn create(&self, progress: TaskProgress) {
        self.evict_expired().await;
        debug!("🆕 Tracking task {}", progress.task_id);
        self.tasks
            .write()
            .await
            .insert(progress.task_id.clone(), progress);
    }

    /// Snapshot of a task's progress
    pub async fn get(&self, task_id: &str) -> Option<TaskProgress> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Apply `f` under a single write lock. Returns false for unknown tasks.
    pub async fn update<F>(&self, task_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut TaskProgress),
    {
        match self.tasks.write().await.get_mut(task_id) {
            Some(progress) => {
                f(progress);
                true
            }
            None => false,
        }
    }

    pub async fn mark_processing(&self, task_id: &str) -> bool {
        self.update(task_id, |p| p.status = TaskStatus::Processing).await
    }

    pub async fn set_keyword(&self, task_id: &str, keyword: &str) -> bool {
        self.update(task_id, |p| p.keyword = Some(keyword.to_string()))
            .await
    }

    /// Add one keyword's counts and advance the keyword index
    pub async fn record_keyword(&self, task_id: &str, counts: KindCounts) -> bool {
        self.update(task_id, |p| {
            p.pdf_count += counts.pdf;
            p.image_count += counts.image;
            p.youtube_count += counts.youtube;
            p.current_keyword_index += 1;
        })
        .await
    }

    pub async fn complete(&self, task_id: &str) -> bool {
        self.update(task_id, |p| p.finish(TaskStatus::Completed)).await
    }

    pub async fn fail(&self, task_id: &str, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.update(task_id, |p| p.finish(TaskStatus::Error(reason)))
            .await
    }

    /// Fail a task part-way through a keyword, keeping the counts committed so far.
    /// The keyword index does not advance.
    pub async fn fail_keyword(&self, task_id: &str, counts: KindCounts, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.update(task_id, |p| {
            p.pdf_count += counts.pdf;
            p.image_count += counts.image;
            p.youtube_count += counts.youtube;
            p.finish(TaskStatus::Error(reason));
        })
        .await
    }

    /// Every tracked task, oldest first
    pub async fn list(&self) -> Vec<TaskProgress> {
        let mut tasks: Vec<TaskProgress> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop terminal records past the retention period
    pub async fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, p| !p.expired(now, self.retention));
        let removed = before - tasks.len();

        if removed > 0 {
            info!("🧹 Evicted {} finished task records", removed);
        }
        removed
    }
}
