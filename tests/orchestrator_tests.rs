use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use keyword_harvester::db::ItemPage;
use keyword_harvester::error::{RelayError, StoreResult};
use keyword_harvester::models::{NewItem, StorageRef};
use keyword_harvester::scraper::video::{
    DownloadAttempt, MediaFetcher, ShortFormFilter, VideoEntry, VideoScraper, VideoSearch,
    DEFAULT_LADDER,
};
use keyword_harvester::storage::RelayRequest;
use keyword_harvester::{
    Candidate, Config, ConfigBuilder, ContentKind, ContentScraper, DisabledRelay, HarvestError,
    ItemListing, ItemStore, KeywordSet, MemoryStore, ScraperSet, StorageRelay, StoreError,
    TaskOrchestrator, TaskProgress, TaskStatus,
};

const POLL: Duration = Duration::from_millis(10);

/// Yields `per_keyword` distinct PDF links derived from the keyword
struct KeywordPdfs {
    per_keyword: usize,
    delay: Duration,
}

impl KeywordPdfs {
    fn new(per_keyword: usize) -> Self {
        Self {
            per_keyword,
            delay: Duration::ZERO,
        }
    }
}

impl ContentScraper for KeywordPdfs {
    fn kind(&self) -> ContentKind {
        ContentKind::Pdf
    }

    fn find<'a>(&'a self, keyword: &'a str, limit: usize) -> BoxStream<'a, Candidate> {
        let slug = keyword.replace(' ', "-");
        stream::iter(0..self.per_keyword)
            .then(move |n| {
                let url = format!("https://docs.example.org/{}/{}.pdf", slug, n);
                async move {
                    tokio::time::sleep(self.delay).await;
                    Candidate::new(ContentKind::Pdf, url, format!("{} #{}", keyword, n))
                }
            })
            .take(limit)
            .boxed()
    }
}

/// Always yields the same links, whatever the keyword
struct SharedLinks(ContentKind, Vec<&'static str>);

impl ContentScraper for SharedLinks {
    fn kind(&self) -> ContentKind {
        self.0
    }

    fn find<'a>(&'a self, keyword: &'a str, limit: usize) -> BoxStream<'a, Candidate> {
        stream::iter(self.1.iter())
            .map(move |url| Candidate::new(self.0, *url, keyword))
            .take(limit)
            .boxed()
    }
}

/// Waits for a signal before yielding anything
struct Gated {
    inner: KeywordPdfs,
    open: Arc<Notify>,
}

impl ContentScraper for Gated {
    fn kind(&self) -> ContentKind {
        ContentKind::Pdf
    }

    fn find<'a>(&'a self, keyword: &'a str, limit: usize) -> BoxStream<'a, Candidate> {
        stream::once(self.open.notified())
            .flat_map(move |_| self.inner.find(keyword, limit))
            .boxed()
    }
}

struct FailingRelay;

#[async_trait]
impl StorageRelay for FailingRelay {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn put(&self, _request: &RelayRequest<'_>) -> Result<StorageRef, RelayError> {
        Err(RelayError::Upload("503 Service Unavailable".to_string()))
    }

    async fn presign(&self, _key: &str) -> Result<String, RelayError> {
        Err(RelayError::Presign("unavailable".to_string()))
    }
}

/// Accepts every upload and signs keys with a fake host
struct RecordingRelay {
    puts: AtomicUsize,
}

#[async_trait]
impl StorageRelay for RecordingRelay {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn put(&self, request: &RelayRequest<'_>) -> Result<StorageRef, RelayError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(StorageRef {
            key: keyword_harvester::storage::object_key(
                request.kind,
                request.item_id,
                request.keyword,
                request.url,
            ),
            url: None,
        })
    }

    async fn presign(&self, key: &str) -> Result<String, RelayError> {
        Ok(format!("https://signed.example.org/{}?ttl=604800", key))
    }
}

/// Memory store whose inserts fail once the budget is spent
struct FailingAfter {
    inner: MemoryStore,
    inserts_left: AtomicUsize,
}

#[async_trait]
impl ItemStore for FailingAfter {
    async fn url_exists(&self, kind: ContentKind, url: &str) -> StoreResult<bool> {
        self.inner.url_exists(kind, url).await
    }

    async fn hash_exists(&self, content_hash: &str) -> StoreResult<bool> {
        self.inner.hash_exists(content_hash).await
    }

    async fn insert(&self, item: NewItem) -> StoreResult<keyword_harvester::ScrapedItem> {
        let left = self.inserts_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Unavailable("connection reset by peer".to_string()));
        }
        self.inserts_left.store(left - 1, Ordering::SeqCst);
        self.inner.insert(item).await
    }

    async fn attach_storage(&self, id: i64, storage: &StorageRef) -> StoreResult<()> {
        self.inner.attach_storage(id, storage).await
    }

    async fn keywords_for_source(&self, source_file: &str) -> StoreResult<Vec<String>> {
        self.inner.keywords_for_source(source_file).await
    }

    async fn list_items(&self, task_id: Option<&str>, limit: usize, offset: usize) -> StoreResult<ItemPage> {
        self.inner.list_items(task_id, limit, offset).await
    }

    async fn source_files_for_task(&self, task_id: &str) -> StoreResult<Vec<String>> {
        self.inner.source_files_for_task(task_id).await
    }

    async fn clear(&self) -> StoreResult<u64> {
        self.inner.clear().await
    }
}

/// Reports every item as new, then refuses the insert
struct RefusingStore(StoreError);

#[async_trait]
impl ItemStore for RefusingStore {
    async fn url_exists(&self, _kind: ContentKind, _url: &str) -> StoreResult<bool> {
        Ok(false)
    }

    async fn hash_exists(&self, _content_hash: &str) -> StoreResult<bool> {
        Ok(false)
    }

    async fn insert(&self, _item: NewItem) -> StoreResult<keyword_harvester::ScrapedItem> {
        Err(self.0.clone())
    }

    async fn attach_storage(&self, _id: i64, _storage: &StorageRef) -> StoreResult<()> {
        Ok(())
    }

    async fn keywords_for_source(&self, _source_file: &str) -> StoreResult<Vec<String>> {
        Ok(vec![])
    }

    async fn list_items(&self, _task_id: Option<&str>, _limit: usize, _offset: usize) -> StoreResult<ItemPage> {
        Ok(ItemPage::default())
    }

    async fn source_files_for_task(&self, _task_id: &str) -> StoreResult<Vec<String>> {
        Ok(vec![])
    }

    async fn clear(&self) -> StoreResult<u64> {
        Ok(0)
    }
}

struct OneVideo;

#[async_trait]
impl VideoSearch for OneVideo {
    async fn search(&self, _keyword: &str, _count: usize) -> Result<Vec<VideoEntry>> {
        Ok(vec![VideoEntry {
            id: "w1nd".to_string(),
            webpage_url: Some("https://www.youtube.com/watch?v=w1nd".to_string()),
            title: "How wind turbines work".to_string(),
            description: None,
            duration: Some(720.0),
            thumbnail: None,
        }])
    }
}

/// Fails the first three attempts, succeeds on the fourth
struct FourthRung {
    calls: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for FourthRung {
    async fn fetch(&self, _url: &str, _attempt: &DownloadAttempt, dest: &Path) -> Result<PathBuf> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < 3 {
            return Err(anyhow!("Sign in to confirm you're not a bot"));
        }
        let path = dest.join("w1nd.mp4");
        tokio::fs::write(&path, b"mp4").await?;
        Ok(path)
    }
}

fn config() -> Config {
    ConfigBuilder::new().with_max_results(2).with_workers(2).build()
}

fn pdf_orchestrator(store: Arc<dyn ItemStore>) -> TaskOrchestrator {
    TaskOrchestrator::new(
        &config(),
        store,
        Arc::new(DisabledRelay),
        ScraperSet::new().with(Arc::new(KeywordPdfs::new(8))),
    )
}

fn video_orchestrator(
    store: Arc<dyn ItemStore>,
    relay: Arc<dyn StorageRelay>,
    fetcher: Arc<FourthRung>,
) -> TaskOrchestrator {
    let videos = VideoScraper::new(
        Arc::new(OneVideo),
        Some(fetcher as Arc<dyn MediaFetcher>),
        DEFAULT_LADDER.to_vec(),
        ShortFormFilter::new(60, &["#shorts".to_string()]),
    );
    TaskOrchestrator::new(&config(), store, relay, ScraperSet::new().with(Arc::new(videos)))
}

fn set(source: &str, keywords: &[&str]) -> Vec<KeywordSet> {
    vec![KeywordSet::new(
        source,
        keywords.iter().map(|k| k.to_string()).collect(),
    )]
}

async fn finish(orchestrator: &TaskOrchestrator, task_id: &str) -> TaskProgress {
    tokio::time::timeout(Duration::from_secs(10), orchestrator.wait_for(task_id, POLL))
        .await
        .expect("task did not finish")
        .unwrap()
}

#[tokio::test]
async fn test_first_submission_has_no_skips() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = pdf_orchestrator(store.clone());

    let receipt = orchestrator
        .submit(set("A", &["solar panels", "wind turbines"]), &[ContentKind::Pdf])
        .await
        .unwrap();

    assert_eq!(receipt.new_keywords_count, 2);
    assert_eq!(receipt.total_keywords, 2);
    assert_eq!(receipt.skipped_keywords_count, 0);
    assert!(!receipt.resumable_mode);
    assert!(!receipt.all_keywords_scraped);
    assert_eq!(receipt.source_files, vec!["A"]);

    let progress = finish(&orchestrator, &receipt.task_id).await;
    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.current_keyword_index, 2);
    assert_eq!(progress.pdf_count, 4);
    assert_eq!(progress.image_count, 0);
}

#[tokio::test]
async fn test_scenario_two_keywords_pdf_only() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = pdf_orchestrator(store.clone());

    let receipt = orchestrator
        .submit(set("A", &["solar panels", "wind turbines"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    finish(&orchestrator, &receipt.task_id).await;

    let items = store.all().await;
    assert!(items.len() <= 4);
    assert!(items.iter().all(|i| i.kind == ContentKind::Pdf && i.source_file == "A"));

    let mut urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), items.len());

    let page = orchestrator
        .list_items(ItemListing::for_task(receipt.task_id.clone()))
        .await
        .unwrap();
    assert_eq!(page.total, items.len() as u64);
    assert!(page.items.windows(2).all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn test_full_resubmission_is_all_scraped() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = pdf_orchestrator(store.clone());

    let first = orchestrator
        .submit(set("A", &["solar panels", "wind turbines"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    finish(&orchestrator, &first.task_id).await;
    let stored = store.len().await;

    let again = orchestrator
        .submit(set("A", &["Wind Turbines", "solar  panels"]), &[ContentKind::Pdf])
        .await
        .unwrap();

    assert!(again.all_keywords_scraped);
    assert!(again.resumable_mode);
    assert_eq!(again.total_keywords, 0);
    assert_eq!(again.skipped_keywords_count, 2);

    let progress = orchestrator.get_progress(&again.task_id).await.unwrap();
    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.current_keyword_index, 0);
    assert_eq!(store.len().await, stored);
}

#[tokio::test]
async fn test_resubmission_processes_only_new_keyword() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = pdf_orchestrator(store.clone());

    let first = orchestrator
        .submit(set("A", &["solar panels", "wind turbines"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    finish(&orchestrator, &first.task_id).await;

    let second = orchestrator
        .submit(
            set("A", &["solar panels", "wind turbines", "hydro power"]),
            &[ContentKind::Pdf],
        )
        .await
        .unwrap();

    assert_eq!(second.skipped_keywords_count, 2);
    assert_eq!(second.new_keywords_count, 1);
    assert_eq!(second.total_keywords, 1);
    assert!(second.resumable_mode);

    let progress = finish(&orchestrator, &second.task_id).await;
    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.keyword.as_deref(), Some("hydro power"));

    let page = orchestrator
        .list_items(ItemListing::for_task(second.task_id.clone()))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.items.iter().all(|i| i.keyword == "hydro power"));
}

#[tokio::test]
async fn test_same_candidate_across_tasks_is_stored_once() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = TaskOrchestrator::new(
        &config(),
        store.clone(),
        Arc::new(DisabledRelay),
        ScraperSet::new().with(Arc::new(SharedLinks(
            ContentKind::Pdf,
            vec!["https://shared.example.org/energy-guide.pdf"],
        ))),
    );

    for source in ["B", "C"] {
        let receipt = orchestrator
            .submit(set(source, &["renewables"]), &[ContentKind::Pdf])
            .await
            .unwrap();
        finish(&orchestrator, &receipt.task_id).await;
    }

    let items = store.all().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source_file, "B");
}

#[tokio::test]
async fn test_keyword_index_is_monotonic() {
    let orchestrator = TaskOrchestrator::new(
        &config(),
        Arc::new(MemoryStore::new()),
        Arc::new(DisabledRelay),
        ScraperSet::new().with(Arc::new(KeywordPdfs {
            per_keyword: 8,
            delay: Duration::from_millis(5),
        })),
    );

    let receipt = orchestrator
        .submit(
            set("A", &["solar panels", "wind turbines", "hydro power", "geothermal"]),
            &[ContentKind::Pdf],
        )
        .await
        .unwrap();

    let mut observed = Vec::new();
    loop {
        let progress = orchestrator.get_progress(&receipt.task_id).await.unwrap();
        observed.push(progress.current_keyword_index);

        if progress.status == TaskStatus::Completed {
            assert_eq!(progress.current_keyword_index, progress.total_keywords);
            break;
        }
        assert!(progress.current_keyword_index < progress.total_keywords);
        assert!(!progress.status.is_terminal());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(observed.last(), Some(&4));
}

#[tokio::test]
async fn test_fourth_ladder_rung_counts_once() {
    let store = Arc::new(MemoryStore::new());
    let relay = Arc::new(RecordingRelay {
        puts: AtomicUsize::new(0),
    });
    let fetcher = Arc::new(FourthRung {
        calls: AtomicUsize::new(0),
    });
    let orchestrator = video_orchestrator(store.clone(), relay.clone(), fetcher.clone());

    let receipt = orchestrator
        .submit(set("A", &["wind turbines"]), &[ContentKind::Video])
        .await
        .unwrap();
    let progress = finish(&orchestrator, &receipt.task_id).await;

    assert_eq!(progress.youtube_count, 1);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
    assert_eq!(relay.puts.load(Ordering::SeqCst), 1);

    let items = store.all().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, ContentKind::Video);
    assert_eq!(items[0].url, "https://www.youtube.com/watch?v=w1nd");
    assert!(items[0].storage_key.as_deref().unwrap().starts_with("youtube/"));
}

#[tokio::test]
async fn test_videos_stay_links_when_relay_disabled() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(FourthRung {
        calls: AtomicUsize::new(0),
    });
    let orchestrator = video_orchestrator(store.clone(), Arc::new(DisabledRelay), fetcher.clone());

    let receipt = orchestrator
        .submit(set("A", &["wind turbines"]), &[ContentKind::Video])
        .await
        .unwrap();
    let progress = finish(&orchestrator, &receipt.task_id).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.youtube_count, 1);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_known_video_is_not_downloaded_again() {
    let store = Arc::new(MemoryStore::new());
    let relay = Arc::new(RecordingRelay {
        puts: AtomicUsize::new(0),
    });
    let fetcher = Arc::new(FourthRung {
        calls: AtomicUsize::new(0),
    });
    let orchestrator = video_orchestrator(store.clone(), relay.clone(), fetcher.clone());

    let first = orchestrator
        .submit(set("A", &["wind turbines"]), &[ContentKind::Video])
        .await
        .unwrap();
    finish(&orchestrator, &first.task_id).await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);

    let second = orchestrator
        .submit(set("B", &["wind turbines"]), &[ContentKind::Video])
        .await
        .unwrap();
    let progress = finish(&orchestrator, &second.task_id).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.youtube_count, 0);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
    assert_eq!(relay.puts.load(Ordering::SeqCst), 1);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_failing_relay_keeps_items() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = TaskOrchestrator::new(
        &config(),
        store.clone(),
        Arc::new(FailingRelay),
        ScraperSet::new().with(Arc::new(KeywordPdfs::new(8))),
    );

    let receipt = orchestrator
        .submit(set("A", &["solar panels"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    let progress = finish(&orchestrator, &receipt.task_id).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.pdf_count, 2);

    let items = store.all().await;
    assert_eq!(items.len(), 2);
    assert!(items
        .iter()
        .all(|i| i.storage_key.is_none() && i.storage_url.is_none()));

    let page = orchestrator.list_items(ItemListing::all()).await.unwrap();
    assert!(page.items.iter().all(|i| i.storage_url.is_none()));
}

#[tokio::test]
async fn test_relayed_items_get_download_urls() {
    let store = Arc::new(MemoryStore::new());
    let relay = Arc::new(RecordingRelay {
        puts: AtomicUsize::new(0),
    });
    let orchestrator = TaskOrchestrator::new(
        &config(),
        store.clone(),
        relay.clone(),
        ScraperSet::new().with(Arc::new(KeywordPdfs::new(8))),
    );

    let receipt = orchestrator
        .submit(set("A", &["solar panels"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    finish(&orchestrator, &receipt.task_id).await;

    assert_eq!(relay.puts.load(Ordering::SeqCst), 2);

    let page = orchestrator
        .list_items(ItemListing::all().page(1, 0))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);

    let item = &page.items[0];
    let key = item.storage_key.as_deref().unwrap();
    assert!(key.starts_with("pdfs/item_"));
    assert!(key.ends_with("_solar_panels.pdf"));
    assert_eq!(
        item.storage_url.as_deref(),
        Some(format!("https://signed.example.org/{}?ttl=604800", key).as_str())
    );
}

#[tokio::test]
async fn test_unavailable_store_fails_task() {
    let store = Arc::new(FailingAfter {
        inner: MemoryStore::new(),
        inserts_left: AtomicUsize::new(3),
    });
    let orchestrator = pdf_orchestrator(store.clone());

    let receipt = orchestrator
        .submit(
            set("A", &["solar panels", "wind turbines", "hydro power"]),
            &[ContentKind::Pdf],
        )
        .await
        .unwrap();
    let progress = finish(&orchestrator, &receipt.task_id).await;

    match &progress.status {
        TaskStatus::Error(reason) => assert!(reason.contains("unavailable")),
        other => panic!("expected error status, got {:?}", other),
    }
    // The first keyword completed; the second failed after one insert
    assert_eq!(progress.current_keyword_index, 1);
    assert_eq!(progress.pdf_count, 3);

    let committed = store.inner.all().await;
    assert_eq!(committed.len(), 3);
    assert!(committed.iter().all(|i| i.keyword != "hydro power"));
}

#[tokio::test]
async fn test_lost_insert_race_is_skipped() {
    let orchestrator = pdf_orchestrator(Arc::new(RefusingStore(StoreError::Duplicate(
        "scraped_url already exists".to_string(),
    ))));

    let receipt = orchestrator
        .submit(set("A", &["solar panels", "wind turbines"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    let progress = finish(&orchestrator, &receipt.task_id).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.pdf_count, 0);
    assert_eq!(progress.current_keyword_index, 2);
}

#[tokio::test]
async fn test_rejected_row_is_skipped() {
    let orchestrator = pdf_orchestrator(Arc::new(RefusingStore(StoreError::Rejected(
        "value too long for type character varying(500)".to_string(),
    ))));

    let receipt = orchestrator
        .submit(set("A", &["solar panels"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    let progress = finish(&orchestrator, &receipt.task_id).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.pdf_count, 0);
    assert_eq!(progress.current_keyword_index, 1);
}

#[tokio::test]
async fn test_queued_task_stays_pending() {
    let open = Arc::new(Notify::new());
    let orchestrator = TaskOrchestrator::new(
        &ConfigBuilder::new().with_max_results(2).with_workers(1).build(),
        Arc::new(MemoryStore::new()),
        Arc::new(DisabledRelay),
        ScraperSet::new().with(Arc::new(Gated {
            inner: KeywordPdfs::new(4),
            open: open.clone(),
        })),
    );

    let first = orchestrator
        .submit(set("A", &["solar panels"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    let second = orchestrator
        .submit(set("B", &["wind turbines"]), &[ContentKind::Pdf])
        .await
        .unwrap();

    // Whichever task took the only worker slot, the other one waits for it
    let mut running = None;
    for _ in 0..100 {
        for receipt in [&first, &second] {
            let progress = orchestrator.get_progress(&receipt.task_id).await.unwrap();
            if progress.status == TaskStatus::Processing {
                running = Some(receipt.task_id.clone());
            }
        }
        if running.is_some() {
            break;
        }
        tokio::time::sleep(POLL).await;
    }
    let running = running.expect("no task started");
    let queued = if running == first.task_id { &second.task_id } else { &first.task_id };
    assert_eq!(
        orchestrator.get_progress(queued).await.unwrap().status,
        TaskStatus::Pending
    );

    open.notify_one();
    finish(&orchestrator, &running).await;
    open.notify_one();
    let progress = finish(&orchestrator, queued).await;
    assert_eq!(progress.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_source_files_fall_back_to_items() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = TaskOrchestrator::new(
        &ConfigBuilder::new().with_max_results(1).with_retention_secs(0).build(),
        store.clone(),
        Arc::new(DisabledRelay),
        ScraperSet::new().with(Arc::new(KeywordPdfs::new(2))),
    );

    let mut sets = set("B", &["solar panels"]);
    sets.extend(set("A", &["wind turbines"]));
    sets.extend(set("C", &[" "]));
    let receipt = orchestrator.submit(sets, &[ContentKind::Pdf]).await.unwrap();
    finish(&orchestrator, &receipt.task_id).await;

    assert_eq!(
        orchestrator.list_source_files(&receipt.task_id).await.unwrap(),
        vec!["B", "A", "C"]
    );

    assert_eq!(orchestrator.progress_store().evict_expired().await, 1);
    assert!(matches!(
        orchestrator.get_progress(&receipt.task_id).await,
        Err(HarvestError::TaskNotFound(_))
    ));
    assert_eq!(
        orchestrator.list_source_files(&receipt.task_id).await.unwrap(),
        vec!["B", "A"]
    );
}

#[tokio::test]
async fn test_list_tasks_and_clear() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = pdf_orchestrator(store.clone());

    let receipt = orchestrator
        .submit(set("A", &["solar panels"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    finish(&orchestrator, &receipt.task_id).await;

    let tasks = orchestrator.list_tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_id, receipt.task_id);
    assert_eq!(tasks[0].items_found, 2);

    assert_eq!(orchestrator.clear_items().await.unwrap(), 2);
    assert!(store.is_empty().await);

    // With history gone the keyword is new again
    let again = orchestrator
        .submit(set("A", &["solar panels"]), &[ContentKind::Pdf])
        .await
        .unwrap();
    assert_eq!(again.new_keywords_count, 1);
    assert!(!again.resumable_mode);
}
