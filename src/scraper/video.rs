use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{truncate, ContentScraper};
use crate::config::VideoConfig;
use crate::models::{Candidate, ContentKind, DownloadedMedia};

/// Format selection passed to yt-dlp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatStrategy {
    Best,
    Worst,
    /// Let yt-dlp pick
    Auto,
}

/// YouTube player client to impersonate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientProfile {
    Default,
    Android,
    Ios,
}

/// One rung of the download retry ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadAttempt {
    pub format: FormatStrategy,
    pub client: ClientProfile,
}

impl DownloadAttempt {
    pub const fn new(format: FormatStrategy, client: ClientProfile) -> Self {
        Self { format, client }
    }

    /// yt-dlp arguments selecting this attempt's format and client
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self.format {
            FormatStrategy::Best => args.extend(["-f".to_string(), "best".to_string()]),
            FormatStrategy::Worst => args.extend(["-f".to_string(), "worst".to_string()]),
            FormatStrategy::Auto => {}
        }
        match self.client {
            ClientProfile::Default => {}
            ClientProfile::Android => args.extend([
                "--extractor-args".to_string(),
                "youtube:player_client=android".to_string(),
            ]),
            ClientProfile::Ios => args.extend([
                "--extractor-args".to_string(),
                "youtube:player_client=ios".to_string(),
            ]),
        }
        args
    }
}

pub const DEFAULT_LADDER: [DownloadAttempt; 4] = [
    DownloadAttempt::new(FormatStrategy::Best, ClientProfile::Default),
    DownloadAttempt::new(FormatStrategy::Worst, ClientProfile::Default),
    DownloadAttempt::new(FormatStrategy::Auto, ClientProfile::Android),
    DownloadAttempt::new(FormatStrategy::Auto, ClientProfile::Ios),
];

/// A search hit as reported by `yt-dlp --dump-json`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VideoEntry {
    #[serde(default)]
    pub id: String,
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
}

impl VideoEntry {
    pub fn url(&self) -> String {
        match &self.webpage_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("https://www.youtube.com/watch?v={}", self.id),
        }
    }
}

/// Parse newline-delimited JSON, skipping lines that do not parse
pub fn parse_entries(stdout: &str) -> Vec<VideoEntry> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<VideoEntry>(line).ok())
        .collect()
}

#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(&self, keyword: &str, count: usize) -> Result<Vec<VideoEntry>>;
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` into `dest` using one attempt's settings, returning the file written
    async fn fetch(&self, url: &str, attempt: &DownloadAttempt, dest: &Path) -> Result<PathBuf>;
}

/// Try each attempt in order until one succeeds.
///
/// Returns the downloaded file and the index of the attempt that produced it.
pub async fn run_ladder(
    fetcher: &dyn MediaFetcher,
    ladder: &[DownloadAttempt],
    url: &str,
    dest: &Path,
) -> Option<(PathBuf, usize)> {
    for (index, attempt) in ladder.iter().enumerate() {
        match fetcher.fetch(url, attempt, dest).await {
            Ok(path) => {
                debug!("📥 Downloaded {} on attempt {} ({:?})", url, index + 1, attempt);
                return Some((path, index));
            }
            Err(e) => {
                debug!("Download attempt {} for {} failed ({:?}): {}", index + 1, url, attempt, e);
            }
        }
    }

    warn!("⚠️ All {} download attempts failed for {}", ladder.len(), url);
    None
}

/// Decides which search hits are short-form or otherwise unwanted
#[derive(Debug, Clone)]
pub struct ShortFormFilter {
    min_duration_secs: u64,
    exclusions: Vec<Regex>,
}

impl ShortFormFilter {
    pub fn new(min_duration_secs: u64, exclusion_terms: &[String]) -> Self {
        let exclusions = exclusion_terms
            .iter()
            .filter_map(|term| Regex::new(&format!("(?i){}", regex::escape(term))).ok())
            .collect();

        Self {
            min_duration_secs,
            exclusions,
        }
    }

    pub fn is_excluded(&self, entry: &VideoEntry) -> bool {
        if let Some(duration) = entry.duration {
            if duration < self.min_duration_secs as f64 {
                return true;
            }
        }
        if entry.url().contains("/shorts/") {
            return true;
        }
        self.exclusions.iter().any(|re| re.is_match(&entry.title))
    }
}

/// The yt-dlp command line tool, used for both search and download
#[derive(Debug, Clone)]
pub struct YtDlp {
    path: String,
    search_timeout: Duration,
    download_timeout: Duration,
    max_filesize_mb: u64,
}

impl YtDlp {
    pub fn from_config(config: &VideoConfig) -> Self {
        Self {
            path: config.yt_dlp_path.clone(),
            search_timeout: Duration::from_secs(config.search_timeout_secs),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
            max_filesize_mb: config.max_filesize_mb,
        }
    }

    async fn run(&self, args: &[String], timeout: Duration) -> Result<std::process::Output> {
        let child = Command::new(&self.path)
            .args(args)
            .kill_on_drop(true)
            .output();

        tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| anyhow!("yt-dlp timed out after {:?}", timeout))?
            .with_context(|| format!("Failed to run {}", self.path))
    }
}

#[async_trait]
impl VideoSearch for YtDlp {
    async fn search(&self, keyword: &str, count: usize) -> Result<Vec<VideoEntry>> {
        let args = vec![
            format!("ytsearch{}:{}", count, keyword),
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--default-search".to_string(),
            "ytsearch".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
        ];

        let output = self.run(&args, self.search_timeout).await?;
        if !output.status.success() {
            return Err(anyhow!(
                "yt-dlp search failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(parse_entries(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn fetch(&self, url: &str, attempt: &DownloadAttempt, dest: &Path) -> Result<PathBuf> {
        let template = dest.join("%(id)s.%(ext)s");

        let mut args = attempt.args();
        args.extend([
            "--no-playlist".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--max-filesize".to_string(),
            format!("{}M", self.max_filesize_mb),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
            url.to_string(),
        ]);

        let output = self.run(&args, self.download_timeout).await?;
        if !output.status.success() {
            return Err(anyhow!(
                "yt-dlp download failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        find_downloaded_file(dest)
            .await?
            .ok_or_else(|| anyhow!("yt-dlp reported success but wrote no file"))
    }
}

/// First complete file in `dir`, ignoring yt-dlp partials
async fn find_downloaded_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let partial = path
            .extension()
            .map_or(false, |ext| ext == "part" || ext == "ytdl");
        if entry.file_type().await?.is_file() && !partial {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// YouTube search with optional download of each accepted video
pub struct VideoScraper {
    search: Arc<dyn VideoSearch>,
    fetcher: Option<Arc<dyn MediaFetcher>>,
    ladder: Vec<DownloadAttempt>,
    filter: ShortFormFilter,
}

impl VideoScraper {
    pub fn new(
        search: Arc<dyn VideoSearch>,
        fetcher: Option<Arc<dyn MediaFetcher>>,
        ladder: Vec<DownloadAttempt>,
        filter: ShortFormFilter,
    ) -> Self {
        Self {
            search,
            fetcher,
            ladder,
            filter,
        }
    }

    pub fn from_config(config: &VideoConfig) -> Self {
        let yt_dlp = Arc::new(YtDlp::from_config(config));
        let fetcher: Option<Arc<dyn MediaFetcher>> = if config.download {
            Some(yt_dlp.clone())
        } else {
            None
        };
        info!(
            "🎬 Video scraper using {} (downloads {})",
            config.yt_dlp_path,
            if config.download { "enabled" } else { "disabled" }
        );

        Self::new(
            yt_dlp,
            fetcher,
            config.ladder.clone(),
            ShortFormFilter::new(config.min_duration_secs, &config.exclusion_terms),
        )
    }

    async fn entries(&self, keyword: &str, count: usize) -> Vec<VideoEntry> {
        match self.search.search(keyword, count).await {
            Ok(entries) => {
                debug!("🔍 yt-dlp returned {} entries for '{}'", entries.len(), keyword);
                entries
            }
            Err(e) => {
                warn!("⚠️ Video search for '{}' failed: {}", keyword, e);
                Vec::new()
            }
        }
    }

    fn candidate(entry: VideoEntry) -> Candidate {
        let description = entry
            .description
            .as_deref()
            .map(|d| truncate(d, 500))
            .unwrap_or_default();
        Candidate::new(ContentKind::Video, entry.url(), entry.title).with_description(description)
    }

    /// Walk the retry ladder into a fresh temp directory.
    /// An exhausted ladder drops the candidate.
    async fn download(&self, fetcher: &dyn MediaFetcher, candidate: Candidate) -> Option<Candidate> {
        let dir = match tempfile::Builder::new().prefix("harvest-video-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!("⚠️ Cannot create temp dir for {}: {}", candidate.url, e);
                return None;
            }
        };

        let (path, _) = run_ladder(fetcher, &self.ladder, &candidate.url, dir.path()).await?;
        Some(candidate.with_media(DownloadedMedia::new(path, dir)))
    }
}

impl ContentScraper for VideoScraper {
    fn kind(&self) -> ContentKind {
        ContentKind::Video
    }

    fn find<'a>(&'a self, keyword: &'a str, limit: usize) -> BoxStream<'a, Candidate> {
        stream::once(self.entries(keyword, limit))
            .flat_map(stream::iter)
            .filter(move |entry| {
                let excluded = self.filter.is_excluded(entry);
                if excluded {
                    debug!("⏭️ Skipping short-form video: {}", entry.title);
                }
                future::ready(!excluded)
            })
            .map(Self::candidate)
            .take(limit)
            .boxed()
    }

    /// Without a fetcher the candidate is kept as a link only
    fn fetch_media<'a>(&'a self, candidate: Candidate) -> BoxFuture<'a, Option<Candidate>> {
        async move {
            match &self.fetcher {
                Some(fetcher) => self.download(fetcher.as_ref(), candidate).await,
                None => Some(candidate),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails until the given attempt index, then writes a file
    struct FlakyFetcher {
        succeed_at: usize,
        calls: AtomicUsize,
        seen: Mutex<Vec<DownloadAttempt>>,
    }

    impl FlakyFetcher {
        fn new(succeed_at: usize) -> Self {
            Self {
                succeed_at,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for FlakyFetcher {
        async fn fetch(&self, _url: &str, attempt: &DownloadAttempt, dest: &Path) -> Result<PathBuf> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(*attempt);
            if call < self.succeed_at {
                return Err(anyhow!("HTTP Error 403: Forbidden"));
            }
            let path = dest.join("abc.mp4");
            tokio::fs::write(&path, b"video bytes").await?;
            Ok(path)
        }
    }

    struct FixedSearch(Vec<VideoEntry>);

    #[async_trait]
    impl VideoSearch for FixedSearch {
        async fn search(&self, _keyword: &str, count: usize) -> Result<Vec<VideoEntry>> {
            Ok(self.0.iter().take(count).cloned().collect())
        }
    }

    fn entry(id: &str, title: &str, duration: f64) -> VideoEntry {
        VideoEntry {
            id: id.to_string(),
            webpage_url: Some(format!("https://www.youtube.com/watch?v={}", id)),
            title: title.to_string(),
            description: Some("about wind".to_string()),
            duration: Some(duration),
            thumbnail: None,
        }
    }

    fn filter() -> ShortFormFilter {
        ShortFormFilter::new(60, &["#shorts".to_string(), "#short".to_string()])
    }

    #[test]
    fn test_attempt_args() {
        assert_eq!(DEFAULT_LADDER[0].args(), vec!["-f", "best"]);
        assert_eq!(DEFAULT_LADDER[1].args(), vec!["-f", "worst"]);
        assert_eq!(
            DEFAULT_LADDER[2].args(),
            vec!["--extractor-args", "youtube:player_client=android"]
        );
        assert_eq!(
            DEFAULT_LADDER[3].args(),
            vec!["--extractor-args", "youtube:player_client=ios"]
        );
    }

    #[tokio::test]
    async fn test_ladder_stops_at_first_success() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FlakyFetcher::new(1);

        let (path, index) = run_ladder(&fetcher, &DEFAULT_LADDER, "https://youtu.be/abc", dir.path())
            .await
            .unwrap();

        assert_eq!(index, 1);
        assert!(path.exists());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ladder_reaches_last_rung_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FlakyFetcher::new(3);

        let (_, index) = run_ladder(&fetcher, &DEFAULT_LADDER, "https://youtu.be/abc", dir.path())
            .await
            .unwrap();

        assert_eq!(index, 3);
        assert_eq!(*fetcher.seen.lock().unwrap(), DEFAULT_LADDER.to_vec());
    }

    #[tokio::test]
    async fn test_ladder_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FlakyFetcher::new(usize::MAX);

        assert!(run_ladder(&fetcher, &DEFAULT_LADDER, "https://youtu.be/abc", dir.path())
            .await
            .is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_short_form_filter() {
        let filter = filter();
        assert!(!filter.is_excluded(&entry("a", "Wind farm tour", 600.0)));
        assert!(filter.is_excluded(&entry("b", "Wind farm tour", 45.0)));
        assert!(filter.is_excluded(&entry("c", "Turbine blade #Shorts", 600.0)));

        let mut short_url = entry("d", "Turbine", 600.0);
        short_url.webpage_url = Some("https://www.youtube.com/shorts/d".to_string());
        assert!(filter.is_excluded(&short_url));

        let mut unknown = entry("e", "Turbine", 0.0);
        unknown.duration = None;
        assert!(!filter.is_excluded(&unknown));
    }

    #[test]
    fn test_parse_entries_skips_bad_lines() {
        let stdout = concat!(
            r#"{"id":"abc","title":"Wind","duration":300,"webpage_url":"https://www.youtube.com/watch?v=abc"}"#,
            "\n",
            "WARNING: not json\n",
            "\n",
            r#"{"id":"def","title":"Solar"}"#,
            "\n"
        );

        let entries = parse_entries(stdout);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].duration, Some(300.0));
        assert_eq!(entries[1].url(), "https://www.youtube.com/watch?v=def");
    }

    fn scraper_with(fetcher: Option<Arc<FlakyFetcher>>) -> VideoScraper {
        let search = Arc::new(FixedSearch(vec![
            entry("short", "Quick look", 30.0),
            entry("long", "Full documentary", 900.0),
        ]));
        VideoScraper::new(
            search,
            fetcher.map(|f| f as Arc<dyn MediaFetcher>),
            DEFAULT_LADDER.to_vec(),
            filter(),
        )
    }

    #[tokio::test]
    async fn test_find_filters_without_downloading() {
        let fetcher = Arc::new(FlakyFetcher::new(0));
        let scraper = scraper_with(Some(fetcher.clone()));

        let found: Vec<Candidate> = scraper.find("wind turbines", 2).collect().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://www.youtube.com/watch?v=long");
        assert_eq!(found[0].description.as_deref(), Some("about wind"));
        assert!(found[0].media.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_media_walks_ladder() {
        let fetcher = Arc::new(FlakyFetcher::new(3));
        let scraper = scraper_with(Some(fetcher.clone()));
        let candidate = Candidate::new(ContentKind::Video, "https://www.youtube.com/watch?v=long", "doc");

        let fetched = scraper.fetch_media(candidate).await.unwrap();
        assert!(fetched.media.as_ref().unwrap().path().exists());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fetch_media_drops_undownloadable_video() {
        let scraper = scraper_with(Some(Arc::new(FlakyFetcher::new(usize::MAX))));
        let candidate = Candidate::new(ContentKind::Video, "https://www.youtube.com/watch?v=long", "doc");

        assert!(scraper.fetch_media(candidate).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_media_without_fetcher_keeps_link() {
        let scraper = scraper_with(None);
        let candidate = Candidate::new(ContentKind::Video, "https://www.youtube.com/watch?v=long", "doc");

        let fetched = scraper.fetch_media(candidate).await.unwrap();
        assert!(fetched.media.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_yields_nothing() {
        let config = VideoConfig {
            yt_dlp_path: "/nonexistent/yt-dlp".to_string(),
            ..VideoConfig::default()
        };
        let scraper = VideoScraper::from_config(&config);

        let found: Vec<Candidate> = scraper.find("wind turbines", 2).collect().await;
        assert!(found.is_empty());
    }
}
