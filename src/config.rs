use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::ContentKind;
use crate::scraper::video::{DownloadAttempt, DEFAULT_LADDER};

/// Configuration for the keyword harvester
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Per-keyword limits and shared HTTP settings
    pub scraping: ScrapingConfig,

    /// PDF search (Exa) settings
    pub pdf: PdfConfig,

    /// Image search (Bing) settings
    pub image: ImageConfig,

    /// Video search and download (yt-dlp) settings
    pub video: VideoConfig,

    /// Relational store settings
    pub database: DatabaseConfig,

    /// Object storage relay settings
    pub storage: StorageConfig,

    /// Background worker pool settings
    pub pool: PoolConfig,

    /// Progress tracking settings
    pub progress: ProgressConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Items accepted per keyword and content kind
    pub max_results_per_keyword: usize,

    /// Optional override of the per-keyword limit for PDFs
    pub max_pdf_results_per_keyword: Option<usize>,

    /// Candidates requested from a scraper per accepted item, to absorb duplicates
    pub candidate_oversample: usize,

    /// HTTP request timeout (seconds)
    pub request_timeout_secs: u64,

    /// User agent sent to search services
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Exa API key; PDF search is skipped without it
    pub api_key: Option<String>,

    /// Exa search endpoint
    pub endpoint: String,

    /// Qualifiers appended to the keyword, one query per entry
    pub query_variations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Bing async image results endpoint
    pub endpoint: String,

    /// Results per page requested from Bing
    pub images_per_page: usize,

    /// Upper bound on pages fetched per keyword
    pub max_pages: usize,

    /// Domains whose images are never collected (subdomains included)
    pub excluded_domains: Vec<String>,

    /// Terms in title, description or page URL that disqualify a result
    pub blocked_terms: Vec<String>,

    /// Require keyword terms in title, description or page URL
    pub require_keyword_match: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// Timeout for a search invocation (seconds)
    pub search_timeout_secs: u64,

    /// Download each accepted video for relay to object storage
    pub download: bool,

    /// Timeout for a single download attempt (seconds)
    pub download_timeout_secs: u64,

    /// Videos shorter than this are treated as short-form (seconds)
    pub min_duration_secs: u64,

    /// Title terms that exclude a video
    pub exclusion_terms: Vec<String>,

    /// Passed to yt-dlp as --max-filesize (MB)
    pub max_filesize_mb: u64,

    /// Download attempts, tried in order until one succeeds
    pub ladder: Vec<DownloadAttempt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection URL; the in-memory store is used when absent
    pub url: Option<String>,

    /// Pool size
    pub max_connections: u32,

    /// Pool acquire timeout (seconds)
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Relay payloads to object storage
    pub enabled: bool,

    /// S3-compatible endpoint
    pub endpoint_url: Option<String>,

    /// Bucket name
    pub bucket: String,

    /// Region sent with requests ("auto" for R2)
    pub region: String,

    pub access_key_id: Option<String>,

    pub secret_access_key: Option<String>,

    /// Public base URL; presigned URLs are used when absent
    pub public_url: Option<String>,

    /// Validity of presigned download URLs (seconds)
    pub presign_ttl_secs: u64,

    /// Largest payload relayed (MB)
    pub max_object_mb: u64,

    /// Timeout for fetching a payload from its source URL (seconds)
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Tasks processed concurrently; further submissions wait in Pending
    pub max_concurrent_tasks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// How long finished task records are kept (seconds)
    pub retention_secs: u64,

    /// Poll interval used when waiting for a task (milliseconds)
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing-subscriber EnvFilter directive
    pub level: String,
}

impl ScrapingConfig {
    /// Items accepted per keyword for the given kind
    pub fn limit_for(&self, kind: ContentKind) -> usize {
        match kind {
            ContentKind::Pdf => self
                .max_pdf_results_per_keyword
                .unwrap_or(self.max_results_per_keyword),
            _ => self.max_results_per_keyword,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ProgressConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_paths = [
            "keyword-harvester.toml",
            "config/keyword-harvester.toml",
            "/etc/keyword-harvester/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config file {}: {}", path, e))?;
        let config: Config = toml::from_str(&config_str)?;
        tracing::info!("📄 Loaded configuration from: {}", path);
        Ok(config.with_env_overrides())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }

        if let Ok(key) = std::env::var("EXA_API_KEY") {
            if !key.is_empty() {
                self.pdf.api_key = Some(key);
            }
        }

        if let Ok(max) = std::env::var("HARVESTER_MAX_RESULTS") {
            self.scraping.max_results_per_keyword = max.parse().unwrap_or(2);
        }

        if let Ok(workers) = std::env::var("HARVESTER_WORKERS") {
            self.pool.max_concurrent_tasks = workers.parse().unwrap_or(2);
        }

        if let Ok(level) = std::env::var("HARVESTER_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(path) = std::env::var("YT_DLP_PATH") {
            self.video.yt_dlp_path = path;
        }

        if let Ok(endpoint) = std::env::var("STORAGE_ENDPOINT_URL") {
            self.storage.endpoint_url = Some(endpoint);
            self.storage.enabled = true;
        }

        if let Ok(bucket) = std::env::var("STORAGE_BUCKET") {
            self.storage.bucket = bucket;
        }

        if let Ok(key) = std::env::var("STORAGE_ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(key);
        }

        if let Ok(secret) = std::env::var("STORAGE_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(secret);
        }

        if let Ok(public_url) = std::env::var("STORAGE_PUBLIC_URL") {
            if !public_url.is_empty() {
                self.storage.public_url = Some(public_url);
            }
        }

        self
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.scraping.max_results_per_keyword == 0 {
            return Err(anyhow!("max_results_per_keyword must be greater than 0"));
        }

        if self.scraping.max_pdf_results_per_keyword == Some(0) {
            return Err(anyhow!("max_pdf_results_per_keyword must be greater than 0"));
        }

        if self.scraping.candidate_oversample == 0 {
            return Err(anyhow!("candidate_oversample must be greater than 0"));
        }

        if self.scraping.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than 0"));
        }

        if self.pool.max_concurrent_tasks == 0 {
            return Err(anyhow!("max_concurrent_tasks must be greater than 0"));
        }

        if self.video.download && self.video.ladder.is_empty() {
            return Err(anyhow!("video download ladder must contain at least one attempt"));
        }

        if self.video.download_timeout_secs == 0 || self.video.search_timeout_secs == 0 {
            return Err(anyhow!("video timeouts must be greater than 0"));
        }

        if self.storage.enabled {
            if self.storage.endpoint_url.is_none() {
                return Err(anyhow!("storage endpoint_url required when storage is enabled"));
            }
            if self.storage.access_key_id.is_none() || self.storage.secret_access_key.is_none() {
                return Err(anyhow!("storage credentials required when storage is enabled"));
            }
            if self.storage.bucket.is_empty() {
                return Err(anyhow!("storage bucket required when storage is enabled"));
            }
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Keyword Harvester Configuration:\n\
            - Max results per keyword: {}\n\
            - Concurrent tasks: {}\n\
            - PDF search: {}\n\
            - Video downloads: {} ({} ladder steps)\n\
            - Database: {}\n\
            - Object storage: {}",
            self.scraping.max_results_per_keyword,
            self.pool.max_concurrent_tasks,
            if self.pdf.api_key.is_some() { "enabled" } else { "disabled (no EXA_API_KEY)" },
            self.video.download,
            self.video.ladder.len(),
            if self.database.url.is_some() { "postgres" } else { "in-memory" },
            if self.storage.enabled { self.storage.bucket.as_str() } else { "disabled" },
        )
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            max_results_per_keyword: 2,
            max_pdf_results_per_keyword: None,
            candidate_oversample: 3,
            request_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.exa.ai/search".to_string(),
            query_variations: vec![
                "filetype:pdf".to_string(),
                "PDF".to_string(),
                "PDF document".to_string(),
            ],
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        let excluded = [
            "gamespot.com", "steam.com", "steampowered.com", "gog.com", "epicgames.com",
            "twitch.tv", "youtube.com", "facebook.com", "twitter.com", "x.com",
            "instagram.com", "reddit.com", "imgur.com", "pinterest.com", "flickr.com",
            "deviantart.com", "tumblr.com", "9gag.com", "memegenerator.net",
        ];
        let blocked = [
            "game", "gaming", "gamer", "console", "playstation", "xbox", "nintendo",
            "esports", "esport", "twitch", "livestream",
        ];

        Self {
            endpoint: "https://www.bing.com/images/async".to_string(),
            images_per_page: 35,
            max_pages: 10,
            excluded_domains: excluded.iter().map(|d| d.to_string()).collect(),
            blocked_terms: blocked.iter().map(|t| t.to_string()).collect(),
            require_keyword_match: false,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            search_timeout_secs: 30,
            download: true,
            download_timeout_secs: 300, // 5 minutes per attempt
            min_duration_secs: 60,
            exclusion_terms: vec!["#shorts".to_string(), "#short".to_string()],
            max_filesize_mb: 500,
            ladder: DEFAULT_LADDER.to_vec(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            acquire_timeout_secs: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint_url: None,
            bucket: String::new(),
            region: "auto".to_string(),
            access_key_id: None,
            secret_access_key: None,
            public_url: None,
            presign_ttl_secs: 604_800, // 7 days
            max_object_mb: 500,
            download_timeout_secs: 60,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: num_cpus::get().clamp(1, 4),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            retention_secs: 86_400, // 1 day
            poll_interval_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "keyword_harvester=info,warn".to_string(),
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.config.scraping.max_results_per_keyword = max_results;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.pool.max_concurrent_tasks = workers;
        self
    }

    pub fn with_database_url(mut self, url: String) -> Self {
        self.config.database.url = Some(url);
        self
    }

    pub fn with_exa_api_key(mut self, api_key: String) -> Self {
        self.config.pdf.api_key = Some(api_key);
        self
    }

    pub fn with_retention_secs(mut self, secs: u64) -> Self {
        self.config.progress.retention_secs = secs;
        self
    }

    pub fn enable_video_download(mut self, enable: bool) -> Self {
        self.config.video.download = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
