//! Error types shared across the harvester

use crate::models::ContentKind;

/// Result type for persistence operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence failures, split by how the orchestrator reacts to them
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The uniqueness constraint rejected the row. Treated as a silent skip.
    #[error("duplicate item: {0}")]
    Duplicate(String),

    /// The row itself was refused (bad data, constraint other than uniqueness).
    #[error("item rejected by store: {0}")]
    Rejected(String),

    /// The store cannot be reached. Fatal to the running task.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Storage relay failures. Never fatal; items are kept without a storage reference.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("storage relay is not configured")]
    Disabled,

    #[error("download failed: {0}")]
    Download(String),

    #[error("payload too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("presign failed: {0}")]
    Presign(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the task orchestrator
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("no scraper registered for {0}")]
    ScraperMissing(ContentKind),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker pool closed")]
    WorkerPoolClosed,
}
