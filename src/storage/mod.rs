//! Relay of binary payloads to object storage

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use crate::error::RelayError;
use crate::models::{ContentKind, StorageRef};

pub mod s3;

pub use s3::S3Relay;

/// Where the bytes to relay come from
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// Already downloaded to a local file
    File(&'a Path),
    /// Fetched from the item's source URL
    Remote,
}

/// Everything the relay needs to store one item's payload
#[derive(Debug, Clone, Copy)]
pub struct RelayRequest<'a> {
    pub item_id: i64,
    pub kind: ContentKind,
    pub keyword: &'a str,
    pub url: &'a str,
    pub task_id: &'a str,
    pub payload: Payload<'a>,
}

#[async_trait]
pub trait StorageRelay: Send + Sync {
    /// Whether `put` can succeed at all
    fn is_enabled(&self) -> bool;

    async fn put(&self, request: &RelayRequest<'_>) -> Result<StorageRef, RelayError>;

    /// Time-limited download URL for a stored key
    async fn presign(&self, key: &str) -> Result<String, RelayError>;
}

/// Used when no object storage is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRelay;

#[async_trait]
impl StorageRelay for DisabledRelay {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn put(&self, request: &RelayRequest<'_>) -> Result<StorageRef, RelayError> {
        debug!("Storage relay disabled, not storing {}", request.url);
        Err(RelayError::Disabled)
    }

    async fn presign(&self, _key: &str) -> Result<String, RelayError> {
        Err(RelayError::Disabled)
    }
}

/// MIME type stored with the object
pub fn content_type_for(kind: ContentKind, url: &str) -> &'static str {
    match kind {
        ContentKind::Video => "video/mp4",
        ContentKind::Pdf => "application/pdf",
        ContentKind::Image => {
            let lower = url.to_lowercase();
            if lower.ends_with(".png") {
                "image/png"
            } else if lower.ends_with(".gif") {
                "image/gif"
            } else if lower.ends_with(".webp") {
                "image/webp"
            } else if lower.ends_with(".bmp") {
                "image/bmp"
            } else {
                "image/jpeg"
            }
        }
    }
}

/// File extension used in the object key
pub fn extension_for(kind: ContentKind, url: &str) -> &'static str {
    match kind {
        ContentKind::Video => ".mp4",
        ContentKind::Pdf => ".pdf",
        ContentKind::Image => {
            let lower = url.to_lowercase();
            if lower.ends_with(".png") {
                ".png"
            } else if lower.ends_with(".gif") {
                ".gif"
            } else if lower.ends_with(".webp") {
                ".webp"
            } else if lower.ends_with(".bmp") {
                ".bmp"
            } else {
                ".jpg"
            }
        }
    }
}

/// Keyword reduced to characters safe in an object key (at most 50)
pub fn safe_keyword(keyword: &str) -> String {
    keyword
        .chars()
        .take(50)
        .map(|c| match c {
            ' ' => '_',
            c if c.is_alphanumeric() || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect()
}

/// `{pdfs|images|youtube}/item_{id}_{keyword}{ext}`
pub fn object_key(kind: ContentKind, item_id: i64, keyword: &str, url: &str) -> String {
    format!(
        "{}/item_{}_{}{}",
        kind.storage_dir(),
        item_id,
        safe_keyword(keyword),
        extension_for(kind, url)
    )
}
