//! Deduplication gate: decides whether a candidate is new before it is stored

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::db::ItemStore;
use crate::error::StoreResult;
use crate::models::{Candidate, ContentKind};

/// Why a candidate was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Same URL already stored for this kind
    KnownUrl,
    /// Same content hash already stored
    KnownHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted { content_hash: String },
    Rejected(RejectReason),
}

/// Canonical form of a URL for hashing.
///
/// The `url` crate already lower-cases scheme and host and drops default
/// ports; the fragment is removed here. Unparseable input is only trimmed.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.trim().to_string(),
    }
}

/// Hex SHA-256 of `"{kind}:{normalized url}"`
pub fn content_hash(kind: ContentKind, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(normalize_url(url).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Checks candidates against everything already stored, across all tasks
#[derive(Clone)]
pub struct DedupGate {
    store: Arc<dyn ItemStore>,
}

impl DedupGate {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    /// Store errors pass through untouched so the caller can decide whether they are fatal.
    pub async fn admit(&self, candidate: &Candidate) -> StoreResult<Admission> {
        if self.store.url_exists(candidate.kind, &candidate.url).await? {
            debug!("⏭️ Known {} URL: {}", candidate.kind, candidate.url);
            return Ok(Admission::Rejected(RejectReason::KnownUrl));
        }

        let content_hash = content_hash(candidate.kind, &candidate.url);
        if self.store.hash_exists(&content_hash).await? {
            debug!("⏭️ Known {} content: {}", candidate.kind, candidate.url);
            return Ok(Admission::Rejected(RejectReason::KnownHash));
        }

        Ok(Admission::Accepted { content_hash })
    }
}
