//! Core data types: content kinds, candidates and persisted items

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;

/// The three kinds of content the harvester collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentKind {
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "image")]
    Image,
    /// Persisted as `youtube` for compatibility with existing rows
    #[serde(rename = "youtube")]
    Video,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Pdf, ContentKind::Image, ContentKind::Video];

    /// Value stored in the `content_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Pdf => "pdf",
            ContentKind::Image => "image",
            ContentKind::Video => "youtube",
        }
    }

    /// Object storage directory for this kind
    pub fn storage_dir(&self) -> &'static str {
        match self {
            ContentKind::Pdf => "pdfs",
            ContentKind::Image => "images",
            ContentKind::Video => "youtube",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(ContentKind::Pdf),
            "image" | "img" => Ok(ContentKind::Image),
            "youtube" | "video" | "yt" => Ok(ContentKind::Video),
            other => Err(format!("unknown content kind: {}", other)),
        }
    }
}

/// A batch of keywords tagged with the file they came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    pub source_file: String,
    pub keywords: Vec<String>,
}

impl KeywordSet {
    pub fn new(source_file: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            source_file: source_file.into(),
            keywords,
        }
    }

    /// Read a keyword file; the file name becomes the source file
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read keyword file {}", path.display()))?;
        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(source_file, parse_keyword_lines(&text)))
    }
}

/// First comma-separated field of every non-empty line, unquoted and trimmed
pub fn parse_keyword_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(first_field)
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

/// A quoted field may contain commas; `""` inside quotes is a literal quote
fn first_field(line: &str) -> String {
    let line = line.trim_start();
    let Some(quoted) = line.strip_prefix('"') else {
        return line.split(',').next().unwrap_or_default().trim().to_string();
    };

    let mut field = String::new();
    let mut chars = quoted.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => break,
            c => field.push(c),
        }
    }
    field.trim().to_string()
}

/// Media downloaded to a temporary directory; removed when dropped
#[derive(Debug)]
pub struct DownloadedMedia {
    path: PathBuf,
    _dir: TempDir,
}

impl DownloadedMedia {
    pub fn new(path: PathBuf, dir: TempDir) -> Self {
        Self { path, _dir: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An unpersisted, not yet deduplicated scraper result
#[derive(Debug)]
pub struct Candidate {
    pub kind: ContentKind,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub media: Option<DownloadedMedia>,
}

impl Candidate {
    pub fn new(kind: ContentKind, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            title: title.into(),
            description: None,
            media: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.is_empty() {
            self.description = Some(description);
        }
        self
    }

    pub fn with_media(mut self, media: DownloadedMedia) -> Self {
        self.media = Some(media);
        self
    }
}

/// Reference to an object held by the storage relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRef {
    pub key: String,
    pub url: Option<String>,
}

/// Row to insert; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub keyword: String,
    pub source_file: String,
    pub kind: ContentKind,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub content_hash: String,
    pub task_id: String,
}

/// A persisted, deduplicated record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedItem {
    pub id: i64,
    pub keyword: String,
    pub source_file: String,
    #[serde(rename = "scraped_url")]
    pub url: String,
    #[serde(rename = "content_type")]
    pub kind: ContentKind,
    pub title: String,
    pub description: Option<String>,
    pub content_hash: String,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    pub storage_url: Option<String>,
    pub storage_key: Option<String>,
}

impl ScrapedItem {
    pub fn from_new(id: i64, item: NewItem, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            keyword: item.keyword,
            source_file: item.source_file,
            url: item.url,
            kind: item.kind,
            title: item.title,
            description: item.description,
            content_hash: item.content_hash,
            task_id: item.task_id,
            created_at,
            storage_url: None,
            storage_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_names() {
        assert_eq!(ContentKind::Video.as_str(), "youtube");
        assert_eq!("video".parse::<ContentKind>().unwrap(), ContentKind::Video);
        assert_eq!(" PDF ".parse::<ContentKind>().unwrap(), ContentKind::Pdf);
        assert!("audio".parse::<ContentKind>().is_err());
        assert_eq!(serde_json::to_string(&ContentKind::Video).unwrap(), "\"youtube\"");
    }

    #[test]
    fn test_item_serializes_with_record_field_names() {
        let new = NewItem {
            keyword: "solar panels".into(),
            source_file: "A".into(),
            kind: ContentKind::Pdf,
            url: "https://example.org/solar.pdf".into(),
            title: "Solar".into(),
            description: None,
            content_hash: "abc".into(),
            task_id: "t1".into(),
        };
        let item = ScrapedItem::from_new(7, new, Utc::now());
        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(json["scraped_url"], "https://example.org/solar.pdf");
        assert_eq!(json["content_type"], "pdf");
        assert_eq!(json["id"], 7);
        assert!(json["storage_url"].is_null());
    }

    #[test]
    fn test_parse_keyword_lines() {
        let text = "solar panels,extra\n\n  wind turbines  \n\"hydro power\",x\n ,\n";
        assert_eq!(
            parse_keyword_lines(text),
            vec!["solar panels", "wind turbines", "hydro power"]
        );
    }

    #[test]
    fn test_quoted_keyword_keeps_commas() {
        let text = "\"solar, panels\",pdf\n\"the \"\"green\"\" grid\"\n\"unterminated, field\n";
        assert_eq!(
            parse_keyword_lines(text),
            vec!["solar, panels", "the \"green\" grid", "unterminated, field"]
        );
    }

    #[tokio::test]
    async fn test_keyword_set_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("energy.csv");
        std::fs::write(&path, "solar panels\nwind turbines\n").unwrap();

        let set = KeywordSet::from_file(&path).await.unwrap();
        assert_eq!(set.source_file, "energy.csv");
        assert_eq!(set.keywords.len(), 2);

        assert!(KeywordSet::from_file(&dir.path().join("missing.csv")).await.is_err());
    }

    #[test]
    fn test_media_dir_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"video").unwrap();
        let dir_path = dir.path().to_path_buf();

        let candidate = Candidate::new(ContentKind::Video, "https://youtu.be/x", "x")
            .with_media(DownloadedMedia::new(path.clone(), dir));
        assert!(candidate.media.as_ref().unwrap().path().exists());

        drop(candidate);
        assert!(!dir_path.exists());
    }
}
