use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

use super::{ItemPage, ItemStore};
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{ContentKind, NewItem, ScrapedItem, StorageRef};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS scraped_items (
    id BIGSERIAL PRIMARY KEY,
    keyword TEXT NOT NULL,
    source_file TEXT NOT NULL,
    content_type TEXT NOT NULL,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    content_hash TEXT NOT NULL UNIQUE,
    task_id TEXT NOT NULL,
    storage_key TEXT,
    storage_url TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (url, content_type)
)";

const INDEXES: [&str; 2] = [
    "CREATE INDEX IF NOT EXISTS scraped_items_source_keyword ON scraped_items (source_file, keyword)",
    "CREATE INDEX IF NOT EXISTS scraped_items_task ON scraped_items (task_id, created_at DESC)",
];

const ITEM_COLUMNS: &str = "id, keyword, source_file, content_type, url, title, description, \
     content_hash, task_id, storage_key, storage_url, created_at";

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: i64,
    keyword: String,
    source_file: String,
    content_type: String,
    url: String,
    title: String,
    description: Option<String>,
    content_hash: String,
    task_id: String,
    storage_key: Option<String>,
    storage_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for ScrapedItem {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> StoreResult<Self> {
        let kind: ContentKind = row.content_type.parse().map_err(StoreError::Rejected)?;
        Ok(ScrapedItem {
            id: row.id,
            keyword: row.keyword,
            source_file: row.source_file,
            url: row.url,
            kind,
            title: row.title,
            description: row.description,
            content_hash: row.content_hash,
            task_id: row.task_id,
            created_at: row.created_at,
            storage_url: row.storage_url,
            storage_key: row.storage_key,
        })
    }
}

/// SQLSTATE classes meaning the server or connection is gone, not the row:
/// 08 connection exception, 53 insufficient resources, 57 operator intervention
fn is_connection_failure(code: Option<&str>) -> bool {
    matches!(code, Some(code) if ["08", "53", "57"].iter().any(|class| code.starts_with(*class)))
}

/// Map driver errors onto the orchestrator's three failure classes
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(db.message().to_string())
        }
        sqlx::Error::Database(db) if is_connection_failure(db.code().as_deref()) => {
            StoreError::Unavailable(db.message().to_string())
        }
        sqlx::Error::Database(db) => StoreError::Rejected(db.message().to_string()),
        e @ (sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. }) => StoreError::Rejected(e.to_string()),
        e => StoreError::Unavailable(e.to_string()),
    }
}

/// Postgres-backed item store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and create the schema when missing
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await
            .context("Failed to connect to Postgres")?;

        let store = Self { pool };
        store.migrate().await?;
        info!("🐘 Connected to Postgres item store");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to create scraped_items table")?;
        for statement in INDEXES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ItemStore for PgStore {
    async fn url_exists(&self, kind: ContentKind, url: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM scraped_items WHERE url = $1 AND content_type = $2)",
        )
        .bind(url)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn hash_exists(&self, content_hash: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM scraped_items WHERE content_hash = $1)",
        )
        .bind(content_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn insert(&self, item: NewItem) -> StoreResult<ScrapedItem> {
        let sql = format!(
            "INSERT INTO scraped_items
                (keyword, source_file, content_type, url, title, description, content_hash, task_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            ITEM_COLUMNS
        );

        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(&item.keyword)
            .bind(&item.source_file)
            .bind(item.kind.as_str())
            .bind(&item.url)
            .bind(&item.title)
            .bind(&item.description)
            .bind(&item.content_hash)
            .bind(&item.task_id)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        row.try_into()
    }

    async fn attach_storage(&self, id: i64, storage: &StorageRef) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE scraped_items SET storage_key = $1, storage_url = $2 WHERE id = $3",
        )
        .bind(&storage.key)
        .bind(&storage.url)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Rejected(format!("no item with id {}", id)));
        }
        Ok(())
    }

    async fn keywords_for_source(&self, source_file: &str) -> StoreResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT keyword FROM scraped_items WHERE source_file = $1",
        )
        .bind(source_file)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn list_items(
        &self,
        task_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<ItemPage> {
        // LIMIT NULL is unbounded in Postgres
        let limit = (limit > 0).then_some(limit as i64);
        let sql = format!(
            "SELECT {} FROM scraped_items
             WHERE ($1::TEXT IS NULL OR task_id = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
            ITEM_COLUMNS
        );

        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(task_id)
            .bind(limit)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM scraped_items WHERE ($1::TEXT IS NULL OR task_id = $1)",
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        let items = rows
            .into_iter()
            .map(ScrapedItem::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(ItemPage {
            items,
            total: total.max(0) as u64,
        })
    }

    async fn source_files_for_task(&self, task_id: &str) -> StoreResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT source_file FROM scraped_items
             WHERE task_id = $1
             GROUP BY source_file
             ORDER BY MIN(id)",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn clear(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM scraped_items")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }
}
