//! src/services/metadata_store.rs
//!
//! The metadata table: one row per read set, keyed by read set ARN.
//! `MetadataStore` is the write seam used by the backfill and the
//! reconciler; `SqliteMetadataStore` keeps the rows in SQLite with scalar
//! fields as columns and `tags`/`files`/`container` as JSON text.

use crate::{
    models::record::{ContainerInfo, FileEntry, MetadataRecord, ReadSetStatus},
    services::retry::{RetryPolicy, Retryable},
};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table name `{0}` is invalid: use letters, digits and underscores")]
    InvalidTableName(String),
    #[error("stored record `{id}` is corrupt: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Sqlx(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => true,
            Self::Sqlx(sqlx::Error::Database(db_err)) => {
                let message = db_err.message().to_ascii_lowercase();
                message.contains("locked") || message.contains("busy")
            }
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a status-only update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied,
    /// No record with that id exists. Nothing was written.
    Missing,
}

/// Idempotent writes and simple reads against the metadata table.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create the record or replace every field of the existing one.
    async fn upsert(&self, record: &MetadataRecord) -> StoreResult<()>;

    /// Set only `status`. A missing record is left missing.
    async fn update_status(&self, id: &str, status: &ReadSetStatus) -> StoreResult<StatusUpdate>;

    /// Delete the record. Returns whether a record was present.
    async fn remove(&self, id: &str) -> StoreResult<bool>;

    async fn get(&self, id: &str) -> StoreResult<Option<MetadataRecord>>;

    /// All records of one sequence store, ordered by id.
    async fn list_by_container(&self, container_id: &str) -> StoreResult<Vec<MetadataRecord>>;
}

/// SQLite-backed metadata table.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
    table: String,
    retry: RetryPolicy,
}

#[derive(FromRow)]
struct RecordRow {
    id: String,
    object_id: Option<String>,
    file_type: Option<String>,
    name: Option<String>,
    description: Option<String>,
    reference_id: Option<String>,
    sample_id: Option<String>,
    subject_id: Option<String>,
    status: String,
    tags: Option<String>,
    files: String,
    container: String,
}

const RECORD_COLUMNS: &str = "id, object_id, file_type, name, description, reference_id, \
     sample_id, subject_id, status, tags, files, container";

impl RecordRow {
    fn into_record(self) -> StoreResult<MetadataRecord> {
        let id = self.id;
        let corrupt = |source| StoreError::Corrupt {
            id: id.clone(),
            source,
        };

        let tags: Option<BTreeMap<String, String>> = match self.tags.as_deref() {
            Some(raw) => Some(serde_json::from_str(raw).map_err(corrupt)?),
            None => None,
        };
        let files: Vec<FileEntry> = serde_json::from_str(&self.files).map_err(corrupt)?;
        let container: ContainerInfo = serde_json::from_str(&self.container).map_err(corrupt)?;

        Ok(MetadataRecord {
            id,
            object_id: self.object_id,
            file_type: self.file_type,
            name: self.name,
            description: self.description,
            reference_id: self.reference_id,
            sample_id: self.sample_id,
            subject_id: self.subject_id,
            status: ReadSetStatus::parse(&self.status),
            tags: tags.filter(|t| !t.is_empty()),
            files,
            container,
        })
    }
}

impl SqliteMetadataStore {
    /// Wrap a pool. The table name is interpolated into SQL, so it is
    /// restricted to `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn new(db: Arc<SqlitePool>, table: impl Into<String>, retry: RetryPolicy) -> StoreResult<Self> {
        let table = table.into();
        let valid = table
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(StoreError::InvalidTableName(table));
        }
        Ok(Self { db, table, retry })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the table and its container index if they do not exist.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY NOT NULL,
                    object_id TEXT,
                    file_type TEXT,
                    name TEXT,
                    description TEXT,
                    reference_id TEXT,
                    sample_id TEXT,
                    subject_id TEXT,
                    status TEXT NOT NULL,
                    tags TEXT,
                    files TEXT NOT NULL,
                    container TEXT NOT NULL,
                    container_id TEXT NOT NULL
                )",
                table = self.table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_container_idx ON {table} (container_id, id)",
                table = self.table
            ),
        ];

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Cheap connectivity and schema probe for readiness checks.
    pub async fn health_check(&self) -> StoreResult<()> {
        let sql = format!("SELECT COUNT(*) FROM (SELECT 1 FROM {} LIMIT 1)", self.table);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }

    async fn upsert_once(&self, record: &MetadataRecord) -> StoreResult<()> {
        let tags = match record.tags.as_ref().filter(|t| !t.is_empty()) {
            Some(tags) => Some(serde_json::to_string(tags)?),
            None => None,
        };
        let files = serde_json::to_string(&record.files)?;
        let container = serde_json::to_string(&record.container)?;

        let sql = format!(
            "INSERT INTO {table} ({columns}, container_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                object_id = excluded.object_id,
                file_type = excluded.file_type,
                name = excluded.name,
                description = excluded.description,
                reference_id = excluded.reference_id,
                sample_id = excluded.sample_id,
                subject_id = excluded.subject_id,
                status = excluded.status,
                tags = excluded.tags,
                files = excluded.files,
                container = excluded.container,
                container_id = excluded.container_id",
            table = self.table,
            columns = RECORD_COLUMNS
        );

        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.object_id)
            .bind(&record.file_type)
            .bind(&record.name)
            .bind(&record.description)
            .bind(&record.reference_id)
            .bind(&record.sample_id)
            .bind(&record.subject_id)
            .bind(record.status.as_str())
            .bind(tags)
            .bind(files)
            .bind(container)
            .bind(&record.container.id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn update_status_once(&self, id: &str, status: &ReadSetStatus) -> StoreResult<StatusUpdate> {
        let sql = format!("UPDATE {} SET status = ? WHERE id = ?", self.table);
        let result = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(id)
            .execute(&*self.db)
            .await?;

        Ok(if result.rows_affected() == 0 {
            StatusUpdate::Missing
        } else {
            StatusUpdate::Applied
        })
    }

    async fn remove_once(&self, id: &str) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let result = sqlx::query(&sql).bind(id).execute(&*self.db).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn upsert(&self, record: &MetadataRecord) -> StoreResult<()> {
        self.retry
            .run("upsert", || self.upsert_once(record))
            .await?;
        debug!(id = %record.id, "record upserted");
        Ok(())
    }

    async fn update_status(&self, id: &str, status: &ReadSetStatus) -> StoreResult<StatusUpdate> {
        let outcome = self
            .retry
            .run("update_status", || self.update_status_once(id, status))
            .await?;
        if outcome == StatusUpdate::Missing {
            debug!(id, %status, "no record to update; status change ignored");
        }
        Ok(outcome)
    }

    async fn remove(&self, id: &str) -> StoreResult<bool> {
        self.retry.run("remove", || self.remove_once(id)).await
    }

    async fn get(&self, id: &str) -> StoreResult<Option<MetadataRecord>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", RECORD_COLUMNS, self.table);
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        row.map(RecordRow::into_record).transpose()
    }

    async fn list_by_container(&self, container_id: &str) -> StoreResult<Vec<MetadataRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE container_id = ? ORDER BY id ASC",
            RECORD_COLUMNS, self.table
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(container_id)
            .fetch_all(&*self.db)
            .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }
}
