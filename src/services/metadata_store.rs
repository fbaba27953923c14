//! src/services/metadata_store.rs
//!
//! MetadataStore — the `images` table behind the publish pipeline. Rows are
//! inserted once per published image, listed newest first, and soft-deleted
//! by flipping `is_active`.

use crate::models::image::{ImageFilter, ImageRecord, NewImageRecord};
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Default number of rows returned by a listing.
pub const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone)]
pub struct MetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl MetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Insert a new active record stamped with the current time.
    /// Returns the store-assigned id.
    pub async fn insert(&self, record: &NewImageRecord) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO images (
                title, description, filename, filepath, url, original_url,
                category, type, is_active, uploaded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            RETURNING id
            "#,
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.filename)
        .bind(&record.filepath)
        .bind(&record.url)
        .bind(&record.original_url)
        .bind(&record.category)
        .bind(&record.image_type)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        debug!(id, filename = %record.filename, "inserted image record");
        Ok(id)
    }

    /// List active records, newest first, optionally filtered by exact
    /// `type` and/or `category`.
    pub async fn query(&self, filter: &ImageFilter, limit: usize) -> StoreResult<Vec<ImageRecord>> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, title, description, filename, filepath, url, original_url, \
             category, type, is_active, uploaded_at \
             FROM images WHERE is_active = 1",
        );

        if let Some(image_type) = &filter.image_type {
            builder.push(" AND type = ");
            builder.push_bind(image_type);
        }

        if let Some(category) = &filter.category {
            builder.push(" AND category = ");
            builder.push_bind(category);
        }

        builder.push(" ORDER BY uploaded_at DESC, id DESC LIMIT ");
        builder.push_bind(limit as i64);

        let rows: Vec<ImageRecord> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows)
    }

    /// Soft-delete a record. Returns `false` when no active row has this id.
    pub async fn deactivate(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE images SET is_active = 0 WHERE id = ? AND is_active = 1")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lightweight connectivity check.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}
