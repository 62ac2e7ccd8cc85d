//! Document metadata store.
//!
//! The [`DocumentStore`] trait is the seam the pipeline and answerer depend
//! on; [`SqliteDocumentStore`] is the durable implementation backed by the
//! `documents` table created in [`crate::migrate`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;

use crate::error::StoreError;
use crate::models::Document;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new row. Never overwrites an existing id.
    async fn save(&self, doc: &Document) -> Result<(), StoreError>;

    /// Path of the stored raw file for `id`.
    async fn find_path(&self, id: &str) -> Result<PathBuf, StoreError>;

    /// Full metadata row for `id`.
    async fn get(&self, id: &str) -> Result<Document, StoreError>;
}

/// SQLite implementation of [`DocumentStore`].
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad uploaded_at '{}': {}", raw, e)))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn save(&self, doc: &Document) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO documents (id, name, path, uploaded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.name)
        .bind(doc.path.to_string_lossy().as_ref())
        .bind(format_ts(&doc.uploaded_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateKey(doc.id.clone()))
            }
            Err(e) => Err(StoreError::Storage(e)),
        }
    }

    async fn find_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        let path: Option<String> = sqlx::query_scalar("SELECT path FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        path.map(PathBuf::from)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        let row = sqlx::query("SELECT id, name, path, uploaded_at FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let path: String = row.get("path");
        let uploaded_at: String = row.get("uploaded_at");

        Ok(Document {
            id: row.get("id"),
            name: row.get("name"),
            path: PathBuf::from(path),
            uploaded_at: parse_ts(&uploaded_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn store(tmp: &TempDir) -> SqliteDocumentStore {
        let pool = db::connect_path(&tmp.path().join("documents.sqlite"))
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        SqliteDocumentStore::new(pool)
    }

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            name: "Quarterly Report (final).pdf".to_string(),
            path: PathBuf::from(format!("uploads/{}.pdf", id)),
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_lookup() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let d = doc("a1");

        store.save(&d).await.unwrap();

        assert_eq!(store.find_path("a1").await.unwrap(), d.path);
        let fetched = store.get("a1").await.unwrap();
        assert_eq!(fetched.name, "Quarterly Report (final).pdf");
        assert_eq!(
            fetched.uploaded_at.timestamp_micros(),
            d.uploaded_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        store.save(&doc("dup")).await.unwrap();
        let err = store.save(&doc("dup")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(id) if id == "dup"));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        assert!(matches!(
            store.find_path("missing").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            store.get("missing").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn rows_survive_reconnect() {
        let tmp = TempDir::new().unwrap();
        {
            let store = store(&tmp).await;
            store.save(&doc("persist")).await.unwrap();
            store.pool().close().await;
        }
        let store = store(&tmp).await;
        assert!(store.find_path("persist").await.is_ok());
    }
}
