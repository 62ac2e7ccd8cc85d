//! Per-document vector indexes.
//!
//! Every uploaded document gets its own directory `<root>/<id>_vectors/`
//! holding a single SQLite file, `index.sqlite`:
//!
//! ```text
//! chunks(chunk_index INTEGER PRIMARY KEY, page INTEGER, text TEXT,
//!        hash TEXT, embedding BLOB)
//! meta(key TEXT PRIMARY KEY, value TEXT)   -- model, dims, created_at
//! ```
//!
//! An index is written once, when the document is ingested, and only read
//! afterwards. Search is brute-force cosine similarity over every chunk of
//! the one document, which is plenty for a single PDF.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ScoredChunk};

const INDEX_FILE: &str = "index.sqlite";

/// Storage and similarity search for chunk embeddings, one index per document.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Build the index for `document_id`. Fails if one already exists. A
    /// failed build leaves nothing behind.
    async fn create(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<()>;

    /// The `k` chunks most similar to `query`, best first.
    async fn search(&self, document_id: &str, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Remove the index for `document_id`. Removing a missing index is not an error.
    async fn delete(&self, document_id: &str) -> Result<()>;

    /// Where the index for `document_id` lives, for logs.
    fn location(&self, document_id: &str) -> PathBuf;
}

/// [`VectorStore`] writing one SQLite file per document under `root`.
pub struct SqliteVectorStore {
    root: PathBuf,
}

impl SqliteVectorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn index_dir(&self, document_id: &str) -> PathBuf {
        self.root.join(format!("{}_vectors", document_id))
    }

    async fn open(path: &Path, create: bool) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .read_only(!create);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(pool)
    }

    async fn write_index(
        path: &Path,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
        dims: usize,
    ) -> Result<()> {
        let pool = Self::open(path, true).await?;
        let result = Self::write_rows(&pool, chunks, vectors, model, dims).await;
        pool.close().await;
        result
    }

    async fn write_rows(
        pool: &SqlitePool,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
        dims: usize,
    ) -> Result<()> {
        sqlx::query(
            "CREATE TABLE chunks (
                chunk_index INTEGER PRIMARY KEY,
                page INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(pool)
            .await?;

        let mut tx = pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                "INSERT INTO chunks (chunk_index, page, text, hash, embedding)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(chunk.chunk_index)
            .bind(chunk.page as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        let created_at = chrono::Utc::now().to_rfc3339();
        for (key, value) in [
            ("model", model.to_string()),
            ("dims", dims.to_string()),
            ("created_at", created_at),
        ] {
            sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn read_ranked(pool: &SqlitePool, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let dims: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = 'dims'")
            .fetch_optional(pool)
            .await?;
        let dims: usize = dims
            .context("vector index has no dims entry")?
            .parse()
            .context("vector index dims entry is not a number")?;
        if query.len() != dims {
            bail!(
                "query vector has {} dimensions but the index was built with {}",
                query.len(),
                dims
            );
        }

        let rows = sqlx::query("SELECT chunk_index, page, text, embedding FROM chunks")
            .fetch_all(pool)
            .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let page: i64 = row.get("page");
                ScoredChunk {
                    chunk_index: row.get("chunk_index"),
                    page: page as u32,
                    text: row.get("text"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                }
            })
            .collect();

        // Ties keep document order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        scored.truncate(k);

        Ok(scored)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<()> {
        if chunks.is_empty() {
            bail!("refusing to build an empty vector index");
        }
        if chunks.len() != vectors.len() {
            bail!(
                "got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        let dims = vectors[0].len();
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            bail!("embedding vectors must share one non-zero dimension");
        }

        let dir = self.index_dir(document_id);
        tokio::fs::create_dir_all(&self.root).await?;
        // create_dir (not create_dir_all) so an existing index is never reused.
        tokio::fs::create_dir(&dir)
            .await
            .with_context(|| format!("vector index directory {} not created", dir.display()))?;

        let result = Self::write_index(&dir.join(INDEX_FILE), chunks, vectors, model, dims).await;

        if result.is_err() {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                tracing::error!(path = %dir.display(), error = %e, "failed to remove partial vector index");
            }
        }
        result
    }

    async fn search(&self, document_id: &str, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let path = self.index_dir(document_id).join(INDEX_FILE);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            bail!("no vector index for document {}", document_id);
        }

        let pool = Self::open(&path, false).await?;
        let result = Self::read_ranked(&pool, query, k).await;
        pool.close().await;
        result
    }

    async fn delete(&self, document_id: &str) -> Result<()> {
        let dir = self.index_dir(document_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", dir.display())),
        }
    }

    fn location(&self, document_id: &str) -> PathBuf {
        self.index_dir(document_id)
    }
}
