//! Upload ingestion pipeline.
//!
//! Turns an uploaded file into a queryable document:
//!
//! ```text
//! validate name + bytes
//!   → write <uploads>/<id>.pdf          (registers: remove file)
//!   → load pages
//!   → split into chunks → embed → create vector index
//!                                       (registers: drop index)
//!   → save metadata row
//! ```
//!
//! Each created artifact registers a [`CleanupAction`] on a [`Rollback`].
//! When a later step fails the actions run in reverse order, so a failed
//! upload leaves no file, no index and no row. A metadata row therefore
//! always points at an existing raw file and vector index.
//!
//! Cleanup is best-effort: an action that fails is logged and the original
//! error is still the one returned.

use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::chunk::TextSplitter;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::IngestError;
use crate::extract::{is_pdf_filename, DocumentLoader, ExtractError};
use crate::models::{Chunk, Document};
use crate::store::DocumentStore;
use crate::vector_index::VectorStore;

/// Undo step for one artifact created during ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum CleanupAction {
    RemoveFile(PathBuf),
    DropIndex(String),
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupAction::RemoveFile(path) => write!(f, "remove file {}", path.display()),
            CleanupAction::DropIndex(id) => write!(f, "drop vector index {}", id),
        }
    }
}

/// What a rollback did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RollbackReport {
    /// Every action attempted, in execution order.
    pub ran: Vec<CleanupAction>,
    /// The subset of `ran` that failed.
    pub failed: Vec<CleanupAction>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered list of cleanup actions, run last-registered first.
#[derive(Debug, Default)]
pub struct Rollback {
    actions: Vec<CleanupAction>,
}

impl Rollback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: CleanupAction) {
        self.actions.push(action);
    }

    pub fn pending(&self) -> &[CleanupAction] {
        &self.actions
    }

    /// Disarm: the artifacts are now owned by a committed document.
    pub fn commit(mut self) {
        self.actions.clear();
    }

    /// Run every action in reverse order, continuing past failures.
    pub async fn run(mut self, vectors: &dyn VectorStore) -> RollbackReport {
        let mut report = RollbackReport::default();

        while let Some(action) = self.actions.pop() {
            let outcome = match &action {
                CleanupAction::RemoveFile(path) => match tokio::fs::remove_file(path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(anyhow::Error::from(e)),
                },
                CleanupAction::DropIndex(id) => vectors.delete(id).await,
            };

            if let Err(e) = outcome {
                tracing::error!(action = %action, error = %e, "cleanup failed; artifact left behind");
                report.failed.push(action.clone());
            }
            report.ran.push(action);
        }

        report
    }
}

/// Orchestrates a single upload end to end.
pub struct IngestionPipeline {
    uploads_dir: PathBuf,
    splitter: TextSplitter,
    batch_size: usize,
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    documents: Arc<dyn DocumentStore>,
}

impl IngestionPipeline {
    pub fn new(
        config: &Config,
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            uploads_dir: config.storage.uploads_dir.clone(),
            splitter: TextSplitter::from_config(&config.chunking),
            batch_size: config.embedding.batch_size.max(1),
            loader,
            embedder,
            vectors,
            documents,
        }
    }

    /// Ingest one uploaded file. `filename` is kept verbatim as the
    /// document's display name.
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<Document, IngestError> {
        if !is_pdf_filename(filename) {
            return Err(IngestError::UnsupportedFormat(filename.to_string()));
        }
        if bytes.is_empty() {
            return Err(IngestError::EmptyUpload);
        }

        let id = Uuid::new_v4().to_string();
        let mut rollback = Rollback::new();

        let path = self.store_raw(&id, bytes).await?;
        rollback.register(CleanupAction::RemoveFile(path.clone()));

        let pages = match self.loader.load(&path).await {
            Ok(pages) if pages.iter().any(|p| !p.text.trim().is_empty()) => pages,
            Ok(_) => {
                return Err(self
                    .abort(rollback, IngestError::CorruptDocument("no text found".to_string()))
                    .await)
            }
            Err(e) => {
                let err = if e.downcast_ref::<ExtractError>().is_some() {
                    IngestError::CorruptDocument(e.to_string())
                } else {
                    IngestError::StorageWrite(format!("{:#}", e))
                };
                return Err(self.abort(rollback, err).await);
            }
        };

        let chunks = self.splitter.split_pages(&id, &pages);
        if let Err(e) = self.build_index(&id, &chunks).await {
            return Err(self
                .abort(rollback, IngestError::Processing(format!("{:#}", e)))
                .await);
        }
        rollback.register(CleanupAction::DropIndex(id.clone()));

        let document = Document {
            id,
            name: filename.to_string(),
            path,
            uploaded_at: Utc::now(),
        };

        if let Err(e) = self.documents.save(&document).await {
            return Err(self
                .abort(rollback, IngestError::Persistence(e.to_string()))
                .await);
        }

        rollback.commit();
        tracing::info!(
            id = %document.id,
            name = %document.name,
            index = %self.vectors.location(&document.id).display(),
            pages = pages.len(),
            chunks = chunks.len(),
            "document ingested"
        );
        Ok(document)
    }

    async fn store_raw(&self, id: &str, bytes: &[u8]) -> Result<PathBuf, IngestError> {
        let path = self.uploads_dir.join(format!("{}.pdf", id));

        let written = async {
            tokio::fs::create_dir_all(&self.uploads_dir).await?;
            tokio::fs::write(&path, bytes).await?;
            if !tokio::fs::try_exists(&path).await? {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "file missing after write",
                ));
            }
            Ok(())
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::error!(path = %path.display(), error = %cleanup, "failed to remove partial upload");
                }
            }
            return Err(IngestError::StorageWrite(e.to_string()));
        }

        Ok(path)
    }

    async fn build_index(&self, id: &str, chunks: &[Chunk]) -> anyhow::Result<()> {
        if chunks.is_empty() {
            anyhow::bail!("document produced no text chunks");
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let dims = self.embedder.dims();
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embedded = self.embedder.embed(batch).await?;
            if embedded.len() != batch.len() {
                anyhow::bail!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                );
            }
            if let Some(bad) = embedded.iter().find(|v| v.len() != dims) {
                anyhow::bail!(
                    "embedder returned a {}-dimensional vector, expected {}",
                    bad.len(),
                    dims
                );
            }
            vectors.extend(embedded);
        }

        self.vectors
            .create(id, chunks, &vectors, self.embedder.model_name())
            .await
    }

    async fn abort(&self, rollback: Rollback, err: IngestError) -> IngestError {
        let pending: Vec<String> = rollback.pending().iter().map(ToString::to_string).collect();
        tracing::debug!(error = %err, ?pending, "rolling back upload");
        let report = rollback.run(self.vectors.as_ref()).await;
        tracing::warn!(
            error = %err,
            cleaned = report.ran.len(),
            cleanup_failures = report.failed.len(),
            "upload rejected"
        );
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredChunk;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records deletes; fails every delete when `fail_delete` is set.
    #[derive(Default)]
    struct RecordingVectors {
        deleted: Mutex<Vec<String>>,
        fail_delete: bool,
    }

    #[async_trait]
    impl VectorStore for RecordingVectors {
        async fn create(&self, _: &str, _: &[Chunk], _: &[Vec<f32>], _: &str) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }
        async fn delete(&self, document_id: &str) -> Result<()> {
            self.deleted.lock().unwrap().push(document_id.to_string());
            if self.fail_delete {
                anyhow::bail!("disk on fire");
            }
            Ok(())
        }
        fn location(&self, document_id: &str) -> PathBuf {
            PathBuf::from(document_id)
        }
    }

    #[tokio::test]
    async fn rollback_runs_in_reverse_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("a.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let mut rollback = Rollback::new();
        rollback.register(CleanupAction::RemoveFile(file.clone()));
        rollback.register(CleanupAction::DropIndex("a".to_string()));

        let vectors = RecordingVectors::default();
        let report = rollback.run(&vectors).await;

        assert_eq!(
            report.ran,
            vec![
                CleanupAction::DropIndex("a".to_string()),
                CleanupAction::RemoveFile(file.clone()),
            ]
        );
        assert!(report.is_clean());
        assert!(!file.exists());
        assert_eq!(*vectors.deleted.lock().unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn rollback_continues_past_failures() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("b.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let mut rollback = Rollback::new();
        rollback.register(CleanupAction::RemoveFile(file.clone()));
        rollback.register(CleanupAction::DropIndex("b".to_string()));

        let vectors = RecordingVectors {
            fail_delete: true,
            ..Default::default()
        };
        let report = rollback.run(&vectors).await;

        assert_eq!(report.ran.len(), 2);
        assert_eq!(report.failed, vec![CleanupAction::DropIndex("b".to_string())]);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn removing_missing_file_is_not_a_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut rollback = Rollback::new();
        rollback.register(CleanupAction::RemoveFile(tmp.path().join("never-written.pdf")));

        let report = rollback.run(&RecordingVectors::default()).await;
        assert!(report.is_clean());
        assert_eq!(report.ran.len(), 1);
    }

    #[tokio::test]
    async fn committed_rollback_does_nothing() {
        let mut rollback = Rollback::new();
        rollback.register(CleanupAction::DropIndex("c".to_string()));
        assert_eq!(rollback.pending().len(), 1);
        rollback.commit();
    }

    #[test]
    fn pending_lists_actions_in_registration_order() {
        let mut rollback = Rollback::new();
        rollback.register(CleanupAction::RemoveFile(PathBuf::from("uploads/d.pdf")));
        rollback.register(CleanupAction::DropIndex("d".to_string()));

        let described: Vec<String> = rollback.pending().iter().map(ToString::to_string).collect();
        assert_eq!(described.len(), 2);
        assert!(described[0].starts_with("remove file"));
        assert_eq!(described[1], "drop vector index d");
    }

    #[test]
    fn actions_describe_themselves() {
        assert_eq!(
            CleanupAction::DropIndex("x1".to_string()).to_string(),
            "drop vector index x1"
        );
        assert!(CleanupAction::RemoveFile(PathBuf::from("uploads/x1.pdf"))
            .to_string()
            .starts_with("remove file uploads"));
    }
}
