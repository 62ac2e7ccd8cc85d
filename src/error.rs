//! Error types for the upload and ask paths.
//!
//! These are plain tagged values. Mapping to HTTP status codes happens only
//! in [`crate::server`].

use thiserror::Error;

/// Failures of the document metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document id already exists: {0}")]
    DuplicateKey(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document store unavailable: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("corrupt document row: {0}")]
    Corrupt(String),
}

/// Failures of [`IngestionPipeline::ingest`](crate::ingest::IngestionPipeline::ingest),
/// in the order the pipeline can produce them.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Only PDF files are allowed (got '{0}')")]
    UnsupportedFormat(String),

    #[error("The uploaded file is empty")]
    EmptyUpload,

    #[error("Failed to save the uploaded file: {0}")]
    StorageWrite(String),

    #[error("The PDF file appears to be empty or corrupted: {0}")]
    CorruptDocument(String),

    #[error("Failed to process the PDF: {0}")]
    Processing(String),

    #[error("Database error: {0}")]
    Persistence(String),
}

/// Failures of [`Answerer::answer`](crate::answer::Answerer::answer).
#[derive(Debug, Error)]
pub enum AskError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Failed to search the document index: {0}")]
    Retrieval(String),

    #[error("Failed to generate an answer: {0}")]
    Generation(String),
}

impl IngestError {
    /// Machine-readable code, stable across message changes.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::UnsupportedFormat(_) => "unsupported_format",
            IngestError::EmptyUpload => "empty_upload",
            IngestError::StorageWrite(_) => "storage_write_error",
            IngestError::CorruptDocument(_) => "corrupt_document",
            IngestError::Processing(_) => "processing_error",
            IngestError::Persistence(_) => "persistence_error",
        }
    }
}

impl AskError {
    pub fn code(&self) -> &'static str {
        match self {
            AskError::NotFound(_) => "not_found",
            AskError::Retrieval(_) => "retrieval_error",
            AskError::Generation(_) => "generation_error",
        }
    }
}
