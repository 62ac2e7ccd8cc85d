//! Core data models.
//!
//! These types flow through the upload pipeline (pages → chunks → indexed
//! chunks → document) and the ask path (scored chunks → answer).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Metadata row for an uploaded document.
///
/// A row exists only when both the raw file at `path` and the document's
/// vector index were created.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    /// Original filename, exactly as uploaded.
    pub name: String,
    pub path: PathBuf,
    pub uploaded_at: DateTime<Utc>,
}

/// One page of extracted text, numbered from 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

/// A window of a document's extracted text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub document_id: String,
    /// Position in the document, contiguous from 0.
    pub chunk_index: i64,
    /// Page the window was cut from.
    pub page: u32,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk returned from a similarity search, best first.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_index: i64,
    pub page: u32,
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Result of a single ask request. Not persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: String,
    pub document_id: String,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}
