//! Shared fixtures: synthetic PDFs, a temp-dir config and fake collaborators.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use docqa::config::Config;
use docqa::embedding::Embedder;
use docqa::error::StoreError;
use docqa::extract::DocumentLoader;
use docqa::llm::{ChatMessage, LanguageModel};
use docqa::models::{Chunk, Document, Page, ScoredChunk};
use docqa::store::{DocumentStore, SqliteDocumentStore};
use docqa::vector_index::VectorStore;
use docqa::{db, migrate};

/// Build a PDF with one page per entry, each page drawing its text in Courier.
pub fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Config rooted in a fresh temp dir, with embeddings disabled so nothing
/// downloads a model.
pub fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.db.path = tmp.path().join("data").join("documents.sqlite");
    config.storage.uploads_dir = tmp.path().join("uploads");
    config.embedding.provider = "disabled".to_string();
    config
}

pub async fn sqlite_documents(config: &Config) -> Arc<SqliteDocumentStore> {
    let pool = db::connect(config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    Arc::new(SqliteDocumentStore::new(pool))
}

pub async fn row_count(store: &SqliteDocumentStore) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

/// Sorted entry names of `dir`; empty when it does not exist.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let Ok(read) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============ Fakes ============

/// Bag-of-words hashing embedder: texts sharing words get similar vectors.
pub struct HashEmbedder {
    pub dims: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self { dims: 16 }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let bucket = word.bytes().fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % self.dims] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Returns a canned reply and records every prompt it receives.
pub struct ScriptedLlm {
    pub reply: String,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        Ok(self.reply.clone())
    }
}

/// Language model whose every call fails.
pub struct UnreachableLlm;

#[async_trait]
impl LanguageModel for UnreachableLlm {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        anyhow::bail!("connection refused")
    }
}

/// Vector store that cannot build indexes.
pub struct BrokenVectorStore;

#[async_trait]
impl VectorStore for BrokenVectorStore {
    async fn create(&self, _: &str, _: &[Chunk], _: &[Vec<f32>], _: &str) -> Result<()> {
        anyhow::bail!("index backend unavailable")
    }
    async fn search(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<ScoredChunk>> {
        anyhow::bail!("index backend unavailable")
    }
    async fn delete(&self, _: &str) -> Result<()> {
        Ok(())
    }
    fn location(&self, document_id: &str) -> PathBuf {
        PathBuf::from(document_id)
    }
}

/// Document store that rejects every save.
pub struct RejectingDocumentStore;

#[async_trait]
impl DocumentStore for RejectingDocumentStore {
    async fn save(&self, doc: &Document) -> Result<(), StoreError> {
        Err(StoreError::DuplicateKey(doc.id.clone()))
    }
    async fn find_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }
}

/// Loader whose stored file can never be read back.
pub struct UnreadableLoader;

#[async_trait]
impl DocumentLoader for UnreadableLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Page>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("cannot read {}", path.display()),
        )
        .into())
    }
}
