//! # docqa
//!
//! Upload a PDF, then ask questions about it. Answers come from an LLM
//! grounded on the passages of that one document most similar to the
//! question.
//!
//! ## Architecture
//!
//! ```text
//!  POST /upload                                POST /ask
//!       │                                          │
//!       ▼                                          ▼
//! ┌─────────────────┐   ┌────────────────┐   ┌──────────────┐
//! │IngestionPipeline│──▶│ vector index   │◀──│   Answerer   │──▶ LLM
//! │ load→chunk→embed│   │ <id>_vectors/  │   │ embed+top-k  │
//! └────────┬────────┘   └────────────────┘   └──────┬───────┘
//!          ▼                                        │
//!   ┌─────────────┐                                 │
//!   │ documents   │◀────────────────────────────────┘
//!   │ (SQLite)    │
//!   └─────────────┘
//! ```
//!
//! Every collaborator (loader, embedder, vector store, document store,
//! language model) is a trait object built once at startup and passed in,
//! so tests can swap any of them for a fake.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Upload, ask and store error enums |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Document metadata store |
//! | [`extract`] | PDF page text extraction |
//! | [`chunk`] | Overlapping text splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | Per-document vector indexes |
//! | [`llm`] | Chat-completion client |
//! | [`ingest`] | Upload pipeline with rollback |
//! | [`answer`] | Retrieval-augmented answering |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
mod http;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod server;
pub mod store;
pub mod vector_index;
