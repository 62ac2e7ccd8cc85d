//! # docqa CLI
//!
//! The `docqa` binary runs the document question-answering HTTP service and
//! offers the same upload/ask operations from the command line.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and run schema migrations |
//! | `docqa serve` | Start the HTTP server (`/upload`, `/ask`, `/health`) |
//! | `docqa upload <file>` | Ingest a local PDF and print the new document |
//! | `docqa ask <id> "<question>"` | Answer a question about an uploaded document |
//! | `docqa get <id>` | Print a document's stored metadata |
//!
//! A `.env` file in the working directory is read at startup (for example
//! `TOGETHER_API_KEY=...`); variables already set in the environment win.
//!
//! A missing config file means built-in defaults. Logs go to stderr and
//! are filtered with `RUST_LOG` (default `info`); command output goes to
//! stdout as JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docqa::answer::Answerer;
use docqa::config::{self, Config};
use docqa::embedding::{self, Embedder};
use docqa::extract::PdfLoader;
use docqa::ingest::IngestionPipeline;
use docqa::llm::ChatCompletionsClient;
use docqa::server::{self, AppState};
use docqa::store::{DocumentStore, SqliteDocumentStore};
use docqa::vector_index::SqliteVectorStore;
use docqa::{db, migrate};

/// docqa: ask questions about uploaded PDF documents.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Upload PDFs and ask questions about them, answered by an LLM grounded on the document",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. Built-in defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents table.
    /// Running it multiple times is safe.
    Init,

    /// Start the HTTP server.
    Serve,

    /// Ingest a local PDF file.
    Upload {
        /// Path to the PDF.
        file: PathBuf,
    },

    /// Ask a question about an uploaded document.
    Ask {
        /// Document id returned by `upload`.
        document_id: String,
        /// The question, in natural language.
        question: String,
    },

    /// Show an uploaded document's metadata.
    Get {
        /// Document id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => {
            open_documents(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            let documents = open_documents(&cfg).await?;
            let embedder = load_embedder(&cfg).await?;
            let state = AppState {
                pipeline: Arc::new(build_pipeline(&cfg, documents.clone(), embedder.clone())),
                answerer: Arc::new(build_answerer(&cfg, documents, embedder)?),
            };
            server::run_server(&cfg, state).await?;
        }
        Commands::Upload { file } => {
            let documents = open_documents(&cfg).await?;
            let embedder = load_embedder(&cfg).await?;
            let pipeline = build_pipeline(&cfg, documents, embedder);

            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let doc = pipeline.ingest(&display_name(&file), &bytes).await?;

            print_json(&serde_json::json!({
                "id": doc.id,
                "name": doc.name,
                "uploadedAt": doc.uploaded_at,
            }))?;
        }
        Commands::Ask {
            document_id,
            question,
        } => {
            let documents = open_documents(&cfg).await?;
            let embedder = load_embedder(&cfg).await?;
            let answerer = build_answerer(&cfg, documents, embedder)?;

            let answer = answerer.answer(&document_id, &question).await?;
            print_json(&answer)?;
        }
        Commands::Get { id } => {
            let documents = open_documents(&cfg).await?;
            let doc = documents.get(&id).await?;

            print_json(&serde_json::json!({
                "id": doc.id,
                "name": doc.name,
                "path": doc.path,
                "uploadedAt": doc.uploaded_at,
            }))?;
        }
    }

    Ok(())
}

async fn open_documents(cfg: &Config) -> anyhow::Result<Arc<SqliteDocumentStore>> {
    let pool = db::connect(cfg).await?;
    migrate::run_migrations(&pool).await?;
    Ok(Arc::new(SqliteDocumentStore::new(pool)))
}

/// Model loading can download weights, so it runs off the async workers.
async fn load_embedder(cfg: &Config) -> anyhow::Result<Arc<dyn Embedder>> {
    let embedding_cfg = cfg.embedding.clone();
    tokio::task::spawn_blocking(move || embedding::create_embedder(&embedding_cfg)).await?
}

fn build_pipeline(
    cfg: &Config,
    documents: Arc<SqliteDocumentStore>,
    embedder: Arc<dyn Embedder>,
) -> IngestionPipeline {
    IngestionPipeline::new(
        cfg,
        Arc::new(PdfLoader),
        embedder,
        Arc::new(SqliteVectorStore::new(&cfg.storage.uploads_dir)),
        documents,
    )
}

fn build_answerer(
    cfg: &Config,
    documents: Arc<SqliteDocumentStore>,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<Answerer> {
    let llm = ChatCompletionsClient::new(&cfg.llm)?;
    tracing::info!(model = llm.model(), embedder = embedder.model_name(), "answerer ready");
    Ok(Answerer::new(
        cfg.retrieval.top_k,
        documents,
        embedder,
        Arc::new(SqliteVectorStore::new(&cfg.storage.uploads_dir)),
        Arc::new(llm),
    ))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
