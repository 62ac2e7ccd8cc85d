//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart upload (field `file`) of one PDF |
//! | `POST` | `/ask` | Ask a question about an uploaded document |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every error response has the same body:
//!
//! ```json
//! { "detail": "Document not found: 1b2c…", "status": 404, "code": "not_found" }
//! ```
//!
//! | Error | Status |
//! |-------|--------|
//! | unsupported format, empty upload, corrupt document, bad multipart | 400 |
//! | upload larger than `[server].max_upload_bytes` | 413 |
//! | unknown document | 404 |
//! | storage write, processing, persistence, retrieval, generation | 500 |
//!
//! # CORS
//!
//! Origins come from `[server].cors_origins`. A listed origin may send
//! credentials; `"*"` allows every origin without credentials.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::answer::Answerer;
use crate::config::{Config, ServerConfig};
use crate::error::{AskError, IngestError};
use crate::ingest::IngestionPipeline;
use crate::models::{Answer, Document};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub answerer: Arc<Answerer>,
}

/// Build the router with CORS, body limit and request tracing applied.
pub fn router(state: AppState, config: &ServerConfig) -> anyhow::Result<Router> {
    Ok(Router::new()
        .route("/upload", post(handle_upload))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.iter().any(|o| o == "*") {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| anyhow::anyhow!("invalid CORS origin '{}': {}", o, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    // Credentials rule out wildcard methods/headers, so mirror the request.
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config, state: AppState) -> anyhow::Result<()> {
    let app = router(state, &config.server)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "docqa listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    status: u16,
    code: &'static str,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, detail = %self.detail, "request failed");
        }
        let body = ErrorBody {
            detail: self.detail,
            status: self.status.as_u16(),
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        detail: detail.into(),
    }
}

/// Oversized bodies keep their 413; anything else is a malformed request.
fn multipart_error(err: MultipartError) -> AppError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError {
            status,
            code: "payload_too_large",
            detail: format!("The uploaded file is too large: {}", err.body_text()),
        }
    } else {
        bad_request(format!("Malformed multipart request: {}", err.body_text()))
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::UnsupportedFormat(_)
            | IngestError::EmptyUpload
            | IngestError::CorruptDocument(_) => StatusCode::BAD_REQUEST,
            IngestError::StorageWrite(_)
            | IngestError::Processing(_)
            | IngestError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code(),
            detail: err.to_string(),
        }
    }
}

impl From<AskError> for AppError {
    fn from(err: AskError) -> Self {
        let status = match &err {
            AskError::NotFound(_) => StatusCode::NOT_FOUND,
            AskError::Retrieval(_) | AskError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code(),
            detail: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

/// JSON response body for `POST /upload`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    id: String,
    name: String,
    uploaded_at: DateTime<Utc>,
}

impl From<Document> for UploadResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            uploaded_at: doc.uploaded_at,
        }
    }
}

/// Handler for `POST /upload`.
///
/// Reads the first multipart field named `file`; other fields are ignored.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(multipart_error)?;

        let document = state.pipeline.ingest(&filename, &bytes).await?;
        return Ok(Json(document.into()));
    }

    Err(bad_request("No file provided in field 'file'"))
}

// ============ POST /ask ============

/// JSON request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    document_id: String,
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    let answer = state
        .answerer
        .answer(&req.document_id, &req.question)
        .await?;
    Ok(Json(answer))
}
