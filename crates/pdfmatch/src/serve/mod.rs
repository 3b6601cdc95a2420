use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use pdf::Watermark;
use pdfmatch_core::{
    request::decode_base64_pdf, ErrorKind, ExtractError, Extraction, ExtractionRequest,
    ItemParams, SearchTerms,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::prelude::{eprintln, *};
use crate::redact::{load_watermark, redact_pdf, RedactRequest};

#[derive(Debug, clap::Args)]
pub struct App {
    /// Port to listen on
    #[arg(short, long, env = "PDFMATCH_PORT", default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, env = "PDFMATCH_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Image (PNG or JPEG) stamped on every redacted document
    #[arg(short, long, env = "PDFMATCH_WATERMARK")]
    pub watermark: Option<PathBuf>,

    /// Paint the watermark over the page content
    #[arg(long, requires = "watermark")]
    pub on_top: bool,

    /// File name suggested to clients downloading a redacted document
    #[arg(long, default_value = "redacted.pdf")]
    pub filename: String,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "PDFMATCH_BODY_LIMIT", default_value = "33554432")]
    pub body_limit: usize,
}

/// Settings shared by every request.
#[derive(Debug, Clone)]
pub struct ServeState {
    pub watermark: Option<Watermark>,
    pub filename: String,
}

/// Failures reported to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        match err.kind() {
            ErrorKind::Validation => ApiError::BadRequest(err.to_string()),
            ErrorKind::Decode => ApiError::Internal(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Internal(msg) => {
                log::error!("request failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorResponse {
            error,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let watermark = app
        .watermark
        .as_deref()
        .map(|path| load_watermark(path, app.on_top))
        .transpose()?;

    if global.verbose {
        eprintln!(
            "Starting HTTP API on {}:{}{}...",
            app.host,
            app.port,
            if watermark.is_some() {
                " with watermark"
            } else {
                ""
            }
        );
    }

    let state = ServeState {
        watermark,
        filename: app.filename,
    };
    let addr = format!("{}:{}", app.host, app.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("Failed to bind to {}: {}", addr, e))?;

    log::info!("http api listening on {addr}");

    axum::serve(listener, router(state, app.body_limit))
        .await
        .map_err(|e| eyre!("Server error: {e}"))?;

    Ok(())
}

pub fn router(state: ServeState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/extract", post(extract_handler))
        .route("/api/v1/redact", post(redact_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(Arc::new(state))
}

async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Task join error: {e}")))?
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn extract_handler(body: Bytes) -> Result<Json<Extraction>, ApiError> {
    let params: ItemParams = parse_body(&body)?;

    let search_terms = SearchTerms::parse(&params.search_text_array).map_err(ExtractError::from)?;
    let pdf_bytes = decode_base64_pdf(&params.base64_pdf)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let request = ExtractionRequest {
        pdf_bytes,
        search_terms,
    };

    let extraction = run_blocking(move || request.run().map_err(ApiError::from)).await?;

    log::debug!("extract: {} match(es)", extraction.matched_texts.len());

    Ok(Json(extraction))
}

async fn redact_handler(
    State(state): State<Arc<ServeState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: RedactRequest = parse_body(&body)?;

    let pdf = base64::engine::general_purpose::STANDARD
        .decode(request.pdf_string.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid base64 string: {e}")))?;

    let redactions = request.matched_texts;
    let count = redactions.len();
    let worker_state = Arc::clone(&state);
    let output = run_blocking(move || {
        redact_pdf(&pdf, &redactions, worker_state.watermark.as_ref())
            .map_err(|e| ApiError::Internal(e.to_string()))
    })
    .await?;

    log::debug!("redact: {count} annotation(s), {} bytes", output.len());

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", state.filename),
            ),
        ],
        output,
    )
        .into_response())
}
