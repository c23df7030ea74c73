//! HTTP surface for DocuChat.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /upload` – Accept a single PDF (multipart field `file`), create a
//!   session, and start background ingestion. Returns
//!   `{ sessionId, statusUrl, chatUrl }`.
//! - `GET /status/{sessionId}` – Report the session lifecycle state
//!   (`processing` | `ready` | `error`) plus the failure detail when present.
//! - `POST /chat` – Answer a question against an ingested document. Replies
//!   425 with a status pointer while the document is still processing.
//! - `GET /metrics` – Observe ingestion and query counters.
//!
//! Handlers are generic over [`ChatApi`] so tests can drive the router with a
//! stub service.

use crate::qa::ChatError;
use crate::service::ChatApi;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Largest accepted upload, matching the original service limit.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Build the HTTP router exposing the upload/status/chat surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ChatApi + 'static,
{
    Router::new()
        .route("/upload", post(upload_document::<S>))
        .route("/status/:session_id", get(session_status::<S>))
        .route("/chat", post(chat::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 16 * 1024))
        .with_state(service)
}

/// Success response for the `POST /upload` endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    session_id: String,
    status_url: String,
    chat_url: String,
}

/// Accept a PDF upload and start ingesting it.
///
/// Anything that is not a PDF is rejected with 400 before a session exists;
/// oversized uploads are rejected with 413.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError>
where
    S: ChatApi,
{
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() != Some("file") {
            continue;
        }
        if !is_pdf_field(field.content_type(), field.file_name()) {
            return Err(ApiError::Validation(
                "only PDF uploads are supported".to_string(),
            ));
        }
        let bytes = field.bytes().await.map_err(read_error)?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::PayloadTooLarge);
        }
        file_bytes = Some(bytes.to_vec());
    }

    let bytes = file_bytes.ok_or_else(|| ApiError::Validation("no file received".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::Validation("uploaded file is empty".to_string()));
    }

    let session_id = service.create_session(bytes).await?;
    tracing::info!(session_id = %session_id, "Upload accepted");
    Ok(Json(UploadResponse {
        status_url: format!("/status/{session_id}"),
        chat_url: "/chat".to_string(),
        session_id,
    }))
}

/// Map a multipart read failure onto the API error taxonomy.
///
/// Bodies larger than the [`DefaultBodyLimit`] fail inside the field stream
/// rather than at the explicit size check, so the limit violation has to be
/// recognized here to keep it a 413 instead of a generic 400.
fn read_error(error: MultipartError) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::Validation(format!("failed to read multipart body: {error}"))
    }
}

fn is_pdf_field(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    if content_type == Some("application/pdf") {
        return true;
    }
    file_name
        .map(|name| name.to_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

/// Response body for `GET /status/{sessionId}`.
#[derive(Serialize)]
struct StatusResponse {
    status: crate::sessions::SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Report a session's lifecycle state.
async fn session_status<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError>
where
    S: ChatApi,
{
    let snapshot = service
        .session_status(&session_id)
        .ok_or_else(|| ApiError::NotFound("unknown session".to_string()))?;
    Ok(Json(StatusResponse {
        status: snapshot.status,
        error: snapshot.error_detail,
    }))
}

/// Request body for the `POST /chat` endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    question: Option<String>,
}

/// Success response for the `POST /chat` endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    answer: String,
    session_id: String,
}

/// Answer a question against an uploaded document.
async fn chat<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError>
where
    S: ChatApi,
{
    let session_id = request
        .session_id
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("sessionId is required".to_string()))?;
    let question = request
        .question
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("question is required".to_string()))?;

    let answer = service
        .answer(&session_id, &question)
        .await
        .map_err(|error| ApiError::from_chat_error(error, &session_id))?;
    Ok(Json(ChatResponse { answer, session_id }))
}

/// Return a concise metrics snapshot.
async fn get_metrics<S>(
    State(service): State<Arc<S>>,
) -> Json<crate::metrics::MetricsSnapshot>
where
    S: ChatApi,
{
    Json(service.metrics_snapshot())
}

/// Error taxonomy mapped onto HTTP responses.
enum ApiError {
    /// Bad or missing request fields; 400.
    Validation(String),
    /// Upload exceeded the size limit; 413.
    PayloadTooLarge,
    /// Unknown session; 404.
    NotFound(String),
    /// Session still processing; 425 plus a status pointer.
    NotReady { status_url: String },
    /// Downstream failure; 500 with a generic message and a detail field.
    Service { detail: String },
}

impl ApiError {
    fn from_chat_error(error: ChatError, session_id: &str) -> Self {
        match error {
            ChatError::NotFound => Self::NotFound("unknown session".to_string()),
            ChatError::NotReady => Self::NotReady {
                status_url: format!("/status/{session_id}"),
            },
            ChatError::Service(detail) => Self::Service { detail },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "file exceeds the 10MB upload limit" })),
            )
                .into_response(),
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            Self::NotReady { status_url } => (
                StatusCode::TOO_EARLY,
                Json(json!({
                    "error": "document is still being processed, try again shortly",
                    "statusUrl": status_url,
                })),
            )
                .into_response(),
            Self::Service { detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "answering service temporarily unavailable",
                    "detail": detail,
                })),
            )
                .into_response(),
        }
    }
}

impl From<crate::service::UploadError> for ApiError {
    fn from(error: crate::service::UploadError) -> Self {
        Self::Service {
            detail: error.to_string(),
        }
    }
}
