//! HTTP server for the chat frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness text |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/chat` | Answer a question in general, docs or cms mode |
//! | `POST` | `/api/docs/upload` | Multipart upload (`files`) of PDF / CSV / DOCX |
//! | `GET`  | `/api/docs` | Documents of the calling session |
//! | `DELETE` | `/api/docs/{file_id}` | Delete an owned document |
//! | `POST` | `/api/cms/upload` | Multipart upload (`files`) of JSON |
//! | `GET`  | `/api/cms` | CMS files of the calling session |
//! | `DELETE` | `/api/cms/{file_id}` | Delete an owned CMS file |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Invalid number of files uploaded" } }
//! ```
//!
//! Error codes: `bad_request` (400), `conflict` (400), `unauthorized` (401),
//! `forbidden` (403), `internal` (500). Internal errors carry a generic
//! message; details are only logged.
//!
//! # CORS
//!
//! One configured origin, with credentials, so the browser sends the
//! session cookie cross-origin.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use docchat_core::compose::{ChatRequest, ChatResponse, Composer};
use docchat_core::error::DocChatError;
use docchat_core::models::{Collection, FileRecord};
use docchat_core::store::VectorStore;

use crate::config::Config;
use crate::session::{self, SessionCookies};
use crate::upload::{IncomingFile, UploadGate};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub gate: UploadGate,
    pub composer: Composer,
    pub cookies: SessionCookies,
}

/// Router-level settings that do not belong to any service.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub cors_origin: String,
    pub max_request_bytes: usize,
}

impl From<&Config> for RouterOptions {
    fn from(config: &Config) -> Self {
        Self {
            cors_origin: config.server.cors_origin.clone(),
            max_request_bytes: config.upload.max_request_bytes,
        }
    }
}

/// Build the full router. Exposed so tests can serve it on an ephemeral port.
pub fn build_router(state: AppState, options: &RouterOptions) -> anyhow::Result<Router> {
    let origin: HeaderValue = options
        .cors_origin
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid server.cors_origin: {}", options.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let router = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/chat", post(handle_chat))
        .route("/api/docs/upload", post(upload_docs))
        .route("/api/docs", get(list_docs))
        .route("/api/docs/{file_id}", delete(delete_doc))
        .route("/api/cms/upload", post(upload_cms))
        .route("/api/cms", get(list_cms))
        .route("/api/cms/{file_id}", delete(delete_cms))
        .layer(DefaultBodyLimit::max(options.max_request_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    Ok(router)
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind`, checks the vector store once (failures are
/// logged, not fatal) and serves until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let (state, vectors) = crate::app::build_state(config).await?;

    match vectors.health().await {
        Ok(()) => tracing::info!(url = %config.vector.url, "connected to vector store"),
        Err(err) => tracing::warn!(url = %config.vector.url, error = %err, "vector store unreachable"),
    }
    if let Err(err) = vectors.ensure_collection().await {
        tracing::warn!(collection = %vectors.collection(), error = %err, "vector collection bootstrap failed; uploads will retry it");
    }

    let app = build_router(state, &RouterOptions::from(config))?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "docchat listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutting down");
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<DocChatError> for AppError {
    fn from(err: DocChatError) -> Self {
        match err {
            DocChatError::Validation(m) => bad_request(m),
            DocChatError::Conflict(m) => AppError::new(StatusCode::BAD_REQUEST, "conflict", m),
            DocChatError::Unauthenticated(m) => {
                AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", m)
            }
            err @ DocChatError::Unauthorized => {
                AppError::new(StatusCode::FORBIDDEN, "forbidden", err.to_string())
            }
            DocChatError::Provider(e) => {
                tracing::error!(error = %e, "provider failure");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Unexpected server error",
                )
            }
            DocChatError::Storage(m) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", m)
            }
        }
    }
}

// ============ GET / and /health ============

async fn handle_root() -> &'static str {
    "Server is running!"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /api/chat ============

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    if req.question.trim().is_empty() {
        return Err(bad_request("Question must not be empty"));
    }
    let answer = state.composer.answer(&req).await;
    Ok(Json(ChatResponse { answer }))
}

// ============ Uploads ============

async fn upload_docs(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    handle_upload(state, Collection::Documents, headers, multipart).await
}

async fn upload_cms(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    handle_upload(state, Collection::Cms, headers, multipart).await
}

/// Upload handler shared by both collections. Issues the session cookie on
/// every response, success or error, when the request carried none.
async fn handle_upload(
    state: AppState,
    collection: Collection,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let (session_id, cookie) = state.cookies.read_or_issue(&headers);

    let result = match read_files(multipart).await {
        Ok(files) => state
            .gate
            .upload(collection, &session_id, files)
            .await
            .map_err(AppError::from),
        Err(err) => Err(err),
    };

    let mut response = match result {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => err.into_response(),
    };
    session::attach(response.headers_mut(), cookie);
    response
}

/// Collect every `files` part of a multipart body.
async fn read_files(mut multipart: Multipart) -> Result<Vec<IncomingFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid upload: {}", e.body_text())))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Invalid upload: {}", e.body_text())))?;
        files.push(IncomingFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Ok(files)
}

// ============ Listing and deletion ============

#[derive(Serialize)]
struct FileListResponse {
    state: &'static str,
    files: Vec<FileRecord>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

fn require_session(cookies: &SessionCookies, headers: &HeaderMap) -> Result<String, AppError> {
    cookies.read(headers).ok_or_else(|| {
        AppError::from(DocChatError::Unauthenticated(
            "No session cookie found".to_string(),
        ))
    })
}

async fn list_files(
    state: AppState,
    collection: Collection,
    headers: HeaderMap,
) -> Result<Json<FileListResponse>, AppError> {
    let session_id = require_session(&state.cookies, &headers)?;
    let files = state.gate.list(collection, &session_id).await?;
    Ok(Json(FileListResponse {
        state: "success",
        files,
    }))
}

async fn delete_file(
    state: AppState,
    collection: Collection,
    headers: HeaderMap,
    file_id: String,
) -> Result<Json<MessageResponse>, AppError> {
    let session_id = require_session(&state.cookies, &headers)?;
    state.gate.delete(collection, &session_id, &file_id).await?;
    Ok(Json(MessageResponse {
        message: "File deleted successfully",
    }))
}

async fn list_docs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FileListResponse>, AppError> {
    list_files(state, Collection::Documents, headers).await
}

async fn list_cms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FileListResponse>, AppError> {
    list_files(state, Collection::Cms, headers).await
}

async fn delete_doc(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    delete_file(state, Collection::Documents, headers, file_id).await
}

async fn delete_cms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    delete_file(state, Collection::Cms, headers, file_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::error::ProviderError;

    #[test]
    fn test_error_mapping() {
        let cases = [
            (DocChatError::Validation("bad".into()), 400, "bad_request"),
            (DocChatError::Conflict("dup".into()), 400, "conflict"),
            (DocChatError::Unauthenticated("none".into()), 401, "unauthorized"),
            (DocChatError::Unauthorized, 403, "forbidden"),
            (DocChatError::Storage("Failed".into()), 500, "internal"),
        ];
        for (err, status, code) in cases {
            let app = AppError::from(err);
            assert_eq!(app.status.as_u16(), status);
            assert_eq!(app.code, code);
        }
    }

    #[test]
    fn test_provider_error_message_is_generic() {
        let app = AppError::from(DocChatError::Provider(ProviderError::Status {
            service: "qdrant".into(),
            status: 500,
            body: "secret internals".into(),
        }));
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.message, "Unexpected server error");
    }

    #[test]
    fn test_forbidden_message_does_not_leak_ownership() {
        let app = AppError::from(DocChatError::Unauthorized);
        assert_eq!(app.message, "Unauthorized or file not found");
    }
}
