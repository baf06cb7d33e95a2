use crate::error::{DocChatError, SessionError};
use crate::ingest::IngestPipeline;
use crate::session::{AnswerEvent, AnswerStream, SessionRegistry};
use crate::store::DocumentStore;
use crate::types::{
    AskRequest, DocumentId, DocumentSummary, SessionCreated, SessionId, StatusResponse,
    StreamRecord, UploadResponse, UserId,
};
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

mod registry;

pub use registry::{FileRegistry, InMemoryFileRegistry};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub pipeline: Arc<IngestPipeline>,
    pub sessions: Arc<SessionRegistry>,
    pub files: Arc<dyn FileRegistry>,
}

/// Build the HTTP router
///
/// Document routes are scoped to the authenticated user; session routes
/// check ownership through the session's bound document.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/documents", post(upload_document).get(list_documents))
        .route("/documents/:id/status", get(document_status))
        .route("/documents/:id", axum::routing::delete(delete_document))
        .route("/documents/:id/sessions", post(create_session))
        .route("/sessions/:id/message", post(send_message))
        .route("/sessions/:id/cancel", post(cancel_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until the process is stopped
pub async fn serve(state: AppState, bind_addr: &str) -> Result<(), DocChatError> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {}", bind_addr);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| DocChatError::other(format!("server error: {}", e)))
}

/// API error with a stable wire shape: {"kind": ..., "message": ...}
struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn from_error(err: DocChatError) -> Self {
        let status = match &err {
            DocChatError::Session(SessionError::Busy) => StatusCode::CONFLICT,
            DocChatError::Session(SessionError::DocumentUnavailable) => StatusCode::CONFLICT,
            DocChatError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            DocChatError::Extraction(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "unauthorized",
            message: "missing or invalid user identity".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "kind": self.kind, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<DocChatError> for ApiError {
    fn from(err: DocChatError) -> Self {
        Self::from_error(err)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::from_error(err.into())
    }
}

fn current_user(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let header = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok());
    state
        .files
        .resolve_user(header)
        .ok_or_else(ApiError::unauthorized)
}

async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let owner = current_user(&state, &headers)?;
    let document = state.pipeline.ingest_document(owner.clone(), body.to_vec())?;
    state.files.record_upload(&owner, &document.id);

    tracing::info!(document = %document.id, owner = %owner, "accepted upload");
    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            document_id: document.id,
            status: document.status,
        }),
    ))
}

async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let owner = current_user(&state, &headers)?;
    let summaries = state
        .store
        .documents_for_owner(&owner)
        .into_iter()
        .map(|doc| DocumentSummary {
            document_id: doc.id,
            status: doc.status,
            page_count: doc.page_count,
            created_at: doc.created_at,
        })
        .collect();
    Ok(Json(summaries))
}

async fn document_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let owner = current_user(&state, &headers)?;
    let document = owned_document(&state, &owner, &DocumentId(id))?;
    Ok(Json(StatusResponse {
        document_id: document.id,
        status: document.status,
        page_count: document.page_count,
    }))
}

async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = current_user(&state, &headers)?;
    let id = DocumentId(id);
    owned_document(&state, &owner, &id)?;

    state.store.delete_document(&id)?;
    state.files.remove_upload(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let owner = current_user(&state, &headers)?;
    let id = DocumentId(id);
    owned_document(&state, &owner, &id)?;

    let session = state.sessions.create(id)?;
    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id().clone(),
            document_id: session.document_id().clone(),
        }),
    ))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<AskRequest>,
) -> Result<Response, ApiError> {
    let owner = current_user(&state, &headers)?;
    let session = owned_session(&state, &owner, &SessionId(id))?;

    let stream = session.ask(&request.question)?;
    Ok(ndjson_response(stream))
}

async fn cancel_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let owner = current_user(&state, &headers)?;
    let session = owned_session(&state, &owner, &SessionId(id))?;

    let cancelled = session.cancel();
    Ok(Json(json!({ "cancelled": cancelled })))
}

fn owned_document(
    state: &AppState,
    owner: &UserId,
    id: &DocumentId,
) -> Result<crate::types::Document, ApiError> {
    // A document owned by someone else is indistinguishable from a missing one
    state
        .store
        .document(id)
        .filter(|doc| doc.owner == *owner)
        .ok_or_else(|| ApiError::not_found(format!("document not found: {}", id)))
}

fn owned_session(
    state: &AppState,
    owner: &UserId,
    id: &SessionId,
) -> Result<Arc<crate::session::ChatSession>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .ok_or_else(|| ApiError::not_found(format!("session not found: {}", id)))?;
    owned_document(state, owner, session.document_id())
        .map_err(|_| ApiError::not_found(format!("session not found: {}", id)))?;
    Ok(session)
}

/// Stream answer events as newline-delimited JSON
///
/// Fragments become {"fragment":...} records; the stream closes after a
/// final {"cited_passages":...} or {"kind":...,"message":...} record. A
/// cancelled question closes the stream with no terminal record.
fn ndjson_response(stream: AnswerStream) -> Response {
    let body_stream = futures::stream::unfold(stream, |mut stream| async move {
        let event = stream.next_event().await?;
        let record = match event {
            AnswerEvent::Fragment(fragment) => StreamRecord::Fragment { fragment },
            AnswerEvent::Completed { cited_passages } => StreamRecord::Citations { cited_passages },
            AnswerEvent::Failed { error } => StreamRecord::Error {
                kind: error.kind().to_string(),
                message: error.to_string(),
            },
        };
        Some((encode_record(&record), stream))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(body_stream))
        .expect("static response parts are valid")
}

fn encode_record(record: &StreamRecord) -> Result<Bytes, std::convert::Infallible> {
    let mut line = serde_json::to_string(record).expect("stream records serialize");
    line.push('\n');
    Ok(Bytes::from(line))
}
