// Message and resume HTTP routes
//
// Messages are served from the persisted documents, not from the event
// log. The resume endpoint gives a reconnecting client everything it needs
// in one round trip: the cursor to re-subscribe with and the base parts to
// prime its reducer.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use chatpipe_core::{resume_plan, Message, MessageDocumentStore, Part, ResumeCursor};

use crate::pipeline::EventPipeline;

// ============================================
// App State and Routes
// ============================================

/// App state for message routes
#[derive(Clone)]
pub struct AppState {
    pub pipeline: EventPipeline,
}

impl AppState {
    pub fn new(pipeline: EventPipeline) -> Self {
        Self { pipeline }
    }
}

/// Create message routes (nested under conversations)
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/conversations/:conversation_id/messages",
            get(list_messages),
        )
        .route("/v1/conversations/:conversation_id/resume", get(get_resume))
        .with_state(state)
}

// ============================================
// Response types
// ============================================

/// Messages list response
#[derive(Debug, Serialize, ToSchema)]
pub struct MessagesResponse {
    /// Persisted message documents, oldest first.
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Message>,
}

/// Resume state response
#[derive(Debug, Serialize, ToSchema)]
pub struct ResumeResponse {
    /// Where to re-subscribe on the event feed. Null when the conversation
    /// has no assistant message yet (subscribe from the start).
    #[schema(value_type = Option<Object>)]
    pub cursor: Option<ResumeCursor>,
    /// Parts to prime the snapshot reducer with before replay.
    #[schema(value_type = Vec<Object>)]
    pub base_parts: Vec<Part>,
}

// ============================================
// HTTP Handlers
// ============================================

/// GET /v1/conversations/{conversation_id}/messages - List persisted messages
#[utoipa::path(
    get,
    path = "/v1/conversations/{conversation_id}/messages",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
    ),
    responses(
        (status = 200, description = "Messages list", body = MessagesResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "messages"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<MessagesResponse>, StatusCode> {
    let data = state
        .pipeline
        .store()
        .list(conversation_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list messages: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .into_iter()
        .map(|d| d.message)
        .collect();

    Ok(Json(MessagesResponse { data }))
}

/// GET /v1/conversations/{conversation_id}/resume - Resume state
///
/// Computes the resume cursor from persisted history. Pass
/// `cursor.afterEventId` as `?after=` on the SSE route and prime the
/// reducer with `base_parts` before applying replayed events.
#[utoipa::path(
    get,
    path = "/v1/conversations/{conversation_id}/resume",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
    ),
    responses(
        (status = 200, description = "Resume state", body = ResumeResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "messages"
)]
pub async fn get_resume(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ResumeResponse>, StatusCode> {
    let history: Vec<Message> = state
        .pipeline
        .store()
        .list(conversation_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load messages for resume: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .into_iter()
        .map(|d| d.message)
        .collect();

    let response = match resume_plan(&history) {
        Some(plan) => ResumeResponse {
            cursor: Some(plan.cursor),
            base_parts: plan.base_parts,
        },
        None => ResumeResponse {
            cursor: None,
            base_parts: Vec::new(),
        },
    };

    Ok(Json(response))
}
