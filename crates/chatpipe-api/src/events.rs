// Event streaming HTTP routes (ingest + SSE)
//
// The event feed is durable: every event lands in the per-conversation log
// with a sequence number, and the SSE route replays from the log with
// offset polling. Resumption is cursor-based: `?after=<part_id>` starts the
// replay strictly past the last logged event carrying that part identity;
// an unknown or absent cursor replays the whole feed.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, LinesStream};
use tokio_util::io::StreamReader;
use utoipa::{IntoParams, ToSchema};

use futures::{
    stream::{self, Stream},
    StreamExt,
};
use std::{convert::Infallible, time::Duration};
use uuid::Uuid;

use chatpipe_core::StreamEvent;

use crate::pipeline::EventPipeline;

// ============================================
// App State and Routes
// ============================================

/// App state for event routes
#[derive(Clone)]
pub struct AppState {
    pub pipeline: EventPipeline,
}

impl AppState {
    pub fn new(pipeline: EventPipeline) -> Self {
        Self { pipeline }
    }
}

/// Create event routes (nested under conversations)
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/conversations/:conversation_id/events",
            post(ingest_events).get(list_events),
        )
        .route("/v1/conversations/:conversation_id/sse", get(stream_sse))
        .route(
            "/v1/conversations/:conversation_id/snapshots",
            get(stream_snapshots),
        )
        .with_state(state)
}

// ============================================
// Query Parameters
// ============================================

/// Query parameters for SSE streaming
#[derive(Debug, Deserialize, IntoParams)]
pub struct SseQuery {
    /// Resume strictly after the last event carrying this part id. Omit
    /// (or pass an unknown id) to replay the feed from the start.
    pub after: Option<String>,
}

/// Query parameters for events list
#[derive(Debug, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Resume from this offset (sequence number). Events with sequence > offset are returned.
    /// Use 0 or omit to start from the beginning.
    #[param(example = 0)]
    pub offset: Option<i64>,
    /// Maximum number of events to return. Defaults to 100 if not specified.
    #[param(example = 100)]
    pub limit: Option<i64>,
}

// ============================================
// Ingest (inbound transport adapter)
// ============================================

/// Response for the ingest endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    /// Events accepted into the pipeline (after batching)
    pub accepted: usize,
}

/// POST /v1/conversations/{conversation_id}/events - Ingest an event stream
///
/// Accepts newline-delimited JSON events from a generation engine and runs
/// them through the batching/persistence pipeline. Malformed lines are
/// logged and skipped, never fatal.
#[utoipa::path(
    post,
    path = "/v1/conversations/{conversation_id}/events",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
    ),
    request_body(content = String, content_type = "application/x-ndjson"),
    responses(
        (status = 200, description = "Stream consumed", body = IngestResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "events"
)]
pub async fn ingest_events(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    body: Body,
) -> Result<Json<IngestResponse>, StatusCode> {
    let reader = StreamReader::new(
        body.into_data_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other)),
    );

    let events = LinesStream::new(reader.lines()).filter_map(|line| async move {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read ingest line: {}", e);
                return None;
            }
        };
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<StreamEvent>(&line) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("Skipping malformed event: {}", e);
                None
            }
        }
    });

    let summary = state
        .pipeline
        .run(conversation_id, Box::pin(events))
        .await
        .map_err(|e| {
            tracing::error!("Ingest pipeline failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(IngestResponse {
        accepted: summary.events,
    }))
}

// ============================================
// SSE feed
// ============================================

/// GET /v1/conversations/{conversation_id}/sse - Stream events (SSE)
///
/// Supports cursor-based resumption: provide `?after=<part_id>` to resume
/// past the last event of that part. The `id` field in each SSE event
/// carries the sequence number for client-side tracking.
#[utoipa::path(
    get,
    path = "/v1/conversations/{conversation_id}/sse",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
        SseQuery
    ),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 500, description = "Internal server error")
    ),
    tag = "events"
)]
pub async fn stream_sse(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    // Resolve the part-id cursor to a replay position
    let initial_offset = state
        .pipeline
        .log()
        .sequence_for_cursor(conversation_id, query.after.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Failed to resolve resume cursor: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    tracing::info!(
        conversation_id = %conversation_id,
        after = ?query.after,
        offset = ?initial_offset,
        "Starting event stream"
    );

    let log = state.pipeline.log().clone();

    // Replay from the offset, then poll for the live tail
    let stream = stream::unfold(initial_offset, move |last_sequence| {
        let log = log.clone();
        async move {
            match log.events_since(conversation_id, last_sequence).await {
                Ok(events) if !events.is_empty() => {
                    let new_sequence = events.last().map(|(seq, _)| *seq);

                    let sse_events: Vec<Result<SseEvent, Infallible>> = events
                        .into_iter()
                        .map(|(sequence, event)| {
                            let json = serde_json::to_string(&event)
                                .unwrap_or_else(|_| "{}".to_string());

                            Ok(SseEvent::default()
                                .event(event.event_type())
                                .data(json)
                                .id(sequence.to_string()))
                        })
                        .collect();

                    Some((stream::iter(sse_events), new_sequence))
                }
                Ok(_) => {
                    // No new events, wait a bit before polling again
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Some((stream::iter(vec![]), last_sequence))
                }
                Err(e) => {
                    tracing::error!("Failed to fetch events: {}", e);
                    None
                }
            }
        }
    })
    .flatten();

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ============================================
// Snapshot fan-out (live message views)
// ============================================

/// GET /v1/conversations/{conversation_id}/snapshots - Stream live snapshots (SSE)
///
/// Streams the full message snapshot after every state-changing event of an
/// in-flight ingest. Consumers do their own diffing.
#[utoipa::path(
    get,
    path = "/v1/conversations/{conversation_id}/snapshots",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
    ),
    responses(
        (status = 200, description = "Snapshot stream", content_type = "text/event-stream"),
    ),
    tag = "events"
)]
pub async fn stream_snapshots(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.pipeline.subscribe();

    let stream = BroadcastStream::new(receiver).filter_map(move |item| async move {
        match item {
            Ok(snapshot) if snapshot.conversation_id == conversation_id => {
                let json = serde_json::to_string(&snapshot.message)
                    .unwrap_or_else(|_| "{}".to_string());
                Some(Ok(SseEvent::default().event("snapshot").data(json)))
            }
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                // Snapshots are full views; a newer one supersedes the missed ones
                tracing::debug!(skipped, "Snapshot subscriber lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ============================================
// List Events (JSON response for polling)
// ============================================

/// Event response type for polling
#[derive(Debug, Serialize, ToSchema)]
pub struct Event {
    /// Unique event ID.
    pub id: Uuid,
    /// Conversation this event belongs to.
    pub conversation_id: Uuid,
    /// Sequence number within the conversation (for offset-based resumption).
    pub sequence: i64,
    /// Event type (e.g., "text-delta", "tool-input-available").
    pub event_type: String,
    /// Part identity the event addresses, if any.
    pub part_id: Option<String>,
    /// Event payload as JSON (the wire form of the event).
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    /// When the event was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Paginated response for events list with offset-based resumption.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    /// Array of events.
    pub data: Vec<Event>,
    /// Next offset to use for pagination. Pass this as `?offset=` to get the
    /// next page. If null, there are no more events (you've caught up).
    pub next_offset: Option<i64>,
    /// Whether more events may be available beyond this page.
    pub has_more: bool,
}

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// GET /v1/conversations/{conversation_id}/events - List events (JSON)
///
/// Offset-based pagination for durable stream semantics:
/// - Use `?offset=N` to get events with sequence > N
/// - Use `?limit=M` to limit the number of events returned
/// - Response includes `next_offset` for the next page
#[utoipa::path(
    get,
    path = "/v1/conversations/{conversation_id}/events",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
        EventsQuery
    ),
    responses(
        (status = 200, description = "Events list with pagination info", body = EventsResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, StatusCode> {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    // Fetch limit+1 to detect has_more
    let event_rows = state
        .pipeline
        .log()
        .db()
        .list_events_paginated(conversation_id, offset, limit + 1)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list events: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let has_more = event_rows.len() > limit as usize;
    let event_rows: Vec<_> = event_rows.into_iter().take(limit as usize).collect();

    let next_offset = event_rows.last().map(|e| e.sequence);

    let events: Vec<Event> = event_rows
        .into_iter()
        .map(|row| Event {
            id: row.id,
            conversation_id: row.conversation_id,
            sequence: row.sequence,
            event_type: row.event_type,
            part_id: row.part_id,
            data: row.data,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(EventsResponse {
        data: events,
        next_offset,
        has_more,
    }))
}
