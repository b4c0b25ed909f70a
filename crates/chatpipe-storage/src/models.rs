// Database models (internal, may differ from public DTOs)

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================
// Message document models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct MessageDocRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub message_id: String,
    pub sequence: i64,
    pub document: sqlx::types::JsonValue,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateMessageDoc {
    pub conversation_id: Uuid,
    pub message_id: String,
    pub document: sqlx::types::JsonValue,
}

// ============================================
// Event log models
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sequence: i64,
    pub event_type: String,
    pub part_id: Option<String>,
    pub data: sqlx::types::JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateEventRow {
    pub conversation_id: Uuid,
    pub event_type: String,
    pub part_id: Option<String>,
    pub data: sqlx::types::JsonValue,
}
