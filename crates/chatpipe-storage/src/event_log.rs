// Database-backed event log
//
// Stream events are stored with auto-incrementing sequence numbers per
// conversation, enabling SSE streaming and event replay. Each row keeps
// the event's part identity in its own column so a resume cursor (a part
// id) can be resolved into a replay position with one query.

use chatpipe_core::{Result, StreamError, StreamEvent};
use uuid::Uuid;

use crate::models::CreateEventRow;
use crate::repositories::Database;

// ============================================================================
// DbEventLog - Append-only event feed per conversation
// ============================================================================

/// Database-backed event log
#[derive(Clone)]
pub struct DbEventLog {
    db: Database,
}

impl DbEventLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Append one event, returning its sequence number
    pub async fn append(&self, conversation_id: Uuid, event: &StreamEvent) -> Result<i64> {
        let data = serde_json::to_value(event)?;
        let row = self
            .db
            .create_event(CreateEventRow {
                conversation_id,
                event_type: event.event_type(),
                part_id: event.part_id().map(str::to_string),
                data,
            })
            .await
            .map_err(|e| StreamError::store(e.to_string()))?;

        Ok(row.sequence)
    }

    /// Events with sequence strictly greater than `since`, oldest first
    pub async fn events_since(
        &self,
        conversation_id: Uuid,
        since: Option<i64>,
    ) -> Result<Vec<(i64, StreamEvent)>> {
        let rows = self
            .db
            .list_events(conversation_id, since)
            .await
            .map_err(|e| StreamError::store(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let event: StreamEvent = serde_json::from_value(row.data)?;
                Ok((row.sequence, event))
            })
            .collect()
    }

    /// Resolve a resume cursor (a part id) to a replay start position.
    ///
    /// Unknown part ids resolve to None, i.e. full replay; this is the
    /// contract for resuming "after event id X" when X is unrecognized.
    pub async fn sequence_for_cursor(
        &self,
        conversation_id: Uuid,
        after_part_id: Option<&str>,
    ) -> Result<Option<i64>> {
        match after_part_id {
            None => Ok(None),
            Some(part_id) => self
                .db
                .last_sequence_for_part(conversation_id, part_id)
                .await
                .map_err(|e| StreamError::store(e.to_string())),
        }
    }
}

// ============================================================================
// Factory functions
// ============================================================================

/// Create a database-backed event log
pub fn create_db_event_log(db: Database) -> DbEventLog {
    DbEventLog::new(db)
}
