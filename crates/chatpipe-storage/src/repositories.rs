// Repository layer for database operations

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running database migrations")?;
        Ok(())
    }

    // ============================================
    // Message documents (PRIMARY conversation data)
    // ============================================

    pub async fn insert_message_doc(&self, input: CreateMessageDoc) -> Result<MessageDocRow> {
        // Get next sequence number for this conversation
        let row = sqlx::query_as::<_, MessageDocRow>(
            r#"
            INSERT INTO message_documents (conversation_id, message_id, sequence, document, revision)
            VALUES ($1, $2, COALESCE((SELECT MAX(sequence) + 1 FROM message_documents WHERE conversation_id = $1), 1), $3, 1)
            RETURNING id, conversation_id, message_id, sequence, document, revision, created_at, updated_at
            "#,
        )
        .bind(input.conversation_id)
        .bind(&input.message_id)
        .bind(&input.document)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_message_doc(
        &self,
        conversation_id: Uuid,
        message_id: &str,
    ) -> Result<Option<MessageDocRow>> {
        let row = sqlx::query_as::<_, MessageDocRow>(
            r#"
            SELECT id, conversation_id, message_id, sequence, document, revision, created_at, updated_at
            FROM message_documents
            WHERE conversation_id = $1 AND message_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Replace a document iff its revision still matches.
    ///
    /// Returns None when no row matched, i.e. the document is missing or
    /// someone else bumped the revision first.
    pub async fn update_message_doc(
        &self,
        conversation_id: Uuid,
        message_id: &str,
        document: &sqlx::types::JsonValue,
        expected_revision: i64,
    ) -> Result<Option<MessageDocRow>> {
        let row = sqlx::query_as::<_, MessageDocRow>(
            r#"
            UPDATE message_documents
            SET
                document = $3,
                revision = revision + 1,
                updated_at = NOW()
            WHERE conversation_id = $1 AND message_id = $2 AND revision = $4
            RETURNING id, conversation_id, message_id, sequence, document, revision, created_at, updated_at
            "#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(document)
        .bind(expected_revision)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_message_docs(&self, conversation_id: Uuid) -> Result<Vec<MessageDocRow>> {
        let rows = sqlx::query_as::<_, MessageDocRow>(
            r#"
            SELECT id, conversation_id, message_id, sequence, document, revision, created_at, updated_at
            FROM message_documents
            WHERE conversation_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Stream events (replayable feed for SSE)
    // ============================================

    pub async fn create_event(&self, input: CreateEventRow) -> Result<EventRow> {
        // Get next sequence number for this conversation
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO stream_events (conversation_id, sequence, event_type, part_id, data)
            VALUES ($1, COALESCE((SELECT MAX(sequence) + 1 FROM stream_events WHERE conversation_id = $1), 1), $2, $3, $4)
            RETURNING id, conversation_id, sequence, event_type, part_id, data, created_at
            "#,
        )
        .bind(input.conversation_id)
        .bind(&input.event_type)
        .bind(&input.part_id)
        .bind(&input.data)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_events(
        &self,
        conversation_id: Uuid,
        since_sequence: Option<i64>,
    ) -> Result<Vec<EventRow>> {
        let rows = if let Some(seq) = since_sequence {
            sqlx::query_as::<_, EventRow>(
                r#"
                SELECT id, conversation_id, sequence, event_type, part_id, data, created_at
                FROM stream_events
                WHERE conversation_id = $1 AND sequence > $2
                ORDER BY sequence ASC
                "#,
            )
            .bind(conversation_id)
            .bind(seq)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, EventRow>(
                r#"
                SELECT id, conversation_id, sequence, event_type, part_id, data, created_at
                FROM stream_events
                WHERE conversation_id = $1
                ORDER BY sequence ASC
                "#,
            )
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows)
    }

    pub async fn list_events_paginated(
        &self,
        conversation_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, conversation_id, sequence, event_type, part_id, data, created_at
            FROM stream_events
            WHERE conversation_id = $1 AND sequence > $2
            ORDER BY sequence ASC
            LIMIT $3
            "#,
        )
        .bind(conversation_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Sequence of the last event touching `part_id`, used to resolve a
    /// resume cursor into a replay position. None means the part was never
    /// seen and the feed must be replayed from the start.
    pub async fn last_sequence_for_part(
        &self,
        conversation_id: Uuid,
        part_id: &str,
    ) -> Result<Option<i64>> {
        let seq: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(sequence)
            FROM stream_events
            WHERE conversation_id = $1 AND part_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(part_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(seq)
    }
}
