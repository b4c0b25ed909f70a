// Database-backed MessageDocumentStore implementation
//
// This module implements the core MessageDocumentStore trait for persisting
// whole message documents to the message_documents table. The revision
// compare-and-swap is pushed into the UPDATE's WHERE clause, so a lost race
// surfaces as zero rows affected rather than a lost write.

use async_trait::async_trait;
use chatpipe_core::{
    Message, MessageDocumentStore, Result, StoredMessage, StreamError, UpdateOutcome,
};
use uuid::Uuid;

use crate::models::CreateMessageDoc;
use crate::repositories::Database;

// ============================================================================
// DbDocumentStore - Stores message documents in the database
// ============================================================================

/// Database-backed message document store
#[derive(Clone)]
pub struct DbDocumentStore {
    db: Database,
}

impl DbDocumentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageDocumentStore for DbDocumentStore {
    async fn fetch(
        &self,
        conversation_id: Uuid,
        message_id: &str,
    ) -> Result<Option<StoredMessage>> {
        let row = self
            .db
            .get_message_doc(conversation_id, message_id)
            .await
            .map_err(|e| StreamError::store(e.to_string()))?;

        row.map(|row| {
            let message: Message = serde_json::from_value(row.document)?;
            Ok(StoredMessage {
                message,
                revision: row.revision,
            })
        })
        .transpose()
    }

    async fn insert(&self, conversation_id: Uuid, message: &Message) -> Result<()> {
        let document = serde_json::to_value(message)?;
        self.db
            .insert_message_doc(CreateMessageDoc {
                conversation_id,
                message_id: message.id.clone(),
                document,
            })
            .await
            .map_err(|e| StreamError::store(e.to_string()))?;
        Ok(())
    }

    async fn update(
        &self,
        conversation_id: Uuid,
        message: &Message,
        expected_revision: i64,
    ) -> Result<UpdateOutcome> {
        let document = serde_json::to_value(message)?;
        let row = self
            .db
            .update_message_doc(conversation_id, &message.id, &document, expected_revision)
            .await
            .map_err(|e| StreamError::store(e.to_string()))?;

        match row {
            Some(_) => Ok(UpdateOutcome::Applied),
            None => {
                // Distinguish a lost race from a missing document
                if self
                    .db
                    .get_message_doc(conversation_id, &message.id)
                    .await
                    .map_err(|e| StreamError::store(e.to_string()))?
                    .is_some()
                {
                    Ok(UpdateOutcome::Conflict)
                } else {
                    Err(StreamError::DocumentNotFound(
                        conversation_id,
                        message.id.clone(),
                    ))
                }
            }
        }
    }

    async fn list(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>> {
        let rows = self
            .db
            .list_message_docs(conversation_id)
            .await
            .map_err(|e| StreamError::store(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let message: Message = serde_json::from_value(row.document)?;
                Ok(StoredMessage {
                    message,
                    revision: row.revision,
                })
            })
            .collect()
    }
}

// ============================================================================
// Factory functions
// ============================================================================

/// Create a database-backed message document store
pub fn create_db_document_store(db: Database) -> DbDocumentStore {
    DbDocumentStore::new(db)
}
