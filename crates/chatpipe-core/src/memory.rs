// In-memory implementations for examples and testing
//
// These implementations keep all data in memory, making them perfect for:
// - Standalone examples that don't need a database
// - Unit tests
// - Quick prototyping

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StreamError};
use crate::message::Message;
use crate::store::{MessageDocumentStore, StoredMessage, UpdateOutcome};

// ============================================================================
// InMemoryDocumentStore - Stores message documents in memory
// ============================================================================

/// In-memory message document store
///
/// Documents are keyed by (conversation, message id); insertion order per
/// conversation is preserved so `list` returns messages oldest first.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<HashMap<Uuid, Vec<StoredMessage>>>>,
}

impl InMemoryDocumentStore {
    /// Create a new in-memory document store
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all documents
    pub async fn clear(&self) {
        self.documents.write().await.clear();
    }

    /// Pre-populate a conversation (useful for testing)
    pub async fn seed(&self, conversation_id: Uuid, messages: Vec<Message>) {
        let stored = messages
            .into_iter()
            .map(|message| StoredMessage {
                message,
                revision: 1,
            })
            .collect();
        self.documents.write().await.insert(conversation_id, stored);
    }
}

#[async_trait]
impl MessageDocumentStore for InMemoryDocumentStore {
    async fn fetch(
        &self,
        conversation_id: Uuid,
        message_id: &str,
    ) -> Result<Option<StoredMessage>> {
        Ok(self
            .documents
            .read()
            .await
            .get(&conversation_id)
            .and_then(|docs| docs.iter().find(|d| d.message.id == message_id))
            .cloned())
    }

    async fn insert(&self, conversation_id: Uuid, message: &Message) -> Result<()> {
        let mut documents = self.documents.write().await;
        let docs = documents.entry(conversation_id).or_default();
        if docs.iter().any(|d| d.message.id == message.id) {
            return Err(StreamError::store(format!(
                "document already exists: {}",
                message.id
            )));
        }
        docs.push(StoredMessage {
            message: message.clone(),
            revision: 1,
        });
        Ok(())
    }

    async fn update(
        &self,
        conversation_id: Uuid,
        message: &Message,
        expected_revision: i64,
    ) -> Result<UpdateOutcome> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(&conversation_id)
            .and_then(|docs| docs.iter_mut().find(|d| d.message.id == message.id))
            .ok_or_else(|| StreamError::DocumentNotFound(conversation_id, message.id.clone()))?;
        if doc.revision != expected_revision {
            return Ok(UpdateOutcome::Conflict);
        }
        doc.message = message.clone();
        doc.revision += 1;
        Ok(UpdateOutcome::Applied)
    }

    async fn list(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>> {
        Ok(self
            .documents
            .read()
            .await
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// FlakyDocumentStore - Fails the first N writes (testing only)
// ============================================================================

/// Wrapper that injects failures into the first N write calls,
/// for exercising the persister's retry and warn paths in tests.
#[derive(Clone)]
pub struct FlakyDocumentStore {
    inner: InMemoryDocumentStore,
    failures_left: Arc<AtomicUsize>,
}

impl FlakyDocumentStore {
    pub fn new(inner: InMemoryDocumentStore, failures: usize) -> Self {
        Self {
            inner,
            failures_left: Arc::new(AtomicUsize::new(failures)),
        }
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MessageDocumentStore for FlakyDocumentStore {
    async fn fetch(
        &self,
        conversation_id: Uuid,
        message_id: &str,
    ) -> Result<Option<StoredMessage>> {
        self.inner.fetch(conversation_id, message_id).await
    }

    async fn insert(&self, conversation_id: Uuid, message: &Message) -> Result<()> {
        if self.take_failure() {
            return Err(StreamError::store("injected insert failure"));
        }
        self.inner.insert(conversation_id, message).await
    }

    async fn update(
        &self,
        conversation_id: Uuid,
        message: &Message,
        expected_revision: i64,
    ) -> Result<UpdateOutcome> {
        if self.take_failure() {
            return Err(StreamError::store("injected update failure"));
        }
        self.inner
            .update(conversation_id, message, expected_revision)
            .await
    }

    async fn list(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>> {
        self.inner.list(conversation_id).await
    }
}
