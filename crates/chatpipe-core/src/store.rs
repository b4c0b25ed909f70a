// Document store abstraction
//
// The persister reads and writes whole message documents; conflict
// detection uses a per-document revision that every successful update
// bumps. Implementations live elsewhere (Postgres in chatpipe-storage,
// in-memory in this crate for tests and single-process deployments).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::message::Message;

/// A message document plus the revision it was read at
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub message: Message,
    pub revision: i64,
}

/// Outcome of a compare-and-swap update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The document matched the expected revision and was replaced
    Applied,
    /// Someone else updated the document first; re-read and retry
    Conflict,
}

/// Storage for whole message documents, keyed by conversation and message id
#[async_trait]
pub trait MessageDocumentStore: Send + Sync {
    /// Fetch one document, or None if it was never written
    async fn fetch(&self, conversation_id: Uuid, message_id: &str)
        -> Result<Option<StoredMessage>>;

    /// Insert a new document at revision 1. Fails if it already exists.
    async fn insert(&self, conversation_id: Uuid, message: &Message) -> Result<()>;

    /// Replace a document if its stored revision still matches
    /// `expected_revision`; the revision is bumped on success.
    async fn update(
        &self,
        conversation_id: Uuid,
        message: &Message,
        expected_revision: i64,
    ) -> Result<UpdateOutcome>;

    /// All documents of a conversation, oldest first
    async fn list(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>>;
}
