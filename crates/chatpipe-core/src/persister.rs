// Durable persister
//
// Applies the event stream to a snapshot reducer and checkpoints the
// resulting message document at durability boundaries:
//
// - start                      -> placeholder document so readers see the message
// - text/reasoning part starts -> placeholder part, preserving part order
//                                 for concurrent readers mid-stream
// - text/reasoning-end, tool events, terminal data parts, finish, abort
//                              -> whole-document write
//
// Text and reasoning events that arrive before `start` are held back
// and replayed once the message id is known; nothing is written until
// then. Deltas only touch the in-memory snapshot. Writes use a
// revision compare-and-swap with a bounded retry; a write that still
// fails is logged and dropped so a storage hiccup never tears down the
// live stream.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, StreamError};
use crate::event::StreamEvent;
use crate::message::{Message, Part};
use crate::policy::ToolPolicies;
use crate::reducer::SnapshotReducer;
use crate::store::{MessageDocumentStore, UpdateOutcome};

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Streams events into durable message documents
pub struct MessagePersister<S> {
    store: Arc<S>,
    conversation_id: Uuid,
    reducer: SnapshotReducer,
    /// Text/reasoning events seen before `start` announced a message id
    pending: Vec<StreamEvent>,
}

impl<S: MessageDocumentStore> MessagePersister<S> {
    pub fn new(store: Arc<S>, conversation_id: Uuid, policies: ToolPolicies) -> Self {
        Self {
            store,
            conversation_id,
            reducer: SnapshotReducer::new(policies),
            pending: Vec::new(),
        }
    }

    /// Seed parts that must survive into the next message document
    /// (for example tool results carried over on resume)
    pub fn prime(&mut self, message_id: impl Into<String>, parts: Vec<Part>) {
        self.reducer.prime(message_id, parts);
    }

    /// Current in-memory snapshot, if a message has started
    pub fn snapshot(&self) -> Option<&Message> {
        self.reducer.snapshot()
    }

    /// Apply one event. Returns the updated snapshot for fan-out, or
    /// None when the event changed nothing.
    pub async fn handle(&mut self, event: &StreamEvent) -> Option<Message> {
        // Nothing can be persisted until a message id is known; text and
        // reasoning arriving early are held back and replayed after start
        if self.reducer.snapshot().is_none() {
            match event {
                StreamEvent::TextStart { .. }
                | StreamEvent::TextDelta { .. }
                | StreamEvent::TextEnd { .. }
                | StreamEvent::ReasoningStart { .. }
                | StreamEvent::ReasoningDelta { .. }
                | StreamEvent::ReasoningEnd { .. } => {
                    self.pending.push(event.clone());
                    return None;
                }
                _ => {}
            }
        }

        let mut snapshot = self.reducer.apply(event)?;
        for held in std::mem::take(&mut self.pending) {
            if let Some(updated) = self.reducer.apply(&held) {
                snapshot = updated;
            }
        }

        if Self::is_durable(event) {
            if let Err(e) = self.write_snapshot(&snapshot).await {
                warn!(
                    conversation_id = %self.conversation_id,
                    message_id = %snapshot.id,
                    event_type = %event.event_type(),
                    "Failed to persist message document: {}", e
                );
            }
        }

        Some(snapshot)
    }

    /// Events after which the document on disk must reflect the snapshot
    fn is_durable(event: &StreamEvent) -> bool {
        match event {
            StreamEvent::Start { .. }
            | StreamEvent::TextStart { .. }
            | StreamEvent::ReasoningStart { .. }
            | StreamEvent::TextEnd { .. }
            | StreamEvent::ReasoningEnd { .. }
            | StreamEvent::ToolInputAvailable { .. }
            | StreamEvent::ToolOutputAvailable { .. }
            | StreamEvent::ToolOutputError { .. }
            | StreamEvent::Finish
            | StreamEvent::Abort => true,
            StreamEvent::Data { data, .. } => crate::event::DataStatus::from_payload(data)
                .map(|s| s.is_terminal())
                .unwrap_or(true),
            _ => false,
        }
    }

    async fn write_snapshot(&self, snapshot: &Message) -> Result<()> {
        match self.store.fetch(self.conversation_id, &snapshot.id).await? {
            None => self.store.insert(self.conversation_id, snapshot).await,
            Some(stored) => {
                let mut expected = stored.revision;
                for _ in 0..MAX_WRITE_ATTEMPTS {
                    match self
                        .store
                        .update(self.conversation_id, snapshot, expected)
                        .await?
                    {
                        UpdateOutcome::Applied => return Ok(()),
                        UpdateOutcome::Conflict => {
                            let current = self
                                .store
                                .fetch(self.conversation_id, &snapshot.id)
                                .await?
                                .ok_or_else(|| {
                                    StreamError::DocumentNotFound(
                                        self.conversation_id,
                                        snapshot.id.clone(),
                                    )
                                })?;
                            expected = current.revision;
                        }
                    }
                }
                Err(StreamError::RevisionConflict(
                    snapshot.id.clone(),
                    MAX_WRITE_ATTEMPTS,
                ))
            }
        }
    }
}
