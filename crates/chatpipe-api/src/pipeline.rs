// Ingest pipeline service
//
// Wires the word batcher, the event log and the durable persister together
// for one inbound generation stream: every batched event is appended to the
// replayable log and folded into the persisted message document, and each
// resulting snapshot is fanned out on a broadcast channel.
//
// Before consuming, the persister is primed from the conversation's
// persisted history, so an engine resuming a half-finished message merges
// into the existing parts instead of starting from scratch.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use uuid::Uuid;

use chatpipe_core::{
    batched, resume_plan, BatcherConfig, Message, MessageDocumentStore, MessagePersister, Result,
    StreamEvent, ToolPolicies,
};
use chatpipe_storage::{Database, DbDocumentStore, DbEventLog};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 256;

/// A live snapshot tagged with the conversation it belongs to
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub conversation_id: Uuid,
    pub message: Message,
}

/// Outcome of one ingest run
#[derive(Debug, Clone, Copy)]
pub struct IngestSummary {
    /// Events accepted after batching
    pub events: usize,
}

/// Shared pipeline: batcher config, stores and the snapshot fan-out
#[derive(Clone)]
pub struct EventPipeline {
    store: Arc<DbDocumentStore>,
    log: DbEventLog,
    policies: ToolPolicies,
    batcher: BatcherConfig,
    snapshots: broadcast::Sender<ConversationSnapshot>,
}

impl EventPipeline {
    pub fn new(db: Database, policies: ToolPolicies, batcher: BatcherConfig) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            store: Arc::new(DbDocumentStore::new(db.clone())),
            log: DbEventLog::new(db),
            policies,
            batcher,
            snapshots,
        }
    }

    pub fn log(&self) -> &DbEventLog {
        &self.log
    }

    pub fn store(&self) -> &Arc<DbDocumentStore> {
        &self.store
    }

    /// Subscribe to live snapshots across all conversations
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationSnapshot> {
        self.snapshots.subscribe()
    }

    /// Consume one inbound event stream for a conversation.
    ///
    /// The stream is batched, logged and persisted in order; processing
    /// continues past individual persistence failures.
    pub async fn run<S>(&self, conversation_id: Uuid, input: S) -> Result<IngestSummary>
    where
        S: Stream<Item = StreamEvent> + Unpin,
    {
        let mut persister =
            MessagePersister::new(self.store.clone(), conversation_id, self.policies.clone());

        // Prime from persisted history so a resumed stream merges
        let history: Vec<Message> = self
            .store
            .list(conversation_id)
            .await?
            .into_iter()
            .map(|d| d.message)
            .collect();
        if let Some(plan) = resume_plan(&history) {
            persister.prime(plan.cursor.last_assistant_message_id, plan.base_parts);
        }

        let mut events = 0usize;
        let mut output = Box::pin(batched(input, self.batcher));
        while let Some(event) = output.next().await {
            events += 1;

            if let Err(e) = self.log.append(conversation_id, &event).await {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    event_type = %event.event_type(),
                    "Failed to append event to log: {}", e
                );
            }

            if let Some(snapshot) = persister.handle(&event).await {
                // No receivers is fine; the send just drops
                let _ = self.snapshots.send(ConversationSnapshot {
                    conversation_id,
                    message: snapshot,
                });
            }
        }

        tracing::info!(
            conversation_id = %conversation_id,
            events,
            "Ingest stream complete"
        );
        Ok(IngestSummary { events })
    }
}
