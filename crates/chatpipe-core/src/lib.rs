// Streaming Message Pipeline
//
// This crate provides a storage-agnostic, streamable implementation of the
// assistant message pipeline (event stream → batched deltas → live snapshot
// + durable document).
//
// Key design decisions:
// - Events and parts use dynamic wire tags ("data-<kind>", "tool-<name>")
//   and (de)serialize through envelope structs
// - The word batcher is a pure state machine wrapped by a stream adapter,
//   so batching logic is testable without a runtime
// - The snapshot reducer is a synchronous fold emitting full Message
//   snapshots; consumers do their own diffing
// - The persister checkpoints whole documents at semantic boundaries
//   (part end, tool output, terminal data status) instead of every delta
// - Document writes use a revision compare-and-swap with bounded retry;
//   persistence failures are logged, never fatal to the stream
// - Storage is pluggable via the MessageDocumentStore trait
// - Tool sanitization/exclusion is an explicit per-tool-name policy table
//   with a pass-through default

pub mod batcher;
pub mod cursor;
pub mod error;
pub mod event;
pub mod message;
pub mod persister;
pub mod policy;
pub mod reducer;
pub mod store;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use batcher::{batched, BatcherConfig, WordBatcher};
pub use cursor::{resume_plan, ResumeCursor, ResumePlan};
pub use error::{Result, StreamError};
pub use event::{DataStatus, StreamEvent};
pub use memory::InMemoryDocumentStore;
pub use message::{
    DataPart, Message, Part, PartKey, PartState, ReasoningPart, Role, TextPart, ToolPart,
};
pub use persister::MessagePersister;
pub use policy::{ToolPolicies, ToolPoliciesBuilder};
pub use reducer::SnapshotReducer;
pub use store::{MessageDocumentStore, StoredMessage, UpdateOutcome};
