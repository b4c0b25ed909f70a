// Postgres storage layer with sqlx
//
// This crate provides database implementations for core traits:
// - DbDocumentStore: implements MessageDocumentStore for message documents
// - DbEventLog: append-only, replayable stream event feed

pub mod doc_store;
pub mod event_log;
pub mod models;
pub mod repositories;

pub use doc_store::{create_db_document_store, DbDocumentStore};
pub use event_log::{create_db_event_log, DbEventLog};
pub use models::*;
pub use repositories::*;
