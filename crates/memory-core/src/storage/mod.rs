//! Persistence collaborators for thread messages and summaries.

pub mod jsonl;
pub mod memory;

use crate::error::StorageError;
use crate::summary::{StoredSummary, SummaryRecord};
use crate::types::Message;
use std::sync::Arc;

pub use jsonl::JsonlThreadStore;
pub use memory::InMemoryThreadStore;

/// Where a thread's messages and summary records live.
///
/// Summary records are append-only: `save_summary` adds a whole new record
/// and the last one saved is the thread's authoritative memory.
#[async_trait::async_trait]
pub trait ThreadStore: Send + Sync {
    async fn append_message(&self, thread_id: &str, message: &Message) -> Result<(), StorageError>;

    /// Messages in insertion order; empty for an unknown thread.
    async fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>, StorageError>;

    async fn get_latest_summary(&self, thread_id: &str) -> Result<Option<StoredSummary>, StorageError>;

    /// Append a record covering the first `message_count_covered` messages.
    async fn save_summary(
        &self,
        thread_id: &str,
        record: &SummaryRecord,
        message_count_covered: usize,
    ) -> Result<StoredSummary, StorageError>;

    /// Every record of the thread, oldest first.
    async fn list_summaries(&self, thread_id: &str) -> Result<Vec<StoredSummary>, StorageError>;
}

/// Arc-wrapped store for sharing across tasks.
pub type SharedThreadStore = Arc<dyn ThreadStore>;
