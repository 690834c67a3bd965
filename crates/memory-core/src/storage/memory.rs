use crate::error::StorageError;
use crate::storage::ThreadStore;
use crate::summary::{StoredSummary, SummaryRecord};
use crate::types::Message;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct ThreadData {
    messages: Vec<Message>,
    summaries: Vec<StoredSummary>,
}

/// Process-local store, used by tests and short-lived tools.
#[derive(Debug, Default)]
pub struct InMemoryThreadStore {
    threads: RwLock<HashMap<String, ThreadData>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn append_message(&self, thread_id: &str, message: &Message) -> Result<(), StorageError> {
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .messages
            .push(message.clone());
        Ok(())
    }

    async fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>, StorageError> {
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default())
    }

    async fn get_latest_summary(&self, thread_id: &str) -> Result<Option<StoredSummary>, StorageError> {
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_id)
            .and_then(|t| t.summaries.last().cloned()))
    }

    async fn save_summary(
        &self,
        thread_id: &str,
        record: &SummaryRecord,
        message_count_covered: usize,
    ) -> Result<StoredSummary, StorageError> {
        let stored = StoredSummary::new(thread_id, record.clone(), message_count_covered);
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .summaries
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_summaries(&self, thread_id: &str) -> Result<Vec<StoredSummary>, StorageError> {
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_id)
            .map(|t| t.summaries.clone())
            .unwrap_or_default())
    }
}
