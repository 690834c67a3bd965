use crate::error::StorageError;
use crate::storage::ThreadStore;
use crate::summary::{StoredSummary, SummaryRecord};
use crate::types::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// File-backed store: one directory per thread holding `messages.jsonl` and
/// `summaries.jsonl`. Each summary record is written as a single line.
#[derive(Debug, Clone)]
pub struct JsonlThreadStore {
    base_path: PathBuf,
}

impl JsonlThreadStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub async fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_path).await
    }

    /// Thread ids that have a directory in the store.
    pub async fn list_threads(&self) -> std::io::Result<Vec<String>> {
        let mut threads = Vec::new();
        if !self.base_path.exists() {
            return Ok(threads);
        }

        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match decode_thread_id(&name) {
                Some(thread_id) => threads.push(thread_id),
                None => tracing::warn!("Ignoring directory {:?}: not a thread id", name),
            }
        }
        threads.sort();
        Ok(threads)
    }

    fn thread_dir(&self, thread_id: &str) -> Result<PathBuf, StorageError> {
        if thread_id.is_empty() {
            return Err(StorageError::InvalidThreadId(thread_id.to_string()));
        }
        Ok(self.base_path.join(encode_thread_id(thread_id)))
    }

    fn messages_path(&self, thread_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.thread_dir(thread_id)?.join("messages.jsonl"))
    }

    fn summaries_path(&self, thread_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.thread_dir(thread_id)?.join("summaries.jsonl"))
    }

    async fn append_line<T: Serialize>(&self, thread_id: &str, path: &Path, value: &T) -> Result<(), StorageError> {
        fs::create_dir_all(self.thread_dir(thread_id)?).await?;
        let mut line = serde_json::to_string(value)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_lines<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>, StorageError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut items = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("Skipping unreadable line in {:?}: {}", path, e),
            }
        }

        Ok(items)
    }
}

/// Percent-encode an id into a single path component.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`, so distinct ids always map to distinct directories.
fn encode_thread_id(thread_id: &str) -> String {
    let mut encoded = String::with_capacity(thread_id.len());
    for byte in thread_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// Inverse of [`encode_thread_id`]; `None` for names it could not have produced.
fn decode_thread_id(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = name.get(i + 1..i + 3)?;
                decoded.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' => {
                decoded.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    if decoded.is_empty() {
        return None;
    }
    String::from_utf8(decoded).ok()
}

#[async_trait::async_trait]
impl ThreadStore for JsonlThreadStore {
    async fn append_message(&self, thread_id: &str, message: &Message) -> Result<(), StorageError> {
        let path = self.messages_path(thread_id)?;
        self.append_line(thread_id, &path, message).await
    }

    async fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>, StorageError> {
        self.read_lines(&self.messages_path(thread_id)?).await
    }

    async fn get_latest_summary(&self, thread_id: &str) -> Result<Option<StoredSummary>, StorageError> {
        let mut summaries: Vec<StoredSummary> = self.read_lines(&self.summaries_path(thread_id)?).await?;
        Ok(summaries.pop())
    }

    async fn save_summary(
        &self,
        thread_id: &str,
        record: &SummaryRecord,
        message_count_covered: usize,
    ) -> Result<StoredSummary, StorageError> {
        let stored = StoredSummary::new(thread_id, record.clone(), message_count_covered);
        let path = self.summaries_path(thread_id)?;
        self.append_line(thread_id, &path, &stored).await?;
        Ok(stored)
    }

    async fn list_summaries(&self, thread_id: &str) -> Result<Vec<StoredSummary>, StorageError> {
        self.read_lines(&self.summaries_path(thread_id)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SummaryField;

    #[tokio::test]
    async fn round_trips_messages_and_summaries() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let store = JsonlThreadStore::new(dir.path());
        store.init().await?;

        store.append_message("thread-1", &Message::user("alice", "Hello")).await?;
        store
            .append_message("thread-1", &Message::assistant("Hi!", Some("openai/gpt-4".into())))
            .await?;

        let record = SummaryRecord::new()
            .with(SummaryField::CoreFacts, "Alice said hello")
            .with_entity("Alice", "user");
        store.save_summary("thread-1", &record, 2).await?;

        let messages = store.get_messages("thread-1").await?;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].model_used.as_deref(), Some("openai/gpt-4"));

        let latest = store.get_latest_summary("thread-1").await?.expect("summary");
        assert_eq!(latest.record, record);
        assert_eq!(latest.message_count_covered, 2);
        assert_eq!(store.list_threads().await?, vec!["thread-1".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn skips_corrupt_lines() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let store = JsonlThreadStore::new(dir.path());

        let record = SummaryRecord::new().with(SummaryField::CoreFacts, "kept");
        store.save_summary("t", &record, 4).await?;

        let path = store.summaries_path("t")?;
        let mut file = fs::OpenOptions::new().append(true).open(&path).await?;
        file.write_all(b"{not json\n").await?;
        file.flush().await?;

        let latest = store.get_latest_summary("t").await?.expect("summary");
        assert_eq!(latest.record, record);
        Ok(())
    }

    #[tokio::test]
    async fn missing_thread_reads_empty() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let store = JsonlThreadStore::new(dir.path().join("not-created"));
        assert!(store.get_messages("x").await?.is_empty());
        assert!(store.get_latest_summary("x").await?.is_none());
        assert!(store.list_threads().await?.is_empty());
        Ok(())
    }

    #[test]
    fn thread_ids_encode_to_one_path_component() {
        assert_eq!(encode_thread_id("../etc/passwd"), "%2E%2E%2Fetc%2Fpasswd");
        assert_eq!(encode_thread_id("thread_42-a"), "thread_42-a");
        assert_eq!(encode_thread_id("100%"), "100%25");
        assert_eq!(encode_thread_id("café"), "caf%C3%A9");
    }

    #[test]
    fn encoding_round_trips() {
        for id in ["team.alpha", "team_alpha", "team/alpha", "a%2Eb", "café ☕", "-"] {
            assert_eq!(decode_thread_id(&encode_thread_id(id)).as_deref(), Some(id));
        }
        assert_eq!(decode_thread_id("bad%zz"), None);
        assert_eq!(decode_thread_id("trailing%2"), None);
        assert_eq!(decode_thread_id("has.dot"), None);
    }

    #[tokio::test]
    async fn similar_ids_stay_separate() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let store = JsonlThreadStore::new(dir.path());

        store.append_message("team.alpha", &Message::user("a", "secret alpha")).await?;
        store.append_message("team/alpha", &Message::user("b", "slash alpha")).await?;
        store
            .save_summary("team.alpha", &SummaryRecord::new().with(SummaryField::CoreFacts, "dot"), 1)
            .await?;

        assert!(store.get_messages("team_alpha").await?.is_empty());
        assert!(store.get_latest_summary("team_alpha").await?.is_none());
        assert!(store.get_latest_summary("team/alpha").await?.is_none());
        let dotted = store.get_messages("team.alpha").await?;
        assert_eq!(dotted.len(), 1);
        assert_eq!(dotted[0].content, "secret alpha");

        assert_eq!(
            store.list_threads().await?,
            vec!["team.alpha".to_string(), "team/alpha".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_thread_id_is_rejected() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let store = JsonlThreadStore::new(dir.path());
        let err = store.append_message("", &Message::user("a", "x")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidThreadId(_)));
        Ok(())
    }
}
