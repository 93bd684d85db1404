//! Chat persistence over a flat key-value store
//!
//! The durable owner of all chats is a single JSON blob stored under the
//! [`CHATS_KEY`] namespace key: a mapping from chat id to [`ChatRecord`].
//! [`ChatStore`] re-reads that mapping from the adapter on every operation
//! rather than trusting a cached copy, so the adapter is always
//! authoritative. Mutations are read-modify-write; callers serialize them
//! by holding a single store handle per process.

use crate::error::{ChathookError, Result};
use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub mod types;
pub use types::{ChatRecord, Message};

/// Namespace key that holds the chat mapping
pub const CHATS_KEY: &str = "chats";

/// Legacy single-chat history key
///
/// Incompatible schema from an earlier version; recognized as reserved but
/// never read or migrated.
pub const LEGACY_HISTORY_KEY: &str = "chatHistory";

/// Messages of trailing history included in outbound requests
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Persist attempts for a message append before giving up
const SAVE_RETRY_ATTEMPTS: u32 = 3;

/// Flat key-value storage boundary
///
/// get/set/remove over a single namespace. The production implementation
/// is [`SledStore`]; tests substitute in-memory fakes.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any existing value
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove the value stored under `key`, if any
    fn remove(&self, key: &str) -> Result<()>;
}

/// Key-value adapter backed by an embedded `sled` database
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open the store at the default location
    ///
    /// The `CHATHOOK_STORE_PATH` environment variable overrides the
    /// platform data directory, which makes it easy to point the binary at
    /// a test store without touching the user's data.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("CHATHOOK_STORE_PATH") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "xbcsmith", "chathook")
            .ok_or_else(|| ChathookError::Storage("Could not determine data directory".into()))?;

        let store_dir = proj_dirs.data_dir().join("chats");
        Self::new_with_path(store_dir)
    }

    /// Open the store at a specific directory
    ///
    /// Primarily useful for tests that keep the store in a temporary
    /// directory.
    pub fn new_with_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChathookError::Storage(format!("Failed to create store directory: {}", e))
            })?;
        }

        let db = sled::open(&path)
            .map_err(|e| ChathookError::Storage(format!("Failed to open store: {}", e)))?;
        Ok(Self { db })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| ChathookError::Storage(format!("Get failed: {}", e)))?;
        Ok(value.map(|ivec| ivec.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| ChathookError::Storage(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| ChathookError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| ChathookError::Storage(format!("Remove failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| ChathookError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

/// Outcome of [`ChatStore::delete_chat`]
#[derive(Debug)]
pub struct DeleteOutcome {
    /// Whether an entry was actually removed
    pub removed: bool,

    /// Whether the deleted chat was the session's current chat
    pub was_current: bool,

    /// Replacement chat created because the store became empty
    pub replacement: Option<ChatRecord>,
}

/// Outcome of [`ChatStore::append_message`]
#[derive(Debug)]
pub enum AppendOutcome {
    /// Message appended and persisted
    Appended {
        /// The stored message, with its assigned timestamp
        message: Message,
        /// New chat title, set when this was the first user message
        new_title: Option<String>,
    },

    /// Target chat does not exist; nothing was written
    NoSuchChat,
}

/// Multi-chat CRUD over a [`KeyValueStore`]
///
/// Holds no chat data of its own; every operation loads the full mapping
/// from the adapter, mutates a copy, and writes it back.
pub struct ChatStore<S: KeyValueStore> {
    adapter: S,
    save_retry_delay: Duration,
}

impl<S: KeyValueStore> ChatStore<S> {
    /// Create a store over the given adapter
    pub fn new(adapter: S) -> Self {
        Self {
            adapter,
            save_retry_delay: Duration::from_secs(1),
        }
    }

    /// Override the delay between persist retries (tests)
    #[cfg(test)]
    pub fn with_save_retry_delay(mut self, delay: Duration) -> Self {
        self.save_retry_delay = delay;
        self
    }

    /// Create a fresh chat and persist it
    ///
    /// Refuses (returns `None`) when the session's current chat exists and
    /// has zero messages, so empty chats do not accumulate.
    pub fn create_chat(&self, current: Option<&str>) -> Result<Option<ChatRecord>> {
        let mut chats = self.load_mapping()?;

        if let Some(current_id) = current {
            if let Some(chat) = chats.get(current_id) {
                if chat.messages.is_empty() {
                    tracing::debug!("Current chat {} is empty, not creating another", current_id);
                    return Ok(None);
                }
            }
        }

        let chat = ChatRecord::new();
        chats.insert(chat.id.clone(), chat.clone());
        self.persist_mapping(&chats)?;
        tracing::info!("Created chat {}", chat.id);

        Ok(Some(chat))
    }

    /// Delete a chat by id
    ///
    /// When the mapping becomes empty, a replacement chat is created
    /// immediately so the store never holds zero chats.
    pub fn delete_chat(&self, id: &str, current: Option<&str>) -> Result<DeleteOutcome> {
        let mut chats = self.load_mapping()?;
        let removed = chats.remove(id).is_some();
        self.persist_mapping(&chats)?;

        if removed {
            tracing::info!("Deleted chat {}", id);
        }

        let replacement = if chats.is_empty() {
            self.create_chat(None)?
        } else {
            None
        };

        Ok(DeleteOutcome {
            removed,
            was_current: current == Some(id),
            replacement,
        })
    }

    /// Load a chat for display
    ///
    /// Returns the full record so the caller can replay its messages;
    /// nothing is re-persisted.
    pub fn load_chat(&self, id: &str) -> Result<Option<ChatRecord>> {
        let chats = self.load_mapping()?;
        Ok(chats.get(id).cloned())
    }

    /// Append a message to a chat and persist the mapping
    ///
    /// The first user message overwrites the placeholder title. Persist
    /// failures are retried up to three times with a fixed delay; the
    /// final error is returned for inline display rather than panicking.
    pub async fn append_message(
        &self,
        chat_id: &str,
        text: &str,
        is_user: bool,
    ) -> Result<AppendOutcome> {
        let mut chats = self.load_mapping()?;

        let chat = match chats.get_mut(chat_id) {
            Some(chat) => chat,
            None => return Ok(AppendOutcome::NoSuchChat),
        };

        let message = Message::new(text, is_user);
        chat.messages.push(message.clone());

        let new_title = if is_user && chat.messages.iter().filter(|m| m.is_user).count() == 1 {
            let title = types::title_from_message(text);
            chat.title = title.clone();
            Some(title)
        } else {
            None
        };

        self.persist_with_retry(&chats).await?;

        Ok(AppendOutcome::Appended { message, new_title })
    }

    /// Trailing history for outbound requests
    ///
    /// Returns at most `limit` of the most recent messages, or an empty
    /// list when the chat does not exist.
    pub fn recent_history(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>> {
        let chats = self.load_mapping()?;
        let messages = match chats.get(chat_id) {
            Some(chat) => {
                let skip = chat.messages.len().saturating_sub(limit);
                chat.messages[skip..].to_vec()
            }
            None => Vec::new(),
        };
        Ok(messages)
    }

    /// All chats ordered by creation time, most recent first
    pub fn list_chats(&self) -> Result<Vec<ChatRecord>> {
        let chats = self.load_mapping()?;
        let mut records: Vec<ChatRecord> = chats.into_values().collect();
        records.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(records)
    }

    /// Whether the store holds no chats
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.load_mapping()?.is_empty())
    }

    fn load_mapping(&self) -> Result<BTreeMap<String, ChatRecord>> {
        match self.adapter.get(CHATS_KEY)? {
            Some(bytes) => {
                let chats = serde_json::from_slice(&bytes)
                    .map_err(|e| ChathookError::Storage(format!("Corrupt chat mapping: {}", e)))?;
                Ok(chats)
            }
            None => Ok(BTreeMap::new()),
        }
    }

    fn persist_mapping(&self, chats: &BTreeMap<String, ChatRecord>) -> Result<()> {
        let bytes = serde_json::to_vec(chats)
            .map_err(|e| ChathookError::Storage(format!("Serialization failed: {}", e)))?;
        self.adapter.set(CHATS_KEY, &bytes)
    }

    async fn persist_with_retry(&self, chats: &BTreeMap<String, ChatRecord>) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.persist_mapping(chats) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SAVE_RETRY_ATTEMPTS => {
                    tracing::warn!(
                        "Persist failed (attempt {}/{}), retrying: {}",
                        attempt,
                        SAVE_RETRY_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(self.save_retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("Persist failed after {} attempts", SAVE_RETRY_ATTEMPTS);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// In-memory adapter for unit tests
    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl KeyValueStore for MemoryStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    /// Adapter that fails a fixed number of writes before recovering
    struct FlakyStore {
        inner: MemoryStore,
        failures_remaining: AtomicU32,
    }

    impl FlakyStore {
        fn failing(times: u32) -> Self {
            Self {
                inner: MemoryStore::default(),
                failures_remaining: AtomicU32::new(times),
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            let fail = self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(ChathookError::Storage("simulated write failure".into()).into());
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    impl KeyValueStore for &FlakyStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            <FlakyStore as KeyValueStore>::get(self, key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            <FlakyStore as KeyValueStore>::set(self, key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            <FlakyStore as KeyValueStore>::remove(self, key)
        }
    }

    fn memory_store() -> ChatStore<MemoryStore> {
        ChatStore::new(MemoryStore::default())
    }

    #[test]
    fn test_create_chat_persists_record() {
        let store = memory_store();
        let chat = store.create_chat(None).unwrap().unwrap();
        let loaded = store.load_chat(&chat.id).unwrap().unwrap();
        assert_eq!(loaded.id, chat.id);
        assert_eq!(loaded.title, chat.title);
    }

    #[test]
    fn test_create_chat_noop_when_current_is_empty() {
        let store = memory_store();
        let first = store.create_chat(None).unwrap().unwrap();

        let second = store.create_chat(Some(&first.id)).unwrap();
        assert!(second.is_none());
        assert_eq!(store.list_chats().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_chat_allowed_once_current_has_messages() {
        let store = memory_store();
        let first = store.create_chat(None).unwrap().unwrap();
        store.append_message(&first.id, "hello", true).await.unwrap();

        let second = store.create_chat(Some(&first.id)).unwrap();
        assert!(second.is_some());
        assert_eq!(store.list_chats().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_noop_scenario_current_empty_among_others() {
        // Store has {A: 2 msgs, B: 0 msgs}, current = B: create is a no-op
        let store = memory_store();
        let a = store.create_chat(None).unwrap().unwrap();
        store.append_message(&a.id, "one", true).await.unwrap();
        store.append_message(&a.id, "two", false).await.unwrap();
        let b = store.create_chat(Some(&a.id)).unwrap().unwrap();

        assert!(store.create_chat(Some(&b.id)).unwrap().is_none());
        assert_eq!(store.list_chats().unwrap().len(), 2);
        // B itself is untouched
        assert!(store.load_chat(&b.id).unwrap().unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_append_message_sets_title_from_first_user_message() {
        let store = memory_store();
        let chat = store.create_chat(None).unwrap().unwrap();

        let outcome = store
            .append_message(&chat.id, "what is on this page?", true)
            .await
            .unwrap();
        match outcome {
            AppendOutcome::Appended { new_title, .. } => {
                let title = new_title.expect("first user message should retitle");
                assert!(title.starts_with("what is on this page?"));
            }
            AppendOutcome::NoSuchChat => panic!("chat should exist"),
        }

        let loaded = store.load_chat(&chat.id).unwrap().unwrap();
        assert!(loaded.title.starts_with("what is on this page?"));
    }

    #[tokio::test]
    async fn test_append_message_title_unset_by_assistant_or_later_messages() {
        let store = memory_store();
        let chat = store.create_chat(None).unwrap().unwrap();

        // Assistant message first: no retitle
        let outcome = store.append_message(&chat.id, "welcome", false).await.unwrap();
        assert!(matches!(
            outcome,
            AppendOutcome::Appended { new_title: None, .. }
        ));

        // First user message: retitle
        let outcome = store.append_message(&chat.id, "hi", true).await.unwrap();
        assert!(matches!(
            outcome,
            AppendOutcome::Appended {
                new_title: Some(_),
                ..
            }
        ));

        // Second user message: no retitle
        let outcome = store.append_message(&chat.id, "again", true).await.unwrap();
        assert!(matches!(
            outcome,
            AppendOutcome::Appended { new_title: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_append_message_long_text_title_truncated() {
        let store = memory_store();
        let chat = store.create_chat(None).unwrap().unwrap();
        let text = "x".repeat(64);

        store.append_message(&chat.id, &text, true).await.unwrap();
        let loaded = store.load_chat(&chat.id).unwrap().unwrap();
        assert!(loaded.title.starts_with(&format!("{}...", "x".repeat(30))));
    }

    #[tokio::test]
    async fn test_append_message_to_missing_chat_is_noop() {
        let store = memory_store();
        let outcome = store.append_message("chat_missing", "hi", true).await.unwrap();
        assert!(matches!(outcome, AppendOutcome::NoSuchChat));
    }

    #[tokio::test]
    async fn test_append_message_roundtrip_preserves_order() {
        let store = memory_store();
        let chat = store.create_chat(None).unwrap().unwrap();

        store.append_message(&chat.id, "first", true).await.unwrap();
        store.append_message(&chat.id, "second", false).await.unwrap();
        store.append_message(&chat.id, "third", true).await.unwrap();

        let loaded = store.load_chat(&chat.id).unwrap().unwrap();
        let texts: Vec<&str> = loaded.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(
            loaded.messages.iter().map(|m| m.is_user).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        for msg in &loaded.messages {
            assert!(chrono::DateTime::parse_from_rfc3339(&msg.timestamp).is_ok());
        }
    }

    #[tokio::test]
    async fn test_append_retries_transient_write_failures() {
        let adapter = FlakyStore::failing(2);
        let store = ChatStore::new(&adapter).with_save_retry_delay(Duration::from_millis(1));

        // Seed a chat directly through the inner store so appends have a target
        let mut chats = BTreeMap::new();
        let chat = ChatRecord::new();
        let id = chat.id.clone();
        chats.insert(id.clone(), chat);
        adapter
            .inner
            .set(CHATS_KEY, &serde_json::to_vec(&chats).unwrap())
            .unwrap();

        // Two failures are absorbed by the retry budget of three
        let outcome = store.append_message(&id, "persisted", true).await.unwrap();
        assert!(matches!(outcome, AppendOutcome::Appended { .. }));
        assert_eq!(
            store.load_chat(&id).unwrap().unwrap().messages[0].text,
            "persisted"
        );
    }

    #[tokio::test]
    async fn test_append_fails_after_retry_budget_exhausted() {
        let adapter = FlakyStore::failing(3);
        let store = ChatStore::new(&adapter).with_save_retry_delay(Duration::from_millis(1));

        let mut chats = BTreeMap::new();
        let chat = ChatRecord::new();
        let id = chat.id.clone();
        chats.insert(id.clone(), chat);
        adapter
            .inner
            .set(CHATS_KEY, &serde_json::to_vec(&chats).unwrap())
            .unwrap();

        let result = store.append_message(&id, "lost", true).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_last_chat_creates_replacement() {
        let store = memory_store();
        let chat = store.create_chat(None).unwrap().unwrap();

        let outcome = store.delete_chat(&chat.id, Some(&chat.id)).unwrap();
        assert!(outcome.removed);
        assert!(outcome.was_current);
        let replacement = outcome.replacement.expect("empty store should refill");
        assert_ne!(replacement.id, chat.id);

        let remaining = store.list_chats().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, replacement.id);
    }

    #[tokio::test]
    async fn test_delete_non_current_chat_leaves_current_untouched() {
        let store = memory_store();
        let current = store.create_chat(None).unwrap().unwrap();
        store.append_message(&current.id, "keep me", true).await.unwrap();
        let other = store.create_chat(Some(&current.id)).unwrap().unwrap();

        let outcome = store.delete_chat(&other.id, Some(&current.id)).unwrap();
        assert!(outcome.removed);
        assert!(!outcome.was_current);
        assert!(outcome.replacement.is_none());

        let kept = store.load_chat(&current.id).unwrap().unwrap();
        assert_eq!(kept.messages.len(), 1);
        assert_eq!(kept.messages[0].text, "keep me");
    }

    #[test]
    fn test_delete_missing_chat_is_idempotent() {
        let store = memory_store();
        store.create_chat(None).unwrap().unwrap();
        let outcome = store.delete_chat("chat_missing", None).unwrap();
        assert!(!outcome.removed);
        assert!(outcome.replacement.is_none());
    }

    #[tokio::test]
    async fn test_recent_history_caps_at_limit() {
        let store = memory_store();
        let chat = store.create_chat(None).unwrap().unwrap();
        for i in 0..25 {
            store
                .append_message(&chat.id, &format!("msg {}", i), i % 2 == 0)
                .await
                .unwrap();
        }

        let history = store
            .recent_history(&chat.id, DEFAULT_HISTORY_LIMIT)
            .unwrap();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].text, "msg 5");
        assert_eq!(history[19].text, "msg 24");
    }

    #[tokio::test]
    async fn test_recent_history_returns_all_when_fewer_than_limit() {
        let store = memory_store();
        let chat = store.create_chat(None).unwrap().unwrap();
        for i in 0..3 {
            store
                .append_message(&chat.id, &format!("msg {}", i), true)
                .await
                .unwrap();
        }

        let history = store
            .recent_history(&chat.id, DEFAULT_HISTORY_LIMIT)
            .unwrap();
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_recent_history_missing_chat_is_empty() {
        let store = memory_store();
        let history = store
            .recent_history("chat_missing", DEFAULT_HISTORY_LIMIT)
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_list_chats_sorted_by_created_descending() {
        let store = memory_store();
        let first = store.create_chat(None).unwrap().unwrap();
        store.append_message(&first.id, "x", true).await.unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let second = store.create_chat(Some(&first.id)).unwrap().unwrap();

        let listed = store.list_chats().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn test_is_empty_on_fresh_store() {
        let store = memory_store();
        assert!(store.is_empty().unwrap());
        store.create_chat(None).unwrap();
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn test_corrupt_mapping_surfaces_storage_error() {
        let adapter = MemoryStore::default();
        adapter.set(CHATS_KEY, b"{not json").unwrap();
        let store = ChatStore::new(adapter);
        assert!(store.list_chats().is_err());
    }

    #[test]
    fn test_legacy_history_key_is_never_touched() {
        let adapter = MemoryStore::default();
        adapter.set(LEGACY_HISTORY_KEY, b"[]").unwrap();
        let store = ChatStore::new(adapter);

        let chat = store.create_chat(None).unwrap().unwrap();
        store.delete_chat(&chat.id, None).unwrap();

        // The legacy blob is still there, untouched and unmigrated
        assert_eq!(
            store.adapter.get(LEGACY_HISTORY_KEY).unwrap(),
            Some(b"[]".to_vec())
        );
    }
}
