//! In-memory message ledger with optional snapshot persistence.
//!
//! Holds per-chat FIFO queues of message handles. When a chat's queue exceeds
//! the configured maximum the oldest handle is evicted; that message simply
//! stays on screen. The whole ledger can be saved to and restored from a
//! postcard snapshot so pending cleanups survive a restart.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use taskbot_proto::codec::{self, LedgerSnapshot};
use taskbot_proto::message::{ChatId, MessageHandle};
use tokio::sync::RwLock;

use super::{LedgerError, MessageLedger};

/// Default maximum number of pending handles per chat before FIFO eviction.
pub const DEFAULT_MAX_LEDGER_LEN: usize = 1000;

/// Per-chat handle queues behind a single [`RwLock`].
pub struct InMemoryLedger {
    queues: RwLock<HashMap<ChatId, VecDeque<MessageHandle>>>,
    max_len: usize,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates an empty ledger with the default per-chat limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LEDGER_LEN)
    }

    /// Creates an empty ledger with a custom per-chat limit.
    #[must_use]
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            max_len: max_len.max(1),
        }
    }

    /// Copies the current content into a snapshot, chats sorted by id.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let queues = self.queues.read().await;
        let mut chats: Vec<_> = queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(chat, q)| (*chat, q.iter().copied().collect::<Vec<_>>()))
            .collect();
        drop(queues);
        chats.sort_by_key(|(chat, _)| *chat);
        LedgerSnapshot::new(chats)
    }

    /// Replaces the current content with a snapshot.
    ///
    /// Duplicate handles are dropped and over-long queues are trimmed to the
    /// newest `max_len` handles.
    pub async fn restore(&self, snapshot: LedgerSnapshot) {
        let mut restored = HashMap::with_capacity(snapshot.chats.len());
        for (chat, handles) in snapshot.chats {
            let queue: &mut VecDeque<MessageHandle> = restored.entry(chat).or_default();
            for handle in handles {
                push_bounded(queue, handle, self.max_len);
            }
        }
        *self.queues.write().await = restored;
    }

    /// Writes a framed snapshot to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Codec`] if encoding fails, or
    /// [`LedgerError::Unavailable`] if the file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<(), LedgerError> {
        let snapshot = self.snapshot().await;
        let bytes = codec::encode_framed(&snapshot)?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| LedgerError::Unavailable(format!("write {}: {e}", path.display())))?;
        tracing::info!(
            path = %path.display(),
            handles = snapshot.handle_count(),
            "saved ledger snapshot"
        );
        Ok(())
    }

    /// Loads a ledger from a snapshot file; a missing file yields an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] if the file exists but cannot be
    /// read, or [`LedgerError::Codec`] if its content is not a valid snapshot.
    pub async fn load_from(path: &Path, max_len: usize) -> Result<Self, LedgerError> {
        let ledger = Self::with_max_len(max_len);
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ledger),
            Err(e) => {
                return Err(LedgerError::Unavailable(format!(
                    "read {}: {e}",
                    path.display()
                )));
            }
        };
        let snapshot = codec::decode_framed(&bytes)?;
        tracing::info!(
            path = %path.display(),
            handles = snapshot.handle_count(),
            "restored ledger snapshot"
        );
        ledger.restore(snapshot).await;
        Ok(ledger)
    }
}

/// Appends unless already present; evicts the oldest handle beyond `max_len`.
///
/// Returns the evicted handle, if any.
fn push_bounded(
    queue: &mut VecDeque<MessageHandle>,
    handle: MessageHandle,
    max_len: usize,
) -> Option<MessageHandle> {
    if queue.contains(&handle) {
        return None;
    }
    queue.push_back(handle);
    if queue.len() > max_len {
        queue.pop_front()
    } else {
        None
    }
}

impl MessageLedger for InMemoryLedger {
    async fn append(&self, chat: ChatId, handle: MessageHandle) -> Result<(), LedgerError> {
        let mut queues = self.queues.write().await;
        let queue = queues.entry(chat).or_default();
        if let Some(evicted) = push_bounded(queue, handle, self.max_len) {
            tracing::debug!(chat_id = %chat, handle = %evicted, "ledger full, evicted oldest handle");
        }
        Ok(())
    }

    async fn drain(&self, chat: ChatId) -> Result<Vec<MessageHandle>, LedgerError> {
        let mut queues = self.queues.write().await;
        Ok(queues
            .remove(&chat)
            .map(|q| q.into_iter().collect())
            .unwrap_or_default())
    }

    async fn pending(&self, chat: ChatId) -> Result<usize, LedgerError> {
        let queues = self.queues.read().await;
        Ok(queues.get(&chat).map_or(0, VecDeque::len))
    }
}
