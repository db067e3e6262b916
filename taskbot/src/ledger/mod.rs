//! Ephemeral-message ledger and its consumer.
//!
//! Every message the bot posts (and, optionally, every text the user sends)
//! is appended to its chat's ledger. When the conversation moves on, the
//! [`Sweeper`] drains the ledger and deletes the recorded messages so the chat
//! only shows the latest prompt.
//!
//! Backends implement [`MessageLedger`]:
//! - [`memory::InMemoryLedger`] — per-chat queues in memory, optionally
//!   persisted to a snapshot file across restarts
//! - [`sqlite::SqliteLedger`] — a table next to the task store

pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use taskbot_proto::codec::CodecError;
use taskbot_proto::message::{ChatId, MessageHandle};

use crate::transport::Transport;

/// Errors that can occur during ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The backing storage failed or is unreachable.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// A persisted snapshot could not be encoded or decoded.
    #[error("ledger snapshot codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Per-chat ordered record of message handles pending deletion.
///
/// # Invariants
///
/// - `append` is idempotent per handle value within a chat.
/// - `drain` returns every handle appended since the previous drain exactly
///   once, oldest first, and leaves the chat's sequence empty.
pub trait MessageLedger: Send + Sync {
    /// Record a handle at the end of the chat's sequence.
    fn append(
        &self,
        chat: ChatId,
        handle: MessageHandle,
    ) -> impl std::future::Future<Output = Result<(), LedgerError>> + Send;

    /// Atomically take the chat's whole sequence.
    fn drain(
        &self,
        chat: ChatId,
    ) -> impl std::future::Future<Output = Result<Vec<MessageHandle>, LedgerError>> + Send;

    /// Number of handles currently pending for the chat.
    fn pending(
        &self,
        chat: ChatId,
    ) -> impl std::future::Future<Output = Result<usize, LedgerError>> + Send;
}

/// Ledger backend chosen at startup.
pub enum LedgerBackend {
    /// In-process queues.
    Memory(memory::InMemoryLedger),
    /// `ledger` table in the bot database.
    Sqlite(sqlite::SqliteLedger),
}

impl MessageLedger for LedgerBackend {
    async fn append(&self, chat: ChatId, handle: MessageHandle) -> Result<(), LedgerError> {
        match self {
            Self::Memory(l) => l.append(chat, handle).await,
            Self::Sqlite(l) => l.append(chat, handle).await,
        }
    }

    async fn drain(&self, chat: ChatId) -> Result<Vec<MessageHandle>, LedgerError> {
        match self {
            Self::Memory(l) => l.drain(chat).await,
            Self::Sqlite(l) => l.drain(chat).await,
        }
    }

    async fn pending(&self, chat: ChatId) -> Result<usize, LedgerError> {
        match self {
            Self::Memory(l) => l.pending(chat).await,
            Self::Sqlite(l) => l.pending(chat).await,
        }
    }
}

/// Outcome of one [`Sweeper::drain_and_delete`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Handles taken out of the ledger.
    pub drained: usize,
    /// Deletes that failed or timed out.
    pub failed: usize,
}

/// Records outgoing messages and clears them from the chat later.
///
/// Both operations are best effort: ledger and transport failures are logged
/// and never escalate to the caller. A failed delete leaves the message on
/// screen but it is never retried, so no handle is deleted twice.
pub struct Sweeper<L> {
    ledger: Arc<L>,
    op_timeout: Duration,
}

impl<L: MessageLedger> Sweeper<L> {
    /// Create a sweeper bounding each ledger and transport call by `op_timeout`.
    #[must_use]
    pub const fn new(ledger: Arc<L>, op_timeout: Duration) -> Self {
        Self { ledger, op_timeout }
    }

    /// The underlying ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Append `handle` to the chat's ledger; failures are logged and dropped.
    pub async fn record(&self, chat: ChatId, handle: MessageHandle) {
        match tokio::time::timeout(self.op_timeout, self.ledger.append(chat, handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(chat_id = %chat, %handle, error = %e, "failed to record message");
            }
            Err(_) => {
                tracing::warn!(chat_id = %chat, %handle, "recording message timed out");
            }
        }
    }

    /// Drain the chat's ledger and delete every drained message, oldest first.
    pub async fn drain_and_delete<T: Transport>(&self, chat: ChatId, transport: &T) -> SweepReport {
        let handles = match tokio::time::timeout(self.op_timeout, self.ledger.drain(chat)).await {
            Ok(Ok(handles)) => handles,
            Ok(Err(e)) => {
                tracing::warn!(chat_id = %chat, error = %e, "ledger drain failed");
                return SweepReport::default();
            }
            Err(_) => {
                tracing::warn!(chat_id = %chat, "ledger drain timed out");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            drained: handles.len(),
            failed: 0,
        };
        for handle in handles {
            match tokio::time::timeout(self.op_timeout, transport.delete(chat, handle)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::debug!(chat_id = %chat, %handle, error = %e, "delete failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::debug!(chat_id = %chat, %handle, "delete timed out");
                }
            }
        }
        if report.drained > 0 {
            tracing::debug!(
                chat_id = %chat,
                drained = report.drained,
                failed = report.failed,
                "swept chat"
            );
        }
        report
    }
}
