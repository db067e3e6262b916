//! SQLite-backed message ledger.
//!
//! Handles live in the `ledger` table of the bot database, ordered by an
//! autoincrement sequence. A `UNIQUE (chat_id, handle)` constraint makes
//! appends idempotent; drains read and delete inside one transaction.

use rusqlite::params;
use taskbot_proto::message::{ChatId, MessageHandle};

use super::memory::DEFAULT_MAX_LEDGER_LEN;
use super::{LedgerError, MessageLedger};
use crate::store::sqlite::{Database, DatabaseError};

impl From<DatabaseError> for LedgerError {
    fn from(e: DatabaseError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// [`MessageLedger`] stored next to the tasks in a shared [`Database`].
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    db: Database,
    max_len: usize,
}

impl SqliteLedger {
    /// Create a ledger with the default per-chat limit.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self::with_max_len(db, DEFAULT_MAX_LEDGER_LEN)
    }

    /// Create a ledger with a custom per-chat limit.
    #[must_use]
    pub const fn with_max_len(db: Database, max_len: usize) -> Self {
        Self { db, max_len }
    }
}

impl MessageLedger for SqliteLedger {
    async fn append(&self, chat: ChatId, handle: MessageHandle) -> Result<(), LedgerError> {
        let max_len = i64::try_from(self.max_len.max(1)).unwrap_or(i64::MAX);
        let evicted = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO ledger (chat_id, handle) VALUES (?1, ?2)",
                    params![chat.get(), handle.get()],
                )?;
                let evicted = tx.execute(
                    "DELETE FROM ledger WHERE chat_id = ?1 AND seq NOT IN (
                         SELECT seq FROM ledger WHERE chat_id = ?1 ORDER BY seq DESC LIMIT ?2
                     )",
                    params![chat.get(), max_len],
                )?;
                tx.commit()?;
                Ok(evicted)
            })
            .await?;
        if evicted > 0 {
            tracing::debug!(chat_id = %chat, evicted, "ledger full, evicted oldest handles");
        }
        Ok(())
    }

    async fn drain(&self, chat: ChatId) -> Result<Vec<MessageHandle>, LedgerError> {
        let handles = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let handles = {
                    let mut stmt =
                        tx.prepare("SELECT handle FROM ledger WHERE chat_id = ?1 ORDER BY seq")?;
                    stmt.query_map(params![chat.get()], |row| row.get::<_, i64>(0))?
                        .collect::<Result<Vec<_>, _>>()?
                };
                tx.execute("DELETE FROM ledger WHERE chat_id = ?1", params![chat.get()])?;
                tx.commit()?;
                Ok(handles)
            })
            .await?;
        Ok(handles.into_iter().map(MessageHandle::new).collect())
    }

    async fn pending(&self, chat: ChatId) -> Result<usize, LedgerError> {
        let count: i64 = self
            .db
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM ledger WHERE chat_id = ?1",
                    params![chat.get()],
                    |row| row.get(0),
                )?)
            })
            .await?;
        usize::try_from(count)
            .map_err(|_| LedgerError::Unavailable(format!("negative ledger count {count}")))
    }
}
