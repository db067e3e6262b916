//! SQLite-backed [`TaskStore`].
//!
//! A single [`Database`] file holds conversation state, tasks and (when the
//! SQLite ledger backend is selected) the message ledger. rusqlite is
//! synchronous, so every call runs on the blocking pool against one
//! connection guarded by a `parking_lot::Mutex`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use taskbot_proto::message::ChatId;
use taskbot_proto::state::ConversationState;
use taskbot_proto::task::{Task, TaskId, TaskStatus};

use super::{StoreError, TaskStore};

/// Schema migrations, applied in order and tracked in `PRAGMA user_version`.
const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    "CREATE TABLE chats (
         chat_id INTEGER PRIMARY KEY,
         state   INTEGER NOT NULL DEFAULT 0
     );
     CREATE TABLE tasks (
         id          INTEGER PRIMARY KEY AUTOINCREMENT,
         chat_id     INTEGER NOT NULL,
         name        TEXT,
         description TEXT,
         status      INTEGER NOT NULL
     );
     CREATE INDEX idx_tasks_chat_status ON tasks(chat_id, status);
     CREATE TABLE ledger (
         seq     INTEGER PRIMARY KEY AUTOINCREMENT,
         chat_id INTEGER NOT NULL,
         handle  INTEGER NOT NULL,
         UNIQUE (chat_id, handle)
     );",
)];

/// Schema version written by this build.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

/// Errors raised by [`Database`] before they are mapped into a layer error.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A row held a value this build cannot interpret.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The database was written by a newer build.
    #[error("schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Version found in the file.
        found: u32,
        /// Latest version this build understands.
        supported: u32,
    },

    /// The blocking task running the query panicked or was cancelled.
    #[error("database worker failed: {0}")]
    Worker(String),
}

impl From<DatabaseError> for StoreError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Corrupt(msg) => Self::Corrupt(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Shared handle to the bot's SQLite database.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (or create) a database file and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`] if the file cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        apply_migrations(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open a fresh in-memory database, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        apply_migrations(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking thread pool.
    pub(crate) async fn call<F, R>(&self, f: F) -> Result<R, DatabaseError>
    where
        F: FnOnce(&mut Connection) -> Result<R, DatabaseError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| DatabaseError::Worker(e.to_string()))?
    }
}

fn apply_migrations(conn: &mut Connection) -> Result<(), DatabaseError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let current = u32::try_from(current)
        .map_err(|_| DatabaseError::Corrupt(format!("negative user_version {current}")))?;

    if current > LATEST_SCHEMA_VERSION {
        return Err(DatabaseError::SchemaTooNew {
            found: current,
            supported: LATEST_SCHEMA_VERSION,
        });
    }
    if current == LATEST_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tracing::info!(version, "applied database migration");
    }
    tx.commit()?;
    Ok(())
}

/// [`TaskStore`] over a shared [`Database`].
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    db: Database,
}

impl SqliteTaskStore {
    /// Create a store on an opened database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Raw `tasks` row: id, chat, name, description, status code.
type TaskRow = (i64, i64, Option<String>, Option<String>, i64);

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

impl TaskStore for SqliteTaskStore {
    async fn get_state(&self, chat: ChatId) -> Result<ConversationState, StoreError> {
        let code: Option<i64> = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT state FROM chats WHERE chat_id = ?1",
                        params![chat.get()],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        match code {
            None => Ok(ConversationState::Default),
            Some(code) => ConversationState::from_code(code).ok_or_else(|| {
                StoreError::Corrupt(format!("unknown state code {code} for chat {chat}"))
            }),
        }
    }

    async fn set_state(&self, chat: ChatId, state: ConversationState) -> Result<(), StoreError> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO chats (chat_id, state) VALUES (?1, ?2)
                     ON CONFLICT(chat_id) DO UPDATE SET state = excluded.state",
                    params![chat.get(), state.code()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn create_draft_task(&self, chat: ChatId) -> Result<TaskId, StoreError> {
        let id = self
            .db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (chat_id, status) VALUES (?1, ?2)",
                    params![chat.get(), TaskStatus::Creating.code()],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(TaskId::new(id))
    }

    async fn set_task_name(&self, id: TaskId, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        let updated = self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE tasks SET name = ?1 WHERE id = ?2",
                    params![name, id.get()],
                )?)
            })
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    async fn set_task_description(&self, id: TaskId, description: &str) -> Result<(), StoreError> {
        let description = description.to_string();
        let updated = self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE tasks SET description = ?1, status = ?2 WHERE id = ?3",
                    params![description, TaskStatus::Created.code(), id.get()],
                )?)
            })
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    async fn get_draft_task_id(&self, chat: ChatId) -> Result<TaskId, StoreError> {
        let id: Option<i64> = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id FROM tasks WHERE chat_id = ?1 AND status = ?2
                         ORDER BY id DESC LIMIT 1",
                        params![chat.get(), TaskStatus::Creating.code()],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        id.map(TaskId::new)
            .ok_or_else(|| StoreError::NotFound(format!("draft task of chat {chat}")))
    }

    async fn delete_task_by_name(&self, chat: ChatId, name: &str) -> Result<usize, StoreError> {
        let name = name.to_string();
        Ok(self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM tasks WHERE chat_id = ?1 AND name = ?2 AND status = ?3",
                    params![chat.get(), name, TaskStatus::Created.code()],
                )?)
            })
            .await?)
    }

    async fn delete_draft_task(&self, chat: ChatId) -> Result<usize, StoreError> {
        Ok(self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM tasks WHERE chat_id = ?1 AND status = ?2",
                    params![chat.get(), TaskStatus::Creating.code()],
                )?)
            })
            .await?)
    }

    async fn list_tasks(&self, chat: ChatId) -> Result<Vec<Task>, StoreError> {
        let rows = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, chat_id, name, description, status FROM tasks
                     WHERE chat_id = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![chat.get()], row_to_task)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, chat_id, name, description, status)| {
                let status = TaskStatus::from_code(status).ok_or_else(|| {
                    StoreError::Corrupt(format!("unknown status code {status} for task {id}"))
                })?;
                Ok(Task {
                    id: TaskId::new(id),
                    chat_id: ChatId::new(chat_id),
                    name,
                    description,
                    status,
                })
            })
            .collect()
    }
}
