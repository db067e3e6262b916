//! Task and conversation-state persistence.
//!
//! Defines the [`TaskStore`] trait consumed by the engine and the task flow.
//! Implementations:
//! - [`memory::InMemoryTaskStore`] — process-local store for tests and ephemeral runs
//! - [`sqlite::SqliteTaskStore`] — persistent store on a single SQLite file

pub mod memory;
pub mod sqlite;

use taskbot_proto::message::ChatId;
use taskbot_proto::state::ConversationState;
use taskbot_proto::task::{Task, TaskId};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage failed or is unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be interpreted.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Persistence of tasks and per-chat conversation state.
///
/// Every method is atomic on its own. Callers serialize calls per chat; the
/// store only has to keep different chats from corrupting each other.
pub trait TaskStore: Send + Sync {
    /// Current conversation state of a chat; [`ConversationState::Default`]
    /// if none was ever written.
    fn get_state(
        &self,
        chat: ChatId,
    ) -> impl std::future::Future<Output = Result<ConversationState, StoreError>> + Send;

    /// Overwrite the conversation state of a chat.
    fn set_state(
        &self,
        chat: ChatId,
        state: ConversationState,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Insert an empty task with status `Creating` and return its id.
    fn create_draft_task(
        &self,
        chat: ChatId,
    ) -> impl std::future::Future<Output = Result<TaskId, StoreError>> + Send;

    /// Set the name of a task.
    ///
    /// Returns [`StoreError::NotFound`] if the task does not exist.
    fn set_task_name(
        &self,
        id: TaskId,
        name: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Set the description of a task and mark it `Created`.
    ///
    /// Returns [`StoreError::NotFound`] if the task does not exist.
    fn set_task_description(
        &self,
        id: TaskId,
        description: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Id of the chat's draft task; [`StoreError::NotFound`] if it has none.
    ///
    /// If several drafts exist the most recent one wins.
    fn get_draft_task_id(
        &self,
        chat: ChatId,
    ) -> impl std::future::Future<Output = Result<TaskId, StoreError>> + Send;

    /// Delete the chat's finished tasks with exactly this name.
    ///
    /// Returns the number of tasks removed.
    fn delete_task_by_name(
        &self,
        chat: ChatId,
        name: &str,
    ) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;

    /// Delete every draft task of the chat.
    ///
    /// Returns the number of tasks removed.
    fn delete_draft_task(
        &self,
        chat: ChatId,
    ) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;

    /// Every task of the chat, drafts included, in creation order.
    fn list_tasks(
        &self,
        chat: ChatId,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, StoreError>> + Send;
}
