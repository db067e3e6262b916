//! Draft lifecycle and deletion for one chat at a time.

use std::sync::Arc;

use taskbot_proto::message::ChatId;
use taskbot_proto::task::{Task, TaskId};

use super::TaskError;
use crate::store::{StoreError, TaskStore};

/// Result of deleting tasks by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// This many tasks were removed.
    Deleted(usize),
    /// No finished task of the chat had that name.
    NoSuchTask,
}

impl DeleteOutcome {
    /// Text shown to the user.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Deleted(_) => "Task deleted successfully",
            Self::NoSuchTask => "There is no such task",
        }
    }
}

/// Task operations of the conversation engine.
///
/// Callers serialize calls per chat, so "the chat's draft" is well defined.
pub struct TaskFlow<S> {
    store: Arc<S>,
}

impl<S> Clone for TaskFlow<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TaskStore> TaskFlow<S> {
    /// Wrap a store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Start a new draft, discarding drafts left behind by aborted events.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the store fails.
    pub async fn begin_draft(&self, chat: ChatId) -> Result<TaskId, TaskError> {
        let purged = self.store.delete_draft_task(chat).await?;
        if purged > 0 {
            tracing::debug!(chat_id = %chat, purged, "discarded stale drafts");
        }
        let id = self.store.create_draft_task(chat).await?;
        tracing::debug!(chat_id = %chat, task_id = %id, "draft created");
        Ok(id)
    }

    /// Name the chat's draft.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NoDraft`] if the chat has no draft, or
    /// [`TaskError::Store`] if the store fails.
    pub async fn name_draft(&self, chat: ChatId, name: &str) -> Result<TaskId, TaskError> {
        let id = self.draft_id(chat).await?;
        self.store.set_task_name(id, name).await?;
        Ok(id)
    }

    /// Describe the chat's draft and mark it finished.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NoDraft`] if the chat has no draft, or
    /// [`TaskError::Store`] if the store fails.
    pub async fn finish_draft(&self, chat: ChatId, description: &str) -> Result<TaskId, TaskError> {
        let id = self.draft_id(chat).await?;
        self.store.set_task_description(id, description).await?;
        tracing::info!(chat_id = %chat, task_id = %id, "task created");
        Ok(id)
    }

    /// Delete the chat's draft, if any. Returns the number of drafts removed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the store fails.
    pub async fn discard_draft(&self, chat: ChatId) -> Result<usize, TaskError> {
        Ok(self.store.delete_draft_task(chat).await?)
    }

    /// Delete the chat's finished tasks called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the store fails.
    pub async fn delete_by_name(&self, chat: ChatId, name: &str) -> Result<DeleteOutcome, TaskError> {
        let removed = self.store.delete_task_by_name(chat, name).await?;
        if removed == 0 {
            return Ok(DeleteOutcome::NoSuchTask);
        }
        tracing::info!(chat_id = %chat, removed, "task deleted");
        Ok(DeleteOutcome::Deleted(removed))
    }

    /// The chat's finished tasks, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the store fails.
    pub async fn list(&self, chat: ChatId) -> Result<Vec<Task>, TaskError> {
        let mut tasks = self.store.list_tasks(chat).await?;
        tasks.retain(|t| !t.is_draft());
        Ok(tasks)
    }

    /// Id of the chat's draft.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NoDraft`] if the chat has no draft, or
    /// [`TaskError::Store`] if the store fails.
    pub async fn draft_id(&self, chat: ChatId) -> Result<TaskId, TaskError> {
        match self.store.get_draft_task_id(chat).await {
            Ok(id) => Ok(id),
            Err(StoreError::NotFound(_)) => Err(TaskError::NoDraft(chat)),
            Err(e) => Err(e.into()),
        }
    }
}
