//! In-memory [`TaskStore`].

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use taskbot_proto::message::ChatId;
use taskbot_proto::state::ConversationState;
use taskbot_proto::task::{Task, TaskId, TaskStatus};

use super::{StoreError, TaskStore};

#[derive(Default)]
struct Tables {
    next_id: i64,
    states: HashMap<ChatId, ConversationState>,
    /// Ordered by id, which is creation order.
    tasks: BTreeMap<TaskId, Task>,
}

/// Process-local task store.
///
/// All data lives behind one lock; contents are lost when the process exits.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tables: Mutex<Tables>,
}

impl InMemoryTaskStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    async fn get_state(&self, chat: ChatId) -> Result<ConversationState, StoreError> {
        Ok(self
            .tables
            .lock()
            .states
            .get(&chat)
            .copied()
            .unwrap_or_default())
    }

    async fn set_state(&self, chat: ChatId, state: ConversationState) -> Result<(), StoreError> {
        self.tables.lock().states.insert(chat, state);
        Ok(())
    }

    async fn create_draft_task(&self, chat: ChatId) -> Result<TaskId, StoreError> {
        let mut tables = self.tables.lock();
        tables.next_id += 1;
        let id = TaskId::new(tables.next_id);
        tables.tasks.insert(
            id,
            Task {
                id,
                chat_id: chat,
                name: None,
                description: None,
                status: TaskStatus::Creating,
            },
        );
        Ok(id)
    }

    async fn set_task_name(&self, id: TaskId, name: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
        task.name = Some(name.to_string());
        Ok(())
    }

    async fn set_task_description(&self, id: TaskId, description: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
        task.description = Some(description.to_string());
        task.status = TaskStatus::Created;
        Ok(())
    }

    async fn get_draft_task_id(&self, chat: ChatId) -> Result<TaskId, StoreError> {
        self.tables
            .lock()
            .tasks
            .values()
            .rev()
            .find(|t| t.chat_id == chat && t.is_draft())
            .map(|t| t.id)
            .ok_or_else(|| StoreError::NotFound(format!("draft task of chat {chat}")))
    }

    async fn delete_task_by_name(&self, chat: ChatId, name: &str) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock();
        let before = tables.tasks.len();
        tables.tasks.retain(|_, t| {
            !(t.chat_id == chat && !t.is_draft() && t.name.as_deref() == Some(name))
        });
        Ok(before - tables.tasks.len())
    }

    async fn delete_draft_task(&self, chat: ChatId) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock();
        let before = tables.tasks.len();
        tables
            .tasks
            .retain(|_, t| !(t.chat_id == chat && t.is_draft()));
        Ok(before - tables.tasks.len())
    }

    async fn list_tasks(&self, chat: ChatId) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .tables
            .lock()
            .tasks
            .values()
            .filter(|t| t.chat_id == chat)
            .cloned()
            .collect())
    }
}
