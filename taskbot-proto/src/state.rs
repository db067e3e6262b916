//! Per-chat conversation state.

use serde::{Deserialize, Serialize};

/// Where in the conversation a chat currently is.
///
/// Exactly one value is active per chat. A chat with no stored state is in
/// [`ConversationState::Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConversationState {
    /// Idle; top-level commands are accepted.
    #[default]
    Default,
    /// A draft task exists and the bot waits for its name.
    AwaitingTaskName,
    /// The draft has a name; the bot waits for its description.
    AwaitingTaskDescription,
    /// The bot waits for the name of a task to delete.
    AwaitingDeletionTarget,
}

impl ConversationState {
    /// All states, in code order.
    pub const ALL: [Self; 4] = [
        Self::Default,
        Self::AwaitingTaskName,
        Self::AwaitingTaskDescription,
        Self::AwaitingDeletionTarget,
    ];

    /// Integer code used by persistent stores.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Default => 0,
            Self::AwaitingTaskName => 1,
            Self::AwaitingTaskDescription => 2,
            Self::AwaitingDeletionTarget => 3,
        }
    }

    /// Parses a persisted state code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Default),
            1 => Some(Self::AwaitingTaskName),
            2 => Some(Self::AwaitingTaskDescription),
            3 => Some(Self::AwaitingDeletionTarget),
            _ => None,
        }
    }

    /// Returns `true` while a draft task belongs to the chat.
    #[must_use]
    pub const fn is_creating(self) -> bool {
        matches!(
            self,
            Self::AwaitingTaskName | Self::AwaitingTaskDescription
        )
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::AwaitingTaskName => write!(f, "awaiting_task_name"),
            Self::AwaitingTaskDescription => write!(f, "awaiting_task_description"),
            Self::AwaitingDeletionTarget => write!(f, "awaiting_deletion_target"),
        }
    }
}
