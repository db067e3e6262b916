//! Task records owned by a chat.

use serde::{Deserialize, Serialize};

use crate::message::ChatId;

/// Maximum allowed task name length in characters.
pub const MAX_TASK_NAME_LENGTH: usize = 256;

/// Maximum allowed task description length in characters.
pub const MAX_TASK_DESCRIPTION_LENGTH: usize = 4096;

/// Store-assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(i64);

impl TaskId {
    /// Wraps a store row id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw row id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Draft: created by the new-task flow, name and/or description missing.
    Creating,
    /// Finished: both fields set.
    Created,
}

impl TaskStatus {
    /// Integer code used by persistent stores.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Creating => 0,
            Self::Created => 1,
        }
    }

    /// Parses a persisted status code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Creating),
            1 => Some(Self::Created),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Created => write!(f, "created"),
        }
    }
}

/// A personal task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Chat that owns the task.
    pub chat_id: ChatId,
    /// Name, `None` until the user sends it.
    pub name: Option<String>,
    /// Description, `None` until the user sends it.
    pub description: Option<String>,
    /// Draft or finished.
    pub status: TaskStatus,
}

impl Task {
    /// Returns `true` while the task is still a draft.
    #[must_use]
    pub const fn is_draft(&self) -> bool {
        matches!(self.status, TaskStatus::Creating)
    }
}

/// Why a user-supplied field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// Nothing left after trimming.
    #[error("value is empty")]
    Empty,
    /// Longer than the allowed number of characters.
    #[error("value too long (max {max} characters)")]
    TooLong {
        /// Limit in characters.
        max: usize,
    },
}

/// Trims and validates a task name.
///
/// # Errors
///
/// Returns [`FieldError`] if the trimmed name is empty or longer than
/// [`MAX_TASK_NAME_LENGTH`] characters.
pub fn normalize_name(raw: &str) -> Result<String, FieldError> {
    normalize(raw, MAX_TASK_NAME_LENGTH)
}

/// Trims and validates a task description.
///
/// # Errors
///
/// Returns [`FieldError`] if the trimmed description is empty or longer than
/// [`MAX_TASK_DESCRIPTION_LENGTH`] characters.
pub fn normalize_description(raw: &str) -> Result<String, FieldError> {
    normalize(raw, MAX_TASK_DESCRIPTION_LENGTH)
}

fn normalize(raw: &str, max: usize) -> Result<String, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError::Empty);
    }
    if trimmed.chars().count() > max {
        return Err(FieldError::TooLong { max });
    }
    Ok(trimmed.to_string())
}
