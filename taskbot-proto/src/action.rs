//! Typed decoding of inbound events.
//!
//! Every [`EventPayload`] is decoded exactly once into an [`Input`]. Button
//! payloads that embed an argument (for example the task bound to a "delete
//! this task" button) become [`Input::Button`] with the argument split out, so
//! dispatch never inspects raw strings.

use crate::message::{EventPayload, MAX_CALLBACK_DATA_LEN};

/// Callback payload prefix of a "delete this task" button.
pub const DELETE_TASK_PREFIX: &str = "delete-task:";

/// Top-level commands and `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Greet and show the menu.
    Start,
    /// Begin the two-step task creation flow.
    NewTask,
    /// Show every finished task with a delete button.
    ListTasks,
    /// Ask for the name of a task to delete.
    DeleteTask,
    /// Abandon the current flow.
    Cancel,
}

impl Command {
    /// All commands.
    pub const ALL: [Self; 5] = [
        Self::Start,
        Self::NewTask,
        Self::ListTasks,
        Self::DeleteTask,
        Self::Cancel,
    ];

    /// Canonical name, also used as callback payload.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::NewTask => "new_task",
            Self::ListTasks => "list_tasks",
            Self::DeleteTask => "delete_task",
            Self::Cancel => "cancel",
        }
    }

    /// Slash form typed by users and shown on the menu keyboard.
    #[must_use]
    pub const fn as_text(self) -> &'static str {
        match self {
            Self::Start => "/start",
            Self::NewTask => "/new_task",
            Self::ListTasks => "/list_tasks",
            Self::DeleteTask => "/delete_task",
            Self::Cancel => "/cancel",
        }
    }

    /// Returns `true` for commands that start a new top-level action.
    #[must_use]
    pub const fn is_top_level(self) -> bool {
        !matches!(self, Self::Cancel)
    }

    /// Parses a bare command name.
    ///
    /// Matching is case-insensitive and accepts `_`, `-` or no separator
    /// (`new_task`, `new-task`, `newtask`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let folded: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "start" => Some(Self::Start),
            "newtask" => Some(Self::NewTask),
            "listtasks" | "listoftasks" => Some(Self::ListTasks),
            "deletetask" => Some(Self::DeleteTask),
            "cancel" | "cancellastaction" => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Parses a chat message as a slash command.
    ///
    /// A `@botname` suffix (added by clients in group chats) is ignored.
    /// Text without a leading `/` is never a command.
    #[must_use]
    pub fn from_text(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let name = rest.split('@').next().unwrap_or_default();
        if name.contains(char::is_whitespace) {
            return None;
        }
        Self::from_name(name)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A parameterized inline-button action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Delete the task with this name.
    DeleteTask(String),
}

/// Why an event could not be decoded into a command or text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Text or callback data was empty.
    #[error("empty payload")]
    EmptyPayload,
    /// Callback data matched no command and no known prefix.
    #[error("unknown callback payload: {0}")]
    UnknownCallback(String),
    /// A known prefix was present but its argument was empty.
    #[error("callback {0} is missing its argument")]
    MissingArgument(&'static str),
    /// Callback data longer than the platform allows.
    #[error("callback payload of {0} bytes exceeds the platform limit")]
    CallbackTooLong(usize),
    /// The user sent something other than text.
    #[error("unsupported message kind")]
    UnsupportedMessage,
}

/// The logical action carried by an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A recognized command, typed or pressed.
    Command(Command),
    /// Free text.
    Text(String),
    /// A button bound to an argument.
    Button(ButtonAction),
    /// Anything that failed to decode.
    Unrecognized(DecodeError),
}

impl Input {
    /// Short label for log fields.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Command(cmd) => format!("command:{cmd}"),
            Self::Text(_) => "text".to_string(),
            Self::Button(ButtonAction::DeleteTask(_)) => "button:delete-task".to_string(),
            Self::Unrecognized(_) => "unrecognized".to_string(),
        }
    }
}

/// Decodes an inbound payload into an [`Input`].
#[must_use]
pub fn decode(payload: &EventPayload) -> Input {
    match payload {
        EventPayload::Text { text, .. } => decode_text(text),
        EventPayload::Callback { data, .. } => decode_callback(data),
        EventPayload::Unsupported { .. } => Input::Unrecognized(DecodeError::UnsupportedMessage),
    }
}

/// Decodes the text of a chat message.
#[must_use]
pub fn decode_text(text: &str) -> Input {
    if text.trim().is_empty() {
        return Input::Unrecognized(DecodeError::EmptyPayload);
    }
    Command::from_text(text).map_or_else(|| Input::Text(text.to_string()), Input::Command)
}

/// Decodes inline-button callback data.
#[must_use]
pub fn decode_callback(data: &str) -> Input {
    if data.is_empty() {
        return Input::Unrecognized(DecodeError::EmptyPayload);
    }
    if data.len() > MAX_CALLBACK_DATA_LEN {
        return Input::Unrecognized(DecodeError::CallbackTooLong(data.len()));
    }
    if let Some(name) = data.strip_prefix(DELETE_TASK_PREFIX) {
        if name.trim().is_empty() {
            return Input::Unrecognized(DecodeError::MissingArgument("delete-task"));
        }
        return Input::Button(ButtonAction::DeleteTask(name.to_string()));
    }
    let bare = data.strip_prefix('/').unwrap_or(data);
    Command::from_name(bare).map_or_else(
        || Input::Unrecognized(DecodeError::UnknownCallback(data.to_string())),
        Input::Command,
    )
}

/// Builds the callback payload of a "delete this task" button.
///
/// Returns `None` when the payload would exceed the platform's
/// [`MAX_CALLBACK_DATA_LEN`]; such tasks are listed without a button.
#[must_use]
pub fn delete_task_payload(name: &str) -> Option<String> {
    let payload = format!("{DELETE_TASK_PREFIX}{name}");
    (payload.len() <= MAX_CALLBACK_DATA_LEN).then_some(payload)
}
