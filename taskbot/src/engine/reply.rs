//! User-visible texts and keyboards.

use taskbot_proto::action::{self, Command};
use taskbot_proto::message::{InlineButton, Keyboard, OutboundMessage};
use taskbot_proto::task::{FieldError, Task};

/// Label of the cancel button under a "Send task name" prompt during creation.
pub const CANCEL_CREATION_LABEL: &str = "Cancel task creation";
/// Label of the cancel button under a "Send task name" prompt during deletion.
pub const CANCEL_DELETION_LABEL: &str = "Cancel task deletion";
/// Label of the button under every task card.
pub const DELETE_TASK_LABEL: &str = "Delete this task";

/// Which flow a name prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePurpose {
    /// Naming a new draft.
    Create,
    /// Naming a task to delete.
    Delete,
}

/// A canned bot message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// "Hello <first name>!"
    Greeting,
    /// The reply keyboard with the top-level commands.
    Menu,
    /// "Send task name" with a cancel button.
    AskTaskName(NamePurpose),
    /// "Send task description" with a cancel button.
    AskTaskDescription,
    /// Cancel pressed with nothing in progress.
    NothingToCancel,
    /// A new action was requested mid-flow.
    FinishLastAction,
    /// The current flow was abandoned.
    Canceled,
    /// The draft was finished.
    TaskCreated,
    /// The chat has no finished tasks to list.
    NoTasks,
    /// The name sent was rejected.
    InvalidName(FieldError),
    /// The description sent was rejected.
    InvalidDescription(FieldError),
}

impl Reply {
    /// Build the outbound message; `sender` is the user's first name.
    #[must_use]
    pub fn render(&self, sender: Option<&str>) -> OutboundMessage {
        match self {
            Self::Greeting => match sender.map(str::trim).filter(|s| !s.is_empty()) {
                Some(name) => OutboundMessage::plain(format!("Hello {name}!")),
                None => OutboundMessage::plain("Hello!"),
            },
            Self::Menu => OutboundMessage::plain("Menu: ").with_keyboard(menu_keyboard()),
            Self::AskTaskName(purpose) => {
                let label = match purpose {
                    NamePurpose::Create => CANCEL_CREATION_LABEL,
                    NamePurpose::Delete => CANCEL_DELETION_LABEL,
                };
                OutboundMessage::plain("Send task name").with_keyboard(cancel_keyboard(label))
            }
            Self::AskTaskDescription => OutboundMessage::plain("Send task description")
                .with_keyboard(cancel_keyboard(CANCEL_CREATION_LABEL)),
            Self::NothingToCancel => OutboundMessage::plain("There is nothing to cancel"),
            Self::FinishLastAction => OutboundMessage::plain(format!(
                "Finish your last action or {}",
                Command::Cancel.as_text()
            )),
            Self::Canceled => OutboundMessage::plain("Last action canceled"),
            Self::TaskCreated => OutboundMessage::plain("Task created"),
            Self::NoTasks => OutboundMessage::plain("You have no tasks"),
            Self::InvalidName(e) => OutboundMessage::plain(field_message("name", *e)),
            Self::InvalidDescription(e) => {
                OutboundMessage::plain(field_message("description", *e))
            }
        }
    }
}

fn field_message(field: &str, error: FieldError) -> String {
    match error {
        FieldError::Empty => format!("Task {field} must not be empty"),
        FieldError::TooLong { max } => format!("Task {field} must be 1-{max} characters"),
    }
}

/// Reply keyboard with the top-level commands.
#[must_use]
pub fn menu_keyboard() -> Keyboard {
    Keyboard::Menu(vec![
        vec![
            Command::NewTask.as_text().to_string(),
            Command::ListTasks.as_text().to_string(),
        ],
        vec![Command::DeleteTask.as_text().to_string()],
    ])
}

fn cancel_keyboard(label: &str) -> Keyboard {
    Keyboard::Inline(vec![vec![InlineButton::new(label, Command::Cancel.name())]])
}

/// One message per finished task, with a delete button when the name fits
/// into a callback payload.
#[must_use]
pub fn task_card(task: &Task) -> OutboundMessage {
    let name = task.name.as_deref().unwrap_or_default();
    let description = task.description.as_deref().unwrap_or_default();
    let card = OutboundMessage::plain(format!(
        "Task name: {name}\nTask description: {description}"
    ));
    match action::delete_task_payload(name) {
        Some(payload) => card.with_keyboard(Keyboard::Inline(vec![vec![InlineButton::new(
            DELETE_TASK_LABEL,
            payload,
        )]])),
        None => card,
    }
}
