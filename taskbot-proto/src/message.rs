//! Chat-level message types exchanged with the bot platform.
//!
//! Inbound events arrive from the transport as [`InboundEvent`] values and are
//! decoded into [`crate::action::Input`] exactly once. Outbound messages are
//! described by [`OutboundMessage`] and carry an optional [`Keyboard`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Telegram's upper bound on `callback_data` length, in bytes.
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Identifies a chat; the unit of conversation state isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(i64);

impl ChatId {
    /// Wraps a platform chat identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque transport-assigned identifier of a message inside a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageHandle(i64);

impl MessageHandle {
    /// Wraps a platform message identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id assigned to every inbound event (UUID v7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new time-ordered event identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user did in the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// A plain text message (menu keyboard taps arrive this way too).
    Text {
        /// Handle of the user's own message.
        handle: MessageHandle,
        /// Message text as typed.
        text: String,
    },
    /// An inline button was pressed.
    Callback {
        /// Platform id used to acknowledge the press.
        query_id: String,
        /// The button's callback data.
        data: String,
        /// Handle of the message carrying the button, if still known.
        handle: Option<MessageHandle>,
    },
    /// A message the bot cannot interpret (sticker, photo, ...).
    Unsupported {
        /// Handle of the user's message.
        handle: MessageHandle,
    },
}

/// An event received from the bot platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Correlation id for logging.
    pub id: EventId,
    /// Chat the event belongs to.
    pub chat_id: ChatId,
    /// First name of the sender, when the platform provides it.
    pub sender_name: Option<String>,
    /// The event itself.
    pub payload: EventPayload,
}

impl InboundEvent {
    /// Builds a text event with a fresh [`EventId`].
    #[must_use]
    pub fn text(chat_id: ChatId, handle: MessageHandle, text: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            chat_id,
            sender_name: None,
            payload: EventPayload::Text {
                handle,
                text: text.into(),
            },
        }
    }

    /// Builds a button-press event with a fresh [`EventId`].
    #[must_use]
    pub fn callback(chat_id: ChatId, query_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            chat_id,
            sender_name: None,
            payload: EventPayload::Callback {
                query_id: query_id.into(),
                data: data.into(),
                handle: None,
            },
        }
    }

    /// Sets the sender's first name.
    #[must_use]
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }
}

/// A button attached below a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    /// Label shown to the user.
    pub label: String,
    /// Payload delivered back in a callback event.
    pub data: String,
}

impl InlineButton {
    /// Creates a button with the given label and callback payload.
    #[must_use]
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Keyboard markup attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Buttons rendered under the message; presses arrive as callbacks.
    Inline(Vec<Vec<InlineButton>>),
    /// Reply keyboard replacing the text input; taps arrive as text.
    Menu(Vec<Vec<String>>),
}

/// A message the bot wants to show in a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Message body.
    pub text: String,
    /// Optional keyboard markup.
    pub keyboard: Option<Keyboard>,
}

impl OutboundMessage {
    /// A message without any keyboard.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    /// Attaches keyboard markup.
    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// Returns the inline buttons of this message, if any.
    #[must_use]
    pub fn inline_buttons(&self) -> Vec<&InlineButton> {
        match &self.keyboard {
            Some(Keyboard::Inline(rows)) => rows.iter().flatten().collect(),
            _ => Vec::new(),
        }
    }
}
