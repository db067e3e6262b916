//! Transport layer abstraction for taskbot.
//!
//! Defines the [`Transport`] trait every chat platform adapter must satisfy.
//! Concrete implementations:
//! - [`loopback::LoopbackTransport`] — in-process transport for testing
//! - [`telegram::TelegramTransport`] — Telegram Bot API over HTTPS

pub mod loopback;
pub mod telegram;

use std::fmt;

use taskbot_proto::message::{ChatId, InboundEvent, MessageHandle, OutboundMessage};

/// Describes which kind of transport is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// Telegram Bot API (long polling).
    Telegram,
    /// In-process loopback for testing.
    Loopback,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telegram => write!(f, "Telegram"),
            Self::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The event stream has ended; no further events will arrive.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The HTTP request itself failed.
    #[error("http request failed: {0}")]
    Http(String),

    /// The platform answered with an error.
    #[error("platform error {code}: {description}")]
    Api {
        /// Platform error code (HTTP status for Telegram).
        code: i64,
        /// Human-readable error returned by the platform.
        description: String,
    },

    /// A platform response could not be parsed.
    #[error("malformed platform response: {0}")]
    Decode(String),

    /// The platform refused the request (for example deleting a message
    /// that no longer exists).
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Async transport trait for exchanging chat messages with a bot platform.
///
/// `recv` has a single consumer (the dispatcher); `send` and `delete` are
/// called concurrently from per-chat workers.
pub trait Transport: Send + Sync {
    /// Receive the next inbound event from any chat.
    ///
    /// Blocks asynchronously until an event arrives. Returns
    /// [`TransportError::ConnectionClosed`] once the stream has ended.
    fn recv(&self) -> impl std::future::Future<Output = Result<InboundEvent, TransportError>> + Send;

    /// Post a message into a chat and return its handle.
    fn send(
        &self,
        chat: ChatId,
        message: &OutboundMessage,
    ) -> impl std::future::Future<Output = Result<MessageHandle, TransportError>> + Send;

    /// Delete a previously posted message.
    fn delete(
        &self,
        chat: ChatId,
        handle: MessageHandle,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Return the type of this transport.
    fn transport_type(&self) -> TransportType;
}
