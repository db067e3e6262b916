//! Loopback transport for testing.
//!
//! Uses an in-process [`tokio::sync::mpsc`] channel to simulate a chat
//! platform. Created via [`LoopbackTransport::create_pair`], which returns the
//! bot-side transport and a [`LoopbackClient`] playing the users: messages and
//! button presses injected by the client arrive at [`Transport::recv`], while
//! everything the bot sends or deletes is recorded in a shared chat log the
//! client can inspect.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use taskbot_proto::message::{
    ChatId, EventId, EventPayload, InboundEvent, Keyboard, MessageHandle, OutboundMessage,
};
use tokio::sync::{Mutex, Notify, mpsc};

use super::{Transport, TransportError, TransportType};

/// Who posted a visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    /// Sent by the bot through [`Transport::send`].
    Bot,
    /// Injected by the [`LoopbackClient`].
    User,
}

/// A message currently shown in a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleMessage {
    /// Handle assigned by the loopback platform.
    pub handle: MessageHandle,
    /// Who posted it.
    pub author: Author,
    /// Message text.
    pub text: String,
    /// Keyboard attached by the bot, if any.
    pub keyboard: Option<Keyboard>,
}

/// One successful [`Transport::send`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Target chat.
    pub chat_id: ChatId,
    /// Handle assigned to the message.
    pub handle: MessageHandle,
    /// What was sent.
    pub message: OutboundMessage,
}

#[derive(Default)]
struct LogState {
    next_handle: i64,
    next_query: u64,
    visible: HashMap<ChatId, BTreeMap<MessageHandle, VisibleMessage>>,
    sent: Vec<SentMessage>,
    delete_attempts: Vec<(ChatId, MessageHandle)>,
    failing_sends: usize,
    failing_deletes: HashSet<MessageHandle>,
}

impl LogState {
    fn allocate_handle(&mut self) -> MessageHandle {
        self.next_handle += 1;
        MessageHandle::new(self.next_handle)
    }
}

/// Chat state shared by the transport and its client.
#[derive(Default)]
struct ChatLog {
    state: parking_lot::Mutex<LogState>,
    changed: Notify,
}

/// Bot-side end of a loopback pair.
pub struct LoopbackTransport {
    /// Receiver for events injected by the client.
    rx: Mutex<mpsc::Receiver<InboundEvent>>,
    /// Shared chat log.
    log: Arc<ChatLog>,
}

/// User-side end of a loopback pair.
///
/// Dropping the client closes the event stream; the transport then returns
/// [`TransportError::ConnectionClosed`] once queued events are consumed.
pub struct LoopbackClient {
    tx: mpsc::Sender<InboundEvent>,
    log: Arc<ChatLog>,
}

impl LoopbackTransport {
    /// Create a connected transport/client pair.
    ///
    /// The `buffer` parameter controls the inbound channel capacity.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use taskbot::transport::loopback::LoopbackTransport;
    /// use taskbot::transport::Transport;
    /// use taskbot_proto::message::ChatId;
    ///
    /// # async fn example() {
    /// let (transport, client) = LoopbackTransport::create_pair(32);
    /// client.send_text(ChatId::new(1), "/start").await.unwrap();
    /// let event = transport.recv().await.unwrap();
    /// assert_eq!(event.chat_id, ChatId::new(1));
    /// # }
    /// ```
    #[must_use]
    pub fn create_pair(buffer: usize) -> (Self, LoopbackClient) {
        let (tx, rx) = mpsc::channel(buffer);
        let log = Arc::new(ChatLog::default());
        let transport = Self {
            rx: Mutex::new(rx),
            log: Arc::clone(&log),
        };
        (transport, LoopbackClient { tx, log })
    }
}

impl Transport for LoopbackTransport {
    async fn recv(&self) -> Result<InboundEvent, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    async fn send(
        &self,
        chat: ChatId,
        message: &OutboundMessage,
    ) -> Result<MessageHandle, TransportError> {
        let handle = {
            let mut state = self.log.state.lock();
            if state.failing_sends > 0 {
                state.failing_sends -= 1;
                return Err(TransportError::Http("injected send failure".into()));
            }
            let handle = state.allocate_handle();
            state.visible.entry(chat).or_default().insert(
                handle,
                VisibleMessage {
                    handle,
                    author: Author::Bot,
                    text: message.text.clone(),
                    keyboard: message.keyboard.clone(),
                },
            );
            state.sent.push(SentMessage {
                chat_id: chat,
                handle,
                message: message.clone(),
            });
            handle
        };
        self.log.changed.notify_waiters();
        Ok(handle)
    }

    async fn delete(&self, chat: ChatId, handle: MessageHandle) -> Result<(), TransportError> {
        let result = {
            let mut state = self.log.state.lock();
            state.delete_attempts.push((chat, handle));
            if state.failing_deletes.contains(&handle) {
                Err(TransportError::Http("injected delete failure".into()))
            } else if state
                .visible
                .get_mut(&chat)
                .and_then(|messages| messages.remove(&handle))
                .is_some()
            {
                Ok(())
            } else {
                Err(TransportError::Rejected(format!(
                    "message {handle} to delete not found"
                )))
            }
        };
        self.log.changed.notify_waiters();
        result
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Loopback
    }
}

impl LoopbackClient {
    /// Post a user text message into a chat.
    ///
    /// The message becomes visible and is delivered to the bot as a
    /// [`EventPayload::Text`] event.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the transport was dropped.
    pub async fn send_text(
        &self,
        chat: ChatId,
        text: impl Into<String>,
    ) -> Result<MessageHandle, TransportError> {
        let text = text.into();
        let handle = {
            let mut state = self.log.state.lock();
            let handle = state.allocate_handle();
            state.visible.entry(chat).or_default().insert(
                handle,
                VisibleMessage {
                    handle,
                    author: Author::User,
                    text: text.clone(),
                    keyboard: None,
                },
            );
            handle
        };
        self.deliver(InboundEvent::text(chat, handle, text).with_sender_name("Tester"))
            .await?;
        Ok(handle)
    }

    /// Press an inline button carrying `data`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the transport was dropped.
    pub async fn press(&self, chat: ChatId, data: impl Into<String>) -> Result<(), TransportError> {
        let query_id = {
            let mut state = self.log.state.lock();
            state.next_query += 1;
            format!("query-{}", state.next_query)
        };
        self.deliver(InboundEvent::callback(chat, query_id, data)).await
    }

    /// Post a message the bot cannot interpret (a sticker, say).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the transport was dropped.
    pub async fn send_unsupported(&self, chat: ChatId) -> Result<MessageHandle, TransportError> {
        let handle = self.log.state.lock().allocate_handle();
        self.deliver(InboundEvent {
            id: EventId::new(),
            chat_id: chat,
            sender_name: None,
            payload: EventPayload::Unsupported { handle },
        })
        .await?;
        Ok(handle)
    }

    async fn deliver(&self, event: InboundEvent) -> Result<(), TransportError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Messages currently visible in a chat, oldest first.
    #[must_use]
    pub fn visible(&self, chat: ChatId) -> Vec<VisibleMessage> {
        self.log
            .state
            .lock()
            .visible
            .get(&chat)
            .map(|messages| messages.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every message the bot sent into a chat, in send order.
    #[must_use]
    pub fn sent(&self, chat: ChatId) -> Vec<SentMessage> {
        self.log
            .state
            .lock()
            .sent
            .iter()
            .filter(|m| m.chat_id == chat)
            .cloned()
            .collect()
    }

    /// Every delete attempt in a chat, successful or not, in call order.
    #[must_use]
    pub fn delete_attempts(&self, chat: ChatId) -> Vec<MessageHandle> {
        self.log
            .state
            .lock()
            .delete_attempts
            .iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, h)| *h)
            .collect()
    }

    /// Total number of successful sends across all chats.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.log.state.lock().sent.len()
    }

    /// Make the next `count` sends fail with [`TransportError::Http`].
    pub fn fail_next_sends(&self, count: usize) {
        self.log.state.lock().failing_sends = count;
    }

    /// Make every delete of `handle` fail with [`TransportError::Http`].
    pub fn fail_delete_of(&self, handle: MessageHandle) {
        self.log.state.lock().failing_deletes.insert(handle);
    }

    /// Wait until the bot has sent at least `count` messages in total.
    pub async fn wait_for_sent(&self, count: usize) {
        loop {
            let changed = self.log.changed.notified();
            if self.sent_count() >= count {
                return;
            }
            changed.await;
        }
    }
}
