//! Telegram Bot API transport.
//!
//! Long-polls `getUpdates` with offset tracking and converts each update into
//! an [`InboundEvent`]. Updates arrive in batches; the batch is buffered and
//! handed out one event per [`Transport::recv`] call. Button presses are
//! acknowledged with `answerCallbackQuery` on a best-effort basis so the
//! client stops showing its progress spinner.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use taskbot_proto::message::{
    ChatId, EventId, EventPayload, InboundEvent, Keyboard, MessageHandle, OutboundMessage,
};
use tokio::sync::Mutex;

use super::{Transport, TransportError, TransportType};

/// Placeholder shown in the input field while the menu keyboard is open.
pub const MENU_PLACEHOLDER: &str = "Select something";

/// Connection settings for [`TelegramTransport`].
#[derive(Debug, Clone)]
pub struct TelegramOptions {
    /// Bot token issued by `@BotFather`.
    pub token: String,
    /// API root, `https://api.telegram.org` unless a local Bot API server is used.
    pub api_base_url: String,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout: Duration,
    /// Per-request HTTP timeout; must exceed `poll_timeout`.
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramGetMeResult {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramSendMessageResult {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TelegramCallbackQuery {
    id: String,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    chat: TelegramChat,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    #[serde(default)]
    first_name: Option<String>,
}

/// Events already fetched but not yet handed out, plus the next update offset.
#[derive(Default)]
struct Inbox {
    offset: i64,
    pending: VecDeque<InboundEvent>,
}

/// Telegram Bot API transport over HTTPS.
pub struct TelegramTransport {
    http: reqwest::Client,
    api_base: String,
    token: String,
    poll_timeout: Duration,
    inbox: Mutex<Inbox>,
}

impl TelegramTransport {
    /// Build a transport from the given options.
    ///
    /// No request is made; call [`get_me`](Self::get_me) to verify the token.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the HTTP client cannot be built.
    pub fn new(options: TelegramOptions) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            api_base: options.api_base_url.trim_end_matches('/').to_string(),
            token: options.token,
            poll_timeout: options.poll_timeout,
            inbox: Mutex::new(Inbox::default()),
        })
    }

    /// Fetch the bot's username with `getMe`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the token is rejected or the request fails.
    pub async fn get_me(&self) -> Result<String, TransportError> {
        let me: TelegramGetMeResult = self.call("getMe", &serde_json::json!({})).await?;
        me.username
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| TransportError::Decode("telegram bot username is missing".into()))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let url = format!("{}/bot{}/{method}", self.api_base, self.token);
        let res = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_request_error(method, &e))?;
        let status = res.status();
        let parsed = res
            .json::<TelegramApiResponse<T>>()
            .await
            .map_err(|e| TransportError::Decode(format!("telegram {method} response: {e}")))?;
        if !parsed.ok {
            return Err(TransportError::Api {
                code: parsed
                    .error_code
                    .unwrap_or_else(|| i64::from(status.as_u16())),
                description: parsed
                    .description
                    .unwrap_or_else(|| format!("telegram {method} failed")),
            });
        }
        parsed
            .result
            .ok_or_else(|| TransportError::Decode(format!("telegram {method} returned no result")))
    }

    async fn poll_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>, TransportError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body).await
    }

    async fn answer_callback_query(&self, query_id: &str) {
        let body = serde_json::json!({ "callback_query_id": query_id });
        if let Err(e) = self.call::<bool>("answerCallbackQuery", &body).await {
            tracing::debug!(query_id, error = %e, "answerCallbackQuery failed");
        }
    }
}

impl Transport for TelegramTransport {
    async fn recv(&self) -> Result<InboundEvent, TransportError> {
        let mut inbox = self.inbox.lock().await;
        loop {
            if let Some(event) = inbox.pending.pop_front() {
                return Ok(event);
            }
            let updates = self.poll_updates(inbox.offset).await?;
            for update in updates {
                inbox.offset = inbox.offset.max(update.update_id.saturating_add(1));
                let update_id = update.update_id;
                match into_event(update) {
                    Some((event, query_id)) => {
                        if let Some(query_id) = query_id {
                            self.answer_callback_query(&query_id).await;
                        }
                        inbox.pending.push_back(event);
                    }
                    None => tracing::debug!(update_id, "ignoring update without a chat"),
                }
            }
        }
    }

    async fn send(
        &self,
        chat: ChatId,
        message: &OutboundMessage,
    ) -> Result<MessageHandle, TransportError> {
        let body = send_message_body(chat, message);
        let sent: TelegramSendMessageResult = self.call("sendMessage", &body).await?;
        Ok(MessageHandle::new(sent.message_id))
    }

    async fn delete(&self, chat: ChatId, handle: MessageHandle) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "chat_id": chat.get(),
            "message_id": handle.get(),
        });
        let deleted: bool = self.call("deleteMessage", &body).await?;
        if deleted {
            Ok(())
        } else {
            Err(TransportError::Rejected(format!(
                "deleteMessage returned false for {handle}"
            )))
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Telegram
    }
}

fn map_request_error(method: &str, e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(format!("telegram {method}: {e}"))
    }
}

/// Converts an update into an event, plus the callback query id to acknowledge.
fn into_event(update: TelegramUpdate) -> Option<(InboundEvent, Option<String>)> {
    if let Some(query) = update.callback_query {
        let message = query.message?;
        let event = InboundEvent {
            id: EventId::new(),
            chat_id: ChatId::new(message.chat.id),
            sender_name: query.from.and_then(|u| u.first_name),
            payload: EventPayload::Callback {
                query_id: query.id.clone(),
                data: query.data.unwrap_or_default(),
                handle: Some(MessageHandle::new(message.message_id)),
            },
        };
        return Some((event, Some(query.id)));
    }

    let message = update.message?;
    let handle = MessageHandle::new(message.message_id);
    let payload = match message.text {
        Some(text) => EventPayload::Text { handle, text },
        None => EventPayload::Unsupported { handle },
    };
    let event = InboundEvent {
        id: EventId::new(),
        chat_id: ChatId::new(message.chat.id),
        sender_name: message.from.and_then(|u| u.first_name),
        payload,
    };
    Some((event, None))
}

fn send_message_body(chat: ChatId, message: &OutboundMessage) -> serde_json::Value {
    let mut body = serde_json::json!({
        "chat_id": chat.get(),
        "text": message.text,
        "disable_web_page_preview": true,
    });
    if let Some(keyboard) = &message.keyboard {
        body["reply_markup"] = reply_markup(keyboard);
    }
    body
}

fn reply_markup(keyboard: &Keyboard) -> serde_json::Value {
    match keyboard {
        Keyboard::Inline(rows) => {
            let inline_keyboard = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| {
                            serde_json::json!({
                                "text": b.label,
                                "callback_data": b.data,
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();
            serde_json::json!({ "inline_keyboard": inline_keyboard })
        }
        Keyboard::Menu(rows) => serde_json::json!({
            "keyboard": rows,
            "resize_keyboard": true,
            "one_time_keyboard": true,
            "input_field_placeholder": MENU_PLACEHOLDER,
        }),
    }
}
