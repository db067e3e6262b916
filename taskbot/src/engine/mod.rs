//! Conversation engine.
//!
//! Handles one inbound event at a time for a chat:
//! 1. optionally records the user's own message for later cleanup,
//! 2. decodes the payload into an [`Input`],
//! 3. loads the chat's [`ConversationState`],
//! 4. plans a [`Transition`](transition::Transition) and executes its effects.
//!
//! Every store, ledger and transport call is bounded by the configured
//! operation timeout. The first failing effect aborts the event; effects that
//! already ran are not rolled back.

pub mod reply;
pub mod transition;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use taskbot_proto::action::{self, Input};
use taskbot_proto::message::{ChatId, EventPayload, InboundEvent, OutboundMessage};
use taskbot_proto::state::ConversationState;

use crate::ledger::{MessageLedger, Sweeper};
use crate::store::{StoreError, TaskStore};
use crate::tasks::{DeleteOutcome, TaskError, TaskFlow};
use crate::transport::{Transport, TransportError};

use reply::Reply;
use transition::Effect;

/// Default bound on a single store, ledger or transport call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that abort the handling of one event.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Sending or deleting a message failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reading or writing tasks or state failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A record the transition relies on does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An operation did not finish within the operation timeout.
    #[error("{operation} timed out")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
    },
}

impl From<TaskError> for EngineError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::NoDraft(chat) => Self::NotFound(format!("draft task of chat {chat}")),
            TaskError::Store(e) => Self::Store(e),
        }
    }
}

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bound on each store, ledger and transport call.
    pub operation_timeout: Duration,
    /// Record the user's own messages so they are swept with the prompts.
    pub sweep_user_messages: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            sweep_user_messages: true,
        }
    }
}

/// Summary of a successfully handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handled {
    /// Decoded input.
    pub input: Input,
    /// State before the event.
    pub previous: ConversationState,
    /// State after the event.
    pub state: ConversationState,
    /// Number of messages sent.
    pub sent: usize,
}

/// What is known about an event so far, for error logs.
#[derive(Default)]
struct Trace {
    input: Option<String>,
    state: Option<ConversationState>,
}

/// Per-event scratch space shared by the effects of one transition.
struct Run<'a> {
    chat: ChatId,
    sender: Option<&'a str>,
    outcome: Option<DeleteOutcome>,
    sent: usize,
}

/// The conversation engine.
///
/// Shared by all per-chat workers; callers must not handle two events of the
/// same chat concurrently.
pub struct Engine<T, S, L> {
    transport: Arc<T>,
    flow: TaskFlow<S>,
    sweeper: Sweeper<L>,
    config: EngineConfig,
}

impl<T, S, L> Engine<T, S, L>
where
    T: Transport,
    S: TaskStore,
    L: MessageLedger,
{
    /// Create an engine over the given collaborators.
    #[must_use]
    pub fn new(transport: Arc<T>, store: Arc<S>, ledger: Arc<L>, config: EngineConfig) -> Self {
        Self {
            transport,
            flow: TaskFlow::new(store),
            sweeper: Sweeper::new(ledger, config.operation_timeout),
            config,
        }
    }

    /// The transport events are sent through.
    #[must_use]
    pub const fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The task store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        self.flow.store()
    }

    /// The message ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<L> {
        self.sweeper.ledger()
    }

    /// Handle one event and log the outcome; errors are not propagated.
    pub async fn process(&self, event: InboundEvent) {
        let mut trace = Trace::default();
        match self.run(&event, &mut trace).await {
            Ok(handled) => {
                tracing::debug!(
                    chat_id = %event.chat_id,
                    event_id = %event.id,
                    input = %handled.input.label(),
                    from = %handled.previous,
                    to = %handled.state,
                    sent = handled.sent,
                    "event handled"
                );
            }
            Err(e) => {
                tracing::warn!(
                    chat_id = %event.chat_id,
                    event_id = %event.id,
                    input = trace.input.as_deref().unwrap_or("-"),
                    state = %trace.state.map_or_else(|| "-".to_string(), |s| s.to_string()),
                    error = %e,
                    "event dropped"
                );
            }
        }
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a store or transport call fails or times
    /// out. Effects executed before the failure remain in place.
    pub async fn handle(&self, event: &InboundEvent) -> Result<Handled, EngineError> {
        self.run(event, &mut Trace::default()).await
    }

    async fn run(&self, event: &InboundEvent, trace: &mut Trace) -> Result<Handled, EngineError> {
        let chat = event.chat_id;

        if self.config.sweep_user_messages {
            match &event.payload {
                EventPayload::Text { handle, .. } | EventPayload::Unsupported { handle } => {
                    self.sweeper.record(chat, *handle).await;
                }
                EventPayload::Callback { .. } => {}
            }
        }

        let input = action::decode(&event.payload);
        trace.input = Some(input.label());
        if let Input::Unrecognized(reason) = &input {
            tracing::debug!(chat_id = %chat, event_id = %event.id, %reason, "unrecognized input");
        }

        let previous = self.bounded("get_state", self.store().get_state(chat)).await?;
        trace.state = Some(previous);

        let transition = transition::plan(previous, &input);
        let mut run = Run {
            chat,
            sender: event.sender_name.as_deref(),
            outcome: None,
            sent: 0,
        };
        for effect in &transition.effects {
            self.apply(effect, &mut run).await?;
        }

        Ok(Handled {
            previous,
            state: transition.next_state(previous),
            sent: run.sent,
            input,
        })
    }

    async fn apply(&self, effect: &Effect, run: &mut Run<'_>) -> Result<(), EngineError> {
        let chat = run.chat;
        match effect {
            Effect::ClearScreen => {
                self.sweeper.drain_and_delete(chat, self.transport.as_ref()).await;
            }
            Effect::Enter(state) => {
                self.bounded("set_state", self.store().set_state(chat, *state))
                    .await?;
            }
            Effect::CreateDraft => {
                self.bounded("begin_draft", self.flow.begin_draft(chat)).await?;
            }
            Effect::NameDraft(name) => {
                self.bounded("name_draft", self.flow.name_draft(chat, name))
                    .await?;
            }
            Effect::FinishDraft(description) => {
                self.bounded("finish_draft", self.flow.finish_draft(chat, description))
                    .await?;
            }
            Effect::DiscardDraft => {
                self.bounded("discard_draft", self.flow.discard_draft(chat))
                    .await?;
            }
            Effect::DeleteTask(name) => {
                let outcome = self
                    .bounded("delete_task", self.flow.delete_by_name(chat, name))
                    .await?;
                run.outcome = Some(outcome);
            }
            Effect::RenderTasks => {
                let tasks = self.bounded("list_tasks", self.flow.list(chat)).await?;
                if tasks.is_empty() {
                    self.send(run, &Reply::NoTasks.render(None)).await?;
                }
                for task in &tasks {
                    self.send(run, &reply::task_card(task)).await?;
                }
            }
            Effect::SayOutcome => {
                if let Some(outcome) = run.outcome {
                    self.send(run, &OutboundMessage::plain(outcome.message()))
                        .await?;
                }
            }
            Effect::Say(reply) => {
                let message = reply.render(run.sender);
                self.send(run, &message).await?;
            }
        }
        Ok(())
    }

    /// Send a message and record it for the next sweep.
    async fn send(&self, run: &mut Run<'_>, message: &OutboundMessage) -> Result<(), EngineError> {
        let handle = self
            .bounded("send", self.transport.send(run.chat, message))
            .await?;
        self.sweeper.record(run.chat, handle).await;
        run.sent += 1;
        Ok(())
    }

    async fn bounded<F, R, E>(&self, operation: &'static str, fut: F) -> Result<R, EngineError>
    where
        F: Future<Output = Result<R, E>>,
        E: Into<EngineError>,
    {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(EngineError::Timeout { operation }),
        }
    }
}
