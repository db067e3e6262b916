//! Per-chat event dispatcher.
//!
//! Reads the transport's single inbound stream and fans it out to one worker
//! task per chat:
//!
//! ```text
//! Transport::recv ──► Dispatcher ──► mpsc ──► worker(chat 1) ──► Engine
//!                                └─► mpsc ──► worker(chat 2) ──► Engine
//! ```
//!
//! A chat's events are handled strictly in arrival order; different chats run
//! in parallel. Intake never waits on a single chat: a chat whose queue is
//! full loses the overflowing event. Idle workers exit and are respawned on
//! the next event.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use taskbot_proto::message::{ChatId, InboundEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::Engine;
use crate::ledger::MessageLedger;
use crate::store::TaskStore;
use crate::transport::{Transport, TransportError};

/// Default per-chat queue capacity; events beyond it are dropped.
pub const DEFAULT_WORKER_BUFFER: usize = 64;

/// Default time a worker waits for its next event before exiting.
pub const DEFAULT_WORKER_IDLE: Duration = Duration::from_secs(300);

/// Pause after a failed receive before polling again.
const RECV_BACKOFF: Duration = Duration::from_secs(1);

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Capacity of each chat's queue.
    pub worker_buffer: usize,
    /// Idle time after which a worker exits.
    pub worker_idle: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_buffer: DEFAULT_WORKER_BUFFER,
            worker_idle: DEFAULT_WORKER_IDLE,
        }
    }
}

struct Worker {
    tx: mpsc::Sender<InboundEvent>,
    handle: JoinHandle<()>,
}

/// Routes inbound events to per-chat workers.
pub struct Dispatcher<T, S, L> {
    engine: Arc<Engine<T, S, L>>,
    config: DispatchConfig,
    workers: HashMap<ChatId, Worker>,
}

impl<T, S, L> Dispatcher<T, S, L>
where
    T: Transport + 'static,
    S: TaskStore + 'static,
    L: MessageLedger + 'static,
{
    /// Create a dispatcher feeding `engine`.
    #[must_use]
    pub fn new(engine: Arc<Engine<T, S, L>>, config: DispatchConfig) -> Self {
        Self {
            engine,
            config,
            workers: HashMap::new(),
        }
    }

    /// Number of chats with a live worker.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.workers
            .values()
            .filter(|w| !w.handle.is_finished())
            .count()
    }

    /// Receive and dispatch events until the transport closes or `shutdown`
    /// resolves, then wait for every worker to finish its queue.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let transport = Arc::clone(self.engine.transport());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, stopping intake");
                    break;
                }
                received = transport.recv() => match received {
                    Ok(event) => self.dispatch(event),
                    Err(TransportError::ConnectionClosed) => {
                        tracing::info!(transport = %transport.transport_type(), "transport closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "receive failed, backing off");
                        tokio::time::sleep(RECV_BACKOFF).await;
                    }
                },
            }
        }

        self.shutdown().await;
    }

    /// Hand one event to its chat's worker, spawning the worker if needed.
    ///
    /// Never waits on a chat's queue. An event arriving while its chat already
    /// has `worker_buffer` events queued is dropped.
    pub fn dispatch(&mut self, event: InboundEvent) {
        let chat = event.chat_id;

        let event = match self.workers.get(&chat) {
            Some(worker) => match worker.tx.try_send(event) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(event)) => {
                    tracing::warn!(
                        chat_id = %chat,
                        event_id = %event.id,
                        backlog = self.config.worker_buffer,
                        "chat queue full, dropping event"
                    );
                    return;
                }
                // Worker went idle and closed its queue.
                Err(mpsc::error::TrySendError::Closed(event)) => event,
            },
            None => event,
        };

        let previous = self.workers.remove(&chat).map(|w| w.handle);
        self.workers.retain(|_, w| !w.handle.is_finished());

        let (tx, rx) = mpsc::channel(self.config.worker_buffer.max(1));
        let handle = tokio::spawn(run_worker(
            Arc::clone(&self.engine),
            chat,
            rx,
            self.config.worker_idle,
            previous,
        ));
        if tx.try_send(event).is_err() {
            tracing::warn!(chat_id = %chat, "worker exited before its first event");
        }
        tracing::debug!(chat_id = %chat, "worker spawned");
        self.workers.insert(chat, Worker { tx, handle });
    }

    /// Close every queue and wait for the workers to drain them.
    pub async fn shutdown(self) {
        let count = self.workers.len();
        let handles = self.workers.into_values().map(|w| {
            drop(w.tx);
            w.handle
        });
        for result in futures_util::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "worker task failed");
            }
        }
        tracing::info!(workers = count, "dispatcher stopped");
    }
}

async fn run_worker<T, S, L>(
    engine: Arc<Engine<T, S, L>>,
    chat: ChatId,
    mut rx: mpsc::Receiver<InboundEvent>,
    idle: Duration,
    previous: Option<JoinHandle<()>>,
) where
    T: Transport,
    S: TaskStore,
    L: MessageLedger,
{
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            tracing::error!(chat_id = %chat, error = %e, "previous worker failed");
        }
    }

    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => engine.process(event).await,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    engine.process(event).await;
                }
                tracing::debug!(chat_id = %chat, "worker idle, exiting");
                break;
            }
        }
    }
}
