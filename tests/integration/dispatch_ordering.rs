//! Integration tests for the per-chat dispatcher.
//!
//! Feeds interleaved events of several chats through a loopback transport and
//! checks that chats do not interfere and each chat keeps its arrival order.
//! A chat whose handling stalls must not hold up intake for other chats.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use taskbot::dispatch::{DispatchConfig, Dispatcher};
use taskbot::engine::{Engine, EngineConfig};
use taskbot::ledger::memory::InMemoryLedger;
use taskbot::store::memory::InMemoryTaskStore;
use taskbot::store::{StoreError, TaskStore};
use taskbot::transport::loopback::{LoopbackClient, LoopbackTransport};
use taskbot_proto::message::ChatId;
use taskbot_proto::state::ConversationState;
use taskbot_proto::task::{Task, TaskId};
use tokio::sync::oneshot;

type TestEngine = Engine<LoopbackTransport, InMemoryTaskStore, InMemoryLedger>;

/// Messages the bot sends for one `/new_task` + name + description cycle.
const SENDS_PER_TASK: usize = 4;

const WAIT: Duration = Duration::from_secs(10);

struct Running {
    engine: Arc<TestEngine>,
    client: LoopbackClient,
    stop: oneshot::Sender<()>,
    dispatcher: tokio::task::JoinHandle<()>,
}

fn start(config: DispatchConfig) -> Running {
    let (transport, client) = LoopbackTransport::create_pair(256);
    let engine = Arc::new(Engine::new(
        Arc::new(transport),
        Arc::new(InMemoryTaskStore::new()),
        Arc::new(InMemoryLedger::new()),
        EngineConfig::default(),
    ));
    let (stop, stopped) = oneshot::channel::<()>();
    let dispatcher = tokio::spawn(Dispatcher::new(Arc::clone(&engine), config).run(async {
        let _ = stopped.await;
    }));
    Running {
        engine,
        client,
        stop,
        dispatcher,
    }
}

impl Running {
    async fn wait_for_sent(&self, count: usize) {
        tokio::time::timeout(WAIT, self.client.wait_for_sent(count))
            .await
            .expect("bot did not send the expected messages in time");
    }

    async fn stop(self) -> (Arc<TestEngine>, LoopbackClient) {
        self.stop.send(()).unwrap();
        self.dispatcher.await.unwrap();
        (self.engine, self.client)
    }
}

async fn task_names(engine: &TestEngine, chat: ChatId) -> Vec<String> {
    engine
        .store()
        .list_tasks(chat)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|t| t.name)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_chats_do_not_interfere() {
    let running = start(DispatchConfig::default());
    let alice = ChatId::new(1);
    let bob = ChatId::new(2);

    for (a, b) in [
        ("/new_task", "/new_task"),
        ("Buy milk", "Walk dog"),
        ("skim", "twice"),
    ] {
        running.client.send_text(alice, a).await.unwrap();
        running.client.send_text(bob, b).await.unwrap();
    }

    running.wait_for_sent(2 * SENDS_PER_TASK).await;
    let (engine, _client) = running.stop().await;

    assert_eq!(task_names(&engine, alice).await, vec!["Buy milk"]);
    assert_eq!(task_names(&engine, bob).await, vec!["Walk dog"]);
    for chat in [alice, bob] {
        assert_eq!(
            engine.store().get_state(chat).await.unwrap(),
            ConversationState::Default
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_chat_order_is_preserved() {
    let running = start(DispatchConfig::default());
    let chat = ChatId::new(42);
    let names: Vec<_> = (0..10).map(|i| format!("task-{i}")).collect();

    for name in &names {
        running.client.send_text(chat, "/new_task").await.unwrap();
        running.client.send_text(chat, name).await.unwrap();
        running.client.send_text(chat, "details").await.unwrap();
    }

    running.wait_for_sent(names.len() * SENDS_PER_TASK).await;
    let (engine, _client) = running.stop().await;

    assert_eq!(task_names(&engine, chat).await, names);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_chats_each_get_their_own_conversation() {
    let running = start(DispatchConfig::default());
    let chats: Vec<_> = (100..120).map(ChatId::new).collect();

    for step in ["/new_task", "name", "description"] {
        for chat in &chats {
            let text = if step == "name" {
                format!("task of {chat}")
            } else {
                step.to_string()
            };
            running.client.send_text(*chat, text).await.unwrap();
        }
    }

    running.wait_for_sent(chats.len() * SENDS_PER_TASK).await;
    let (engine, client) = running.stop().await;

    for chat in &chats {
        assert_eq!(
            task_names(&engine, *chat).await,
            vec![format!("task of {chat}")]
        );
        let visible: Vec<_> = client.visible(*chat).into_iter().map(|m| m.text).collect();
        assert_eq!(visible, vec!["Task created", "Menu: "]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recycled_worker_keeps_conversation() {
    let running = start(DispatchConfig {
        worker_buffer: 4,
        worker_idle: Duration::from_millis(20),
    });
    let chat = ChatId::new(9);

    running.client.send_text(chat, "/new_task").await.unwrap();
    running.wait_for_sent(1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    running.client.send_text(chat, "Buy milk").await.unwrap();
    running.client.send_text(chat, "skim").await.unwrap();
    running.wait_for_sent(SENDS_PER_TASK).await;
    let (engine, _client) = running.stop().await;

    assert_eq!(task_names(&engine, chat).await, vec!["Buy milk"]);
}

#[tokio::test]
async fn shutdown_drains_queued_events() {
    let running = start(DispatchConfig::default());
    let chat = ChatId::new(3);

    running.client.send_text(chat, "/start").await.unwrap();
    running.wait_for_sent(2).await;
    let (engine, client) = running.stop().await;

    assert_eq!(client.sent_count(), 2);
    assert_eq!(
        engine.store().get_state(chat).await.unwrap(),
        ConversationState::Default
    );
}

/// Store that stalls every state read of one chat.
struct StallingStore {
    inner: InMemoryTaskStore,
    slow_chat: ChatId,
    delay: Duration,
}

impl TaskStore for StallingStore {
    async fn get_state(&self, chat: ChatId) -> Result<ConversationState, StoreError> {
        if chat == self.slow_chat {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.get_state(chat).await
    }

    async fn set_state(&self, chat: ChatId, state: ConversationState) -> Result<(), StoreError> {
        self.inner.set_state(chat, state).await
    }

    async fn create_draft_task(&self, chat: ChatId) -> Result<TaskId, StoreError> {
        self.inner.create_draft_task(chat).await
    }

    async fn set_task_name(&self, id: TaskId, name: &str) -> Result<(), StoreError> {
        self.inner.set_task_name(id, name).await
    }

    async fn set_task_description(&self, id: TaskId, description: &str) -> Result<(), StoreError> {
        self.inner.set_task_description(id, description).await
    }

    async fn get_draft_task_id(&self, chat: ChatId) -> Result<TaskId, StoreError> {
        self.inner.get_draft_task_id(chat).await
    }

    async fn delete_task_by_name(&self, chat: ChatId, name: &str) -> Result<usize, StoreError> {
        self.inner.delete_task_by_name(chat, name).await
    }

    async fn delete_draft_task(&self, chat: ChatId) -> Result<usize, StoreError> {
        self.inner.delete_draft_task(chat).await
    }

    async fn list_tasks(&self, chat: ChatId) -> Result<Vec<Task>, StoreError> {
        self.inner.list_tasks(chat).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_chat_does_not_block_other_chats() {
    let slow = ChatId::new(1);
    let fast = ChatId::new(2);
    let (transport, client) = LoopbackTransport::create_pair(64);
    let engine = Arc::new(Engine::new(
        Arc::new(transport),
        Arc::new(StallingStore {
            inner: InMemoryTaskStore::new(),
            slow_chat: slow,
            delay: Duration::from_millis(800),
        }),
        Arc::new(InMemoryLedger::new()),
        EngineConfig::default(),
    ));

    // More events than the slow chat's queue can hold, then one for another chat.
    for _ in 0..4 {
        client.send_text(slow, "/list_tasks").await.unwrap();
    }
    client.send_text(fast, "/start").await.unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let dispatcher = tokio::spawn(
        Dispatcher::new(
            Arc::clone(&engine),
            DispatchConfig {
                worker_buffer: 1,
                ..DispatchConfig::default()
            },
        )
        .run(async {
            let _ = stopped.await;
        }),
    );

    let answered = tokio::time::timeout(Duration::from_millis(500), async {
        while client.sent(fast).is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(answered.is_ok(), "fast chat waited on the stalled chat");

    stop.send(()).unwrap();
    dispatcher.await.unwrap();
    assert_eq!(
        engine.store().get_state(fast).await.unwrap(),
        ConversationState::Default
    );
}
