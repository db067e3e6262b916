//! Integration tests for the conversation engine.
//!
//! Drives whole conversations through a `LoopbackTransport` pair and checks
//! the resulting conversation state, tasks and visible chat.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::future_not_send)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use taskbot::engine::{Engine, EngineConfig, EngineError, Handled};
use taskbot::ledger::memory::InMemoryLedger;
use taskbot::store::memory::InMemoryTaskStore;
use taskbot::store::{StoreError, TaskStore};
use taskbot::transport::Transport;
use taskbot::transport::loopback::{LoopbackClient, LoopbackTransport};
use taskbot_proto::message::ChatId;
use taskbot_proto::state::ConversationState;
use taskbot_proto::task::{Task, TaskId, TaskStatus};

const CHAT: ChatId = ChatId::new(1001);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness<S: TaskStore> {
    engine: Engine<LoopbackTransport, S, InMemoryLedger>,
    client: LoopbackClient,
}

impl Harness<InMemoryTaskStore> {
    fn new() -> Self {
        Self::with_store(InMemoryTaskStore::new())
    }
}

impl<S: TaskStore> Harness<S> {
    fn with_store(store: S) -> Self {
        let (transport, client) = LoopbackTransport::create_pair(32);
        let engine = Engine::new(
            Arc::new(transport),
            Arc::new(store),
            Arc::new(InMemoryLedger::new()),
            EngineConfig::default(),
        );
        Self { engine, client }
    }

    async fn say_in(&self, chat: ChatId, text: &str) -> Result<Handled, EngineError> {
        self.client.send_text(chat, text).await.unwrap();
        let event = self.engine.transport().recv().await.unwrap();
        self.engine.handle(&event).await
    }

    async fn say(&self, text: &str) -> Handled {
        self.say_in(CHAT, text).await.unwrap()
    }

    async fn press(&self, data: &str) -> Handled {
        self.client.press(CHAT, data).await.unwrap();
        let event = self.engine.transport().recv().await.unwrap();
        self.engine.handle(&event).await.unwrap()
    }

    async fn state(&self) -> ConversationState {
        self.engine.store().get_state(CHAT).await.unwrap()
    }

    async fn tasks(&self) -> Vec<Task> {
        self.engine.store().list_tasks(CHAT).await.unwrap()
    }

    async fn create(&self, name: &str, description: &str) {
        self.say("/new_task").await;
        self.say(name).await;
        self.say(description).await;
    }

    fn visible_texts(&self) -> Vec<String> {
        self.client
            .visible(CHAT)
            .into_iter()
            .map(|m| m.text)
            .collect()
    }

    fn sent_texts(&self) -> Vec<String> {
        self.client
            .sent(CHAT)
            .into_iter()
            .map(|m| m.message.text)
            .collect()
    }
}

/// Store whose name writes can be made to fail.
struct FlakyStore {
    inner: InMemoryTaskStore,
    fail_names: AtomicBool,
}

impl TaskStore for FlakyStore {
    async fn get_state(&self, chat: ChatId) -> Result<ConversationState, StoreError> {
        self.inner.get_state(chat).await
    }

    async fn set_state(&self, chat: ChatId, state: ConversationState) -> Result<(), StoreError> {
        self.inner.set_state(chat, state).await
    }

    async fn create_draft_task(&self, chat: ChatId) -> Result<TaskId, StoreError> {
        self.inner.create_draft_task(chat).await
    }

    async fn set_task_name(&self, id: TaskId, name: &str) -> Result<(), StoreError> {
        if self.fail_names.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".into()));
        }
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

// ---------------------------------------------------------------------------
// Task creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_task_flow_creates_one_finished_task() {
    let h = Harness::new();

    assert_eq!(h.say("/new_task").await.state, ConversationState::AwaitingTaskName);
    assert_eq!(
        h.say("Buy milk").await.state,
        ConversationState::AwaitingTaskDescription
    );
    assert_eq!(h.say("2 liters, skim").await.state, ConversationState::Default);

    let tasks = h.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].name.as_deref(), Some("Buy milk"));
    assert_eq!(tasks[0].description.as_deref(), Some("2 liters, skim"));
    assert_eq!(tasks[0].status, TaskStatus::Created);
    assert_eq!(h.state().await, ConversationState::Default);

    // Only the final confirmation and the menu stay on screen.
    assert_eq!(h.visible_texts(), vec!["Task created", "Menu: "]);
}

#[tokio::test]
async fn names_and_descriptions_are_trimmed() {
    let h = Harness::new();
    h.create("  Buy milk  ", "\tskim\n").await;

    let tasks = h.tasks().await;
    assert_eq!(tasks[0].name.as_deref(), Some("Buy milk"));
    assert_eq!(tasks[0].description.as_deref(), Some("skim"));
}

#[tokio::test]
async fn overlong_name_is_refused_and_state_kept() {
    let h = Harness::new();
    h.say("/new_task").await;

    let handled = h.say(&"x".repeat(257)).await;

    assert_eq!(handled.state, ConversationState::AwaitingTaskName);
    assert_eq!(
        h.sent_texts().last().map(String::as_str),
        Some("Task name must be 1-256 characters")
    );

    // A valid name afterwards continues the same draft.
    h.say("Buy milk").await;
    h.say("skim").await;
    assert_eq!(h.tasks().await.len(), 1);
}

#[tokio::test]
async fn restarting_creation_leaves_single_draft() {
    let h = Harness::new();
    h.say("/new_task").await;
    h.engine
        .store()
        .set_state(CHAT, ConversationState::Default)
        .await
        .unwrap();
    h.say("/new_task").await;

    let drafts = h.tasks().await.into_iter().filter(Task::is_draft).count();
    assert_eq!(drafts, 1);
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_while_naming_deletes_draft() {
    let h = Harness::new();
    h.say("/new_task").await;

    let handled = h.say("/cancel").await;

    assert_eq!(handled.state, ConversationState::Default);
    assert!(h.tasks().await.is_empty());
    assert_eq!(h.visible_texts(), vec!["Last action canceled", "Menu: "]);
}

#[tokio::test]
async fn cancel_button_while_describing_deletes_draft() {
    let h = Harness::new();
    h.say("/new_task").await;
    h.say("Buy milk").await;

    let handled = h.press("cancel").await;

    assert_eq!(handled.state, ConversationState::Default);
    assert!(h.tasks().await.is_empty());
}

#[tokio::test]
async fn cancel_while_deleting_leaves_only_confirmation() {
    let h = Harness::new();
    h.say("/delete_task").await;

    let handled = h.say("/cancel").await;

    assert_eq!(handled.state, ConversationState::Default);
    assert_eq!(h.visible_texts(), vec!["Last action canceled"]);
}

#[tokio::test]
async fn cancel_with_nothing_in_progress() {
    let h = Harness::new();
    let handled = h.say("/cancel").await;

    assert_eq!(handled.state, ConversationState::Default);
    assert_eq!(h.sent_texts(), vec!["There is nothing to cancel"]);
}

// ---------------------------------------------------------------------------
// Interrupted flows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_while_naming_is_refused() {
    let h = Harness::new();
    h.say("/new_task").await;

    let handled = h.say("/list_tasks").await;

    assert_eq!(handled.state, ConversationState::AwaitingTaskName);
    assert_eq!(h.state().await, ConversationState::AwaitingTaskName);
    assert_eq!(
        h.sent_texts().last().map(String::as_str),
        Some("Finish your last action or /cancel")
    );
    // The draft is still there to be named.
    assert_eq!(h.tasks().await.len(), 1);
}

#[tokio::test]
async fn stickers_mid_flow_are_ignored() {
    let h = Harness::new();
    h.say("/new_task").await;
    let sent_before = h.client.sent_count();

    h.client.send_unsupported(CHAT).await.unwrap();
    let event = h.engine.transport().recv().await.unwrap();
    let handled = h.engine.handle(&event).await.unwrap();

    assert_eq!(handled.state, ConversationState::AwaitingTaskName);
    assert_eq!(handled.sent, 0);
    assert_eq!(h.client.sent_count(), sent_before);
}

#[tokio::test]
async fn free_text_in_default_shows_menu() {
    let h = Harness::new();
    let handled = h.say("hello?").await;

    assert_eq!(handled.state, ConversationState::Default);
    assert_eq!(h.sent_texts(), vec!["Menu: "]);
}

// ---------------------------------------------------------------------------
// Listing and deleting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_renders_one_card_per_task() {
    let h = Harness::new();
    h.create("Buy milk", "skim").await;
    h.create("Walk dog", "twice").await;

    h.say("/list_tasks").await;

    assert_eq!(
        h.visible_texts(),
        vec![
            "Task name: Buy milk\nTask description: skim",
            "Task name: Walk dog\nTask description: twice",
            "Menu: ",
        ]
    );
}

#[tokio::test]
async fn delete_button_removes_exactly_that_task() {
    let h = Harness::new();
    h.create("Buy milk", "skim").await;
    h.create("Walk dog", "twice").await;
    h.say("/list_tasks").await;

    let card = h
        .client
        .visible(CHAT)
        .into_iter()
        .find(|m| m.text.contains("Buy milk"))
        .expect("card for Buy milk");
    let data = match card.keyboard {
        Some(taskbot_proto::message::Keyboard::Inline(rows)) => rows[0][0].data.clone(),
        other => panic!("card without inline keyboard: {other:?}"),
    };
    let sent_before = h.client.sent_count();

    let handled = h.press(&data).await;

    assert_eq!(handled.state, ConversationState::Default);
    let names: Vec<_> = h
        .tasks()
        .await
        .into_iter()
        .filter_map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["Walk dog"]);

    // Re-rendered list, result, menu; no name prompt.
    let after: Vec<_> = h.sent_texts().split_off(sent_before);
    assert_eq!(
        after,
        vec![
            "Task name: Walk dog\nTask description: twice",
            "Task deleted successfully",
            "Menu: ",
        ]
    );
}

#[tokio::test]
async fn stale_delete_button_reports_no_such_task() {
    let h = Harness::new();
    h.create("Buy milk", "skim").await;

    h.press("delete-task:Buy milk").await;
    h.press("delete-task:Buy milk").await;

    assert!(h.tasks().await.is_empty());
    assert_eq!(
        h.visible_texts(),
        vec!["You have no tasks", "There is no such task", "Menu: "]
    );
}

#[tokio::test]
async fn delete_by_typed_name() {
    let h = Harness::new();
    h.create("Buy milk", "skim").await;

    assert_eq!(
        h.say("/delete_task").await.state,
        ConversationState::AwaitingDeletionTarget
    );
    let handled = h.say("  Buy milk ").await;

    assert_eq!(handled.state, ConversationState::Default);
    assert!(h.tasks().await.is_empty());
    assert_eq!(h.visible_texts(), vec!["Task deleted successfully", "Menu: "]);
}

#[tokio::test]
async fn deletion_is_scoped_to_the_chat() {
    let h = Harness::new();
    let other = ChatId::new(2002);
    h.create("Buy milk", "skim").await;

    h.say_in(other, "/delete_task").await.unwrap();
    h.say_in(other, "Buy milk").await.unwrap();

    assert_eq!(h.tasks().await.len(), 1);
    let other_texts: Vec<_> = h
        .client
        .visible(other)
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(other_texts, vec!["There is no such task", "Menu: "]);
}

// ---------------------------------------------------------------------------
// Failures and determinism
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_store_write_aborts_without_state_change() {
    let h = Harness::with_store(FlakyStore {
        inner: InMemoryTaskStore::new(),
        fail_names: AtomicBool::new(false),
    });
    h.say("/new_task").await;
    h.engine.store().fail_names.store(true, Ordering::SeqCst);

    let result = h.say_in(CHAT, "Buy milk").await;

    assert!(matches!(result, Err(EngineError::Store(StoreError::Unavailable(_)))));
    assert_eq!(h.state().await, ConversationState::AwaitingTaskName);
    let tasks = h.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].name.is_none());

    // Once the store recovers the same step succeeds.
    h.engine.store().fail_names.store(false, Ordering::SeqCst);
    assert_eq!(
        h.say("Buy milk").await.state,
        ConversationState::AwaitingTaskDescription
    );
}

#[tokio::test]
async fn replaying_a_conversation_is_deterministic() {
    let script = [
        "/start",
        "/new_task",
        "/list_tasks",
        "Buy milk",
        "skim",
        "/new_task",
        "/cancel",
        "/delete_task",
        "Walk dog",
        "/new_task",
        "Walk dog",
    ];

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let h = Harness::new();
        for line in script {
            h.say(line).await;
        }
        let tasks: Vec<_> = h
            .tasks()
            .await
            .into_iter()
            .map(|t| (t.name, t.description, t.status))
            .collect();
        outcomes.push((h.state().await, tasks, h.sent_texts()));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0].0, ConversationState::AwaitingTaskDescription);
}

#[tokio::test]
async fn greeting_uses_sender_name() {
    let h = Harness::new();
    h.say("/start").await;

    assert_eq!(h.sent_texts(), vec!["Hello Tester!", "Menu: "]);
}
