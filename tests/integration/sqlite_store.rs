//! Integration tests for the task stores.
//!
//! Runs the same behavioral checks against the SQLite and in-memory stores,
//! then exercises SQLite-only concerns: persistence across reopen and a full
//! conversation on a file-backed database.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use taskbot::engine::{Engine, EngineConfig};
use taskbot::ledger::LedgerBackend;
use taskbot::ledger::sqlite::SqliteLedger;
use taskbot::store::memory::InMemoryTaskStore;
use taskbot::store::sqlite::{Database, SqliteTaskStore};
use taskbot::store::{StoreError, TaskStore};
use taskbot::transport::Transport;
use taskbot::transport::loopback::LoopbackTransport;
use taskbot_proto::message::ChatId;
use taskbot_proto::state::ConversationState;
use taskbot_proto::task::{TaskId, TaskStatus};

const CHAT: ChatId = ChatId::new(77);
const OTHER: ChatId = ChatId::new(-1_001_234);

fn temp_db(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("taskbot-{}-{name}.db", std::process::id()));
    remove_db(&path);
    path
}

fn remove_db(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut p = path.as_os_str().to_os_string();
        p.push(suffix);
        let _ = std::fs::remove_file(p);
    }
}

async fn finished_task<S: TaskStore>(store: &S, chat: ChatId, name: &str) -> TaskId {
    let id = store.create_draft_task(chat).await.unwrap();
    store.set_task_name(id, name).await.unwrap();
    store.set_task_description(id, "desc").await.unwrap();
    id
}

// ---------------------------------------------------------------------------
// Shared contract
// ---------------------------------------------------------------------------

async fn check_store_contract<S: TaskStore>(store: S) {
    // Absent state reads as Default.
    assert_eq!(
        store.get_state(CHAT).await.unwrap(),
        ConversationState::Default
    );
    for state in ConversationState::ALL {
        store.set_state(CHAT, state).await.unwrap();
        assert_eq!(store.get_state(CHAT).await.unwrap(), state);
    }
    assert_eq!(
        store.get_state(OTHER).await.unwrap(),
        ConversationState::Default
    );

    // Drafts.
    assert!(matches!(
        store.get_draft_task_id(CHAT).await,
        Err(StoreError::NotFound(_))
    ));
    let draft = store.create_draft_task(CHAT).await.unwrap();
    assert_eq!(store.get_draft_task_id(CHAT).await.unwrap(), draft);
    assert!(matches!(
        store.get_draft_task_id(OTHER).await,
        Err(StoreError::NotFound(_))
    ));
    store.set_task_name(draft, "Buy milk").await.unwrap();
    store.set_task_description(draft, "skim").await.unwrap();
    assert!(matches!(
        store.get_draft_task_id(CHAT).await,
        Err(StoreError::NotFound(_))
    ));

    let tasks = store.list_tasks(CHAT).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, draft);
    assert_eq!(tasks[0].chat_id, CHAT);
    assert_eq!(tasks[0].name.as_deref(), Some("Buy milk"));
    assert_eq!(tasks[0].description.as_deref(), Some("skim"));
    assert_eq!(tasks[0].status, TaskStatus::Created);

    // Updates of unknown ids.
    assert!(matches!(
        store.set_task_name(TaskId::new(9_999), "x").await,
        Err(StoreError::NotFound(_))
    ));

    // Delete by name touches only finished tasks of the same chat.
    finished_task(&store, OTHER, "Buy milk").await;
    let pending = store.create_draft_task(CHAT).await.unwrap();
    store.set_task_name(pending, "Buy milk").await.unwrap();

    assert_eq!(store.delete_task_by_name(CHAT, "Buy milk").await.unwrap(), 1);
    assert_eq!(store.delete_task_by_name(CHAT, "Buy milk").await.unwrap(), 0);
    assert_eq!(store.list_tasks(OTHER).await.unwrap().len(), 1);
    assert_eq!(store.get_draft_task_id(CHAT).await.unwrap(), pending);

    // Draft deletion spares finished tasks.
    finished_task(&store, CHAT, "Walk dog").await;
    assert_eq!(store.delete_draft_task(CHAT).await.unwrap(), 1);
    assert_eq!(store.delete_draft_task(CHAT).await.unwrap(), 0);
    let names: Vec<_> = store
        .list_tasks(CHAT)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["Walk dog"]);
}

#[tokio::test]
async fn sqlite_store_honors_contract() {
    check_store_contract(SqliteTaskStore::new(Database::open_in_memory().unwrap())).await;
}

#[tokio::test]
async fn memory_store_honors_contract() {
    check_store_contract(InMemoryTaskStore::new()).await;
}

#[tokio::test]
async fn list_is_in_creation_order() {
    let store = SqliteTaskStore::new(Database::open_in_memory().unwrap());
    for name in ["c", "a", "b"] {
        finished_task(&store, CHAT, name).await;
    }

    let names: Vec<_> = store
        .list_tasks(CHAT)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn duplicate_names_are_all_deleted() {
    let store = SqliteTaskStore::new(Database::open_in_memory().unwrap());
    finished_task(&store, CHAT, "Buy milk").await;
    finished_task(&store, CHAT, "Buy milk").await;

    assert_eq!(store.delete_task_by_name(CHAT, "Buy milk").await.unwrap(), 2);
}

#[tokio::test]
async fn concurrent_chats_do_not_interfere() {
    let store = Arc::new(SqliteTaskStore::new(Database::open_in_memory().unwrap()));
    let mut handles = Vec::new();
    for n in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let chat = ChatId::new(n);
            store
                .set_state(chat, ConversationState::AwaitingTaskName)
                .await
                .unwrap();
            finished_task(store.as_ref(), chat, &format!("task {n}")).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for n in 0..16 {
        let chat = ChatId::new(n);
        let tasks = store.list_tasks(chat).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, Some(format!("task {n}")));
        assert_eq!(
            store.get_state(chat).await.unwrap(),
            ConversationState::AwaitingTaskName
        );
    }
}

// ---------------------------------------------------------------------------
// File-backed database
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tasks_and_state_survive_reopen() {
    let path = temp_db("reopen");
    {
        let store = SqliteTaskStore::new(Database::open(&path).unwrap());
        finished_task(&store, CHAT, "Buy milk").await;
        store
            .set_state(CHAT, ConversationState::AwaitingDeletionTarget)
            .await
            .unwrap();
    }

    let store = SqliteTaskStore::new(Database::open(&path).unwrap());
    let names: Vec<_> = store
        .list_tasks(CHAT)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|t| t.name)
        .collect();
    let state = store.get_state(CHAT).await.unwrap();
    drop(store);
    remove_db(&path);

    assert_eq!(names, vec!["Buy milk"]);
    assert_eq!(state, ConversationState::AwaitingDeletionTarget);
}

#[tokio::test]
async fn conversation_resumes_after_restart() {
    let path = temp_db("resume");

    let run = |lines: &'static [&'static str]| {
        let path = path.clone();
        async move {
            let db = Database::open(&path).unwrap();
            let (transport, client) = LoopbackTransport::create_pair(8);
            let engine = Engine::new(
                Arc::new(transport),
                Arc::new(SqliteTaskStore::new(db.clone())),
                Arc::new(LedgerBackend::Sqlite(SqliteLedger::new(db))),
                EngineConfig::default(),
            );
            for line in lines {
                client.send_text(CHAT, *line).await.unwrap();
                let event = engine.transport().recv().await.unwrap();
                engine.handle(&event).await.unwrap();
            }
            engine.store().list_tasks(CHAT).await.unwrap()
        }
    };

    run(&["/new_task", "Buy milk"]).await;
    let tasks = run(&["skim"]).await;
    remove_db(&path);

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].name.as_deref(), Some("Buy milk"));
    assert_eq!(tasks[0].description.as_deref(), Some("skim"));
    assert_eq!(tasks[0].status, TaskStatus::Created);
}
