//! Task-flow orchestration on top of a [`TaskStore`](crate::store::TaskStore).
//!
//! Turns the two-step create conversation and delete-by-name into store
//! calls, hiding draft lookup from the engine.

pub mod flow;

pub use flow::{DeleteOutcome, TaskFlow};

use taskbot_proto::message::ChatId;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur during task operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The chat has no draft task to operate on.
    #[error("chat {0} has no draft task")]
    NoDraft(ChatId),
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
