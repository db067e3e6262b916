//! Shared domain definitions for `taskbot`.

pub mod action;
pub mod codec;
pub mod message;
pub mod state;
pub mod task;
