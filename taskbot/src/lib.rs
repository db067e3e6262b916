//! `taskbot` — chat-driven personal task manager.
//!
//! A per-chat conversation state machine over a bot transport, with a ledger
//! of transient messages that are swept once the conversation moves on.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod ledger;
pub mod store;
pub mod tasks;
pub mod transport;
