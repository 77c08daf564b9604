//! Star Triage: auto-reply engine for starred mailbox conversations.

pub mod compose;
pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
