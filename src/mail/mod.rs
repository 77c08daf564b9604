//! Mailbox model and the store collaborator.

pub mod body;
pub mod mailbox;
pub mod memory;
pub mod reply;
pub mod snapshot;
pub mod store;
pub mod types;

pub use mailbox::{Mailbox, OutboxEntry, OutboxKind};
pub use memory::{InMemoryMailStore, MailCall, MailOperation};
pub use reply::ReplyEnvelope;
pub use snapshot::JsonMailStore;
pub use store::MailStore;
pub use types::{AgentIdentity, Conversation, Label, MessageHeaders, MessageRecord};
