//! Mail store collaborator trait.

use async_trait::async_trait;

use crate::error::MailError;
use crate::mail::types::Conversation;

/// Mailbox access. Pure I/O, no triage logic.
///
/// Implementations may retry internally; the pipeline never does. Every
/// mutation is scoped to a single conversation.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Store name for logging (e.g. "snapshot", "memory").
    fn name(&self) -> &str;

    /// Fetch a fresh snapshot of every starred conversation.
    async fn list_starred_conversations(&self) -> Result<Vec<Conversation>, MailError>;

    /// Create a draft reply threaded under `in_reply_to`.
    async fn create_draft(
        &self,
        conversation_id: &str,
        reply_text: &str,
        in_reply_to: &str,
    ) -> Result<(), MailError>;

    /// Send a reply threaded under `in_reply_to`.
    async fn send_reply(
        &self,
        conversation_id: &str,
        reply_text: &str,
        in_reply_to: &str,
    ) -> Result<(), MailError>;

    /// Clear the star so the conversation is not picked up again.
    async fn remove_star(&self, conversation_id: &str) -> Result<(), MailError>;

    /// Drop the unread tag from every message in the conversation.
    async fn mark_read(&self, conversation_id: &str) -> Result<(), MailError>;
}
