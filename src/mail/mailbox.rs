//! Mailbox state shared by the in-memory and snapshot stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MailError;
use crate::mail::reply::ReplyEnvelope;
use crate::mail::types::{AgentIdentity, Conversation, Label, MessageHeaders, MessageRecord};

/// Whether an outbox entry was drafted or sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxKind {
    Draft,
    Sent,
}

/// A reply produced by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub conversation_id: String,
    pub kind: OutboxKind,
    pub envelope: ReplyEnvelope,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Conversations plus everything replied so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub outbox: Vec<OutboxEntry>,
}

impl Mailbox {
    pub fn new(conversations: Vec<Conversation>) -> Self {
        let mut mailbox = Self {
            conversations,
            outbox: Vec::new(),
        };
        mailbox.normalize();
        mailbox
    }

    /// Restore message ordering after loading from disk.
    pub fn normalize(&mut self) {
        for conversation in &mut self.conversations {
            conversation.normalize();
        }
    }

    pub fn starred(&self) -> Vec<Conversation> {
        self.conversations
            .iter()
            .filter(|c| c.starred)
            .cloned()
            .collect()
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation, MailError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| MailError::ConversationNotFound { id: id.to_string() })
    }

    /// Record a draft or sent reply.
    ///
    /// A sent reply is also appended to the thread as the agent's message,
    /// so the next snapshot shows the agent holding the last word.
    pub fn record_reply(
        &mut self,
        kind: OutboxKind,
        conversation_id: &str,
        reply_text: &str,
        in_reply_to: &str,
        agent: &AgentIdentity,
    ) -> Result<OutboxEntry, MailError> {
        let operation = match kind {
            OutboxKind::Draft => "create_draft",
            OutboxKind::Sent => "send_reply",
        };

        let conversation = self.conversation_mut(conversation_id)?;
        let parent = conversation
            .message(in_reply_to)
            .ok_or_else(|| MailError::MessageNotFound {
                conversation_id: conversation_id.to_string(),
                message_id: in_reply_to.to_string(),
            })?;

        let envelope = ReplyEnvelope::for_parent(parent).ok_or_else(|| MailError::Permanent {
            operation: operation.to_string(),
            reason: format!("no recipient for message {in_reply_to}"),
        })?;

        let now = Utc::now();
        let entry = OutboxEntry {
            conversation_id: conversation_id.to_string(),
            kind,
            envelope: envelope.clone(),
            body: reply_text.to_string(),
            created_at: now,
        };

        if kind == OutboxKind::Sent {
            let (head_ts, head_arrival) = conversation
                .latest()
                .map(MessageRecord::order_key)
                .unwrap_or((now, 0));
            let mut sent = MessageRecord::new(
                format!("sent-{}", Uuid::new_v4()),
                agent.address(),
                now.max(head_ts),
            )
            .with_label(Label::Sent)
            .with_body(reply_text)
            .with_headers(MessageHeaders {
                subject: Some(envelope.subject),
                to: Some(envelope.to),
                message_id: Some(format!("<{}@star-triage.local>", Uuid::new_v4())),
                references: envelope.references,
                ..Default::default()
            });
            sent.arrival = head_arrival + 1;
            conversation.messages.push(sent);
        }

        self.outbox.push(entry.clone());
        Ok(entry)
    }

    pub fn remove_star(&mut self, conversation_id: &str) -> Result<(), MailError> {
        let conversation = self.conversation_mut(conversation_id)?;
        conversation.starred = false;
        for msg in &mut conversation.messages {
            msg.labels.remove(&Label::Starred);
        }
        Ok(())
    }

    pub fn mark_read(&mut self, conversation_id: &str) -> Result<(), MailError> {
        let conversation = self.conversation_mut(conversation_id)?;
        for msg in &mut conversation.messages {
            msg.labels.remove(&Label::Unread);
        }
        Ok(())
    }
}
