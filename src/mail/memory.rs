//! In-memory mail store with a call log and failure injection.
//!
//! Backs the pipeline tests and dry runs. Every call is logged before any
//! injected failure fires, so tests can assert on attempted mutations.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::MailError;
use crate::mail::mailbox::{Mailbox, OutboxEntry, OutboxKind};
use crate::mail::store::MailStore;
use crate::mail::types::{AgentIdentity, Conversation};

/// Store operation, used for call logging and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailOperation {
    List,
    CreateDraft,
    SendReply,
    RemoveStar,
    MarkRead,
}

impl MailOperation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::List => "list_starred_conversations",
            Self::CreateDraft => "create_draft",
            Self::SendReply => "send_reply",
            Self::RemoveStar => "remove_star",
            Self::MarkRead => "mark_read",
        }
    }

    /// Whether the operation changes mailbox state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::List)
    }
}

/// One logged store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailCall {
    pub operation: MailOperation,
    pub conversation_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub reply_text: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    transient: bool,
}

/// In-memory `MailStore`.
pub struct InMemoryMailStore {
    agent: AgentIdentity,
    mailbox: Mutex<Mailbox>,
    calls: Mutex<Vec<MailCall>>,
    failures: Mutex<HashMap<(MailOperation, Option<String>), InjectedFailure>>,
    delivery_latency: Option<Duration>,
}

impl InMemoryMailStore {
    pub fn new(agent: AgentIdentity, conversations: Vec<Conversation>) -> Self {
        Self {
            agent,
            mailbox: Mutex::new(Mailbox::new(conversations)),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delivery_latency: None,
        }
    }

    /// Delay every draft/send call, to exercise delivery timeouts.
    pub fn with_delivery_latency(mut self, latency: Duration) -> Self {
        self.delivery_latency = Some(latency);
        self
    }

    /// Make `operation` fail for one conversation.
    pub async fn fail(&self, operation: MailOperation, conversation_id: &str, transient: bool) {
        self.failures.lock().await.insert(
            (operation, Some(conversation_id.to_string())),
            InjectedFailure { transient },
        );
    }

    /// Make the starred listing fail.
    pub async fn fail_listing(&self) {
        self.failures
            .lock()
            .await
            .insert((MailOperation::List, None), InjectedFailure { transient: true });
    }

    pub async fn calls(&self) -> Vec<MailCall> {
        self.calls.lock().await.clone()
    }

    /// Logged calls that would have changed the mailbox.
    pub async fn mutation_calls(&self) -> Vec<MailCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.operation.is_mutation())
            .cloned()
            .collect()
    }

    pub async fn outbox(&self) -> Vec<OutboxEntry> {
        self.mailbox.lock().await.outbox.clone()
    }

    pub async fn conversation(&self, id: &str) -> Option<Conversation> {
        self.mailbox.lock().await.conversation(id).cloned()
    }

    async fn log(&self, call: MailCall) -> Result<(), MailError> {
        let key = (call.operation, call.conversation_id.clone());
        let operation = call.operation;
        self.calls.lock().await.push(call);

        match self.failures.lock().await.get(&key) {
            Some(InjectedFailure { transient: true }) => Err(MailError::Transient {
                operation: operation.label().to_string(),
                reason: "injected failure".to_string(),
            }),
            Some(InjectedFailure { transient: false }) => Err(MailError::Permanent {
                operation: operation.label().to_string(),
                reason: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn deliver(
        &self,
        kind: OutboxKind,
        conversation_id: &str,
        reply_text: &str,
        in_reply_to: &str,
    ) -> Result<(), MailError> {
        let operation = match kind {
            OutboxKind::Draft => MailOperation::CreateDraft,
            OutboxKind::Sent => MailOperation::SendReply,
        };
        self.log(MailCall {
            operation,
            conversation_id: Some(conversation_id.to_string()),
            in_reply_to: Some(in_reply_to.to_string()),
            reply_text: Some(reply_text.to_string()),
        })
        .await?;

        if let Some(latency) = self.delivery_latency {
            tokio::time::sleep(latency).await;
        }

        self.mailbox
            .lock()
            .await
            .record_reply(kind, conversation_id, reply_text, in_reply_to, &self.agent)
            .map(|_| ())
    }

    fn conversation_call(operation: MailOperation, conversation_id: &str) -> MailCall {
        MailCall {
            operation,
            conversation_id: Some(conversation_id.to_string()),
            in_reply_to: None,
            reply_text: None,
        }
    }
}

#[async_trait]
impl MailStore for InMemoryMailStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_starred_conversations(&self) -> Result<Vec<Conversation>, MailError> {
        self.log(MailCall {
            operation: MailOperation::List,
            conversation_id: None,
            in_reply_to: None,
            reply_text: None,
        })
        .await?;
        Ok(self.mailbox.lock().await.starred())
    }

    async fn create_draft(
        &self,
        conversation_id: &str,
        reply_text: &str,
        in_reply_to: &str,
    ) -> Result<(), MailError> {
        self.deliver(OutboxKind::Draft, conversation_id, reply_text, in_reply_to)
            .await
    }

    async fn send_reply(
        &self,
        conversation_id: &str,
        reply_text: &str,
        in_reply_to: &str,
    ) -> Result<(), MailError> {
        self.deliver(OutboxKind::Sent, conversation_id, reply_text, in_reply_to)
            .await
    }

    async fn remove_star(&self, conversation_id: &str) -> Result<(), MailError> {
        self.log(Self::conversation_call(MailOperation::RemoveStar, conversation_id))
            .await?;
        self.mailbox.lock().await.remove_star(conversation_id)
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), MailError> {
        self.log(Self::conversation_call(MailOperation::MarkRead, conversation_id))
            .await?;
        self.mailbox.lock().await.mark_read(conversation_id)
    }
}
