//! JSON-file-backed mail store for local and offline runs.
//!
//! The file holds `{ "conversations": [...], "outbox": [...] }`. Every
//! mutation is applied to a copy, written to a temp file and renamed over
//! the original; in-memory state only changes once the write succeeded.
//! The write and the commit run on their own task, so a caller that gives
//! up (e.g. on timeout) cannot leave the file ahead of memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::MailError;
use crate::mail::mailbox::{Mailbox, OutboxKind};
use crate::mail::store::MailStore;
use crate::mail::types::{AgentIdentity, Conversation};

pub struct JsonMailStore {
    path: PathBuf,
    agent: AgentIdentity,
    mailbox: Arc<Mutex<Mailbox>>,
}

impl JsonMailStore {
    /// Load a snapshot file.
    pub async fn open(path: impl AsRef<Path>, agent: AgentIdentity) -> Result<Self, MailError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MailError::Snapshot(format!("read {}: {e}", path.display())))?;
        let mut mailbox: Mailbox = serde_json::from_str(&raw)
            .map_err(|e| MailError::Snapshot(format!("parse {}: {e}", path.display())))?;
        mailbox.normalize();

        debug!(
            path = %path.display(),
            conversations = mailbox.conversations.len(),
            "Loaded mailbox snapshot"
        );

        Ok(Self {
            path,
            agent,
            mailbox: Arc::new(Mutex::new(mailbox)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current in-memory state.
    pub async fn mailbox(&self) -> Mailbox {
        self.mailbox.lock().await.clone()
    }

    /// Apply `change` to a copy, persist it, then commit.
    async fn mutate<F>(&self, change: F) -> Result<(), MailError>
    where
        F: FnOnce(&mut Mailbox, &AgentIdentity) -> Result<(), MailError> + Send,
    {
        let mut guard = Arc::clone(&self.mailbox).lock_owned().await;
        let mut next = guard.clone();
        change(&mut next, &self.agent)?;

        let path = self.path.clone();
        let commit = tokio::spawn(async move {
            persist(&path, &next).await?;
            *guard = next;
            Ok::<(), MailError>(())
        });
        commit
            .await
            .map_err(|e| MailError::Snapshot(format!("snapshot writer failed: {e}")))?
    }
}

async fn persist(path: &Path, mailbox: &Mailbox) -> Result<(), MailError> {
    let json = serde_json::to_string_pretty(mailbox)
        .map_err(|e| MailError::Snapshot(format!("serialize: {e}")))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| MailError::Snapshot(format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| MailError::Snapshot(format!("rename to {}: {e}", path.display())))
}

#[async_trait]
impl MailStore for JsonMailStore {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn list_starred_conversations(&self) -> Result<Vec<Conversation>, MailError> {
        Ok(self.mailbox.lock().await.starred())
    }

    async fn create_draft(
        &self,
        conversation_id: &str,
        reply_text: &str,
        in_reply_to: &str,
    ) -> Result<(), MailError> {
        self.mutate(|mb, agent| {
            mb.record_reply(OutboxKind::Draft, conversation_id, reply_text, in_reply_to, agent)
                .map(|_| ())
        })
        .await
    }

    async fn send_reply(
        &self,
        conversation_id: &str,
        reply_text: &str,
        in_reply_to: &str,
    ) -> Result<(), MailError> {
        self.mutate(|mb, agent| {
            mb.record_reply(OutboxKind::Sent, conversation_id, reply_text, in_reply_to, agent)
                .map(|_| ())
        })
        .await
    }

    async fn remove_star(&self, conversation_id: &str) -> Result<(), MailError> {
        self.mutate(|mb, _| mb.remove_star(conversation_id)).await
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), MailError> {
        self.mutate(|mb, _| mb.mark_read(conversation_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "conversations": [
            {
                "id": "t1",
                "starred": true,
                "messages": [
                    {
                        "id": "m2",
                        "timestamp": "2026-02-15T11:00:00Z",
                        "sender": "Alice <alice@example.com>",
                        "labels": ["UNREAD", "STARRED"],
                        "body": "Any news?",
                        "headers": { "subject": "Re: Quote", "message_id": "<m2@example.com>" }
                    },
                    {
                        "id": "m1",
                        "timestamp": "2026-02-15T10:00:00Z",
                        "sender": "agent@example.com",
                        "labels": ["SENT"],
                        "body": "Here is the quote."
                    }
                ]
            },
            { "id": "t2", "starred": false, "messages": [] }
        ]
    }"#;

    async fn open(dir: &tempfile::TempDir) -> JsonMailStore {
        let path = dir.path().join("mailbox.json");
        tokio::fs::write(&path, SNAPSHOT).await.unwrap();
        JsonMailStore::open(&path, AgentIdentity::new("agent@example.com"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_sorts_messages_chronologically() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        let starred = store.list_starred_conversations().await.unwrap();
        assert_eq!(starred.len(), 1);
        assert_eq!(starred[0].messages[0].id, "m1");
        assert_eq!(starred[0].latest().unwrap().id, "m2");
    }

    #[tokio::test]
    async fn send_and_unstar_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        store.send_reply("t1", "Coming Monday.", "m2").await.unwrap();
        store.remove_star("t1").await.unwrap();

        let reloaded = JsonMailStore::open(store.path(), AgentIdentity::new("agent@example.com"))
            .await
            .unwrap();
        let mailbox = reloaded.mailbox().await;
        assert_eq!(mailbox.outbox.len(), 1);
        assert_eq!(mailbox.outbox[0].envelope.to, "alice@example.com");
        assert_eq!(mailbox.outbox[0].envelope.subject, "Re: Quote");
        assert_eq!(
            mailbox.outbox[0].envelope.in_reply_to.as_deref(),
            Some("<m2@example.com>")
        );

        let conv = mailbox.conversation("t1").unwrap();
        assert!(!conv.starred);
        assert_eq!(conv.messages.len(), 3);
        assert!(reloaded.list_starred_conversations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_mutation_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        let err = store.create_draft("t1", "x", "missing").await.unwrap_err();
        assert!(matches!(err, MailError::MessageNotFound { .. }));
        assert!(store.mailbox().await.outbox.is_empty());
    }

    #[tokio::test]
    async fn abandoned_mutation_still_commits_memory_and_file() {
        use futures::FutureExt;

        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        // Poll once and drop, as a timeout firing mid-write would.
        let _ = store.send_reply("t1", "Coming Monday.", "m2").now_or_never();

        // Waits for the writer to release the lock.
        store.mark_read("t1").await.unwrap();

        assert_eq!(store.mailbox().await.outbox.len(), 1);
        let reloaded = JsonMailStore::open(store.path(), AgentIdentity::new("agent@example.com"))
            .await
            .unwrap();
        let mailbox = reloaded.mailbox().await;
        assert_eq!(mailbox.outbox.len(), 1);
        assert_eq!(mailbox.conversation("t1").unwrap().messages.len(), 3);
    }

    #[tokio::test]
    async fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            JsonMailStore::open(dir.path().join("nope.json"), AgentIdentity::new("a@x.com")).await;
        assert!(matches!(result, Err(MailError::Snapshot(_))));
    }
}
