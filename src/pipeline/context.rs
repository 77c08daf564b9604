//! Reply context extraction.

use crate::error::ContextError;
use crate::mail::body::clean_body;
use crate::mail::types::{AgentIdentity, Conversation, normalize_address};
use crate::pipeline::types::{HistoryEntry, ReplyContext};

/// Default number of history entries handed to the composer.
pub const DEFAULT_MAX_HISTORY: usize = 10;

const NO_SUBJECT: &str = "(no subject)";

pub struct ContextBuilder {
    agent: AgentIdentity,
    max_history: usize,
}

impl ContextBuilder {
    pub fn new(agent: AgentIdentity) -> Self {
        Self {
            agent,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    /// Cap history length. The target is always kept.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history.max(1);
        self
    }

    /// Build the context for answering `target_id`.
    ///
    /// History runs oldest to newest and stops at the target; anything
    /// after it (e.g. the agent's own stale draft) is left out.
    pub fn build(
        &self,
        conversation: &Conversation,
        target_id: &str,
    ) -> Result<ReplyContext, ContextError> {
        let ordered = conversation.chronological();
        let position = ordered
            .iter()
            .position(|m| m.id == target_id)
            .ok_or_else(|| ContextError::TargetNotFound {
                conversation_id: conversation.id.clone(),
                message_id: target_id.to_string(),
            })?;

        let target = ordered[position];
        let thread_head_id = conversation
            .latest()
            .map(|m| m.id.clone())
            .unwrap_or_else(|| target.id.clone());

        let upto = &ordered[..=position];
        let skip = upto.len().saturating_sub(self.max_history);
        let prior_history = upto[skip..]
            .iter()
            .map(|m| HistoryEntry {
                sender: normalize_address(&m.sender),
                body: clean_body(&m.body),
                from_agent: m.is_from_agent(&self.agent),
            })
            .collect();

        let subject = own_subject(target.headers.subject.as_deref())
            .or_else(|| {
                ordered
                    .iter()
                    .rev()
                    .find_map(|m| own_subject(m.headers.subject.as_deref()))
            })
            .unwrap_or(NO_SUBJECT)
            .to_string();

        Ok(ReplyContext {
            conversation_id: conversation.id.clone(),
            target_message_id: target.id.clone(),
            thread_head_id,
            subject,
            sender_identity: normalize_address(&target.sender),
            target_body: clean_body(&target.body),
            prior_history,
            language_hint: None,
        })
    }
}

fn own_subject(subject: Option<&str>) -> Option<&str> {
    subject.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::types::{Label, MessageRecord};
    use chrono::{DateTime, TimeZone, Utc};

    const AGENT: &str = "agent@example.com";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn builder() -> ContextBuilder {
        ContextBuilder::new(AgentIdentity::new(AGENT))
    }

    fn thread() -> Conversation {
        Conversation::new(
            "t1",
            vec![
                MessageRecord::new("m1", "Alice <alice@example.com>", at(0))
                    .with_subject("Invoice 42")
                    .with_body("Where is my invoice?"),
                MessageRecord::new("m2", AGENT, at(10)).with_body("Sending it today."),
                MessageRecord::new("m3", "alice@example.com", at(20))
                    .with_label(Label::Unread)
                    .with_body("Still nothing.\n\nOn Mon, Agent wrote:\n> Sending it today."),
                MessageRecord::new("m4", AGENT, at(30)).with_body("stale draft"),
            ],
            true,
        )
    }

    #[test]
    fn history_stops_at_target() {
        let ctx = builder().build(&thread(), "m3").unwrap();
        let bodies: Vec<_> = ctx.prior_history.iter().map(|h| h.body.as_str()).collect();
        assert_eq!(
            bodies,
            ["Where is my invoice?", "Sending it today.", "Still nothing."]
        );
        assert!(ctx.prior_history[1].from_agent);
        assert!(!ctx.prior_history[2].from_agent);
    }

    #[test]
    fn history_follows_timestamps_not_list_order() {
        let mut shuffled = thread();
        shuffled.messages.reverse();
        let ctx = builder().build(&shuffled, "m3").unwrap();
        let bodies: Vec<_> = ctx.prior_history.iter().map(|h| h.body.as_str()).collect();
        assert_eq!(
            bodies,
            ["Where is my invoice?", "Sending it today.", "Still nothing."]
        );
        assert_eq!(ctx.thread_head_id, "m4");
    }

    #[test]
    fn context_fields() {
        let ctx = builder().build(&thread(), "m3").unwrap();
        assert_eq!(ctx.conversation_id, "t1");
        assert_eq!(ctx.target_message_id, "m3");
        assert_eq!(ctx.thread_head_id, "m4");
        assert_eq!(ctx.sender_identity, "alice@example.com");
        assert_eq!(ctx.target_body, "Still nothing.");
        assert!(ctx.language_hint.is_none());
    }

    #[test]
    fn subject_falls_back_to_thread() {
        let ctx = builder().build(&thread(), "m3").unwrap();
        assert_eq!(ctx.subject, "Invoice 42");

        let bare = Conversation::new(
            "t2",
            vec![MessageRecord::new("m1", "a@x.com", at(0)).with_body("hi")],
            true,
        );
        assert_eq!(builder().build(&bare, "m1").unwrap().subject, "(no subject)");
    }

    #[test]
    fn history_is_capped_but_keeps_target() {
        let ctx = builder().with_max_history(2).build(&thread(), "m3").unwrap();
        assert_eq!(ctx.prior_history.len(), 2);
        assert_eq!(ctx.prior_history[1].body, "Still nothing.");

        let ctx = builder().with_max_history(0).build(&thread(), "m3").unwrap();
        assert_eq!(ctx.prior_history.len(), 1);
    }

    #[test]
    fn unknown_target_is_an_error() {
        let err = builder().build(&thread(), "nope").unwrap_err();
        assert!(matches!(err, ContextError::TargetNotFound { .. }));
    }

    #[test]
    fn build_is_deterministic() {
        let conv = thread();
        assert_eq!(
            builder().build(&conv, "m3").unwrap(),
            builder().build(&conv, "m3").unwrap()
        );
    }
}
