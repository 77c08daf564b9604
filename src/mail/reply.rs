//! Reply addressing and threading headers.

use serde::{Deserialize, Serialize};

use crate::mail::types::{Label, MessageRecord, normalize_address};

/// Addressing for an outgoing reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub to: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl ReplyEnvelope {
    /// Build the envelope for a reply threaded under `parent`.
    ///
    /// When the parent was sent from this mailbox the reply goes to the
    /// parent's recipients, otherwise back to its sender. Returns `None` when
    /// no recipient can be determined.
    pub fn for_parent(parent: &MessageRecord) -> Option<Self> {
        let to = if parent.has_label(&Label::Sent) {
            parent.headers.to.as_deref().map(str::trim).map(String::from)
        } else {
            Some(normalize_address(&parent.sender))
        }
        .filter(|to| !to.is_empty())?;

        let subject = reply_subject(parent.headers.subject.as_deref().unwrap_or(""));

        let message_id = parent
            .headers
            .message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let references = message_id.map(|id| match parent.headers.references.as_deref() {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), id),
            _ => id.to_string(),
        });

        Some(Self {
            to,
            subject,
            in_reply_to: message_id.map(String::from),
            references,
        })
    }
}

/// Prefix `Re:` unless the subject already carries it.
pub fn reply_subject(subject: &str) -> String {
    let subject = subject.trim();
    if subject.is_empty() {
        return "Re: (no subject)".to_string();
    }
    if subject.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::types::MessageHeaders;
    use chrono::Utc;

    fn parent(sender: &str) -> MessageRecord {
        MessageRecord::new("m1", sender, Utc::now()).with_headers(MessageHeaders {
            subject: Some("Meeting tomorrow".into()),
            to: Some("agent@example.com".into()),
            message_id: Some("<abc@example.com>".into()),
            references: None,
            ..Default::default()
        })
    }

    #[test]
    fn reply_subject_prepends_re() {
        assert_eq!(reply_subject("Meeting tomorrow"), "Re: Meeting tomorrow");
    }

    #[test]
    fn reply_subject_no_double_re() {
        assert_eq!(reply_subject("Re: Meeting"), "Re: Meeting");
        assert_eq!(reply_subject("RE: Meeting"), "RE: Meeting");
        assert_eq!(reply_subject("re:Meeting"), "re:Meeting");
    }

    #[test]
    fn reply_subject_empty() {
        assert_eq!(reply_subject("  "), "Re: (no subject)");
    }

    #[test]
    fn reply_subject_multibyte_prefix_does_not_panic() {
        assert_eq!(reply_subject("Ré"), "Re: Ré");
        assert_eq!(reply_subject("abé"), "Re: abé");
    }

    #[test]
    fn incoming_parent_replies_to_sender() {
        let env = ReplyEnvelope::for_parent(&parent("Alice <Alice@Example.com>")).unwrap();
        assert_eq!(env.to, "alice@example.com");
        assert_eq!(env.subject, "Re: Meeting tomorrow");
        assert_eq!(env.in_reply_to.as_deref(), Some("<abc@example.com>"));
        assert_eq!(env.references.as_deref(), Some("<abc@example.com>"));
    }

    #[test]
    fn sent_parent_replies_to_recipient() {
        let mut msg = parent("agent@example.com").with_label(Label::Sent);
        msg.headers.to = Some("bob@example.com".into());
        let env = ReplyEnvelope::for_parent(&msg).unwrap();
        assert_eq!(env.to, "bob@example.com");
    }

    #[test]
    fn sent_parent_without_to_has_no_envelope() {
        let mut msg = parent("agent@example.com").with_label(Label::Sent);
        msg.headers.to = None;
        assert!(ReplyEnvelope::for_parent(&msg).is_none());
    }

    #[test]
    fn references_chain_is_extended() {
        let mut msg = parent("alice@example.com");
        msg.headers.references = Some("<root@example.com>".into());
        let env = ReplyEnvelope::for_parent(&msg).unwrap();
        assert_eq!(
            env.references.as_deref(),
            Some("<root@example.com> <abc@example.com>")
        );
    }

    #[test]
    fn missing_message_id_omits_threading_headers() {
        let mut msg = parent("alice@example.com");
        msg.headers.message_id = None;
        let env = ReplyEnvelope::for_parent(&msg).unwrap();
        assert!(env.in_reply_to.is_none());
        assert!(env.references.is_none());
    }
}
