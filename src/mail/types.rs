//! Mailbox snapshot types: labels, messages, conversations.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Labels ──────────────────────────────────────────────────────────

/// Status tag on a message.
///
/// The engine only reasons about the named variants. Anything else the
/// provider attaches is carried as `Other` so snapshots round-trip.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Label {
    Unread,
    Starred,
    Sent,
    Draft,
    Inbox,
    Important,
    Spam,
    Promotions,
    Other(String),
}

impl Label {
    /// Provider-style tag name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unread => "UNREAD",
            Self::Starred => "STARRED",
            Self::Sent => "SENT",
            Self::Draft => "DRAFT",
            Self::Inbox => "INBOX",
            Self::Important => "IMPORTANT",
            Self::Spam => "SPAM",
            Self::Promotions => "CATEGORY_PROMOTIONS",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "UNREAD" => Self::Unread,
            "STARRED" => Self::Starred,
            "SENT" => Self::Sent,
            "DRAFT" => Self::Draft,
            "INBOX" => Self::Inbox,
            "IMPORTANT" => Self::Important,
            "SPAM" => Self::Spam,
            "CATEGORY_PROMOTIONS" | "PROMOTIONS" => Self::Promotions,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        match label {
            Label::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Agent identity ──────────────────────────────────────────────────

/// The address the agent sends as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    address: String,
}

impl AgentIdentity {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self {
            address: normalize_address(address.as_ref()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether a sender header belongs to the agent.
    ///
    /// Accepts both bare addresses and `Name <addr>` forms.
    pub fn matches(&self, sender: &str) -> bool {
        !self.address.is_empty() && normalize_address(sender) == self.address
    }
}

/// Extract the bare, lowercased address from a `Name <addr>` header value.
pub fn normalize_address(addr: &str) -> String {
    if let Some(start) = addr.find('<')
        && let Some(end) = addr[start..].find('>')
    {
        return addr[start + 1..start + end].trim().to_lowercase();
    }
    addr.trim().trim_matches('"').to_lowercase()
}

// ── Messages ────────────────────────────────────────────────────────

/// Headers needed to address and thread a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_unsubscribe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedence: Option<String>,
}

/// Normalized view of one email message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Provider message id, unique within its conversation.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Arrival index; breaks timestamp ties. Assigned by `Conversation::new`
    /// when the snapshot does not carry one.
    #[serde(default)]
    pub arrival: usize,
    /// `From` header value.
    pub sender: String,
    #[serde(default)]
    pub labels: BTreeSet<Label>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub headers: MessageHeaders,
}

impl MessageRecord {
    pub fn new(id: impl Into<String>, sender: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            arrival: 0,
            sender: sender.into(),
            labels: BTreeSet::new(),
            body: String::new(),
            headers: MessageHeaders::default(),
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.insert(label);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.headers.subject = Some(subject.into());
        self
    }

    pub fn with_headers(mut self, headers: MessageHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn is_unread(&self) -> bool {
        self.labels.contains(&Label::Unread)
    }

    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// Derived from the sender; never stored.
    pub fn is_from_agent(&self, identity: &AgentIdentity) -> bool {
        identity.matches(&self.sender)
    }

    /// Total order key within a conversation.
    pub fn order_key(&self) -> (DateTime<Utc>, usize) {
        (self.timestamp, self.arrival)
    }
}

// ── Conversations ───────────────────────────────────────────────────

/// Immutable snapshot of one thread, messages oldest first.
///
/// Deserialization always re-sorts, so a snapshot written in any order
/// reads back chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConversationRecord")]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<MessageRecord>,
    pub starred: bool,
}

/// Wire form of a conversation, before ordering.
#[derive(Deserialize)]
struct ConversationRecord {
    id: String,
    #[serde(default)]
    messages: Vec<MessageRecord>,
    #[serde(default)]
    starred: bool,
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        Self::new(record.id, record.messages, record.starred)
    }
}

impl Conversation {
    /// Build a conversation, ordering messages by `(timestamp, arrival)`.
    ///
    /// Messages that arrive without an arrival index get their input position.
    pub fn new(id: impl Into<String>, messages: Vec<MessageRecord>, starred: bool) -> Self {
        let mut conversation = Self {
            id: id.into(),
            messages,
            starred,
        };
        conversation.normalize();
        conversation
    }

    /// Re-establish the chronological invariant after deserialization.
    pub fn normalize(&mut self) {
        if self.messages.iter().all(|m| m.arrival == 0) {
            for (i, msg) in self.messages.iter_mut().enumerate() {
                msg.arrival = i;
            }
        }
        self.messages.sort_by_key(MessageRecord::order_key);
    }

    /// Chronologically latest message, i.e. the visible thread head.
    ///
    /// Decided by `order_key`, not list position.
    pub fn latest(&self) -> Option<&MessageRecord> {
        self.messages.iter().max_by_key(|m| m.order_key())
    }

    /// Messages oldest first by `order_key`, whatever order `messages` is in.
    pub fn chronological(&self) -> Vec<&MessageRecord> {
        let mut ordered: Vec<&MessageRecord> = self.messages.iter().collect();
        ordered.sort_by_key(|m| m.order_key());
        ordered
    }

    pub fn message(&self, id: &str) -> Option<&MessageRecord> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
