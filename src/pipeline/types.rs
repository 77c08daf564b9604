//! Shared types for the thread-state pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ── Mode ────────────────────────────────────────────────────────────

/// What to do with a composed reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Send immediately.
    Auto,
    /// Leave a draft for human review.
    #[default]
    Draft,
}

impl ReplyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Draft => "draft",
        }
    }
}

impl fmt::Display for ReplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "draft" => Ok(Self::Draft),
            other => Err(ConfigError::InvalidValue {
                key: "mode".to_string(),
                message: format!("expected 'auto' or 'draft', got '{other}'"),
            }),
        }
    }
}

// ── Verdict ─────────────────────────────────────────────────────────

/// Why a conversation was not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoStarred,
    LatestIsAgent,
    NoUnread,
    /// Target looks like bulk or marketing mail. Only with the promotion filter on.
    Promotional,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoStarred => "no_starred",
            Self::LatestIsAgent => "latest_is_agent",
            Self::NoUnread => "no_unread",
            Self::Promotional => "promotional",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Evaluator output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Skip { reason: SkipReason },
    Respond { target_message_id: String },
}

impl Verdict {
    pub fn skip(reason: SkipReason) -> Self {
        Self::Skip { reason }
    }

    pub fn respond(target_message_id: impl Into<String>) -> Self {
        Self::Respond {
            target_message_id: target_message_id.into(),
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Respond { target_message_id } => Some(target_message_id),
            Self::Skip { .. } => None,
        }
    }
}

// ── Reply context ───────────────────────────────────────────────────

/// One message of thread history as the composer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub sender: String,
    pub body: String,
    pub from_agent: bool,
}

/// Everything the composer needs to write a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyContext {
    pub conversation_id: String,
    pub target_message_id: String,
    /// Chronologically latest message; replies are threaded under it.
    pub thread_head_id: String,
    pub subject: String,
    pub sender_identity: String,
    pub target_body: String,
    /// Oldest first, ends with the target.
    pub prior_history: Vec<HistoryEntry>,
    /// Left for the composer to detect.
    pub language_hint: Option<String>,
}

// ── Action plan ─────────────────────────────────────────────────────

/// A composed reply ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedReply {
    pub text: String,
    /// Conversation's latest message id at planning time.
    pub in_reply_to: String,
    /// The message the reply actually answers.
    pub answered_message_id: String,
}

/// Why a plan carries no action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NoActionReason {
    Skipped(SkipReason),
    ComposeFailed(String),
    MissingContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    CreateDraft(PlannedReply),
    SendReply(PlannedReply),
    NoAction { reason: NoActionReason },
}

/// Idempotency step run after a confirmed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUp {
    RemoveStar,
    ClearUnread,
}

/// Planner output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionPlan {
    pub action: PlannedAction,
    pub follow_ups: Vec<FollowUp>,
}

impl ActionPlan {
    pub fn no_action(reason: NoActionReason) -> Self {
        Self {
            action: PlannedAction::NoAction { reason },
            follow_ups: Vec::new(),
        }
    }

    pub fn reply(&self) -> Option<&PlannedReply> {
        match &self.action {
            PlannedAction::CreateDraft(reply) | PlannedAction::SendReply(reply) => Some(reply),
            PlannedAction::NoAction { .. } => None,
        }
    }

    pub fn is_no_action(&self) -> bool {
        matches!(self.action, PlannedAction::NoAction { .. })
    }
}
