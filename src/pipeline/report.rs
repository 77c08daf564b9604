//! Run report: per-conversation outcomes plus aggregate counts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ConversationFailure;
use crate::pipeline::types::{ReplyMode, SkipReason};

/// How a reply was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Drafted,
    Sent,
}

/// What happened to one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Responded {
        delivery: Delivery,
        answered_message_id: String,
        in_reply_to: String,
        /// `None` when unread clearing is not configured.
        #[serde(skip_serializing_if = "Option::is_none")]
        unread_cleared: Option<bool>,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        failure: ConversationFailure,
    },
    /// Stopped by shutdown before anything was delivered.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationOutcome {
    pub conversation_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ConversationOutcome {
    pub fn new(conversation_id: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            outcome,
        }
    }

    pub fn failure(&self) -> Option<&ConversationFailure> {
        match &self.outcome {
            Outcome::Failed { failure } => Some(failure),
            _ => None,
        }
    }

    /// Replied but still starred.
    pub fn is_critical(&self) -> bool {
        self.failure().is_some_and(ConversationFailure::is_critical)
    }
}

/// Summary of one processing pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: ReplyMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub responded: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub failed: usize,
    pub cancelled: usize,
    pub outcomes: Vec<ConversationOutcome>,
}

impl RunReport {
    /// Aggregate outcomes. Outcomes are sorted by conversation id, since
    /// completion order under concurrency carries no meaning.
    pub fn from_outcomes(
        run_id: Uuid,
        mode: ReplyMode,
        started_at: DateTime<Utc>,
        mut outcomes: Vec<ConversationOutcome>,
    ) -> Self {
        outcomes.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));

        let mut report = Self {
            run_id,
            mode,
            started_at,
            finished_at: Utc::now(),
            responded: 0,
            skipped: BTreeMap::new(),
            failed: 0,
            cancelled: 0,
            outcomes: Vec::new(),
        };

        for outcome in &outcomes {
            match &outcome.outcome {
                Outcome::Responded { .. } => report.responded += 1,
                Outcome::Skipped { reason } => {
                    *report.skipped.entry(*reason).or_default() += 1;
                }
                Outcome::Failed { .. } => report.failed += 1,
                Outcome::Cancelled => report.cancelled += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcome(&self, conversation_id: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.conversation_id == conversation_id)
            .map(|o| &o.outcome)
    }

    /// Conversations an operator must look at: replied but still starred.
    pub fn needs_attention(&self) -> Vec<&ConversationOutcome> {
        self.outcomes.iter().filter(|o| o.is_critical()).collect()
    }
}
