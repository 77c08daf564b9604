//! Error types for star-triage.

use std::time::Duration;

use serde::Serialize;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail store errors.
///
/// The core does not retry either kind; the distinction only reaches the
/// report so an operator can tell a flaky provider from a broken request.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("{operation} failed (transient): {reason}")]
    Transient { operation: String, reason: String },

    #[error("{operation} failed: {reason}")]
    Permanent { operation: String, reason: String },

    #[error("Conversation {id} not found")]
    ConversationNotFound { id: String },

    #[error("Message {message_id} not found in conversation {conversation_id}")]
    MessageNotFound {
        conversation_id: String,
        message_id: String,
    },

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl MailError {
    /// Whether the collaborator reported this failure as retryable.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reply composition errors. All of them abort the conversation with no action.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Target message has no readable content")]
    EmptyInput,

    #[error("Composer returned an empty reply")]
    EmptyReply,

    #[error("Composer timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Context extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Target message {message_id} not found in conversation {conversation_id}")]
    TargetNotFound {
        conversation_id: String,
        message_id: String,
    },
}

/// Batch-level errors. Only a failed listing stops a run once it started.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Listing starred conversations failed: {0}")]
    Listing(#[source] MailError),

    #[error("Invalid promotion rule: {0}")]
    InvalidRule(String),
}

/// Per-conversation failure, recorded in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationFailure {
    /// Composer failed or timed out. Nothing was sent and the star is kept.
    #[error("compose failed: {reason}")]
    Compose { reason: String },

    /// Target could not be turned into a reply context.
    #[error("context unavailable: {reason}")]
    Context { reason: String },

    /// Draft/send failed. The star is left in place so the next run retries.
    #[error("delivery failed: {reason}")]
    Delivery { reason: String, transient: bool },

    /// Reply went out but the star could not be removed.
    #[error("reply delivered but star removal failed: {reason}")]
    Idempotency { reason: String },
}

impl ConversationFailure {
    /// A delivered-but-still-starred conversation will be answered again on
    /// the next run unless someone intervenes.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Idempotency { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_mail_errors_are_flagged() {
        let err = MailError::Transient {
            operation: "send_reply".into(),
            reason: "503".into(),
        };
        assert!(err.is_transient());
        assert!(err.to_string().contains("transient"));

        let err = MailError::Permanent {
            operation: "send_reply".into(),
            reason: "400".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn only_idempotency_failures_are_critical() {
        assert!(ConversationFailure::Idempotency { reason: "x".into() }.is_critical());
        assert!(!ConversationFailure::Compose { reason: "x".into() }.is_critical());
        assert!(
            !ConversationFailure::Delivery {
                reason: "x".into(),
                transient: true
            }
            .is_critical()
        );
    }

    #[test]
    fn conversation_failure_serializes_with_kind_tag() {
        let json = serde_json::to_value(ConversationFailure::Delivery {
            reason: "timeout".into(),
            transient: true,
        })
        .unwrap();
        assert_eq!(json["kind"], "delivery");
        assert_eq!(json["transient"], true);
    }
}
