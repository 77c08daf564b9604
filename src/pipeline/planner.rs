//! Action planning: turn a verdict and context into a deliverable plan.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::compose::ReplyComposer;
use crate::error::ComposeError;
use crate::pipeline::types::{
    ActionPlan, FollowUp, NoActionReason, PlannedAction, PlannedReply, ReplyContext, ReplyMode,
    Verdict,
};

/// Default bound on a single compose call.
pub const DEFAULT_COMPOSE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ActionPlanner {
    composer: Arc<dyn ReplyComposer>,
    compose_timeout: Duration,
    clear_unread: bool,
}

impl ActionPlanner {
    pub fn new(composer: Arc<dyn ReplyComposer>) -> Self {
        Self {
            composer,
            compose_timeout: DEFAULT_COMPOSE_TIMEOUT,
            clear_unread: false,
        }
    }

    pub fn with_compose_timeout(mut self, timeout: Duration) -> Self {
        self.compose_timeout = timeout;
        self
    }

    /// Also drop the unread tag once the star is gone.
    pub fn with_clear_unread(mut self, clear_unread: bool) -> Self {
        self.clear_unread = clear_unread;
        self
    }

    /// Never fails; compose problems become `NoAction(ComposeFailed)`.
    ///
    /// The reply is threaded under `context.thread_head_id`, which is not
    /// necessarily the message being answered.
    pub async fn plan(
        &self,
        verdict: &Verdict,
        context: Option<&ReplyContext>,
        mode: ReplyMode,
    ) -> ActionPlan {
        let target_id = match verdict {
            Verdict::Skip { reason } => {
                return ActionPlan::no_action(NoActionReason::Skipped(*reason));
            }
            Verdict::Respond { target_message_id } => target_message_id,
        };

        let Some(context) = context.filter(|c| &c.target_message_id == target_id) else {
            warn!(message_id = %target_id, "No reply context for target");
            return ActionPlan::no_action(NoActionReason::MissingContext);
        };

        let text = match self.compose(context).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    conversation_id = %context.conversation_id,
                    message_id = %target_id,
                    error = %e,
                    "Reply composition failed"
                );
                return ActionPlan::no_action(NoActionReason::ComposeFailed(e.to_string()));
            }
        };

        let reply = PlannedReply {
            text,
            in_reply_to: context.thread_head_id.clone(),
            answered_message_id: target_id.clone(),
        };

        let action = match mode {
            ReplyMode::Draft => PlannedAction::CreateDraft(reply),
            ReplyMode::Auto => PlannedAction::SendReply(reply),
        };

        let mut follow_ups = vec![FollowUp::RemoveStar];
        if self.clear_unread {
            follow_ups.push(FollowUp::ClearUnread);
        }

        ActionPlan { action, follow_ups }
    }

    async fn compose(&self, context: &ReplyContext) -> Result<String, ComposeError> {
        let text = tokio::time::timeout(self.compose_timeout, self.composer.compose(context))
            .await
            .map_err(|_| ComposeError::Timeout(self.compose_timeout))??;

        let text = text.trim();
        if text.is_empty() {
            return Err(ComposeError::EmptyReply);
        }
        Ok(text.to_string())
    }
}
