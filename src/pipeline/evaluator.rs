//! Thread eligibility: should this conversation be answered, and which
//! message is the one to answer.

use tracing::debug;

use crate::mail::types::{AgentIdentity, Conversation};
use crate::pipeline::rules::PromotionFilter;
use crate::pipeline::types::{SkipReason, Verdict};

/// Pure function of a conversation snapshot.
pub struct ThreadEvaluator {
    agent: AgentIdentity,
    promotions: Option<PromotionFilter>,
}

impl ThreadEvaluator {
    pub fn new(agent: AgentIdentity) -> Self {
        Self {
            agent,
            promotions: None,
        }
    }

    /// Skip targets the filter flags as promotional.
    pub fn with_promotion_filter(mut self, filter: PromotionFilter) -> Self {
        self.promotions = Some(filter);
        self
    }

    pub fn agent(&self) -> &AgentIdentity {
        &self.agent
    }

    /// Decide whether `conversation` needs a reply.
    ///
    /// Rules, in order:
    /// 1. not starred: `no_starred`
    /// 2. no messages: `no_unread`
    /// 3. latest message is the agent's: `latest_is_agent`
    /// 4. newest unread message not sent by the agent is the target
    /// 5. no such message: `no_unread`
    /// 6. target flagged by the promotion filter (if any): `promotional`
    pub fn evaluate(&self, conversation: &Conversation) -> Verdict {
        if !conversation.starred {
            return Verdict::skip(SkipReason::NoStarred);
        }

        let Some(latest) = conversation.latest() else {
            return Verdict::skip(SkipReason::NoUnread);
        };

        if latest.is_from_agent(&self.agent) {
            return Verdict::skip(SkipReason::LatestIsAgent);
        }

        // Newest first: older unread messages in an answered sub-thread must
        // not trigger a second reply.
        let target = conversation
            .chronological()
            .into_iter()
            .rev()
            .find(|m| m.is_unread() && !m.is_from_agent(&self.agent));

        let Some(target) = target else {
            return Verdict::skip(SkipReason::NoUnread);
        };

        if let Some(filter) = &self.promotions
            && let Some(reason) = filter.evaluate(target)
        {
            debug!(
                conversation_id = %conversation.id,
                message_id = %target.id,
                reason = %reason,
                "Target looks promotional"
            );
            return Verdict::skip(SkipReason::Promotional);
        }

        Verdict::respond(target.id.clone())
    }
}
