//! Thread-state pipeline.
//!
//! Every starred conversation flows through:
//! 1. `ThreadEvaluator::evaluate()`: eligibility and target message (pure)
//! 2. `ContextBuilder::build()`: subject, sender, cleaned history (pure)
//! 3. `ActionPlanner::plan()`: compose the reply, pick draft or send
//! 4. `ThreadProcessor`: deliver, then unstar (and optionally mark read)
//!
//! Nothing is cached between runs. "Already replied" is re-derived from the
//! snapshot every time, so re-running on an unchanged mailbox is safe.

pub mod context;
pub mod evaluator;
pub mod planner;
pub mod processor;
pub mod report;
pub mod rules;
pub mod types;

pub use context::ContextBuilder;
pub use evaluator::ThreadEvaluator;
pub use planner::ActionPlanner;
pub use processor::ThreadProcessor;
pub use report::{ConversationOutcome, Delivery, Outcome, RunReport};
pub use rules::PromotionFilter;
pub use types::{
    ActionPlan, FollowUp, HistoryEntry, NoActionReason, PlannedAction, PlannedReply, ReplyContext,
    ReplyMode, SkipReason, Verdict,
};
