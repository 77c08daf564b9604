//! Thread processor: runs every starred conversation through
//! evaluate, build context, compose, plan, deliver, follow up.
//!
//! Conversations are independent. A failure in one is recorded in the
//! report and never stops the batch; only a failed listing does.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::compose::ReplyComposer;
use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_DELIVERY_TIMEOUT, TriageConfig};
use crate::error::{ConversationFailure, MailError, PipelineError};
use crate::mail::store::MailStore;
use crate::mail::types::{AgentIdentity, Conversation};
use crate::pipeline::context::ContextBuilder;
use crate::pipeline::evaluator::ThreadEvaluator;
use crate::pipeline::planner::ActionPlanner;
use crate::pipeline::report::{ConversationOutcome, Delivery, Outcome, RunReport};
use crate::pipeline::rules::PromotionFilter;
use crate::pipeline::types::{FollowUp, NoActionReason, PlannedAction, ReplyMode, Verdict};

pub struct ThreadProcessor {
    store: Arc<dyn MailStore>,
    evaluator: ThreadEvaluator,
    contexts: ContextBuilder,
    planner: ActionPlanner,
    mode: ReplyMode,
    concurrency_limit: usize,
    delivery_timeout: Duration,
    shutdown: Arc<AtomicBool>,
}

impl ThreadProcessor {
    /// Processor with default limits; tune with the `with_*` builders.
    pub fn new(
        store: Arc<dyn MailStore>,
        composer: Arc<dyn ReplyComposer>,
        agent: AgentIdentity,
    ) -> Self {
        Self {
            store,
            evaluator: ThreadEvaluator::new(agent.clone()),
            contexts: ContextBuilder::new(agent),
            planner: ActionPlanner::new(composer),
            mode: ReplyMode::default(),
            concurrency_limit: DEFAULT_CONCURRENCY,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Processor wired from a full configuration.
    pub fn from_config(
        config: &TriageConfig,
        store: Arc<dyn MailStore>,
        composer: Arc<dyn ReplyComposer>,
    ) -> Result<Self, PipelineError> {
        let agent = config.agent_identity.clone();

        let mut evaluator = ThreadEvaluator::new(agent.clone());
        if config.skip_promotional {
            let mut filter = PromotionFilter::default_rules();
            for sender in &config.promotion_allow {
                filter
                    .add_allow(&format!("(?i){}", regex::escape(sender)))
                    .map_err(|e| PipelineError::InvalidRule(e.to_string()))?;
            }
            evaluator = evaluator.with_promotion_filter(filter);
        }

        let planner = ActionPlanner::new(Arc::clone(&composer))
            .with_compose_timeout(config.compose_timeout)
            .with_clear_unread(config.clear_unread);

        let mut processor = Self::new(store, composer, agent.clone())
            .with_evaluator(evaluator)
            .with_planner(planner)
            .with_mode(config.mode)
            .with_concurrency_limit(config.concurrency_limit)
            .with_delivery_timeout(config.delivery_timeout);
        processor.contexts = ContextBuilder::new(agent).with_max_history(config.max_history);
        Ok(processor)
    }

    pub fn with_mode(mut self, mode: ReplyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_planner(mut self, planner: ActionPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_evaluator(mut self, evaluator: ThreadEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Share a shutdown flag. Once set, no new conversation is started and
    /// in-flight ones stop at their next checkpoint before delivery.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Handle to the shutdown flag.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// List starred conversations and process them.
    pub async fn run_once(&self) -> Result<RunReport, PipelineError> {
        let conversations = self
            .store
            .list_starred_conversations()
            .await
            .map_err(|e| {
                error!(
                    store = self.store.name(),
                    error = %e,
                    "Listing starred conversations failed"
                );
                PipelineError::Listing(e)
            })?;
        Ok(self.run(conversations).await)
    }

    /// Process a batch of conversation snapshots.
    pub async fn run(&self, conversations: Vec<Conversation>) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        // One pipeline per conversation id.
        let mut seen = HashSet::new();
        let conversations: Vec<_> = conversations
            .into_iter()
            .filter(|c| {
                let first = seen.insert(c.id.clone());
                if !first {
                    warn!(conversation_id = %c.id, "Duplicate conversation in batch, ignoring");
                }
                first
            })
            .collect();

        info!(
            %run_id,
            count = conversations.len(),
            mode = %self.mode,
            store = self.store.name(),
            "Processing starred conversations"
        );

        let outcomes: Vec<ConversationOutcome> = futures::stream::iter(conversations)
            .map(|conversation| self.process(conversation))
            .buffer_unordered(self.concurrency_limit)
            .collect()
            .await;

        let report = RunReport::from_outcomes(run_id, self.mode, started_at, outcomes);

        info!(
            %run_id,
            responded = report.responded,
            skipped = report.skipped.values().sum::<usize>(),
            failed = report.failed,
            cancelled = report.cancelled,
            "Run complete"
        );
        for flagged in report.needs_attention() {
            error!(
                conversation_id = %flagged.conversation_id,
                "Replied but still starred; will be answered again on the next run"
            );
        }

        report
    }

    /// Process one conversation. Never fails; every problem is an outcome.
    pub async fn process(&self, conversation: Conversation) -> ConversationOutcome {
        let id = conversation.id.clone();
        let outcome = self.process_inner(&conversation).await;
        ConversationOutcome::new(id, outcome)
    }

    async fn process_inner(&self, conversation: &Conversation) -> Outcome {
        let id = conversation.id.as_str();

        if self.is_shutting_down() {
            return Outcome::Cancelled;
        }

        let verdict = self.evaluator.evaluate(conversation);
        let target_id = match &verdict {
            Verdict::Skip { reason } => {
                debug!(conversation_id = %id, reason = %reason, "Skipping conversation");
                return Outcome::Skipped { reason: *reason };
            }
            Verdict::Respond { target_message_id } => target_message_id.as_str(),
        };

        let context = match self.contexts.build(conversation, target_id) {
            Ok(context) => context,
            Err(e) => {
                warn!(conversation_id = %id, error = %e, "Could not build reply context");
                return Outcome::Failed {
                    failure: ConversationFailure::Context {
                        reason: e.to_string(),
                    },
                };
            }
        };

        if self.is_shutting_down() {
            return Outcome::Cancelled;
        }

        let plan = self.planner.plan(&verdict, Some(&context), self.mode).await;
        let (delivery, reply) = match &plan.action {
            PlannedAction::CreateDraft(reply) => (Delivery::Drafted, reply),
            PlannedAction::SendReply(reply) => (Delivery::Sent, reply),
            PlannedAction::NoAction { reason } => return no_action_outcome(reason),
        };

        if self.is_shutting_down() {
            return Outcome::Cancelled;
        }

        let delivered = match delivery {
            Delivery::Drafted => {
                self.bounded(
                    "create_draft",
                    self.store.create_draft(id, &reply.text, &reply.in_reply_to),
                )
                .await
            }
            Delivery::Sent => {
                self.bounded(
                    "send_reply",
                    self.store.send_reply(id, &reply.text, &reply.in_reply_to),
                )
                .await
            }
        };
        if let Err(e) = delivered {
            warn!(
                conversation_id = %id,
                transient = e.is_transient(),
                error = %e,
                "Reply delivery failed, star left in place"
            );
            return Outcome::Failed {
                failure: ConversationFailure::Delivery {
                    reason: e.to_string(),
                    transient: e.is_transient(),
                },
            };
        }

        info!(
            conversation_id = %id,
            message_id = %reply.answered_message_id,
            in_reply_to = %reply.in_reply_to,
            delivery = ?delivery,
            "Reply delivered"
        );

        // Past this point the reply exists; follow-ups run regardless of shutdown.
        let mut unread_cleared = None;
        for follow_up in &plan.follow_ups {
            match follow_up {
                FollowUp::RemoveStar => {
                    if let Err(e) = self
                        .bounded("remove_star", self.store.remove_star(id))
                        .await
                    {
                        error!(
                            conversation_id = %id,
                            error = %e,
                            "Reply delivered but star removal failed"
                        );
                        return Outcome::Failed {
                            failure: ConversationFailure::Idempotency {
                                reason: e.to_string(),
                            },
                        };
                    }
                }
                FollowUp::ClearUnread => {
                    let cleared = self.bounded("mark_read", self.store.mark_read(id)).await;
                    if let Err(ref e) = cleared {
                        warn!(conversation_id = %id, error = %e, "Could not clear unread tag");
                    }
                    unread_cleared = Some(cleared.is_ok());
                }
            }
        }

        Outcome::Responded {
            delivery,
            answered_message_id: reply.answered_message_id.clone(),
            in_reply_to: reply.in_reply_to.clone(),
            unread_cleared,
        }
    }

    /// Apply the delivery timeout to a store call.
    async fn bounded<F>(&self, operation: &str, call: F) -> Result<(), MailError>
    where
        F: Future<Output = Result<(), MailError>>,
    {
        tokio::time::timeout(self.delivery_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(MailError::Transient {
                    operation: operation.to_string(),
                    reason: format!("timed out after {:?}", self.delivery_timeout),
                })
            })
    }
}

fn no_action_outcome(reason: &NoActionReason) -> Outcome {
    match reason {
        NoActionReason::Skipped(reason) => Outcome::Skipped { reason: *reason },
        NoActionReason::ComposeFailed(message) => Outcome::Failed {
            failure: ConversationFailure::Compose {
                reason: message.clone(),
            },
        },
        NoActionReason::MissingContext => Outcome::Failed {
            failure: ConversationFailure::Context {
                reason: "no context for target".to_string(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComposeError;
    use crate::mail::memory::{InMemoryMailStore, MailOperation};
    use crate::mail::types::{Label, MessageRecord};
    use crate::pipeline::types::{ReplyContext, SkipReason};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};

    const AGENT: &str = "agent@example.com";
    const USER: &str = "alice@example.com";

    struct EchoComposer;

    #[async_trait]
    impl ReplyComposer for EchoComposer {
        async fn compose(&self, context: &ReplyContext) -> Result<String, ComposeError> {
            Ok(format!("Re: {}", context.target_body))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn eligible(id: &str) -> Conversation {
        Conversation::new(
            id,
            vec![
                MessageRecord::new("m1", AGENT, at(0)).with_body("Hello"),
                MessageRecord::new("m2", USER, at(10))
                    .with_label(Label::Unread)
                    .with_body("Question?"),
            ],
            true,
        )
    }

    fn processor(store: Arc<InMemoryMailStore>) -> ThreadProcessor {
        ThreadProcessor::new(store, Arc::new(EchoComposer), AgentIdentity::new(AGENT))
    }

    fn store(conversations: Vec<Conversation>) -> Arc<InMemoryMailStore> {
        Arc::new(InMemoryMailStore::new(AgentIdentity::new(AGENT), conversations))
    }

    #[tokio::test]
    async fn draft_then_unstar() {
        let store = store(vec![eligible("t1")]);
        let report = processor(store.clone()).run_once().await.unwrap();

        assert_eq!(report.responded, 1);
        let ops: Vec<_> = store
            .mutation_calls()
            .await
            .into_iter()
            .map(|c| c.operation)
            .collect();
        assert_eq!(ops, [MailOperation::CreateDraft, MailOperation::RemoveStar]);
        assert!(!store.conversation("t1").await.unwrap().starred);
    }

    #[tokio::test]
    async fn delivery_failure_keeps_star() {
        let store = store(vec![eligible("t1")]);
        store.fail(MailOperation::CreateDraft, "t1", true).await;

        let report = processor(store.clone()).run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(matches!(
            report.outcome("t1"),
            Some(Outcome::Failed {
                failure: ConversationFailure::Delivery { transient: true, .. }
            })
        ));
        assert!(store.conversation("t1").await.unwrap().starred);
        assert!(report.needs_attention().is_empty());
    }

    #[tokio::test]
    async fn unstar_failure_needs_attention() {
        let store = store(vec![eligible("t1")]);
        store.fail(MailOperation::RemoveStar, "t1", false).await;

        let report = processor(store.clone())
            .with_mode(ReplyMode::Auto)
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.needs_attention().len(), 1);
        assert_eq!(store.outbox().await.len(), 1);
    }

    #[tokio::test]
    async fn clear_unread_failure_is_not_fatal() {
        let store = store(vec![eligible("t1")]);
        store.fail(MailOperation::MarkRead, "t1", true).await;

        let planner = ActionPlanner::new(Arc::new(EchoComposer)).with_clear_unread(true);
        let report = processor(store.clone())
            .with_planner(planner)
            .run_once()
            .await
            .unwrap();

        assert!(matches!(
            report.outcome("t1"),
            Some(Outcome::Responded {
                unread_cleared: Some(false),
                ..
            })
        ));
        assert!(!store.conversation("t1").await.unwrap().starred);
    }

    #[tokio::test]
    async fn shutdown_before_run_cancels_everything() {
        let store = store(vec![eligible("t1"), eligible("t2")]);
        let processor = processor(store.clone());
        processor.shutdown_flag().store(true, Ordering::Relaxed);

        let report = processor.run_once().await.unwrap();
        assert_eq!(report.cancelled, 2);
        assert!(store.mutation_calls().await.is_empty());
    }

    #[tokio::test]
    async fn listing_failure_is_fatal() {
        let store = store(vec![eligible("t1")]);
        store.fail_listing().await;
        let result = processor(store).run_once().await;
        assert!(matches!(result, Err(PipelineError::Listing(_))));
    }

    #[tokio::test]
    async fn duplicate_conversations_processed_once() {
        let store = store(vec![eligible("t1")]);
        let report = processor(store.clone())
            .run(vec![eligible("t1"), eligible("t1")])
            .await;
        assert_eq!(report.total(), 1);
        assert_eq!(store.mutation_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn slow_delivery_times_out() {
        let store = Arc::new(
            InMemoryMailStore::new(AgentIdentity::new(AGENT), vec![eligible("t1")])
                .with_delivery_latency(Duration::from_millis(500)),
        );
        let report = processor(store.clone())
            .with_delivery_timeout(Duration::from_millis(20))
            .run_once()
            .await
            .unwrap();
        assert!(matches!(
            report.outcome("t1"),
            Some(Outcome::Failed {
                failure: ConversationFailure::Delivery { transient: true, .. }
            })
        ));
        let ops: Vec<_> = store
            .mutation_calls()
            .await
            .into_iter()
            .map(|c| c.operation)
            .collect();
        assert_eq!(ops, [MailOperation::CreateDraft]);
    }

    #[tokio::test]
    async fn promotional_skip_from_config() {
        let mut newsletter = eligible("t1");
        newsletter.messages[1].headers.list_unsubscribe = Some("<mailto:x@y.com>".into());
        let store = store(vec![newsletter]);

        let mut config = TriageConfig::new(AgentIdentity::new(AGENT));
        config.skip_promotional = true;
        let processor =
            ThreadProcessor::from_config(&config, store.clone(), Arc::new(EchoComposer)).unwrap();

        let report = processor.run_once().await.unwrap();
        assert_eq!(report.skipped_for(SkipReason::Promotional), 1);
        assert!(store.mutation_calls().await.is_empty());
    }
}
