//! Reply composition.
//!
//! `ReplyComposer` is the seam the planner depends on. `LlmComposer` is the
//! shipped implementation: persona system prompt plus thread context, sent
//! through any `LlmProvider`.

pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ComposeError;
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::pipeline::types::ReplyContext;

pub use prompt::{build_reply_system_prompt, build_reply_user_prompt};

/// Default persona the replies are signed as.
pub const DEFAULT_PERSONA: &str = "Sofia";

/// Max tokens for a reply. Replies are a few paragraphs at most.
const REPLY_MAX_TOKENS: u32 = 1000;

const REPLY_TEMPERATURE: f32 = 0.7;

/// Produces reply text for a context.
///
/// Implementations return non-empty prose in the language of
/// `context.target_body`. Timeouts are applied by the caller.
#[async_trait]
pub trait ReplyComposer: Send + Sync {
    async fn compose(&self, context: &ReplyContext) -> Result<String, ComposeError>;
}

/// Composer backed by a chat completion model.
pub struct LlmComposer {
    llm: Arc<dyn LlmProvider>,
    persona: String,
}

impl LlmComposer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            persona: DEFAULT_PERSONA.to_string(),
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }
}

#[async_trait]
impl ReplyComposer for LlmComposer {
    async fn compose(&self, context: &ReplyContext) -> Result<String, ComposeError> {
        if context.target_body.trim().is_empty() {
            return Err(ComposeError::EmptyInput);
        }

        let messages = vec![
            ChatMessage::system(build_reply_system_prompt(&self.persona)),
            ChatMessage::user(build_reply_user_prompt(context)),
        ];
        let request = CompletionRequest::new(messages)
            .with_temperature(REPLY_TEMPERATURE)
            .with_max_tokens(REPLY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;

        debug!(
            conversation_id = %context.conversation_id,
            model = self.llm.model_name(),
            output_tokens = response.output_tokens,
            truncated = response.finish_reason == FinishReason::Length,
            "Reply composed"
        );

        let reply = response.content.trim();
        if reply.is_empty() {
            return Err(ComposeError::EmptyReply);
        }
        Ok(reply.to_string())
    }
}
