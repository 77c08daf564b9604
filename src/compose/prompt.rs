//! Prompt construction for reply composition.

use crate::pipeline::types::ReplyContext;

/// History entries shown to the model, newest kept.
const HISTORY_IN_PROMPT: usize = 5;

/// Per-entry preview length in characters.
const HISTORY_PREVIEW_CHARS: usize = 400;

/// Target body length in characters.
const TARGET_BODY_CHARS: usize = 4000;

/// Build the persona system prompt.
pub fn build_reply_system_prompt(persona: &str) -> String {
    format!(
        "You are {persona}, a helpful and professional assistant replying to an email \
         on behalf of the mailbox owner.\n\n\
         Your reply should be:\n\
         - Complete and helpful, at least 3-5 sentences for most emails\n\
         - Warm and friendly, professional but conversational\n\
         - Solution-oriented\n\
         - Written in the same language as the email you are answering\n\n\
         When replying:\n\
         1. For a question, answer it thoroughly, with steps or examples when relevant\n\
         2. For a request, acknowledge it clearly and state the next steps\n\
         3. For a statement or update, acknowledge it appropriately\n\
         4. Stay positive even when addressing problems\n\
         5. Match greeting and sign-off to the formality of the email\n\n\
         Output ONLY the reply body. No subject line, no quoted text, no commentary."
    )
}

/// Build the user prompt from a reply context.
pub fn build_reply_user_prompt(context: &ReplyContext) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(&format!("Subject: {}\n", context.subject));
    prompt.push_str(&format!("From: {}\n", context.sender_identity));
    if let Some(ref language) = context.language_hint {
        prompt.push_str(&format!("Language: {}\n", language));
    }

    // Everything before the target; the target itself is printed in full below.
    let earlier = context.prior_history.len().saturating_sub(1);
    let history = &context.prior_history[..earlier];
    if !history.is_empty() {
        prompt.push_str("\nEarlier in the thread:\n");
        let skip = history.len().saturating_sub(HISTORY_IN_PROMPT);
        for entry in &history[skip..] {
            let who = if entry.from_agent {
                "you".to_string()
            } else {
                entry.sender.clone()
            };
            let preview: String = entry.body.chars().take(HISTORY_PREVIEW_CHARS).collect();
            prompt.push_str(&format!("  [{}]: {}\n", who, preview));
        }
    }

    let body: String = context.target_body.chars().take(TARGET_BODY_CHARS).collect();
    prompt.push_str(&format!("\nEmail to answer:\n{}", body));

    prompt
}
