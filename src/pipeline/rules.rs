//! Promotional-mail rules engine.
//!
//! Fast regex checks that flag bulk and marketing mail so the agent does
//! not answer newsletters someone happened to star:
//! - `List-Unsubscribe` header present
//! - `Precedence: bulk|list|junk`
//! - provider promotions category
//! - noreply and marketing senders
//! - promotional subject keywords
//!
//! Off unless `skip_promotional` is configured.

use regex::Regex;
use tracing::debug;

use crate::mail::types::{Label, MessageRecord};

/// Which message field a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    Sender,
    Subject,
    Body,
    ListUnsubscribe,
    Precedence,
}

/// A single promotional rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct PromotionRule {
    /// Human-readable pattern description.
    pub pattern: String,
    pub regex: Regex,
    pub field: RuleField,
    /// Why this rule triggers.
    pub reason: String,
}

/// Detects promotional mail.
pub struct PromotionFilter {
    rules: Vec<PromotionRule>,
    /// Senders that are never treated as promotional.
    allow_patterns: Vec<Regex>,
}

impl PromotionFilter {
    /// Filter with the default bulk/marketing heuristics.
    pub fn default_rules() -> Self {
        let rule = |pattern: &str, regex: &str, field: RuleField, reason: &str| PromotionRule {
            pattern: pattern.into(),
            regex: Regex::new(regex).expect("valid regex"),
            field,
            reason: reason.into(),
        };

        let rules = vec![
            rule(
                "List-Unsubscribe",
                r"\S",
                RuleField::ListUnsubscribe,
                "mailing list (List-Unsubscribe header)",
            ),
            rule(
                "Precedence: bulk",
                r"(?i)^\s*(bulk|list|junk)\s*$",
                RuleField::Precedence,
                "bulk precedence header",
            ),
            rule(
                "noreply@*",
                r"(?i)(^|<)no[\-_.]?reply@",
                RuleField::Sender,
                "noreply sender",
            ),
            rule(
                "*@marketing.*",
                r"(?i)@(marketing|newsletter|promo|campaign)\b",
                RuleField::Sender,
                "marketing/newsletter sender",
            ),
            rule(
                "promotional subject",
                r"(?i)\b(sale|discount|offer|promotion|newsletter|marketing|deal|coupon|save|limited time)\b",
                RuleField::Subject,
                "promotional subject",
            ),
            rule(
                "unsubscribe footer",
                r"(?i)(click here to unsubscribe|manage your subscription|email preferences|opt[- ]?out)",
                RuleField::Body,
                "bulk/marketing email (unsubscribe footer)",
            ),
        ];

        Self {
            rules,
            allow_patterns: Vec::new(),
        }
    }

    /// Filter with no rules (only the promotions label still applies).
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            allow_patterns: Vec::new(),
        }
    }

    /// Add a sender pattern that is never treated as promotional.
    pub fn add_allow(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.allow_patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    /// Add a custom rule.
    pub fn add_rule(
        &mut self,
        pattern: &str,
        field: RuleField,
        reason: &str,
    ) -> Result<(), regex::Error> {
        self.rules.push(PromotionRule {
            pattern: pattern.into(),
            regex: Regex::new(pattern)?,
            field,
            reason: reason.into(),
        });
        Ok(())
    }

    /// Returns the reason when `message` looks promotional.
    pub fn evaluate(&self, message: &MessageRecord) -> Option<String> {
        if self
            .allow_patterns
            .iter()
            .any(|r| r.is_match(&message.sender))
        {
            debug!(sender = %message.sender, "Sender is allow-listed, skipping promotion rules");
            return None;
        }

        if message.has_label(&Label::Promotions) {
            return Some("promotions category".to_string());
        }

        for rule in &self.rules {
            let field_value = match rule.field {
                RuleField::Sender => Some(message.sender.as_str()),
                RuleField::Subject => message.headers.subject.as_deref(),
                RuleField::Body => Some(message.body.as_str()),
                RuleField::ListUnsubscribe => message.headers.list_unsubscribe.as_deref(),
                RuleField::Precedence => message.headers.precedence.as_deref(),
            };
            let Some(value) = field_value else {
                continue;
            };

            if rule.regex.is_match(value) {
                debug!(
                    message_id = %message.id,
                    rule = %rule.pattern,
                    reason = %rule.reason,
                    "Message matched promotion rule"
                );
                return Some(rule.reason.clone());
            }
        }

        None
    }
}
