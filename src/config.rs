//! Configuration types.
//!
//! Everything is read from `TRIAGE_*` environment variables. Parsing goes
//! through a lookup function so tests never touch the process environment.

use std::str::FromStr;
use std::time::Duration;

use crate::compose::DEFAULT_PERSONA;
use crate::error::ConfigError;
use crate::mail::types::AgentIdentity;
use crate::pipeline::context::DEFAULT_MAX_HISTORY;
use crate::pipeline::planner::DEFAULT_COMPOSE_TIMEOUT;
use crate::pipeline::types::ReplyMode;

/// Triage run configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Send replies (`auto`) or leave drafts (`draft`).
    pub mode: ReplyMode,
    /// Max conversations processed at once.
    pub concurrency_limit: usize,
    /// Address the agent sends as.
    pub agent_identity: AgentIdentity,
    pub compose_timeout: Duration,
    /// Bound on each mail store mutation.
    pub delivery_timeout: Duration,
    /// Also drop the unread tag after unstarring.
    pub clear_unread: bool,
    /// Skip targets that look like bulk or marketing mail.
    pub skip_promotional: bool,
    /// Senders never treated as promotional.
    pub promotion_allow: Vec<String>,
    /// History entries handed to the composer.
    pub max_history: usize,
    /// Name the replies are written as.
    pub persona: String,
}

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

impl TriageConfig {
    /// Config with defaults for everything but the identity.
    pub fn new(agent_identity: AgentIdentity) -> Self {
        Self {
            mode: ReplyMode::default(),
            concurrency_limit: DEFAULT_CONCURRENCY,
            agent_identity,
            compose_timeout: DEFAULT_COMPOSE_TIMEOUT,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            clear_unread: false,
            skip_promotional: false,
            promotion_allow: Vec::new(),
            max_history: DEFAULT_MAX_HISTORY,
            persona: DEFAULT_PERSONA.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let identity = get("TRIAGE_AGENT_IDENTITY").ok_or_else(|| ConfigError::MissingRequired {
            key: "TRIAGE_AGENT_IDENTITY".to_string(),
            hint: "Set it to the address the agent replies from".to_string(),
        })?;
        let agent_identity = AgentIdentity::new(&identity);
        if agent_identity.address().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_AGENT_IDENTITY".to_string(),
                message: format!("'{identity}' has no address"),
            });
        }

        let mut config = Self::new(agent_identity);

        if let Some(mode) = get("TRIAGE_MODE") {
            config.mode = mode.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TRIAGE_MODE".to_string(),
                message: format!("expected 'auto' or 'draft', got '{mode}'"),
            })?;
        }

        if let Some(limit) = parse::<usize>(&get, "TRIAGE_CONCURRENCY")? {
            if limit == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "TRIAGE_CONCURRENCY".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
            config.concurrency_limit = limit;
        }

        if let Some(secs) = parse::<u64>(&get, "TRIAGE_COMPOSE_TIMEOUT_SECS")? {
            config.compose_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse::<u64>(&get, "TRIAGE_DELIVERY_TIMEOUT_SECS")? {
            config.delivery_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(flag) = parse_bool(&get, "TRIAGE_CLEAR_UNREAD")? {
            config.clear_unread = flag;
        }
        if let Some(flag) = parse_bool(&get, "TRIAGE_SKIP_PROMOTIONAL")? {
            config.skip_promotional = flag;
        }
        if let Some(max) = parse::<usize>(&get, "TRIAGE_MAX_HISTORY")? {
            config.max_history = max.max(1);
        }
        if let Some(persona) = get("TRIAGE_PERSONA") {
            config.persona = persona;
        }

        config.promotion_allow = get("TRIAGE_PROMOTION_ALLOW")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(config)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            })
        })
        .transpose()
}

fn parse_bool(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<bool>, ConfigError> {
    get(key)
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got '{raw}'"),
            }),
        })
        .transpose()
}
