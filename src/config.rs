//! Client configuration
//!
//! Everything is read from the environment; unset or unparseable values fall
//! back to defaults.

use crate::protocol::OutboundMessage;
use crate::state_machine::ConvContext;
use crate::transport::{TransportConfig, DEFAULT_RETRY_INTERVAL};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_URL: &str = "ws://localhost:8002/ws";
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_COMPANY_NAME: &str = "demo";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown dedup strategy `{0}` (expected `debounce` or `exchange`)")]
    UnknownDedup(String),
}

/// How repeated success responses are suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupStrategy {
    /// Ignore success responses for a short window after one is applied
    #[default]
    Debounce,
    /// Apply a success response only while an exchange awaits its reply
    ActiveExchange,
}

impl FromStr for DedupStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debounce" => Ok(Self::Debounce),
            "exchange" | "active_exchange" | "active-exchange" => Ok(Self::ActiveExchange),
            other => Err(ConfigError::UnknownDedup(other.to_string())),
        }
    }
}

/// Tenant and room identifiers attached to every prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub company_id: String,
    pub chat_room_id: String,
    pub company_name: String,
    pub user_id: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            company_id: String::new(),
            chat_room_id: String::new(),
            company_name: DEFAULT_COMPANY_NAME.to_string(),
            user_id: String::new(),
        }
    }
}

impl SessionContext {
    pub fn outbound(&self, prompt: impl Into<String>) -> OutboundMessage {
        OutboundMessage {
            prompt: prompt.into(),
            company_id: self.company_id.clone(),
            chat_room_id: self.chat_room_id.clone(),
            company_name: self.company_name.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub url: String,
    pub retry_interval: Duration,
    pub debounce: Duration,
    pub dedup: DedupStrategy,
    pub session: SessionContext,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            dedup: DedupStrategy::default(),
            session: SessionContext::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let session = SessionContext {
            company_id: lookup("AGENT_CHAT_COMPANY_ID").unwrap_or(defaults.session.company_id),
            chat_room_id: lookup("AGENT_CHAT_ROOM_ID").unwrap_or(defaults.session.chat_room_id),
            company_name: lookup("AGENT_CHAT_COMPANY_NAME")
                .unwrap_or(defaults.session.company_name),
            user_id: lookup("AGENT_CHAT_USER_ID").unwrap_or(defaults.session.user_id),
        };

        Self {
            url: lookup("AGENT_CHAT_URL").unwrap_or(defaults.url),
            retry_interval: parse_or(
                &lookup,
                "AGENT_CHAT_RETRY_SECS",
                defaults.retry_interval,
                Duration::from_secs,
            ),
            debounce: parse_or(
                &lookup,
                "AGENT_CHAT_DEBOUNCE_MS",
                defaults.debounce,
                Duration::from_millis,
            ),
            dedup: match lookup("AGENT_CHAT_DEDUP").map(|v| v.parse::<DedupStrategy>()) {
                Some(Ok(dedup)) => dedup,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Ignoring AGENT_CHAT_DEDUP");
                    defaults.dedup
                }
                None => defaults.dedup,
            },
            session,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig::new(self.url.clone()).with_retry_interval(self.retry_interval)
    }

    pub fn context(&self) -> ConvContext {
        ConvContext::new(self.session.clone(), self.dedup, self.debounce)
    }
}

fn parse_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
    unit: fn(u64) -> Duration,
) -> Duration {
    match lookup(key).map(|raw| raw.trim().parse::<u64>()) {
        Some(Ok(value)) => unit(value),
        Some(Err(e)) => {
            tracing::warn!(key, error = %e, "Ignoring unparseable duration");
            default
        }
        None => default,
    }
}
