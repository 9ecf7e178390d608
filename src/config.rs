//! Runtime configuration read from the environment

use crate::llm::{RetryPolicy, SamplingParams, DEFAULT_ENDPOINT};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Settings for a [`crate::runtime::ChatController`] and its service
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub model: String,
    pub endpoint: String,
    /// Sampling for reply requests
    pub sampling: SamplingParams,
    /// Route turns through topic classification when a character has topics
    pub classify_topics: bool,
    pub check_connection_on_start: bool,
    /// Send the `"<name>:"` stop markers with reply requests
    pub send_stop_sequences: bool,
    pub retry: RetryPolicy,
    pub self_check_retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            sampling: SamplingParams::default(),
            classify_topics: false,
            check_connection_on_start: true,
            send_stop_sequences: false,
            retry: RetryPolicy::chat(),
            self_check_retry: RetryPolicy::self_check(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys keep their defaults;
    /// values that fail to parse are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let env = Lookup(lookup);

        let sampling = SamplingParams {
            temperature: env
                .parse("NPC_CHAT_TEMPERATURE")
                .map_or(defaults.sampling.temperature, |t: f32| t.clamp(0.0, 1.0)),
            max_tokens: Some(
                env.parse("NPC_CHAT_MAX_TOKENS")
                    .map_or(100, |n: u32| n.clamp(1, 2048)),
            ),
            frequency_penalty: Some(
                env.parse("NPC_CHAT_FREQUENCY_PENALTY")
                    .map_or(0.0, |p: f32| p.clamp(0.0, 2.0)),
            ),
            presence_penalty: Some(
                env.parse("NPC_CHAT_PRESENCE_PENALTY")
                    .map_or(0.0, |p: f32| p.clamp(0.0, 2.0)),
            ),
        };

        let max_attempts = env.parse::<u32>("NPC_CHAT_MAX_ATTEMPTS").filter(|n| *n > 0);
        let retry = env
            .parse("NPC_CHAT_RETRY_DELAY_MS")
            .map_or(defaults.retry, |ms: u64| {
                RetryPolicy::fixed(Duration::from_millis(ms))
            })
            .with_max_attempts(max_attempts);

        Self {
            model: env.string("NPC_CHAT_MODEL").unwrap_or(defaults.model),
            endpoint: env.string("NPC_CHAT_ENDPOINT").unwrap_or(defaults.endpoint),
            sampling,
            classify_topics: env
                .flag("NPC_CHAT_CLASSIFY_TOPICS")
                .unwrap_or(defaults.classify_topics),
            check_connection_on_start: env
                .flag("NPC_CHAT_CHECK_CONNECTION")
                .unwrap_or(defaults.check_connection_on_start),
            send_stop_sequences: env
                .flag("NPC_CHAT_STOP_SEQUENCES")
                .unwrap_or(defaults.send_stop_sequences),
            retry,
            self_check_retry: defaults.self_check_retry.with_max_attempts(max_attempts),
            request_timeout: env
                .parse("NPC_CHAT_TIMEOUT_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map_or(defaults.request_timeout, Duration::from_secs),
        }
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.string(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
                None
            }
        }
    }

    fn flag(&self, key: &str) -> Option<bool> {
        let raw = self.string(key)?;
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable flag");
                None
            }
        }
    }
}
