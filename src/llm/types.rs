//! Common types for chat-completion interactions

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single role-tagged chat turn.
///
/// Serializes to the exact `{role, content}` shape the completion service
/// expects, so the same value is used in the message log and on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling parameters sent alongside the messages.
///
/// Optional fields are omitted from the request body when `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

impl SamplingParams {
    /// Deterministic, unshaped sampling used for topic classification
    pub fn classification() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    /// Minimal request used by the connectivity self-check
    pub fn connectivity_probe() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: Some(4),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
        }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: Some(100),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
        }
    }
}

/// Completion request
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub sampling: SamplingParams,
    pub stop: Vec<String>,
}

impl LlmRequest {
    pub fn new(messages: Vec<Message>, sampling: SamplingParams) -> Self {
        Self {
            messages,
            sampling,
            stop: Vec::new(),
        }
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

/// Completion response: the first choice's message, verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub message: Message,
    pub usage: Usage,
}

impl LlmResponse {
    pub fn text(&self) -> &str {
        &self.message.content
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
