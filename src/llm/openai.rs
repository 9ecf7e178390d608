//! `OpenAI`-compatible chat-completions provider

use super::types::{LlmRequest, LlmResponse, Message, Usage};
use super::{CredentialSource, LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default chat-completions endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible service implementation
pub struct OpenAIService {
    client: Client,
    credentials: Arc<dyn CredentialSource>,
    model: String,
    endpoint: String,
}

impl OpenAIService {
    pub fn new(
        model: impl Into<String>,
        credentials: Arc<dyn CredentialSource>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials,
            model: model.into(),
            endpoint: endpoint.into(),
        })
    }

    fn translate_request<'a>(&'a self, request: &'a LlmRequest) -> ChatCompletionRequest<'a> {
        let sampling = &request.sampling;
        ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            stop: if request.stop.is_empty() {
                None
            } else {
                Some(request.stop.as_slice())
            },
        }
    }

    fn normalize_response(resp: ChatCompletionResponse) -> Result<LlmResponse, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::invalid_response("No choices in response"))?;

        let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        });

        Ok(LlmResponse {
            message: choice.message,
            usage,
        })
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> LlmError {
        if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(body) {
            let message = error_resp.error.message;
            return LlmError::from_status(status.as_u16(), format!("HTTP {status}: {message}"));
        }
        LlmError::from_status(status.as_u16(), format!("HTTP {status} error: {body}"))
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header(
                "Authorization",
                format!("Bearer {}", self.credentials.api_key()),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &text));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::invalid_response(format!("Failed to parse response: {e} - body: {text}"))
        })?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn has_credentials(&self) -> bool {
        self.credentials.is_configured()
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}
