//! Completion service abstraction
//!
//! Provides a common interface for talking to a chat-completion provider,
//! plus the retry loop and connectivity probe built on top of it.

mod credentials;
mod error;
mod openai;
pub mod probe;
pub mod retry;
mod types;

pub use credentials::{
    warn_if_missing, CredentialSource, EnvCredentials, StaticCredentials, MISSING_API_KEY_WARNING,
};
pub use error::{LlmError, LlmErrorKind};
pub use openai::{OpenAIService, DEFAULT_ENDPOINT};
pub use probe::check_connection;
pub use retry::{complete_with_retry, Backoff, RetryPolicy};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for completion providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a single completion request (no retries)
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;

    /// Whether an API key is currently available
    fn has_credentials(&self) -> bool {
        true
    }
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn has_credentials(&self) -> bool {
        (**self).has_credentials()
    }
}

/// Logging wrapper for completion services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    messages = request.messages.len(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Completion request finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    transient = e.kind.is_transient(),
                    "Completion request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn has_credentials(&self) -> bool {
        self.inner.has_credentials()
    }
}
