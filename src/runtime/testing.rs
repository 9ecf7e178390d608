//! Test doubles for the runtime

use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService, Message, Usage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock completion service with queued responses.
///
/// An empty queue answers with a network error. A gated mock records each
/// request and then waits for a permit from [`MockLlmService::release`]
/// before answering.
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
    gate: Option<Semaphore>,
    has_credentials: bool,
}

#[allow(dead_code)]
impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
            gate: None,
            has_credentials: true,
        }
    }

    /// Mock that holds every response until released
    pub fn gated(model_id: impl Into<String>) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(model_id)
        }
    }

    /// Mock that reports a missing API key
    pub fn without_credentials(mut self) -> Self {
        self.has_credentials = false;
        self
    }

    /// Let `n` gated responses through
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an assistant reply with the given text
    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse {
            message: Message::assistant(text),
            usage: Usage::default(),
        });
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("mock gate closed").forget();
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn has_credentials(&self) -> bool {
        self.has_credentials
    }
}

// ============================================================================
// Log Capture
// ============================================================================

/// Collects formatted log output for assertions.
///
/// The subscriber is installed for the current thread only, which covers
/// everything a `#[tokio::test]` runs outside spawned tasks.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route this thread's events at `WARN` and above into the buffer
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Number of captured lines containing `needle`
    pub fn count_lines(&self, needle: &str) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
