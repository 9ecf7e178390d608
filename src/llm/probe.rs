//! Startup connectivity self-check

use super::retry::retry_loop;
use super::{LlmError, LlmRequest, LlmService, Message, RetryPolicy, SamplingParams};

/// Request sent by the probe: a single throwaway user turn
pub fn probe_request() -> LlmRequest {
    LlmRequest::new(vec![Message::user("test")], SamplingParams::connectivity_probe())
}

/// Check that the completion service is reachable.
///
/// Retries according to `policy` (normally [`RetryPolicy::self_check`], which
/// waits a little longer after each failure). The reply content is discarded.
/// Returns the number of attempts it took to connect.
pub async fn check_connection<L: LlmService + ?Sized>(
    llm: &L,
    policy: &RetryPolicy,
) -> Result<u32, LlmError> {
    let (result, attempts) = retry_loop(llm, &probe_request(), policy).await;

    match result {
        Ok(_) => {
            tracing::info!(model = %llm.model_id(), attempts, "Connected to completion service");
            Ok(attempts)
        }
        Err(e) => {
            tracing::error!(
                model = %llm.model_id(),
                attempts,
                error = %e,
                "Connecting to completion service failed"
            );
            Err(e)
        }
    }
}
