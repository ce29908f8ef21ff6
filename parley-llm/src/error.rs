//! LLM error types.

use thiserror::Error;

/// Errors that can occur while talking to the generation backend.
///
/// Every variant is non-fatal: a failed query is logged and dropped, a
/// failed lifecycle call is logged and ignored.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Connection or protocol failure before a response arrived.
    #[error("LLM transport failure: {0}")]
    Transport(String),

    /// Backend answered with a non-success HTTP status.
    #[error("LLM backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Request exceeded its bounded wait.
    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    /// Response body could not be parsed.
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    /// Backend reported an error in its response body.
    #[error("LLM backend error: {0}")]
    Backend(String),

    /// Query waited longer than the admission deadline and is now stale.
    #[error("Query waited {0}ms for admission, dropping")]
    AdmissionTimeout(u64),

    /// Preload or unload directive failed.
    #[error("Model {action} failed: {reason}")]
    Lifecycle {
        /// `"preload"` or `"unload"`.
        action: &'static str,
        /// Underlying failure.
        reason: String,
    },

    /// The dispatcher is shutting down and no longer admits queries.
    #[error("Query manager is shutting down")]
    ShuttingDown,

    /// The dispatch task was cancelled or panicked.
    #[error("Query task aborted: {0}")]
    Aborted(String),
}

impl LlmError {
    /// Whether the failure came from a bounded wait expiring, either on
    /// the backend call or in the admission queue.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::AdmissionTimeout(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        // The client sets no timeout of its own, so there is no configured
        // wait to report; keep reqwest's description.
        if err.is_timeout() {
            LlmError::Transport(format!("timed out: {err}"))
        } else if err.is_decode() {
            LlmError::MalformedResponse(err.to_string())
        } else {
            LlmError::Transport(err.to_string())
        }
    }
}
