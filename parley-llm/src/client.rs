//! Generation backend seam and its Ollama implementation.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::COOKIE;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{GenerateRequest, GenerateResponse, KeepAliveRequest, parse_generate_body, truncate};

/// Something that can turn a prompt into text and manage model residency.
///
/// Implementations do not enforce timeouts; callers wrap each call in their
/// own bounded wait.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run one generation.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError>;

    /// Send a residency directive (preload or unload).
    async fn keep_alive(&self, request: &KeepAliveRequest) -> Result<(), LlmError>;
}

/// HTTP client for an Ollama-style `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    cookie: Option<String>,
}

impl OllamaClient {
    /// Create a client. `cookie`, when set, is sent as the `Cookie` header
    /// on every request.
    #[must_use]
    pub fn new(cookie: Option<String>) -> Self {
        Self {
            http: Client::new(),
            cookie,
        }
    }

    async fn post<B: serde::Serialize + Sync>(&self, url: &str, body: &B) -> Result<String, LlmError> {
        let mut req = self.http.post(url).json(body);
        if let Some(cookie) = &self.cookie {
            req = req.header(COOKIE, cookie);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Ollama returned error");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate(&text, 200),
            });
        }
        Ok(text)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let start = Instant::now();
        let body = self.post(&request.url, request).await?;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (text, tokens_generated) = parse_generate_body(&body)?;
        debug!(model = %request.model, latency_ms, tokens_generated, "Ollama generation complete");
        Ok(GenerateResponse {
            text,
            tokens_generated,
            latency_ms,
        })
    }

    async fn keep_alive(&self, request: &KeepAliveRequest) -> Result<(), LlmError> {
        let body = self.post(&request.url, request).await?;
        // A residency call answers with an empty `response`; only an
        // explicit error field counts as failure.
        match parse_generate_body(&body) {
            Err(LlmError::Backend(reason)) => Err(LlmError::Backend(reason)),
            _ => Ok(()),
        }
    }
}
