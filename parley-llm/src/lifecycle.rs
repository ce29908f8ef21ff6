//! Model residency at startup and shutdown.
//!
//! `preload` asks the backend to load the model and hold it indefinitely so
//! the first chat reply does not pay the cold-start cost; `unload` asks it to
//! release the model immediately. Both are best-effort: a failure is logged
//! and returned, never retried, and never blocks the host.

use std::sync::Arc;
use std::time::Instant;

use parley_core::shared::SharedConfig;
use tracing::{info, warn};

use crate::client::GenerationBackend;
use crate::error::LlmError;
use crate::types::{KeepAlive, KeepAliveRequest};

/// Issues preload and unload directives for the configured model.
#[derive(Clone)]
pub struct ModelLifecycleController {
    backend: Arc<dyn GenerationBackend>,
    config: SharedConfig,
}

impl ModelLifecycleController {
    /// Controller for the model named in `config`.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>, config: SharedConfig) -> Self {
        Self { backend, config }
    }

    /// Load the model and keep it resident.
    ///
    /// # Errors
    ///
    /// [`LlmError::Lifecycle`] when the directive fails or times out. Chat
    /// generation still works afterwards, each query just loads on demand.
    pub async fn preload(&self) -> Result<(), LlmError> {
        self.send("preload", KeepAlive::Indefinite).await
    }

    /// Release the model.
    ///
    /// # Errors
    ///
    /// [`LlmError::Lifecycle`] when the directive fails or times out.
    pub async fn unload(&self) -> Result<(), LlmError> {
        self.send("unload", KeepAlive::Release).await
    }

    async fn send(&self, action: &'static str, keep_alive: KeepAlive) -> Result<(), LlmError> {
        let config = self.config.load();
        let request = KeepAliveRequest::new(&config, keep_alive);
        let start = Instant::now();

        let result = match tokio::time::timeout(
            config.lifecycle_timeout(),
            self.backend.keep_alive(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(config.lifecycle_timeout_ms)),
        };
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(()) => {
                info!(model = %request.model, action, elapsed_ms, "Model {action} succeeded");
                Ok(())
            }
            Err(e) => {
                warn!(model = %request.model, action, elapsed_ms, error = %e, "Model {action} failed");
                Err(LlmError::Lifecycle {
                    action,
                    reason: e.to_string(),
                })
            }
        }
    }
}
