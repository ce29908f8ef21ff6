//! # parley-llm: Generation Backend Layer
//!
//! Carries the queries built by `parley-core` to a text-generation backend:
//!
//! - [`client`]: the [`GenerationBackend`] seam and its Ollama HTTP client
//! - [`query`]: the [`QueryManager`]: FIFO admission against a
//!   concurrency ceiling, bounded waits, delivery to a [`ReplySink`]
//! - [`lifecycle`]: model preload at startup and unload at shutdown
//! - [`types`]: wire bodies and response parsing
//!
//! Nothing here retries. A generated chat line that arrives late is worse
//! than none, so every failure is logged and dropped.

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod query;
pub mod sink;
pub mod types;

pub use client::{GenerationBackend, OllamaClient};
pub use error::LlmError;
pub use lifecycle::ModelLifecycleController;
pub use query::{QueryHandle, QueryManager, QueryStats};
pub use sink::{NullSink, ReplySink};
pub use types::{GenerateRequest, GenerateResponse, KeepAlive, KeepAliveRequest, Reply};
