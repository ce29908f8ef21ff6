//! # Parley Core Library
//!
//! Game-agnostic trigger policy for simulated players that answer chat with
//! generated text.
//!
//! Given a chat message or an ambient chatter tick, plus a snapshot of who
//! is nearby, the core decides whether anyone should respond, picks the
//! responders and builds the prompt each one will send:
//!
//! - [`config`]: immutable [`ConfigSnapshot`] loaded from TOML with
//!   per-option defaults
//! - [`personality`]: participant → persona classifier, loaded from SQLite
//! - [`trigger`]: the [`TriggerPolicyEngine`]
//! - [`scheduler`]: per-session ambient chatter timers
//! - [`shared`]: atomically swappable handles for reloads
//!
//! Dispatching the built queries to a backend lives in `parley-llm`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod personality;
pub mod prompt;
pub mod scheduler;
pub mod shared;
pub mod trigger;
pub mod types;

pub use config::{Blacklist, ConfigSnapshot};
pub use error::ParleyError;
pub use personality::PersonalityRegistry;
pub use scheduler::{RandomChatterScheduler, SessionId};
pub use shared::{Shared, SharedConfig, SharedPersonalities};
pub use trigger::{Decision, TriggerPolicyEngine};
pub use types::*;
