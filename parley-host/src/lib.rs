//! # parley-host: Host Integration for parley
//!
//! The layer a game server links against. It owns the shared state and
//! exposes two lifecycle entry points plus the event intake:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               Game server                │
//! │   chat event ─┐        ┌─ chatter tick   │
//! │               ▼        ▼                 │
//! │  ┌────────────────────────────────────┐  │
//! │  │      parley-host: ChatService      │  │
//! │  │  ┌──────────────┐ ┌─────────────┐  │  │
//! │  │  │ parley-core  │ │ parley-llm  │  │  │
//! │  │  │ policy       │▶│ dispatch    │──┼──┼──▶ ChatOutbox
//! │  │  └──────────────┘ └─────────────┘  │  │
//! │  └────────────────────────────────────┘  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `service`: [`ChatService`]: `start`, `stop`, chat and tick intake, reload
//! - `hooks`: build [`parley_core::ChatEvent`]s from host chat callbacks
//! - `sink`: [`ChatOutbox`], the queue of lines waiting to be posted

pub mod hooks;
pub mod service;
pub mod sink;

pub use service::ChatService;
pub use sink::{ChatOutbox, OutgoingChat};
