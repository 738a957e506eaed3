//! # starz-bot — Chat Integration for starz
//!
//! The layer between a chat transport and the chat-agnostic `starz-core`
//! economy.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              chat transport                  │
//! │   messages in ──────────┐    ▲ sends,        │
//! │                         ▼    │ timeouts      │
//! │  ┌─────────────────────────────────────────┐ │
//! │  │              starz-bot                  │ │
//! │  │  ┌──────────────┐   ┌───────────────┐   │ │
//! │  │  │ CommandBridge│   │    Systems    │   │ │
//! │  │  └──────┬───────┘   └───────┬───────┘   │ │
//! │  │         ▼                   ▼           │ │
//! │  │   ┌───────────────────────────────┐     │ │
//! │  │   │   Arc<Mutex<Economy>> (core)  │     │ │
//! │  │   └───────────────────────────────┘     │ │
//! │  └─────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `collaborators` — emote catalog, moderation and outbound traits
//! - `command` — the command vocabulary
//! - `bridge` — message handling and reply rendering
//! - `systems` — periodic reminder and loan sweeps
//! - `config` — `starz.toml` for the whole process

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod collaborators;
pub mod command;
pub mod config;
pub mod systems;

pub use bridge::{ChatMessage, CommandBridge, SharedEconomy};
pub use command::Command;
pub use config::BotConfig;
pub use systems::Systems;
