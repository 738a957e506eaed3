//! # starz Core Library
//!
//! Chat-agnostic star economy for a stream bot. Every chatter gets an
//! [`Account`] holding a star balance, a level, claim state and at most one
//! loan. On top of that sit:
//!
//! - **Claims** — an hourly reward with a first-claim bonus and a
//!   "you can claim again" notice when the cooldown ends
//! - **Loans** — compounding interest and a hard deadline that ends in
//!   auto-repayment or a timeout penalty
//! - **Games** — blackjack, an odd/even guess and a three-reel slot
//! - **Reminders** — due after a duration, at a Berlin wall-clock time, or on
//!   the target's next message
//!
//! Everything is reached through [`Economy`], which owns all state. Every
//! account change is saved immediately through a [`PersistenceAdapter`]
//! (SQLite, JSON files or memory).
//!
//! ## Time
//!
//! All engines take `now` explicitly and randomness is injected, so every
//! flow can be replayed deterministically in tests.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod account;
pub mod bank;
pub mod bet;
pub mod blackjack;
pub mod claim;
pub mod config;
pub mod economy;
pub mod error;
pub mod level;
pub mod loan;
pub mod parity;
pub mod persistence;
pub mod reminder;
pub mod slot;
pub mod time;

pub use account::Account;
pub use bank::Bank;
pub use bet::BetSpec;
pub use config::EconomyConfig;
pub use economy::Economy;
pub use error::{EconomyError, Result};
pub use persistence::PersistenceAdapter;
pub use reminder::Reminder;
