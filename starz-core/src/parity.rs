//! Bet, then guess whether a hidden number is odd or even.
//!
//! A guess can come in as a command argument or as a bare chat message
//! consisting of one of the guess words. Both routes call
//! [`ParityGame::resolve`], which removes the session before paying out, so
//! only the first of two racing guesses settles it.

use std::collections::HashMap;

use rand::Rng;
use tracing::info;

use crate::account::account_key;
use crate::bank::Bank;
use crate::bet::BetSpec;
use crate::config::ParityConfig;
use crate::error::{EconomyError, Result};

const GAME: &str = "parity";

/// A parity guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    /// Odd number.
    Odd,
    /// Even number.
    Even,
}

impl Parity {
    /// Parse one of `odd`, `ungerade`, `even`, `gerade` (case-insensitive).
    #[must_use]
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "odd" | "ungerade" => Some(Self::Odd),
            "even" | "gerade" => Some(Self::Even),
            _ => None,
        }
    }

    /// Parity of `n`.
    #[must_use]
    pub fn of(n: u32) -> Self {
        if n % 2 == 0 { Self::Even } else { Self::Odd }
    }
}

/// Result of a started game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityTicket {
    /// Stake deducted.
    pub bet: u64,
    /// Balance after the deduction.
    pub balance: u64,
}

/// Result of a resolved game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityResult {
    /// The hidden number.
    pub secret: u32,
    /// What the user guessed.
    pub guess: Parity,
    /// Whether the guess was right.
    pub won: bool,
    /// Stake of the game.
    pub bet: u64,
    /// Stars credited (0 on a wrong guess).
    pub payout: u64,
    /// Balance afterwards.
    pub balance: u64,
}

#[derive(Debug, Clone, Copy)]
struct Session {
    bet: u64,
    secret: u32,
}

/// Open parity games, one per user.
#[derive(Debug)]
pub struct ParityGame {
    config: ParityConfig,
    sessions: HashMap<String, Session>,
}

impl ParityGame {
    /// Game table with no open sessions.
    #[must_use]
    pub fn new(config: ParityConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// Whether `user` has a game waiting for a guess.
    #[must_use]
    pub fn is_playing(&self, user: &str) -> bool {
        self.sessions.contains_key(&account_key(user))
    }

    /// Deduct the stake and draw a secret from `0..secret_range`.
    ///
    /// # Errors
    /// [`EconomyError::SessionConflict`] with a game already open, or the
    /// stake errors of [`BetSpec::resolve`].
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        bank: &mut Bank,
        user: &str,
        spec: BetSpec,
        rng: &mut R,
    ) -> Result<ParityTicket> {
        let secret = rng.gen_range(0..self.config.secret_range.max(1));
        self.start_with_secret(bank, user, spec, secret)
    }

    /// As [`Self::start`] with a fixed secret.
    ///
    /// # Errors
    /// As [`Self::start`].
    pub fn start_with_secret(&mut self, bank: &mut Bank, user: &str, spec: BetSpec, secret: u32) -> Result<ParityTicket> {
        let key = account_key(user);
        if self.sessions.contains_key(&key) {
            return Err(EconomyError::SessionConflict { game: GAME });
        }
        let ticket = bank.update(&key, |account| {
            let bet = spec.resolve(account.balance)?;
            let balance = account.debit(bet)?;
            Ok(ParityTicket { bet, balance })
        })?;
        info!(user = %key, bet = ticket.bet, "Parity game started");
        self.sessions.insert(key, Session { bet: ticket.bet, secret });
        Ok(ticket)
    }

    /// Settle the open game with `guess`.
    ///
    /// # Errors
    /// [`EconomyError::NoSession`] without an open game.
    pub fn resolve(&mut self, bank: &mut Bank, user: &str, guess: Parity) -> Result<ParityResult> {
        let key = account_key(user);
        let session = self
            .sessions
            .remove(&key)
            .ok_or(EconomyError::NoSession { game: GAME })?;

        let won = Parity::of(session.secret) == guess;
        let payout = if won {
            session.bet.saturating_mul(self.config.payout_multiplier)
        } else {
            0
        };
        let balance = if payout > 0 {
            bank.update(&key, |account| Ok(account.credit(payout)))?
        } else {
            bank.balance(&key)
        };
        info!(user = %key, secret = session.secret, won, payout, "Parity game resolved");
        Ok(ParityResult {
            secret: session.secret,
            guess,
            won,
            bet: session.bet,
            payout,
            balance,
        })
    }

    /// Treat a plain chat message as a guess.
    ///
    /// Returns `None` when the message is not a guess word or `user` has no
    /// open game, so ordinary chat passes through untouched.
    pub fn resolve_chat(&mut self, bank: &mut Bank, user: &str, text: &str) -> Option<Result<ParityResult>> {
        let guess = Parity::from_word(text)?;
        if !self.is_playing(user) {
            return None;
        }
        Some(self.resolve(bank, user, guess))
    }
}
