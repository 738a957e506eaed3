//! Error types for the starz economy.

use thiserror::Error;

/// Top-level error type for all economy operations.
///
/// The first group of variants are rejected commands: nothing was mutated and
/// the caller should render a short message. The second group are
/// infrastructure failures that are logged and degraded around.
#[derive(Error, Debug)]
pub enum EconomyError {
    /// Unparseable bet, missing argument, unknown guess word.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The account cannot cover the requested amount.
    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds {
        /// Amount the command asked for.
        needed: u64,
        /// Current balance.
        available: u64,
    },

    /// A session of this game is already open for the user.
    #[error("A {game} session is already in progress")]
    SessionConflict {
        /// Game name.
        game: &'static str,
    },

    /// The user has no open session of this game.
    #[error("No {game} session in progress")]
    NoSession {
        /// Game name.
        game: &'static str,
    },

    /// The claim cooldown has not elapsed yet.
    #[error("Claim on cooldown for another {remaining_ms}ms")]
    CooldownActive {
        /// Milliseconds until the next claim is allowed.
        remaining_ms: i64,
    },

    /// The account already carries an active loan.
    #[error("A loan is already active")]
    LoanActive,

    /// The account has no active loan.
    #[error("No active loan")]
    NoLoan,

    /// Repayment is configured as a trap and always refused.
    #[error("Repayment denied")]
    RepayDenied,

    /// The emote catalog does not offer enough distinct symbols for a spin.
    #[error("Not enough distinct symbols: {available} (need 3)")]
    NotEnoughSymbols {
        /// Distinct symbols the catalog returned.
        available: usize,
    },

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external collaborator (emotes, moderation, transport) failed.
    #[error("External service failure: {0}")]
    ExternalService(String),

    /// An external call exceeded its time bound.
    #[error("External call timed out after {0}ms")]
    Timeout(u64),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EconomyError {
    /// Whether this error is a locally rejected command (no state change,
    /// short message to the user) rather than an infrastructure failure.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::InsufficientFunds { .. }
                | Self::SessionConflict { .. }
                | Self::NoSession { .. }
                | Self::CooldownActive { .. }
                | Self::LoanActive
                | Self::NoLoan
                | Self::RepayDenied
                | Self::NotEnoughSymbols { .. }
        )
    }
}

impl From<serde_json::Error> for EconomyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, EconomyError>;
