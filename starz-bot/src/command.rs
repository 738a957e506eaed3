//! The command vocabulary handed in by the message dispatcher.
//!
//! The dispatcher strips the prefix and splits on whitespace; everything
//! from the command name on arrives here as tokens.

use starz_core::parity::Parity;
use starz_core::{BetSpec, EconomyError, Result};

/// A parsed economy command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show balance, level and loan.
    Balance,
    /// Hourly claim.
    Claim,
    /// Take out a loan.
    Loan,
    /// Pay back a loan.
    Repay,
    /// Show the open loan.
    LoanStatus,
    /// Transfer stars.
    Give {
        /// Recipient.
        to: String,
        /// Amount.
        spec: BetSpec,
    },
    /// Invest stars into levels.
    Invest(BetSpec),
    /// Leaderboard.
    Top,
    /// Deal a blackjack hand.
    Blackjack(BetSpec),
    /// Blackjack hit.
    Hit,
    /// Blackjack stand.
    Stand,
    /// Start an odd/even game.
    Parity(BetSpec),
    /// Guess in an odd/even game.
    Guess(Parity),
    /// Spin the slot.
    Gamble(BetSpec),
    /// Leave a reminder.
    Remind {
        /// Recipient (`me` for oneself).
        target: String,
        /// Time expression and message tokens.
        phrase: Vec<String>,
    },
    /// List reminders waiting for the caller.
    Reminders,
}

fn bet_arg(args: &[&str], usage: &str) -> Result<BetSpec> {
    args.first()
        .ok_or_else(|| EconomyError::InvalidInput(format!("usage: {usage}")))?
        .parse()
}

impl Command {
    /// Parse `name args...`. Returns `Ok(None)` for names that are not
    /// economy commands.
    ///
    /// # Errors
    /// [`EconomyError::InvalidInput`] for a known command with bad arguments.
    pub fn from_tokens(tokens: &[&str]) -> Result<Option<Self>> {
        let Some((name, args)) = tokens.split_first() else {
            return Ok(None);
        };
        let command = match name.to_lowercase().as_str() {
            "stars" | "balance" | "konto" => Self::Balance,
            "claim" | "star" => Self::Claim,
            "loan" | "kredit" => match args.first().map(|a| a.to_lowercase()) {
                Some(sub) if sub == "status" => Self::LoanStatus,
                Some(sub) if sub == "repay" => Self::Repay,
                _ => Self::Loan,
            },
            "repay" | "zurückzahlen" => Self::Repay,
            "give" | "gib" => {
                let [to, amount, ..] = args else {
                    return Err(EconomyError::InvalidInput("usage: give <user> <amount>".into()));
                };
                Self::Give {
                    to: (*to).to_string(),
                    spec: amount.parse()?,
                }
            }
            "invest" => Self::Invest(bet_arg(args, "invest <amount>")?),
            "top" | "leaderboard" => Self::Top,
            "bj" | "blackjack" => Self::Blackjack(bet_arg(args, "bj <amount>")?),
            "hit" => Self::Hit,
            "stand" => Self::Stand,
            "parity" | "oddeven" => Self::Parity(bet_arg(args, "parity <amount>")?),
            "guess" | "tipp" => {
                let word = args.first().copied().unwrap_or_default();
                Self::Guess(
                    Parity::from_word(word)
                        .ok_or_else(|| EconomyError::InvalidInput("guess odd or even".into()))?,
                )
            }
            "gamble" | "slot" => Self::Gamble(bet_arg(args, "gamble <amount>")?),
            "remind" | "erinnere" => {
                let Some((target, phrase)) = args.split_first() else {
                    return Err(EconomyError::InvalidInput("usage: remind <user> [time] <message>".into()));
                };
                Self::Remind {
                    target: (*target).to_string(),
                    phrase: phrase.iter().map(|s| (*s).to_string()).collect(),
                }
            }
            "reminders" => Self::Reminders,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}
