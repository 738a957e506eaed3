//! Bet amounts as users type them: `250`, `all`, `half`, `25%`.

use std::fmt;
use std::str::FromStr;

use crate::error::{EconomyError, Result};

/// A stake, resolved against the current balance at the time of the bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetSpec {
    /// A literal number of stars.
    Amount(u64),
    /// The whole balance.
    All,
    /// Half the balance, rounded down.
    Half,
    /// A percentage (1..=100) of the balance, rounded down.
    Percent(u8),
}

impl BetSpec {
    /// Turn the spec into a concrete stake.
    ///
    /// # Errors
    /// [`EconomyError::InvalidInput`] when the stake comes out as zero,
    /// [`EconomyError::InsufficientFunds`] when it exceeds `balance`.
    pub fn resolve(self, balance: u64) -> Result<u64> {
        let stake = match self {
            Self::Amount(n) => n,
            Self::All => balance,
            Self::Half => balance / 2,
            Self::Percent(p) => balance.saturating_mul(u64::from(p)) / 100,
        };
        if stake == 0 {
            return Err(EconomyError::InvalidInput("bet must be positive".into()));
        }
        if stake > balance {
            return Err(EconomyError::InsufficientFunds {
                needed: stake,
                available: balance,
            });
        }
        Ok(stake)
    }
}

impl FromStr for BetSpec {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "all" | "alles" => return Ok(Self::All),
            "half" | "hälfte" => return Ok(Self::Half),
            _ => {}
        }
        if let Some(pct) = s.strip_suffix('%') {
            return match pct.parse::<u8>() {
                Ok(p) if (1..=100).contains(&p) => Ok(Self::Percent(p)),
                _ => Err(EconomyError::InvalidInput(format!("bad percentage: {s}"))),
            };
        }
        s.parse::<u64>()
            .map(Self::Amount)
            .map_err(|_| EconomyError::InvalidInput(format!("not a bet: {s}")))
    }
}

impl fmt::Display for BetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount(n) => write!(f, "{n}"),
            Self::All => f.write_str("all"),
            Self::Half => f.write_str("half"),
            Self::Percent(p) => write!(f, "{p}%"),
        }
    }
}
