//! Three-reel gamble over the channel's emote catalog.
//!
//! The payout category comes from one weighted roll; the reels are then
//! drawn to look like that category (three of a kind for a win, a pair for
//! a near miss, three different symbols for a loss). Nothing is kept
//! between spins.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::bank::Bank;
use crate::bet::BetSpec;
use crate::config::SlotConfig;
use crate::error::{EconomyError, Result};

/// Payout category of a spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    /// Three of a kind, top multiplier.
    Jackpot,
    /// Three of a kind.
    Win,
    /// Two of a kind, pays nothing.
    NearMiss,
    /// Three different symbols, pays nothing.
    Loss,
}

/// Result of a spin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpin {
    /// Category.
    pub outcome: SlotOutcome,
    /// The three symbols shown.
    pub reels: [String; 3],
    /// Stake.
    pub bet: u64,
    /// Stars credited.
    pub payout: u64,
    /// Balance afterwards.
    pub balance: u64,
}

/// Stateless slot machine.
#[derive(Debug, Clone)]
pub struct SlotGamble {
    config: SlotConfig,
}

impl SlotGamble {
    /// Machine with the given odds table.
    #[must_use]
    pub fn new(config: SlotConfig) -> Self {
        Self { config }
    }

    /// Category for a roll in `0..total_weight`.
    #[must_use]
    pub fn outcome_for(&self, roll: u32) -> SlotOutcome {
        let c = &self.config;
        if roll < c.jackpot_weight {
            SlotOutcome::Jackpot
        } else if roll < c.jackpot_weight + c.win_weight {
            SlotOutcome::Win
        } else if roll < c.jackpot_weight + c.win_weight + c.near_miss_weight {
            SlotOutcome::NearMiss
        } else {
            SlotOutcome::Loss
        }
    }

    /// Stars credited for `outcome` on `bet`.
    #[must_use]
    pub fn payout(&self, outcome: SlotOutcome, bet: u64) -> u64 {
        match outcome {
            SlotOutcome::Jackpot => bet.saturating_mul(self.config.jackpot_multiplier),
            SlotOutcome::Win => bet.saturating_mul(self.config.win_multiplier),
            SlotOutcome::NearMiss | SlotOutcome::Loss => 0,
        }
    }

    /// Spin once, staking `spec` and drawing reels from `symbols`.
    ///
    /// # Errors
    /// [`EconomyError::NotEnoughSymbols`] with fewer than three distinct
    /// symbols (checked before any stake is taken), or the stake errors of
    /// [`BetSpec::resolve`].
    pub fn spin<R: Rng + ?Sized>(
        &self,
        bank: &mut Bank,
        user: &str,
        spec: BetSpec,
        symbols: &[String],
        rng: &mut R,
    ) -> Result<SlotSpin> {
        let mut distinct: Vec<&str> = Vec::with_capacity(symbols.len());
        for symbol in symbols.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if !distinct.contains(&symbol) {
                distinct.push(symbol);
            }
        }
        if distinct.len() < 3 {
            return Err(EconomyError::NotEnoughSymbols {
                available: distinct.len(),
            });
        }

        let outcome = self.outcome_for(rng.gen_range(0..self.config.total_weight().max(1)));
        let reels = draw_reels(outcome, &distinct, rng);

        let (bet, payout, balance) = bank.update(user, |account| {
            let bet = spec.resolve(account.balance)?;
            account.debit(bet)?;
            let payout = self.payout(outcome, bet);
            Ok((bet, payout, account.credit(payout)))
        })?;
        info!(user, bet, payout, ?outcome, "Slot spun");
        Ok(SlotSpin {
            outcome,
            reels,
            bet,
            payout,
            balance,
        })
    }
}

fn draw_reels<R: Rng + ?Sized>(outcome: SlotOutcome, symbols: &[&str], rng: &mut R) -> [String; 3] {
    let picked: Vec<String> = symbols.choose_multiple(rng, 3).map(|s| (*s).to_string()).collect();
    let [a, b, c] = <[String; 3]>::try_from(picked).unwrap_or_default();
    match outcome {
        SlotOutcome::Jackpot | SlotOutcome::Win => [a.clone(), a.clone(), a],
        SlotOutcome::NearMiss => {
            let mut reels = [a.clone(), a.clone(), a];
            reels[rng.gen_range(0..3)] = b;
            reels
        }
        SlotOutcome::Loss => [a, b, c],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn funded(amount: u64) -> Bank {
        let mut bank = Bank::load(Arc::new(MemoryStore::new()), 1000);
        bank.update("alice", |a| Ok(a.credit(amount))).expect("fund");
        bank
    }

    #[test]
    fn odds_table_boundaries() {
        let slot = SlotGamble::new(SlotConfig::default());
        assert_eq!(slot.outcome_for(0), SlotOutcome::Jackpot);
        assert_eq!(slot.outcome_for(1), SlotOutcome::Win);
        assert_eq!(slot.outcome_for(67), SlotOutcome::Win);
        assert_eq!(slot.outcome_for(68), SlotOutcome::NearMiss);
        assert_eq!(slot.outcome_for(83), SlotOutcome::NearMiss);
        assert_eq!(slot.outcome_for(84), SlotOutcome::Loss);
        assert_eq!(slot.outcome_for(99), SlotOutcome::Loss);
    }

    #[test]
    fn refuses_without_three_distinct_symbols() {
        let slot = SlotGamble::new(SlotConfig::default());
        let mut bank = funded(100);
        let mut rng = StdRng::seed_from_u64(1);
        let err = slot
            .spin(&mut bank, "alice", BetSpec::Amount(10), &symbols(&["Kappa", "Kappa", "PogU"]), &mut rng)
            .expect_err("too few symbols");
        assert!(matches!(err, EconomyError::NotEnoughSymbols { available: 2 }));
        assert_eq!(bank.balance("alice"), 100);
    }

    #[test]
    fn reels_match_outcome_and_payout() {
        let slot = SlotGamble::new(SlotConfig::default());
        let catalog = symbols(&["Kappa", "PogU", "LUL", "monkaS", "EZ"]);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let mut bank = funded(100);
            let spin = slot
                .spin(&mut bank, "alice", BetSpec::Amount(10), &catalog, &mut rng)
                .expect("spin");
            let distinct: HashSet<&String> = spin.reels.iter().collect();
            match spin.outcome {
                SlotOutcome::Jackpot => {
                    assert_eq!(distinct.len(), 1);
                    assert_eq!(spin.payout, 30);
                }
                SlotOutcome::Win => {
                    assert_eq!(distinct.len(), 1);
                    assert_eq!(spin.payout, 20);
                }
                SlotOutcome::NearMiss => {
                    assert_eq!(distinct.len(), 2);
                    assert_eq!(spin.payout, 0);
                }
                SlotOutcome::Loss => {
                    assert_eq!(distinct.len(), 3);
                    assert_eq!(spin.payout, 0);
                }
            }
            assert_eq!(bank.balance("alice"), 90 + spin.payout);
        }
    }

    #[test]
    fn stake_errors_leave_balance() {
        let slot = SlotGamble::new(SlotConfig::default());
        let mut bank = funded(5);
        let mut rng = StdRng::seed_from_u64(1);
        let catalog = symbols(&["a", "b", "c"]);
        assert!(slot.spin(&mut bank, "alice", BetSpec::Amount(6), &catalog, &mut rng).is_err());
        assert!(slot.spin(&mut bank, "bob", BetSpec::All, &catalog, &mut rng).is_err());
        assert_eq!(bank.balance("alice"), 5);
    }
}
