//! Levels bought by investing stars.
//!
//! Invested stars accumulate; every time they cover the next level's cost
//! the level goes up, the cost is consumed and the following level costs
//! `growth_percent` more (rounded up, always at least one star more).

use tracing::info;

use crate::bank::Bank;
use crate::bet::BetSpec;
use crate::config::LevelConfig;
use crate::error::Result;

/// Result of an investment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Investment {
    /// Stars moved out of the balance.
    pub invested: u64,
    /// Levels gained by this investment.
    pub levels_gained: u32,
    /// Level afterwards.
    pub level: u32,
    /// Stars already put towards the next level.
    pub progress: u64,
    /// Cost of the next level.
    pub next_level_cost: u64,
    /// Balance afterwards.
    pub balance: u64,
}

/// Level cost curve.
#[derive(Debug, Clone)]
pub struct LevelTrack {
    config: LevelConfig,
}

impl LevelTrack {
    /// Track with the given curve.
    #[must_use]
    pub fn new(config: LevelConfig) -> Self {
        Self { config }
    }

    /// Cost of the first level.
    #[must_use]
    pub fn initial_cost(&self) -> u64 {
        self.config.initial_cost.max(1)
    }

    /// Cost of the level after one costing `cost`.
    #[must_use]
    pub fn next_cost(&self, cost: u64) -> u64 {
        let grown = u128::from(cost) * u128::from(100 + self.config.growth_percent);
        let grown = u64::try_from(grown.div_ceil(100)).unwrap_or(u64::MAX);
        grown.max(cost.saturating_add(1))
    }

    /// Move stars from the balance into levels.
    ///
    /// # Errors
    /// The stake errors of [`BetSpec::resolve`].
    pub fn invest(&self, bank: &mut Bank, user: &str, spec: BetSpec) -> Result<Investment> {
        let investment = bank.update(user, |account| {
            let amount = spec.resolve(account.balance)?;
            let balance = account.debit(amount)?;
            account.invested_stars = account.invested_stars.saturating_add(amount);

            let mut levels_gained = 0;
            while account.invested_stars >= account.next_level_cost {
                account.invested_stars -= account.next_level_cost;
                account.level = account.level.saturating_add(1);
                account.next_level_cost = self.next_cost(account.next_level_cost);
                levels_gained += 1;
            }
            Ok(Investment {
                invested: amount,
                levels_gained,
                level: account.level,
                progress: account.invested_stars,
                next_level_cost: account.next_level_cost,
                balance,
            })
        })?;
        if investment.levels_gained > 0 {
            info!(user, level = investment.level, "Level up");
        }
        Ok(investment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn cost_grows_and_rounds_up() {
        let track = LevelTrack::new(LevelConfig::default());
        assert_eq!(track.next_cost(1000), 1500);
        assert_eq!(track.next_cost(1001), 1502);
        let flat = LevelTrack::new(LevelConfig {
            initial_cost: 1,
            growth_percent: 0,
        });
        assert_eq!(flat.next_cost(5), 6);
    }

    #[test]
    fn invest_levels_up_across_several_thresholds() {
        let track = LevelTrack::new(LevelConfig::default());
        let mut bank = Bank::load(Arc::new(MemoryStore::new()), track.initial_cost());
        bank.update("alice", |a| Ok(a.credit(3000))).expect("fund");

        let first = track.invest(&mut bank, "alice", BetSpec::Amount(400)).expect("invest");
        assert_eq!(first.levels_gained, 0);
        assert_eq!(first.progress, 400);

        let second = track.invest(&mut bank, "alice", BetSpec::Amount(2200)).expect("invest");
        assert_eq!(second.levels_gained, 2);
        assert_eq!(second.level, 2);
        assert_eq!(second.progress, 100);
        assert_eq!(second.next_level_cost, 2250);
        assert_eq!(second.balance, 400);
    }

    #[test]
    fn invest_more_than_balance_rejected() {
        let track = LevelTrack::new(LevelConfig::default());
        let mut bank = Bank::load(Arc::new(MemoryStore::new()), 1000);
        bank.update("alice", |a| Ok(a.credit(10))).expect("fund");
        assert!(track.invest(&mut bank, "alice", BetSpec::Amount(11)).is_err());
        let account = bank.account("alice").expect("exists");
        assert_eq!(account.balance, 10);
        assert_eq!(account.invested_stars, 0);
    }
}
