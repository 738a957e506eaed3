//! Hourly star claim with a cooldown and an expiry notice.
//!
//! A successful claim schedules a [`ClaimNotice`] for the moment the
//! cooldown ends. The notice carries a snapshot of the claim it belongs to;
//! when it comes due it is only delivered if the account still shows that
//! same claim and has not been reminded yet. A newer claim or an earlier
//! notice makes it redundant and it is dropped silently.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info};

use crate::account::account_key;
use crate::bank::Bank;
use crate::config::ClaimConfig;
use crate::error::{EconomyError, Result};

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// Stars granted.
    pub reward: u64,
    /// Whether the first-claim bonus was included.
    pub first_claim: bool,
    /// Balance after the claim.
    pub balance: u64,
    /// Earliest time of the next claim.
    pub next_claim_at: DateTime<Utc>,
}

/// A pending "you can claim again" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimNotice {
    /// Account key.
    pub user: String,
    /// Channel to notify in.
    pub channel: String,
    /// The claim this notice belongs to.
    pub claimed_at: DateTime<Utc>,
    /// When the cooldown ends.
    pub fire_at: DateTime<Utc>,
}

/// Cooldown claims and their expiry notices.
#[derive(Debug)]
pub struct ClaimEngine {
    config: ClaimConfig,
    pending: Vec<ClaimNotice>,
}

impl ClaimEngine {
    /// Engine with no pending notices.
    #[must_use]
    pub fn new(config: ClaimConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::milliseconds(self.config.cooldown_ms)
    }

    /// Time left before `user` may claim again, or `None` if they may claim now.
    #[must_use]
    pub fn cooldown_remaining(&self, bank: &Bank, user: &str, now: DateTime<Utc>) -> Option<Duration> {
        let last = bank.account(user)?.last_claim?;
        let remaining = last + self.cooldown() - now;
        (remaining > Duration::zero()).then_some(remaining)
    }

    /// Grant the hourly reward.
    ///
    /// # Errors
    /// [`EconomyError::CooldownActive`] if the last claim was less than one
    /// cooldown ago; the account is left unchanged.
    pub fn claim<R: Rng + ?Sized>(
        &mut self,
        bank: &mut Bank,
        user: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<ClaimOutcome> {
        if let Some(remaining) = self.cooldown_remaining(bank, user, now) {
            return Err(EconomyError::CooldownActive {
                remaining_ms: remaining.num_milliseconds(),
            });
        }

        let base = rng.gen_range(self.config.reward_min..=self.config.reward_max);
        let bonus = self.config.first_claim_bonus;
        let (outcome, channel) = bank.update(user, |account| {
            let first_claim = account.last_claim.is_none();
            let reward = if first_claim { base + bonus } else { base };
            let balance = account.credit(reward);
            account.last_claim = Some(now);
            account.reminded = false;
            Ok((
                ClaimOutcome {
                    reward,
                    first_claim,
                    balance,
                    next_claim_at: now + Duration::milliseconds(self.config.cooldown_ms),
                },
                account.last_channel.clone(),
            ))
        })?;

        info!(user, reward = outcome.reward, first = outcome.first_claim, "Stars claimed");
        self.schedule(ClaimNotice {
            user: account_key(user),
            channel,
            claimed_at: now,
            fire_at: outcome.next_claim_at,
        });
        Ok(outcome)
    }

    fn schedule(&mut self, notice: ClaimNotice) {
        self.pending.retain(|n| n.user != notice.user);
        self.pending.push(notice);
    }

    /// Rebuild notices after a restart.
    ///
    /// Every account that has claimed, was not reminded yet, and whose
    /// cooldown ended less than one cooldown ago (or has not ended) gets its
    /// notice back.
    pub fn restore_notices(&mut self, bank: &Bank, now: DateTime<Utc>) {
        let cooldown = self.cooldown();
        let restored: Vec<ClaimNotice> = bank
            .accounts()
            .filter(|(_, account)| !account.reminded)
            .filter_map(|(user, account)| {
                let claimed_at = account.last_claim?;
                let fire_at = claimed_at + cooldown;
                (now < fire_at + cooldown).then(|| ClaimNotice {
                    user: user.clone(),
                    channel: account.last_channel.clone(),
                    claimed_at,
                    fire_at,
                })
            })
            .collect();
        debug!(restored = restored.len(), "Claim notices restored");
        for notice in restored {
            self.schedule(notice);
        }
    }

    /// Remove notices that are due and return those still relevant,
    /// marking their accounts as reminded.
    pub fn due_notices(&mut self, bank: &mut Bank, now: DateTime<Utc>) -> Vec<ClaimNotice> {
        let (due, waiting): (Vec<ClaimNotice>, Vec<ClaimNotice>) =
            std::mem::take(&mut self.pending)
                .into_iter()
                .partition(|n| n.fire_at <= now);
        self.pending = waiting;

        due.into_iter()
            .filter(|notice| {
                let current = bank
                    .account(&notice.user)
                    .is_some_and(|a| a.last_claim == Some(notice.claimed_at) && !a.reminded);
                current
                    && bank
                        .update(&notice.user, |account| {
                            account.reminded = true;
                            Ok(())
                        })
                        .is_ok()
            })
            .collect()
    }

    /// Number of scheduled notices.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).single().expect("valid")
    }

    fn setup() -> (ClaimEngine, Bank, StdRng) {
        (
            ClaimEngine::new(ClaimConfig::default()),
            Bank::load(Arc::new(MemoryStore::new()), 1000),
            StdRng::seed_from_u64(7),
        )
    }

    #[test]
    fn first_claim_includes_bonus() {
        let (mut engine, mut bank, mut rng) = setup();
        let outcome = engine.claim(&mut bank, "alice", t0(), &mut rng).expect("claim");
        assert!(outcome.first_claim);
        assert!((743..=1353).contains(&outcome.reward));
        assert_eq!(bank.balance("alice"), outcome.reward);

        let later = t0() + Duration::milliseconds(3_600_000);
        let second = engine.claim(&mut bank, "alice", later, &mut rng).expect("claim");
        assert!(!second.first_claim);
        assert!((67..=677).contains(&second.reward));
    }

    #[test]
    fn claim_within_cooldown_rejected() {
        let (mut engine, mut bank, mut rng) = setup();
        engine.claim(&mut bank, "alice", t0(), &mut rng).expect("claim");
        let before = bank.balance("alice");

        let err = engine
            .claim(&mut bank, "alice", t0() + Duration::milliseconds(3_599_999), &mut rng)
            .expect_err("cooldown");
        assert!(matches!(err, EconomyError::CooldownActive { remaining_ms: 1 }));
        assert_eq!(bank.balance("alice"), before);
    }

    #[test]
    fn notice_fires_once_after_cooldown() {
        let (mut engine, mut bank, mut rng) = setup();
        bank.touch_channel("alice", "#stream");
        engine.claim(&mut bank, "alice", t0(), &mut rng).expect("claim");

        assert!(engine.due_notices(&mut bank, t0() + Duration::minutes(59)).is_empty());
        let due = engine.due_notices(&mut bank, t0() + Duration::minutes(60));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].channel, "#stream");
        assert!(bank.account("alice").expect("exists").reminded);
        assert!(engine.due_notices(&mut bank, t0() + Duration::minutes(61)).is_empty());
    }

    #[test]
    fn stale_notice_dropped_after_newer_claim() {
        let (mut engine, mut bank, mut rng) = setup();
        engine.claim(&mut bank, "alice", t0(), &mut rng).expect("claim");
        // A notice snapshot from an older claim must not fire for the newer one.
        engine.pending.push(ClaimNotice {
            user: "alice".into(),
            channel: String::new(),
            claimed_at: t0() - Duration::hours(5),
            fire_at: t0() - Duration::hours(4),
        });
        assert!(engine.due_notices(&mut bank, t0() + Duration::minutes(1)).is_empty());
        assert!(!bank.account("alice").expect("exists").reminded);
    }

    #[test]
    fn notices_restored_after_restart() {
        let (mut engine, mut bank, mut rng) = setup();
        engine.claim(&mut bank, "alice", t0(), &mut rng).expect("claim");
        engine.claim(&mut bank, "bob", t0() - Duration::hours(5), &mut rng).expect("claim");

        let mut restarted = ClaimEngine::new(ClaimConfig::default());
        restarted.restore_notices(&bank, t0() + Duration::minutes(30));
        assert_eq!(restarted.pending_count(), 1, "bob's cooldown ended too long ago");

        let due = restarted.due_notices(&mut bank, t0() + Duration::hours(1));
        assert_eq!(due[0].user, "alice");
    }
}
