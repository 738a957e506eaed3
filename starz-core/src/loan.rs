//! Loans with compounding interest and a hard deadline.
//!
//! ```text
//!   NoLoan --grant--> Active --repay (debt 0)--> NoLoan
//!                       |
//!                       +--tick, now >= due_at--> auto-repay min(balance, debt)
//!                                                  |-- debt 0  -> NoLoan (repaid)
//!                                                  +-- debt >0 -> penalty, NoLoan
//! ```
//!
//! On default the remaining debt is forgiven once the penalty (a timeout
//! proportional to the debt) has been requested. The loan never survives
//! its deadline.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::info;

use crate::bank::Bank;
use crate::config::{LoanConfig, RepayPolicy};
use crate::error::{EconomyError, Result};

/// A freshly granted loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanGrant {
    /// Principal credited to the balance.
    pub amount: u64,
    /// Deadline.
    pub due_at: DateTime<Utc>,
    /// Balance after crediting.
    pub balance: u64,
}

/// Result of a manual repayment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repayment {
    /// Stars taken from the balance.
    pub paid: u64,
    /// Debt left afterwards.
    pub remaining: u64,
    /// Whether the loan is now closed.
    pub cleared: bool,
}

/// Snapshot of an active loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanStatus {
    /// Principal.
    pub amount: u64,
    /// Current debt.
    pub debt: u64,
    /// Deadline.
    pub due_at: DateTime<Utc>,
    /// Time until the deadline (zero if passed).
    pub remaining: Duration,
}

/// Something the periodic loan sweep did.
#[derive(Debug, Clone, PartialEq)]
pub enum LoanEvent {
    /// Interest was added.
    InterestCharged {
        /// Account key.
        user: String,
        /// Debt after interest.
        debt: u64,
    },
    /// The deadline passed and the balance covered the debt.
    Repaid {
        /// Account key.
        user: String,
        /// Stars collected.
        paid: u64,
        /// Channel to announce in.
        channel: String,
    },
    /// The deadline passed and the balance fell short.
    Defaulted {
        /// Account key.
        user: String,
        /// Stars collected before defaulting.
        paid: u64,
        /// Debt forgiven after the penalty.
        remaining: u64,
        /// Timeout to request from moderation.
        penalty_seconds: u64,
        /// Channel to apply the penalty in.
        channel: String,
    },
}

/// Grants loans and enforces their terms.
#[derive(Debug)]
pub struct LoanLedger {
    config: LoanConfig,
}

impl LoanLedger {
    /// New ledger with the given terms.
    #[must_use]
    pub fn new(config: LoanConfig) -> Self {
        Self { config }
    }

    /// Hand out a loan of a random size.
    ///
    /// # Errors
    /// [`EconomyError::LoanActive`] if the account already owes.
    pub fn grant<R: Rng + ?Sized>(
        &self,
        bank: &mut Bank,
        user: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<LoanGrant> {
        let amount = rng.gen_range(self.config.amount_min..=self.config.amount_max);
        let due_at = Duration::try_milliseconds(self.config.duration_ms)
            .and_then(|span| now.checked_add_signed(span))
            .ok_or_else(|| EconomyError::InvalidInput("loan deadline out of range".into()))?;
        let grant = bank.update(user, |account| {
            if account.loan.active {
                return Err(EconomyError::LoanActive);
            }
            account.loan.amount = amount;
            account.loan.debt = amount;
            account.loan.due_at = Some(due_at);
            account.loan.last_interest_at = Some(now);
            account.loan.active = true;
            Ok(LoanGrant {
                amount,
                due_at,
                balance: account.credit(amount),
            })
        })?;
        info!(user, amount, due_at = %due_at, "Loan granted");
        Ok(grant)
    }

    /// Pay down as much debt as the balance allows.
    ///
    /// # Errors
    /// [`EconomyError::RepayDenied`] under [`RepayPolicy::Denied`],
    /// [`EconomyError::NoLoan`] without an active loan,
    /// [`EconomyError::InsufficientFunds`] with an empty balance.
    pub fn repay(&self, bank: &mut Bank, user: &str) -> Result<Repayment> {
        if self.config.repay_policy == RepayPolicy::Denied {
            return Err(EconomyError::RepayDenied);
        }
        bank.update(user, |account| {
            if !account.loan.active {
                return Err(EconomyError::NoLoan);
            }
            let paid = account.balance.min(account.loan.debt);
            if paid == 0 {
                return Err(EconomyError::InsufficientFunds {
                    needed: account.loan.debt,
                    available: 0,
                });
            }
            account.debit(paid)?;
            account.loan.debt -= paid;
            let remaining = account.loan.debt;
            if remaining == 0 {
                account.loan.clear();
            }
            Ok(Repayment {
                paid,
                remaining,
                cleared: remaining == 0,
            })
        })
    }

    /// Current loan of `user`, if any.
    #[must_use]
    pub fn status(&self, bank: &Bank, user: &str, now: DateTime<Utc>) -> Option<LoanStatus> {
        let loan = &bank.account(user)?.loan;
        if !loan.active {
            return None;
        }
        let due_at = loan.due_at?;
        Some(LoanStatus {
            amount: loan.amount,
            debt: loan.debt,
            due_at,
            remaining: (due_at - now).max(Duration::zero()),
        })
    }

    /// Timeout requested for defaulting with `remaining` debt.
    #[must_use]
    pub fn penalty_seconds(&self, remaining: u64) -> u64 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let scaled = (remaining as f64 * self.config.penalty_seconds_per_debt).ceil() as u64;
        scaled.clamp(self.config.penalty_min_seconds, self.config.penalty_max_seconds)
    }

    fn with_interest(&self, debt: u64) -> u64 {
        let bp = self.config.interest_basis_points;
        let grown = u128::from(debt) * u128::from(10_000 + bp);
        u64::try_from(grown.div_ceil(10_000)).unwrap_or(u64::MAX)
    }

    /// Periodic sweep: charge due interest, then settle loans past their deadline.
    pub fn tick(&self, bank: &mut Bank, now: DateTime<Utc>) -> Vec<LoanEvent> {
        let interval = Duration::milliseconds(self.config.interest_interval_ms);
        let borrowers: Vec<String> = bank
            .accounts()
            .filter(|(_, account)| account.loan.active)
            .map(|(user, _)| user.clone())
            .collect();

        let mut events = Vec::new();
        for user in borrowers {
            let result = bank.update(&user, |account| {
                let mut local = Vec::new();
                let loan = &mut account.loan;

                let last = loan.last_interest_at.unwrap_or(now);
                if now - last >= interval {
                    loan.debt = self.with_interest(loan.debt);
                    loan.last_interest_at = Some(last + interval);
                    local.push(LoanEvent::InterestCharged {
                        user: user.clone(),
                        debt: loan.debt,
                    });
                }

                if loan.due_at.is_some_and(|due| now >= due) {
                    let paid = account.balance.min(account.loan.debt);
                    account.debit(paid)?;
                    let remaining = account.loan.debt - paid;
                    account.loan.clear();
                    local.push(if remaining == 0 {
                        LoanEvent::Repaid {
                            user: user.clone(),
                            paid,
                            channel: account.last_channel.clone(),
                        }
                    } else {
                        LoanEvent::Defaulted {
                            user: user.clone(),
                            paid,
                            remaining,
                            penalty_seconds: self.penalty_seconds(remaining),
                            channel: account.last_channel.clone(),
                        }
                    });
                }
                Ok(local)
            });
            if let Ok(local) = result {
                events.extend(local);
            }
        }

        for event in &events {
            match event {
                LoanEvent::Repaid { user, paid, .. } => info!(user = %user, paid, "Loan repaid at deadline"),
                LoanEvent::Defaulted { user, remaining, penalty_seconds, .. } => {
                    info!(user = %user, remaining, penalty_seconds, "Loan defaulted, debt forgiven after penalty");
                }
                LoanEvent::InterestCharged { .. } => {}
            }
        }
        events
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

    fn fixed_amount(amount: u64) -> LoanConfig {
        LoanConfig {
            amount_min: amount,
            amount_max: amount,
            ..LoanConfig::default()
        }
    }

    fn bank() -> Bank {
        Bank::load(Arc::new(MemoryStore::new()), 1000)
    }

    #[test]
    fn unreachable_deadline_is_refused() {
        let ledger = LoanLedger::new(LoanConfig {
            duration_ms: i64::MAX,
            ..fixed_amount(1000)
        });
        let mut bank = bank();
        let mut rng = StdRng::seed_from_u64(1);
        let err = ledger.grant(&mut bank, "alice", t0(), &mut rng).expect_err("overflow");
        assert!(matches!(err, EconomyError::InvalidInput(_)));
        let account = bank.snapshot("alice");
        assert_eq!(account.balance, 0);
        assert!(!account.loan.active);
    }

    #[test]
    fn grant_credits_and_blocks_second_loan() {
        let ledger = LoanLedger::new(fixed_amount(1000));
        let mut bank = bank();
        let mut rng = StdRng::seed_from_u64(1);
        let grant = ledger.grant(&mut bank, "alice", t0(), &mut rng).expect("grant");
        assert_eq!(grant.balance, 1000);
        assert_eq!(grant.due_at, t0() + Duration::hours(6));
        assert!(matches!(
            ledger.grant(&mut bank, "alice", t0(), &mut rng),
            Err(EconomyError::LoanActive)
        ));
        assert_eq!(bank.balance("alice"), 1000);
    }

    #[test]
    fn hourly_interest_then_default() {
        let ledger = LoanLedger::new(fixed_amount(1000));
        let mut bank = bank();
        let mut rng = StdRng::seed_from_u64(1);
        ledger.grant(&mut bank, "alice", t0(), &mut rng).expect("grant");
        // Spend the loan so the deadline cannot be covered.
        bank.update("alice", |a| a.debit(1000)).expect("spend");

        assert!(ledger.tick(&mut bank, t0() + Duration::minutes(30)).is_empty());

        let events = ledger.tick(&mut bank, t0() + Duration::milliseconds(3_700_000));
        assert_eq!(
            events,
            vec![LoanEvent::InterestCharged {
                user: "alice".into(),
                debt: 1100
            }]
        );
        assert_eq!(bank.account("alice").expect("exists").loan.debt, 1100);

        let events = ledger.tick(&mut bank, t0() + Duration::hours(6) + Duration::seconds(1));
        let defaults: Vec<&LoanEvent> = events
            .iter()
            .filter(|e| matches!(e, LoanEvent::Defaulted { .. }))
            .collect();
        assert_eq!(defaults.len(), 1);
        let loan = &bank.account("alice").expect("exists").loan;
        assert!(!loan.active);
        assert_eq!(loan.debt, 0);

        // Nothing left to settle.
        assert!(ledger.tick(&mut bank, t0() + Duration::hours(7)).is_empty());
    }

    #[test]
    fn deadline_partial_payment_takes_balance() {
        let ledger = LoanLedger::new(fixed_amount(1000));
        let mut bank = bank();
        let mut rng = StdRng::seed_from_u64(1);
        ledger.grant(&mut bank, "alice", t0(), &mut rng).expect("grant");
        bank.update("alice", |a| a.debit(700)).expect("spend");

        let events = ledger.tick(&mut bank, t0() + Duration::hours(6));
        let Some(LoanEvent::Defaulted { paid, remaining, .. }) = events.last() else {
            panic!("expected default, got {events:?}");
        };
        assert_eq!(*paid, 300);
        assert_eq!(*remaining, 1100 - 300);
        assert_eq!(bank.balance("alice"), 0);
    }

    #[test]
    fn deadline_with_enough_balance_repays() {
        let ledger = LoanLedger::new(LoanConfig {
            interest_basis_points: 0,
            ..fixed_amount(500)
        });
        let mut bank = bank();
        let mut rng = StdRng::seed_from_u64(1);
        ledger.grant(&mut bank, "alice", t0(), &mut rng).expect("grant");
        bank.update("alice", |a| Ok(a.credit(100))).expect("earn");

        let events = ledger.tick(&mut bank, t0() + Duration::hours(6));
        assert!(matches!(events.last(), Some(LoanEvent::Repaid { paid: 500, .. })));
        assert_eq!(bank.balance("alice"), 100);
    }

    #[test]
    fn repay_allowed_and_denied() {
        let mut bank = bank();
        let mut rng = StdRng::seed_from_u64(1);
        let allowed = LoanLedger::new(fixed_amount(800));
        allowed.grant(&mut bank, "alice", t0(), &mut rng).expect("grant");
        let repayment = allowed.repay(&mut bank, "alice").expect("repay");
        assert_eq!(repayment, Repayment { paid: 800, remaining: 0, cleared: true });
        assert!(allowed.status(&bank, "alice", t0()).is_none());
        assert!(matches!(allowed.repay(&mut bank, "alice"), Err(EconomyError::NoLoan)));

        let trap = LoanLedger::new(LoanConfig {
            repay_policy: RepayPolicy::Denied,
            ..fixed_amount(800)
        });
        trap.grant(&mut bank, "bob", t0(), &mut rng).expect("grant");
        assert!(matches!(trap.repay(&mut bank, "bob"), Err(EconomyError::RepayDenied)));
        assert_eq!(trap.status(&bank, "bob", t0()).expect("active").debt, 800);
    }

    #[test]
    fn penalty_is_clamped() {
        let ledger = LoanLedger::new(LoanConfig::default());
        assert_eq!(ledger.penalty_seconds(1), 60);
        assert_eq!(ledger.penalty_seconds(10_000), 1_000);
        assert_eq!(ledger.penalty_seconds(u64::MAX / 2), 1_209_600);
    }

    #[test]
    fn interest_rounds_up() {
        let ledger = LoanLedger::new(LoanConfig::default());
        assert_eq!(ledger.with_interest(1000), 1100);
        assert_eq!(ledger.with_interest(1001), 1102);
    }
}
