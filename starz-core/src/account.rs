//! Per-user accounts and the in-memory store that owns them.
//!
//! Accounts are keyed by lowercased username, created lazily on first
//! interaction and never deleted. Amounts are unsigned, so a balance can
//! never go negative; every debit is checked.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, Result};

/// Canonical account key for a username.
#[must_use]
pub fn account_key(user: &str) -> String {
    user.trim().trim_start_matches('@').to_lowercase()
}

/// Loan state carried on an account. At most one loan is active at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Principal handed out.
    pub amount: u64,
    /// Outstanding debt including interest.
    pub debt: u64,
    /// Deadline after which the loan defaults.
    pub due_at: Option<DateTime<Utc>>,
    /// When interest was last charged.
    pub last_interest_at: Option<DateTime<Utc>>,
    /// Whether a loan is currently open.
    pub active: bool,
}

impl Loan {
    /// Close the loan and forget any remaining debt.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The authoritative record for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Spendable stars.
    pub balance: u64,
    /// Current level.
    #[serde(default)]
    pub level: u32,
    /// Stars put towards the next level.
    #[serde(default)]
    pub invested_stars: u64,
    /// Stars needed to reach the next level.
    pub next_level_cost: u64,
    /// Time of the last successful claim.
    #[serde(default)]
    pub last_claim: Option<DateTime<Utc>>,
    /// Whether the cooldown-expiry notice for `last_claim` was sent.
    #[serde(default)]
    pub reminded: bool,
    /// Loan state.
    #[serde(default)]
    pub loan: Loan,
    /// Last channel the user was seen in.
    #[serde(default)]
    pub last_channel: String,
}

impl Account {
    /// A fresh account with zero balance.
    #[must_use]
    pub fn new(next_level_cost: u64) -> Self {
        Self {
            balance: 0,
            level: 0,
            invested_stars: 0,
            next_level_cost,
            last_claim: None,
            reminded: false,
            loan: Loan::default(),
            last_channel: String::new(),
        }
    }

    /// Add stars, saturating at `u64::MAX`. Returns the new balance.
    pub fn credit(&mut self, amount: u64) -> u64 {
        self.balance = self.balance.saturating_add(amount);
        self.balance
    }

    /// Remove stars, refusing to go below zero. Returns the new balance.
    ///
    /// # Errors
    /// Returns [`EconomyError::InsufficientFunds`] and leaves the balance
    /// untouched when `amount` exceeds it.
    pub fn debit(&mut self, amount: u64) -> Result<u64> {
        let remaining = self
            .balance
            .checked_sub(amount)
            .ok_or(EconomyError::InsufficientFunds {
                needed: amount,
                available: self.balance,
            })?;
        self.balance = remaining;
        Ok(remaining)
    }
}

/// In-memory map of all accounts. Performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    accounts: BTreeMap<String, Account>,
}

impl AccountStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded from previously persisted accounts. Keys are normalised.
    #[must_use]
    pub fn from_accounts(accounts: BTreeMap<String, Account>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|(name, account)| (account_key(&name), account))
                .collect(),
        }
    }

    /// Look up an account.
    #[must_use]
    pub fn get(&self, user: &str) -> Option<&Account> {
        self.accounts.get(&account_key(user))
    }

    /// Replace the record for `user`.
    pub fn insert(&mut self, user: &str, account: Account) {
        self.accounts.insert(account_key(user), account);
    }

    /// All accounts in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Account)> {
        self.accounts.iter()
    }

    /// All account keys.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        self.accounts.keys().cloned().collect()
    }

    /// Borrow the whole map (for `save_all`).
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, Account> {
        &self.accounts
    }

    /// Number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no account exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// The `n` richest accounts, ties broken by name.
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<(&str, &Account)> {
        let mut ranked: Vec<(&str, &Account)> = self
            .accounts
            .iter()
            .map(|(name, account)| (name.as_str(), account))
            .collect();
        ranked.sort_by(|a, b| b.1.balance.cmp(&a.1.balance).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(n);
        ranked
    }
}
