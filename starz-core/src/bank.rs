//! The account store bound to its persistence adapter.
//!
//! Every mutation goes through [`Bank::update`]: the closure works on a
//! draft copy, the draft replaces the stored record only if the closure
//! succeeds, and the committed record is saved straight away. A rejected
//! command therefore never leaves a partial change behind.
//!
//! A failed save is logged and **not** rolled back. The in-memory record
//! stays authoritative; durability degrades, the chat does not stall.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::account::{Account, AccountStore, account_key};
use crate::error::Result;
use crate::persistence::PersistenceAdapter;

/// Accounts plus the adapter that keeps them durable.
pub struct Bank {
    store: AccountStore,
    adapter: Arc<dyn PersistenceAdapter>,
    initial_level_cost: u64,
}

impl std::fmt::Debug for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bank")
            .field("accounts", &self.store.len())
            .field("adapter", &self.adapter.name())
            .finish_non_exhaustive()
    }
}

impl Bank {
    /// Load all accounts from `adapter`. A failed load starts empty.
    #[must_use]
    pub fn load(adapter: Arc<dyn PersistenceAdapter>, initial_level_cost: u64) -> Self {
        let accounts = adapter.load_all().unwrap_or_else(|e| {
            warn!(error = %e, backend = adapter.name(), "Could not load accounts, starting empty");
            BTreeMap::new()
        });
        debug!(accounts = accounts.len(), backend = adapter.name(), "Bank opened");
        Self {
            store: AccountStore::from_accounts(accounts),
            adapter,
            initial_level_cost,
        }
    }

    /// Read-only view of an existing account.
    #[must_use]
    pub fn account(&self, user: &str) -> Option<&Account> {
        self.store.get(user)
    }

    /// Current record for `user`, or what a fresh account would look like.
    #[must_use]
    pub fn snapshot(&self, user: &str) -> Account {
        self.store
            .get(user)
            .cloned()
            .unwrap_or_else(|| Account::new(self.initial_level_cost))
    }

    /// Balance of `user` (zero for unknown users).
    #[must_use]
    pub fn balance(&self, user: &str) -> u64 {
        self.store.get(user).map_or(0, |a| a.balance)
    }

    /// Apply `f` to a draft of `user`'s account, commit on success and save.
    ///
    /// # Errors
    /// Whatever `f` returns; the stored account is untouched in that case.
    pub fn update<T>(&mut self, user: &str, f: impl FnOnce(&mut Account) -> Result<T>) -> Result<T> {
        let key = account_key(user);
        let mut draft = self.snapshot(&key);
        let out = f(&mut draft)?;
        self.store.insert(&key, draft.clone());
        self.persist(&key, &draft);
        Ok(out)
    }

    /// Record the channel a user was last active in. Saves only on change.
    pub fn touch_channel(&mut self, user: &str, channel: &str) {
        if self.store.get(user).is_some_and(|a| a.last_channel == channel) {
            return;
        }
        // Infallible closure; the result carries no information.
        let _ = self.update(user, |account| {
            account.last_channel = channel.to_string();
            Ok(())
        });
    }

    /// Save every account in one go (shutdown, periodic checkpoint).
    pub fn save_all(&self) {
        if let Err(e) = self.adapter.save_all(self.store.as_map()) {
            warn!(error = %e, backend = self.adapter.name(), "Failed to save all accounts");
        }
    }

    /// All known account keys.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        self.store.users()
    }

    /// Iterate over all accounts.
    pub fn accounts(&self) -> impl Iterator<Item = (&String, &Account)> {
        self.store.iter()
    }

    /// The `n` richest accounts.
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<(&str, &Account)> {
        self.store.top(n)
    }

    /// Name of the backend in use.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.adapter.name()
    }

    fn persist(&self, key: &str, account: &Account) {
        if let Err(e) = self.adapter.save_one(key, account) {
            warn!(user = %key, error = %e, backend = self.adapter.name(), "Failed to persist account, keeping in-memory state");
        }
    }
}
