//! The single owner of all economy state.
//!
//! [`Economy`] is constructed once at process start and handed to whatever
//! drives it (a chat bridge, the console, tests). Each component owns its
//! own data: the [`Bank`] owns accounts, the [`ReminderScheduler`] owns the
//! reminder queue, the game engines own their sessions. Methods here only
//! route calls and pass the shared [`Bank`] along.
//!
//! All methods are synchronous. Callers that share an `Economy` between
//! tasks wrap it in a mutex and never hold the lock across an `.await`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::account::{Account, account_key};
use crate::bank::Bank;
use crate::bet::BetSpec;
use crate::blackjack::{BlackjackEngine, BlackjackRound, Deck};
use crate::claim::{ClaimEngine, ClaimNotice, ClaimOutcome};
use crate::config::EconomyConfig;
use crate::error::{EconomyError, Result};
use crate::level::{Investment, LevelTrack};
use crate::loan::{LoanEvent, LoanGrant, LoanLedger, LoanStatus, Repayment};
use crate::parity::{Parity, ParityGame, ParityResult, ParityTicket};
use crate::persistence::{PersistenceAdapter, open_adapter};
use crate::reminder::{Reminder, ReminderScheduler};
use crate::slot::{SlotGamble, SlotSpin};
use crate::time::parse_time_input;

/// Words that make a reminder target the person setting it.
const SELF_TARGETS: &[&str] = &["me", "mich", "mir"];

/// Stars moved between two accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Amount moved.
    pub amount: u64,
    /// Sender balance afterwards.
    pub from_balance: u64,
    /// Recipient balance afterwards.
    pub to_balance: u64,
}

/// Everything a periodic reminder sweep found due.
#[derive(Debug, Clone, Default)]
pub struct ReminderSweep {
    /// User reminders to deliver.
    pub reminders: Vec<Reminder>,
    /// "You can claim again" notices to deliver.
    pub claim_notices: Vec<ClaimNotice>,
}

impl ReminderSweep {
    /// Whether nothing is due.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty() && self.claim_notices.is_empty()
    }
}

/// Accounts, schedulers and games behind one facade.
#[derive(Debug)]
pub struct Economy {
    config: EconomyConfig,
    bank: Bank,
    reminders: ReminderScheduler,
    claims: ClaimEngine,
    loans: LoanLedger,
    blackjack: BlackjackEngine,
    parity: ParityGame,
    slots: SlotGamble,
    levels: LevelTrack,
    rng: StdRng,
}

impl Economy {
    /// Open the configured backend (with fallback) and restore state.
    #[must_use]
    pub fn open(config: EconomyConfig) -> Self {
        let adapter = open_adapter(&config.persistence);
        Self::new(config, adapter)
    }

    /// Build on an explicit adapter, seeding randomness from the OS.
    #[must_use]
    pub fn new(config: EconomyConfig, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        Self::with_rng(config, adapter, StdRng::from_entropy(), Utc::now())
    }

    /// Build with a fixed random source and start time (tests, replays).
    #[must_use]
    pub fn with_rng(
        config: EconomyConfig,
        adapter: Arc<dyn PersistenceAdapter>,
        rng: StdRng,
        now: DateTime<Utc>,
    ) -> Self {
        let levels = LevelTrack::new(config.level.clone());
        let bank = Bank::load(Arc::clone(&adapter), levels.initial_cost());
        let reminders = ReminderScheduler::load(adapter);
        let mut claims = ClaimEngine::new(config.claim.clone());
        claims.restore_notices(&bank, now);

        info!(
            backend = bank.backend_name(),
            accounts = bank.users().len(),
            reminders = reminders.len(),
            "Economy ready"
        );
        Self {
            loans: LoanLedger::new(config.loan.clone()),
            blackjack: BlackjackEngine::new(config.blackjack.clone()),
            parity: ParityGame::new(config.parity.clone()),
            slots: SlotGamble::new(config.slot.clone()),
            config,
            bank,
            reminders,
            claims,
            levels,
            rng,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Read access to accounts.
    #[must_use]
    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    // -----------------------------------------------------------------------
    // Chat activity
    // -----------------------------------------------------------------------

    /// Record that `user` spoke in `channel` and hand back the
    /// on-next-message reminders that were waiting for them.
    pub fn on_message(&mut self, user: &str, channel: &str) -> Vec<Reminder> {
        self.bank.touch_channel(user, channel);
        self.reminders.on_message(user)
    }

    /// Route a bare chat message to an open parity game if it is a guess word.
    pub fn parity_chat(&mut self, user: &str, text: &str) -> Option<Result<ParityResult>> {
        self.parity.resolve_chat(&mut self.bank, user, text)
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Current account of `user` (a fresh one if they never interacted).
    #[must_use]
    pub fn balance(&self, user: &str) -> Account {
        self.bank.snapshot(user)
    }

    /// Richest accounts, as `(user, balance)`.
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<(String, u64)> {
        self.bank
            .top(n)
            .into_iter()
            .map(|(user, account)| (user.to_string(), account.balance))
            .collect()
    }

    /// Move stars from one user to another.
    ///
    /// # Errors
    /// [`EconomyError::InvalidInput`] for a transfer to oneself, or the stake
    /// errors of [`BetSpec::resolve`].
    pub fn give(&mut self, from: &str, to: &str, spec: BetSpec) -> Result<Transfer> {
        let (from_key, to_key) = (account_key(from), account_key(to));
        if to_key.is_empty() {
            return Err(EconomyError::InvalidInput("missing recipient".into()));
        }
        if from_key == to_key {
            return Err(EconomyError::InvalidInput("cannot give stars to yourself".into()));
        }
        let (amount, from_balance) = self.bank.update(&from_key, |account| {
            let amount = spec.resolve(account.balance)?;
            Ok((amount, account.debit(amount)?))
        })?;
        let to_balance = self.bank.update(&to_key, |account| Ok(account.credit(amount)))?;
        info!(from = %from_key, to = %to_key, amount, "Stars transferred");
        Ok(Transfer {
            amount,
            from_balance,
            to_balance,
        })
    }

    /// Invest stars into levels.
    ///
    /// # Errors
    /// The stake errors of [`BetSpec::resolve`].
    pub fn invest(&mut self, user: &str, spec: BetSpec) -> Result<Investment> {
        self.levels.invest(&mut self.bank, user, spec)
    }

    // -----------------------------------------------------------------------
    // Claims
    // -----------------------------------------------------------------------

    /// Hourly star claim.
    ///
    /// # Errors
    /// [`EconomyError::CooldownActive`] while on cooldown.
    pub fn claim(&mut self, user: &str, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        self.claims.claim(&mut self.bank, user, now, &mut self.rng)
    }

    /// Time until `user` may claim again.
    #[must_use]
    pub fn cooldown_remaining(&self, user: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.claims.cooldown_remaining(&self.bank, user, now)
    }

    // -----------------------------------------------------------------------
    // Loans
    // -----------------------------------------------------------------------

    /// Take out a loan.
    ///
    /// # Errors
    /// [`EconomyError::LoanActive`] if one is already open.
    pub fn take_loan(&mut self, user: &str, now: DateTime<Utc>) -> Result<LoanGrant> {
        self.loans.grant(&mut self.bank, user, now, &mut self.rng)
    }

    /// Repay as much of the loan as the balance covers.
    ///
    /// # Errors
    /// See [`LoanLedger::repay`].
    pub fn repay_loan(&mut self, user: &str) -> Result<Repayment> {
        self.loans.repay(&mut self.bank, user)
    }

    /// Open loan of `user`, if any.
    #[must_use]
    pub fn loan_status(&self, user: &str, now: DateTime<Utc>) -> Option<LoanStatus> {
        self.loans.status(&self.bank, user, now)
    }

    /// Periodic interest and deadline sweep.
    pub fn loan_tick(&mut self, now: DateTime<Utc>) -> Vec<LoanEvent> {
        self.loans.tick(&mut self.bank, now)
    }

    /// Timeout length a default with `remaining` debt earns.
    #[must_use]
    pub fn penalty_seconds(&self, remaining: u64) -> u64 {
        self.loans.penalty_seconds(remaining)
    }

    // -----------------------------------------------------------------------
    // Games
    // -----------------------------------------------------------------------

    /// Deal a blackjack hand.
    ///
    /// # Errors
    /// See [`BlackjackEngine::start`].
    pub fn blackjack_start(&mut self, user: &str, spec: BetSpec) -> Result<BlackjackRound> {
        self.blackjack.start(&mut self.bank, user, spec, &mut self.rng)
    }

    /// Deal a blackjack hand from a prepared deck.
    ///
    /// # Errors
    /// See [`BlackjackEngine::start_with_deck`].
    pub fn blackjack_start_with_deck(&mut self, user: &str, spec: BetSpec, deck: Deck) -> Result<BlackjackRound> {
        self.blackjack.start_with_deck(&mut self.bank, user, spec, deck)
    }

    /// Blackjack hit.
    ///
    /// # Errors
    /// [`EconomyError::NoSession`] without an open hand.
    pub fn blackjack_hit(&mut self, user: &str) -> Result<BlackjackRound> {
        self.blackjack.hit(&mut self.bank, user)
    }

    /// Blackjack stand.
    ///
    /// # Errors
    /// [`EconomyError::NoSession`] without an open hand.
    pub fn blackjack_stand(&mut self, user: &str) -> Result<BlackjackRound> {
        self.blackjack.stand(&mut self.bank, user)
    }

    /// Start a parity game.
    ///
    /// # Errors
    /// See [`ParityGame::start`].
    pub fn parity_start(&mut self, user: &str, spec: BetSpec) -> Result<ParityTicket> {
        self.parity.start(&mut self.bank, user, spec, &mut self.rng)
    }

    /// Start a parity game with a fixed secret.
    ///
    /// # Errors
    /// See [`ParityGame::start_with_secret`].
    pub fn parity_start_with_secret(&mut self, user: &str, spec: BetSpec, secret: u32) -> Result<ParityTicket> {
        self.parity.start_with_secret(&mut self.bank, user, spec, secret)
    }

    /// Guess via the command route.
    ///
    /// # Errors
    /// [`EconomyError::NoSession`] without an open game.
    pub fn parity_guess(&mut self, user: &str, guess: Parity) -> Result<ParityResult> {
        self.parity.resolve(&mut self.bank, user, guess)
    }

    /// Spin the slot machine over `symbols`.
    ///
    /// # Errors
    /// See [`SlotGamble::spin`].
    pub fn spin(&mut self, user: &str, spec: BetSpec, symbols: &[String]) -> Result<SlotSpin> {
        self.slots.spin(&mut self.bank, user, spec, symbols, &mut self.rng)
    }

    // -----------------------------------------------------------------------
    // Reminders
    // -----------------------------------------------------------------------

    /// Create a reminder from a free-text phrase.
    ///
    /// `target` may be `me`/`mich`/`mir` for the source itself. A phrase
    /// without a recognisable time becomes an on-next-message reminder
    /// carrying the whole phrase.
    ///
    /// # Errors
    /// [`EconomyError::InvalidInput`] without a target or message.
    pub fn remind<S: AsRef<str>>(
        &mut self,
        source: &str,
        target: &str,
        phrase: &[S],
        channel: &str,
        now: DateTime<Utc>,
    ) -> Result<Reminder> {
        let target = target.trim();
        if target.is_empty() {
            return Err(EconomyError::InvalidInput("missing reminder target".into()));
        }
        let target = if SELF_TARGETS.contains(&target.to_lowercase().as_str()) {
            source
        } else {
            target
        };

        let (message, due_at) = match parse_time_input(phrase, now) {
            Some(parsed) => (parsed.message, Some(parsed.due_at)),
            None => (
                phrase.iter().map(|t| t.as_ref()).collect::<Vec<&str>>().join(" "),
                None,
            ),
        };
        if message.trim().is_empty() && due_at.is_none() {
            return Err(EconomyError::InvalidInput("nothing to remind about".into()));
        }

        let reminder = Reminder::new(target, &account_key(source), message, due_at, channel, now);
        Ok(self.reminders.create(reminder).clone())
    }

    /// Reminders still waiting for `user`.
    #[must_use]
    pub fn pending_reminders(&self, user: &str) -> Vec<Reminder> {
        self.reminders.pending_for(user).into_iter().cloned().collect()
    }

    /// Periodic sweep for timed reminders and expired claim cooldowns.
    pub fn reminder_tick(&mut self, now: DateTime<Utc>) -> ReminderSweep {
        ReminderSweep {
            reminders: self.reminders.tick(now),
            claim_notices: self.claims.due_notices(&mut self.bank, now),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Flush every account to the backend.
    pub fn save_all(&self) {
        self.bank.save_all();
    }
}
