//! Command bridge: routes chat messages into the economy and renders replies.
//!
//! The economy sits behind a mutex that is only ever locked in synchronous
//! sections. Anything that awaits (emote lookups, sends) happens before the
//! lock is taken or after it is released, so no balance is read in one turn
//! and written in another.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use starz_core::blackjack::{BlackjackRound, HandOutcome};
use starz_core::time::{format_berlin, format_duration};
use starz_core::{Economy, EconomyError, Reminder};
use tracing::{debug, warn};

use crate::collaborators::{EmoteCatalog, Outbound, deliver, with_timeout};
use crate::command::Command;

/// Economy shared between the bridge and the periodic systems.
pub type SharedEconomy = Arc<Mutex<Economy>>;

/// One inbound chat line.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Sender.
    pub user: String,
    /// Channel.
    pub channel: String,
    /// Raw text.
    pub text: String,
}

impl ChatMessage {
    /// Shorthand constructor.
    #[must_use]
    pub fn new(user: &str, channel: &str, text: &str) -> Self {
        Self {
            user: user.to_string(),
            channel: channel.to_string(),
            text: text.to_string(),
        }
    }
}

/// Turns chat messages into economy calls.
pub struct CommandBridge<E, O> {
    economy: SharedEconomy,
    emotes: Arc<E>,
    outbound: Arc<O>,
    prefix: String,
    timeout_ms: u64,
}

impl<E: EmoteCatalog, O: Outbound> CommandBridge<E, O> {
    /// Bridge over `economy`; commands start with `prefix`.
    #[must_use]
    pub fn new(economy: SharedEconomy, emotes: Arc<E>, outbound: Arc<O>, prefix: &str) -> Self {
        let timeout_ms = economy.lock().config().external.request_timeout_ms;
        Self {
            economy,
            emotes,
            outbound,
            prefix: prefix.to_string(),
            timeout_ms,
        }
    }

    /// Handle one chat line: deliver waiting reminders, treat a bare guess
    /// word as a parity guess, run a prefixed command. Every reply is sent
    /// to the message's channel and also returned.
    pub async fn handle_message(&self, message: &ChatMessage, now: DateTime<Utc>) -> Vec<String> {
        let mut replies = Vec::new();

        let (waiting, guess) = {
            let mut economy = self.economy.lock();
            let waiting = economy.on_message(&message.user, &message.channel);
            let guess = economy.parity_chat(&message.user, &message.text);
            (waiting, guess)
        };
        replies.extend(waiting.iter().map(render_reminder));
        if let Some(result) = guess {
            replies.push(match result {
                Ok(r) => render_parity(&message.user, &r),
                Err(e) => render_error(&message.user, &e),
            });
        }

        if let Some(rest) = message.text.trim().strip_prefix(self.prefix.as_str()) {
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            match Command::from_tokens(&tokens) {
                Ok(Some(command)) => {
                    replies.push(self.execute(&message.user, &message.channel, command, now).await);
                }
                Ok(None) => debug!(command = rest, "Not an economy command"),
                Err(e) => replies.push(render_error(&message.user, &e)),
            }
        }

        for reply in &replies {
            deliver(self.outbound.as_ref(), self.timeout_ms, &message.channel, reply).await;
        }
        replies
    }

    /// Run one command and render the reply.
    pub async fn execute(&self, user: &str, channel: &str, command: Command, now: DateTime<Utc>) -> String {
        // Emotes are fetched before the lock; a failed lookup means no symbols.
        let symbols = if matches!(command, Command::Gamble(_)) {
            match with_timeout(self.timeout_ms, self.emotes.emotes(channel)).await {
                Ok(symbols) => symbols,
                Err(e) => {
                    warn!(channel, error = %e, "Emote lookup failed, refusing gamble");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut economy = self.economy.lock();
        let result = match command {
            Command::Balance => {
                let account = economy.balance(user);
                Ok(format!(
                    "@{user} you have {} stars (level {}, {}/{} invested)",
                    account.balance, account.level, account.invested_stars, account.next_level_cost
                ))
            }
            Command::Claim => economy.claim(user, now).map(|o| {
                let bonus = if o.first_claim { " (first claim bonus!)" } else { "" };
                format!("@{user} claimed {} stars{bonus}. Balance: {}", o.reward, o.balance)
            }),
            Command::Loan => economy.take_loan(user, now).map(|g| {
                format!(
                    "@{user} borrowed {} stars, due {} (Berlin). Interest is charged hourly.",
                    g.amount,
                    format_berlin(g.due_at)
                )
            }),
            Command::Repay => economy.repay_loan(user).map(|r| {
                if r.cleared {
                    format!("@{user} paid {} stars, loan cleared", r.paid)
                } else {
                    format!("@{user} paid {} stars, {} still owed", r.paid, r.remaining)
                }
            }),
            Command::LoanStatus => Ok(match economy.loan_status(user, now) {
                Some(s) => format!(
                    "@{user} owes {} stars (borrowed {}), due in {}",
                    s.debt,
                    s.amount,
                    format_duration(s.remaining)
                ),
                None => format!("@{user} has no open loan"),
            }),
            Command::Give { to, spec } => economy.give(user, &to, spec).map(|t| {
                format!("@{user} gave {} stars to {to}. You have {} left", t.amount, t.from_balance)
            }),
            Command::Invest(spec) => economy.invest(user, spec).map(|i| {
                if i.levels_gained > 0 {
                    format!("@{user} reached level {}! Next level: {}/{}", i.level, i.progress, i.next_level_cost)
                } else {
                    format!("@{user} invested {} stars ({}/{})", i.invested, i.progress, i.next_level_cost)
                }
            }),
            Command::Top => {
                let ranking: Vec<String> = economy
                    .top(5)
                    .iter()
                    .enumerate()
                    .map(|(i, (name, balance))| format!("{}. {name} ({balance})", i + 1))
                    .collect();
                Ok(if ranking.is_empty() {
                    "Nobody has stars yet".to_string()
                } else {
                    ranking.join(" | ")
                })
            }
            Command::Blackjack(spec) => economy.blackjack_start(user, spec).map(|r| render_hand(user, &r)),
            Command::Hit => economy.blackjack_hit(user).map(|r| render_hand(user, &r)),
            Command::Stand => economy.blackjack_stand(user).map(|r| render_hand(user, &r)),
            Command::Parity(spec) => economy.parity_start(user, spec).map(|t| {
                format!("@{user} bet {} stars. Odd or even?", t.bet)
            }),
            Command::Guess(guess) => economy.parity_guess(user, guess).map(|r| render_parity(user, &r)),
            Command::Gamble(spec) => economy.spin(user, spec, &symbols).map(|s| {
                let reels = s.reels.join(" | ");
                if s.payout > 0 {
                    format!("{reels} @{user} won {} stars! Balance: {}", s.payout, s.balance)
                } else {
                    format!("{reels} @{user} lost {} stars. Balance: {}", s.bet, s.balance)
                }
            }),
            Command::Remind { target, phrase } => economy
                .remind(user, &target, phrase.as_slice(), channel, now)
                .map(|r| match r.due_at {
                    Some(due) => format!("@{user} reminder for {} set for {} (Berlin)", r.target, format_berlin(due)),
                    None => format!("@{user} I'll tell {} next time they write", r.target),
                }),
            Command::Reminders => {
                let pending = economy.pending_reminders(user);
                Ok(format!("@{user} {} reminder(s) waiting for you", pending.len()))
            }
        };
        drop(economy);

        result.unwrap_or_else(|e| render_error(user, &e))
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Text for a delivered reminder.
#[must_use]
pub fn render_reminder(reminder: &Reminder) -> String {
    if reminder.source == reminder.target {
        format!("@{} reminder: {}", reminder.target, reminder.message)
    } else {
        format!("@{} reminder from {}: {}", reminder.target, reminder.source, reminder.message)
    }
}

fn render_parity(user: &str, result: &starz_core::parity::ParityResult) -> String {
    if result.won {
        format!("@{user} it was {}, you win {} stars! Balance: {}", result.secret, result.payout, result.balance)
    } else {
        format!("@{user} it was {}, you lose {} stars. Balance: {}", result.secret, result.bet, result.balance)
    }
}

fn cards(hand: &[starz_core::blackjack::Card]) -> String {
    hand.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

fn render_hand(user: &str, round: &BlackjackRound) -> String {
    let you = format!("{} ({})", cards(&round.player), round.player_total);
    if round.outcome == HandOutcome::InProgress {
        let upcard = round.dealer.first().map(ToString::to_string).unwrap_or_default();
        return format!("@{user} you: {you} | dealer: {upcard} ?? | hit or stand?");
    }
    let dealer = format!("{} ({})", cards(&round.dealer), round.dealer_total);
    let verdict = match round.outcome {
        HandOutcome::Natural => format!("Blackjack! +{}", round.payout),
        HandOutcome::Win => format!("You win +{}", round.payout),
        HandOutcome::Push => "Push, stake returned".to_string(),
        HandOutcome::Lose => format!("Dealer wins, -{}", round.bet),
        HandOutcome::Bust => format!("Bust, -{}", round.bet),
        HandOutcome::InProgress => String::new(),
    };
    format!("@{user} you: {you} | dealer: {dealer} | {verdict}. Balance: {}", round.balance)
}

/// Short chat text for a failed command.
#[must_use]
pub fn render_error(user: &str, error: &EconomyError) -> String {
    match error {
        EconomyError::InvalidInput(msg) => format!("@{user} {msg}"),
        EconomyError::InsufficientFunds { needed, available } => {
            format!("@{user} you need {needed} stars but have {available}")
        }
        EconomyError::SessionConflict { game } => format!("@{user} finish your {game} game first"),
        EconomyError::NoSession { game } => format!("@{user} you have no {game} game running"),
        EconomyError::CooldownActive { remaining_ms } => format!(
            "@{user} next claim in {}",
            format_duration(chrono::Duration::milliseconds(*remaining_ms))
        ),
        EconomyError::LoanActive => format!("@{user} pay off your current loan first"),
        EconomyError::NoLoan => format!("@{user} you have no loan"),
        EconomyError::RepayDenied => format!("@{user} the bank does not accept repayments. Good luck."),
        EconomyError::NotEnoughSymbols { .. } => format!("@{user} the slot machine is out of order here"),
        other => {
            warn!(user, error = %other, "Command failed");
            format!("@{user} something went wrong, try again later")
        }
    }
}
