//! Periodic systems that run without any user message.
//!
//! | System          | Default cadence | Work                                      |
//! |-----------------|-----------------|-------------------------------------------|
//! | Reminder sweep  | 10 s            | timed reminders, claim-cooldown notices   |
//! | Loan sweep      | 60 s            | hourly interest, deadline settlement      |
//!
//! Each sweep mutates the economy in one locked section and only then talks
//! to collaborators. A failed delivery or moderation call is logged; the
//! state change it belongs to has already happened and is not retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use starz_core::config::SchedulerConfig;
use starz_core::loan::LoanEvent;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bridge::{SharedEconomy, render_reminder};
use crate::collaborators::{Moderation, Outbound, deliver, with_timeout};

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Messages handed to the transport.
    pub delivered: usize,
    /// Deliveries that failed.
    pub failed: usize,
    /// Timeouts requested from moderation.
    pub penalties: usize,
}

/// Collaborators the periodic systems need.
pub struct Systems<M, O> {
    economy: SharedEconomy,
    moderation: Arc<M>,
    outbound: Arc<O>,
    timeout_ms: u64,
}

impl<M: Moderation + 'static, O: Outbound + 'static> Systems<M, O> {
    /// Systems over `economy`.
    #[must_use]
    pub fn new(economy: SharedEconomy, moderation: Arc<M>, outbound: Arc<O>) -> Self {
        let timeout_ms = economy.lock().config().external.request_timeout_ms;
        Self {
            economy,
            moderation,
            outbound,
            timeout_ms,
        }
    }

    async fn send(&self, channel: &str, text: &str, report: &mut SweepReport) {
        if channel.is_empty() {
            debug!(text, "No channel known, dropping message");
            report.failed += 1;
        } else if deliver(self.outbound.as_ref(), self.timeout_ms, channel, text).await {
            report.delivered += 1;
        } else {
            report.failed += 1;
        }
    }

    /// Deliver due reminders and claim notices.
    pub async fn reminder_sweep(&self, now: chrono::DateTime<Utc>) -> SweepReport {
        let sweep = self.economy.lock().reminder_tick(now);
        let mut report = SweepReport::default();
        for reminder in &sweep.reminders {
            self.send(&reminder.channel, &render_reminder(reminder), &mut report).await;
        }
        for notice in &sweep.claim_notices {
            let text = format!("@{} you can claim stars again!", notice.user);
            self.send(&notice.channel, &text, &mut report).await;
        }
        if report != SweepReport::default() {
            debug!(delivered = report.delivered, failed = report.failed, "Reminder sweep");
        }
        report
    }

    /// Charge interest and settle loans past their deadline.
    pub async fn loan_sweep(&self, now: chrono::DateTime<Utc>) -> SweepReport {
        let events = self.economy.lock().loan_tick(now);
        let mut report = SweepReport::default();
        for event in events {
            match event {
                LoanEvent::InterestCharged { .. } => {}
                LoanEvent::Repaid { user, paid, channel } => {
                    let text = format!("@{user} your loan was repaid automatically ({paid} stars)");
                    self.send(&channel, &text, &mut report).await;
                }
                LoanEvent::Defaulted {
                    user,
                    paid,
                    remaining,
                    penalty_seconds,
                    channel,
                } => {
                    if channel.is_empty() {
                        debug!(user = %user, penalty_seconds, "No channel known, skipping timeout");
                    } else {
                        let reason = format!("defaulted on a loan with {remaining} stars unpaid");
                        match with_timeout(
                            self.timeout_ms,
                            self.moderation.request_timeout(&channel, &user, penalty_seconds, &reason),
                        )
                        .await
                        {
                            Ok(()) => report.penalties += 1,
                            Err(e) => warn!(user = %user, error = %e, "Timeout request failed, debt cleared anyway"),
                        }
                    }
                    let text = format!(
                        "@{user} could not repay the loan (paid {paid}, {remaining} missing). Time served: {penalty_seconds}s"
                    );
                    self.send(&channel, &text, &mut report).await;
                }
            }
        }
        report
    }

    /// Run both sweeps on their intervals until `shutdown` flips to `true`.
    pub fn spawn(self: Arc<Self>, cadence: &SchedulerConfig, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let reminder_every = Duration::from_secs(cadence.reminder_tick_seconds.max(1));
        let loan_every = Duration::from_secs(cadence.loan_tick_seconds.max(1));
        info!(
            reminder_secs = reminder_every.as_secs(),
            loan_secs = loan_every.as_secs(),
            "Starting periodic systems"
        );

        let reminders = {
            let systems = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(reminder_every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            systems.reminder_sweep(Utc::now()).await;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Reminder sweep stopped");
            })
        };

        let loans = {
            let systems = self;
            let mut shutdown = shutdown;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(loan_every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            systems.loan_sweep(Utc::now()).await;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Loan sweep stopped");
            })
        };

        vec![reminders, loans]
    }
}
