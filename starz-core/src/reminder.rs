//! Durable reminder queue.
//!
//! A reminder is either due at an instant (delivered by the periodic
//! [`ReminderScheduler::tick`]) or due on the target's next chat message
//! (delivered by [`ReminderScheduler::on_message`]). Either way it leaves
//! the queue, and the queue is persisted, *before* it is handed out for
//! delivery, so overlapping ticks cannot send it twice. Delivery itself is
//! best effort.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::account_key;
use crate::persistence::PersistenceAdapter;

/// A message one user left for another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Unique id.
    pub id: Uuid,
    /// Recipient, lowercased.
    pub target: String,
    /// Who created it.
    pub source: String,
    /// Free text to deliver.
    pub message: String,
    /// When to deliver. `None` means on the target's next message.
    pub due_at: Option<DateTime<Utc>>,
    /// Channel to deliver into.
    pub channel: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// Build a reminder with a fresh id.
    #[must_use]
    pub fn new(
        target: &str,
        source: &str,
        message: impl Into<String>,
        due_at: Option<DateTime<Utc>>,
        channel: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: account_key(target),
            source: source.to_string(),
            message: message.into(),
            due_at,
            channel: channel.into(),
            created_at,
        }
    }

    /// Whether this reminder waits for the target's next message.
    #[must_use]
    pub fn is_on_next_message(&self) -> bool {
        self.due_at.is_none()
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at.is_some_and(|due| due <= now)
    }
}

/// Owns the pending reminder queue and keeps it persisted.
pub struct ReminderScheduler {
    queue: Vec<Reminder>,
    adapter: Arc<dyn PersistenceAdapter>,
}

impl std::fmt::Debug for ReminderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderScheduler")
            .field("pending", &self.queue.len())
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

impl ReminderScheduler {
    /// Restore the queue from `adapter`. A failed load starts empty.
    #[must_use]
    pub fn load(adapter: Arc<dyn PersistenceAdapter>) -> Self {
        let queue = adapter.load_reminders().unwrap_or_else(|e| {
            warn!(error = %e, backend = adapter.name(), "Could not load reminders, starting empty");
            Vec::new()
        });
        debug!(pending = queue.len(), "Reminder queue restored");
        Self { queue, adapter }
    }

    /// Append a reminder and persist the queue.
    pub fn create(&mut self, reminder: Reminder) -> &Reminder {
        info!(
            target_user = %reminder.target,
            source = %reminder.source,
            due_at = ?reminder.due_at,
            "Reminder created"
        );
        self.queue.push(reminder);
        self.persist();
        &self.queue[self.queue.len() - 1]
    }

    /// Remove and return every timed reminder with `due_at <= now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Reminder> {
        self.take_where(|r| r.is_due(now))
    }

    /// Remove and return every on-next-message reminder for `user`.
    pub fn on_message(&mut self, user: &str) -> Vec<Reminder> {
        let key = account_key(user);
        self.take_where(|r| r.is_on_next_message() && r.target == key)
    }

    /// Reminders still waiting for `user`, in creation order.
    #[must_use]
    pub fn pending_for(&self, user: &str) -> Vec<&Reminder> {
        let key = account_key(user);
        self.queue.iter().filter(|r| r.target == key).collect()
    }

    /// Number of queued reminders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn take_where(&mut self, pred: impl Fn(&Reminder) -> bool) -> Vec<Reminder> {
        let (taken, kept): (Vec<Reminder>, Vec<Reminder>) =
            std::mem::take(&mut self.queue).into_iter().partition(|r| pred(r));
        self.queue = kept;
        if !taken.is_empty() {
            self.persist();
        }
        taken
    }

    fn persist(&self) {
        if let Err(e) = self.adapter.save_reminders(&self.queue) {
            warn!(error = %e, backend = self.adapter.name(), "Failed to persist reminder queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).single().expect("valid")
    }

    fn scheduler() -> (ReminderScheduler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ReminderScheduler::load(store.clone()), store)
    }

    #[test]
    fn timed_reminder_fires_once() {
        let (mut sched, store) = scheduler();
        sched.create(Reminder::new("Alice", "bob", "tee", Some(t0() + Duration::minutes(10)), "#c", t0()));
        assert_eq!(store.load_reminders().expect("load").len(), 1);

        assert!(sched.tick(t0() + Duration::minutes(9)).is_empty());
        let fired = sched.tick(t0() + Duration::minutes(10));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].target, "alice");
        assert!(sched.tick(t0() + Duration::minutes(11)).is_empty());
        assert!(store.load_reminders().expect("load").is_empty());
    }

    #[test]
    fn next_message_reminder_fires_once() {
        let (mut sched, _store) = scheduler();
        sched.create(Reminder::new("alice", "bob", "hi", None, "#c", t0()));
        sched.create(Reminder::new("carol", "bob", "yo", None, "#c", t0()));

        assert!(sched.tick(t0() + Duration::days(365)).is_empty());
        assert!(sched.on_message("bob").is_empty());

        let first = sched.on_message("ALICE");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].message, "hi");
        assert!(sched.on_message("alice").is_empty());
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn restored_from_adapter() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut sched = ReminderScheduler::load(store.clone());
            sched.create(Reminder::new("alice", "bob", "later", None, "#c", t0()));
        }
        let sched = ReminderScheduler::load(store);
        assert_eq!(sched.pending_for("alice").len(), 1);
    }
}
