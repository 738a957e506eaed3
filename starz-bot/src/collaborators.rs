//! External collaborators the economy talks to, and simple implementations.
//!
//! The chat transport supplies real implementations; the ones here cover the
//! console binary and tests. Every call made through [`with_timeout`] is
//! bounded, and a timed-out call is reported as an error so the command
//! fails closed.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use starz_core::{EconomyError, Result};
use tracing::{info, warn};

/// Channel-specific emote names, used as slot symbols.
pub trait EmoteCatalog: Send + Sync {
    /// Emotes usable in `channel`. May be empty.
    fn emotes(&self, channel: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Moderation actions against chatters.
pub trait Moderation: Send + Sync {
    /// Time `user` out in `channel` for `seconds`.
    fn request_timeout(
        &self,
        channel: &str,
        user: &str,
        seconds: u64,
        reason: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Message delivery into a channel. Fire-and-forget from the economy's view.
pub trait Outbound: Send + Sync {
    /// Post `text` to `channel`.
    fn send(&self, channel: &str, text: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Await `fut` for at most `timeout_ms`.
///
/// # Errors
/// [`EconomyError::Timeout`] when the bound is hit, otherwise whatever `fut`
/// returned.
pub async fn with_timeout<T>(timeout_ms: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(EconomyError::Timeout(timeout_ms)),
    }
}

// ---------------------------------------------------------------------------
// Emotes
// ---------------------------------------------------------------------------

/// Fixed emote lists per channel with a fallback list.
#[derive(Debug, Clone, Default)]
pub struct StaticEmotes {
    by_channel: HashMap<String, Vec<String>>,
    fallback: Vec<String>,
}

impl StaticEmotes {
    /// Catalog that answers `fallback` for every channel.
    #[must_use]
    pub fn new<I, S>(fallback: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            by_channel: HashMap::new(),
            fallback: fallback.into_iter().map(Into::into).collect(),
        }
    }

    /// Override the list for one channel.
    #[must_use]
    pub fn with_channel<I, S>(mut self, channel: &str, emotes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_channel
            .insert(channel.to_string(), emotes.into_iter().map(Into::into).collect());
        self
    }
}

impl EmoteCatalog for StaticEmotes {
    async fn emotes(&self, channel: &str) -> Result<Vec<String>> {
        Ok(self
            .by_channel
            .get(channel)
            .unwrap_or(&self.fallback)
            .clone())
    }
}

// ---------------------------------------------------------------------------
// Moderation
// ---------------------------------------------------------------------------

/// A timeout that was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutRequest {
    /// Channel.
    pub channel: String,
    /// Chatter.
    pub user: String,
    /// Length.
    pub seconds: u64,
    /// Reason given.
    pub reason: String,
}

/// Logs timeout requests and remembers them. Has no moderation powers.
#[derive(Debug, Default)]
pub struct LoggingModeration {
    requests: Mutex<Vec<TimeoutRequest>>,
}

impl LoggingModeration {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests so far.
    #[must_use]
    pub fn requests(&self) -> Vec<TimeoutRequest> {
        self.requests.lock().clone()
    }
}

impl Moderation for LoggingModeration {
    async fn request_timeout(&self, channel: &str, user: &str, seconds: u64, reason: &str) -> Result<()> {
        info!(channel, user, seconds, reason, "Timeout requested");
        self.requests.lock().push(TimeoutRequest {
            channel: channel.to_string(),
            user: user.to_string(),
            seconds,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Prints messages to stdout as `[channel] text`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOutbound;

impl Outbound for ConsoleOutbound {
    async fn send(&self, channel: &str, text: &str) -> Result<()> {
        println!("[{channel}] {text}");
        Ok(())
    }
}

/// Collects messages in memory.
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingOutbound {
    /// Empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far as `(channel, text)`.
    #[must_use]
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

impl Outbound for RecordingOutbound {
    async fn send(&self, channel: &str, text: &str) -> Result<()> {
        self.sent.lock().push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

/// Send `text` with a time bound, logging instead of failing.
pub async fn deliver<O: Outbound>(outbound: &O, timeout_ms: u64, channel: &str, text: &str) -> bool {
    match with_timeout(timeout_ms, outbound.send(channel, text)).await {
        Ok(()) => true,
        Err(e) => {
            warn!(channel, error = %e, "Message delivery failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowEmotes;

    impl EmoteCatalog for SlowEmotes {
        async fn emotes(&self, _channel: &str) -> Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec!["late".into()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_collaborator_times_out() {
        let err = with_timeout(5_000, SlowEmotes.emotes("#c")).await.expect_err("timeout");
        assert!(matches!(err, EconomyError::Timeout(5_000)));
    }

    #[tokio::test]
    async fn static_emotes_fall_back() {
        let catalog = StaticEmotes::new(["Kappa", "PogU"]).with_channel("#special", ["LUL"]);
        assert_eq!(catalog.emotes("#other").await.expect("ok").len(), 2);
        assert_eq!(catalog.emotes("#special").await.expect("ok"), vec!["LUL".to_string()]);
    }

    #[tokio::test]
    async fn recorders_keep_calls() {
        let moderation = LoggingModeration::new();
        moderation
            .request_timeout("#c", "alice", 60, "loan default")
            .await
            .expect("ok");
        assert_eq!(moderation.requests()[0].seconds, 60);

        let outbound = RecordingOutbound::new();
        assert!(deliver(&outbound, 1_000, "#c", "hi").await);
        assert_eq!(outbound.sent(), vec![("#c".to_string(), "hi".to_string())]);
    }
}
