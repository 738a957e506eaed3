//! Interactive console for the starz economy.
//!
//! Reads lines from stdin and feeds them through the command bridge as chat
//! messages. A line may start with `name:` to speak as someone else:
//!
//! ```text
//! alice: !claim
//! bob: !remind alice 10m tee
//! !top
//! ```
//!
//! Usage: `starz-console [path/to/starz.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use parking_lot::Mutex;
use starz_bot::collaborators::{ConsoleOutbound, LoggingModeration, StaticEmotes};
use starz_bot::{BotConfig, ChatMessage, CommandBridge, Systems};
use starz_core::Economy;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn split_sender<'a>(line: &'a str, default_user: &'a str) -> (&'a str, &'a str) {
    match line.split_once(':') {
        Some((name, rest)) if !name.trim().is_empty() && !name.contains(char::is_whitespace) => {
            (name.trim(), rest.trim())
        }
        _ => (default_user, line.trim()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("starz.toml"), PathBuf::from);
    let config = BotConfig::load_or_default(&path).context("loading configuration")?;
    init_logging(&config.economy.general.log_level, config.economy.general.json_logs);
    info!(config = %path.display(), "starz console starting");

    let economy = Arc::new(Mutex::new(Economy::open(config.economy.clone())));
    let outbound = Arc::new(ConsoleOutbound);
    let bridge = CommandBridge::new(
        Arc::clone(&economy),
        Arc::new(StaticEmotes::new(config.console.emotes.clone())),
        Arc::clone(&outbound),
        &config.console.command_prefix,
    );
    let systems = Arc::new(Systems::new(
        Arc::clone(&economy),
        Arc::new(LoggingModeration::new()),
        outbound,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = systems.spawn(&config.economy.scheduler, shutdown_rx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let (user, text) = split_sender(&line, &config.console.default_user);
                let message = ChatMessage::new(user, &config.console.channel, text);
                bridge.handle_message(&message, Utc::now()).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    economy.lock().save_all();
    info!("starz console stopped");
    Ok(())
}
