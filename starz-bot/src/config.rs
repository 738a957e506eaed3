//! Bot configuration: the economy settings plus the console front-end.
//!
//! Everything lives in one `starz.toml`; the economy sections sit at the top
//! level next to `[console]`.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use starz_core::EconomyConfig;

/// Full configuration of the bot process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Economy settings (`[general]`, `[persistence]`, `[claim]`, ...).
    #[serde(flatten)]
    pub economy: EconomyConfig,
    /// Console front-end.
    #[serde(default)]
    pub console: ConsoleConfig,
}

/// Settings for the stdin console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Channel name console lines are posted to.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Sender used when a line does not name one.
    #[serde(default = "default_user")]
    pub default_user: String,
    /// Command prefix.
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
    /// Emotes offered as slot symbols.
    #[serde(default = "default_emotes")]
    pub emotes: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            default_user: default_user(),
            command_prefix: default_prefix(),
            emotes: default_emotes(),
        }
    }
}

fn default_channel() -> String { "#console".to_string() }
fn default_user() -> String { "console".to_string() }
fn default_prefix() -> String { "!".to_string() }
fn default_emotes() -> Vec<String> {
    ["Kappa", "PogU", "LUL", "monkaS", "EZ", "catJAM"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

impl BotConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// Invalid TOML or a failed economy validation.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(toml_str).context("parsing bot configuration")?;
        config.economy.validate()?;
        Ok(config)
    }

    /// Load `path`, or defaults when it does not exist.
    ///
    /// # Errors
    /// An unreadable or invalid file.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content)
    }
}
