//! Configuration for the starz economy.
//!
//! Maps directly to `starz.toml`. Every tuned constant (reward ranges, odds,
//! interest) lives here instead of as a literal in the engines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, Result};

/// Upper bound for every millisecond span in the config: one year.
pub const MAX_SPAN_MS: i64 = 366 * 24 * 3_600_000;

/// Top-level economy configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EconomyConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Persistence backend selection.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Hourly star claim.
    #[serde(default)]
    pub claim: ClaimConfig,
    /// Loan terms.
    #[serde(default)]
    pub loan: LoanConfig,
    /// Blackjack table rules.
    #[serde(default)]
    pub blackjack: BlackjackConfig,
    /// Odd/even game.
    #[serde(default)]
    pub parity: ParityConfig,
    /// Slot gamble odds table.
    #[serde(default)]
    pub slot: SlotConfig,
    /// Level investment curve.
    #[serde(default)]
    pub level: LevelConfig,
    /// Periodic trigger cadence.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Bounds on calls to external collaborators.
    #[serde(default)]
    pub external: ExternalConfig,
}

impl EconomyConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `EconomyError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| EconomyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    /// Returns `EconomyError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.claim.reward_min > self.claim.reward_max {
            return Err(EconomyError::Config("claim.reward_min exceeds claim.reward_max".into()));
        }
        if self.loan.amount_min == 0 || self.loan.amount_min > self.loan.amount_max {
            return Err(EconomyError::Config("loan amount range is empty".into()));
        }
        if self.loan.penalty_min_seconds > self.loan.penalty_max_seconds {
            return Err(EconomyError::Config("loan penalty bounds are inverted".into()));
        }
        if self.slot.total_weight() != 100 {
            return Err(EconomyError::Config(format!(
                "slot odds must sum to 100, got {}",
                self.slot.total_weight()
            )));
        }
        for (name, ms) in [
            ("claim.cooldown_ms", self.claim.cooldown_ms),
            ("loan.duration_ms", self.loan.duration_ms),
            ("loan.interest_interval_ms", self.loan.interest_interval_ms),
        ] {
            if !(1..=MAX_SPAN_MS).contains(&ms) {
                return Err(EconomyError::Config(format!(
                    "{name} must be between 1 and {MAX_SPAN_MS}, got {ms}"
                )));
            }
        }
        let rate = self.loan.penalty_seconds_per_debt;
        if !rate.is_finite() || rate < 0.0 {
            return Err(EconomyError::Config("loan.penalty_seconds_per_debt must be non-negative".into()));
        }
        if self.parity.secret_range == 0 {
            return Err(EconomyError::Config("parity.secret_range must be positive".into()));
        }
        if self.level.initial_cost == 0 || self.level.growth_percent == 0 {
            return Err(EconomyError::Config("level curve must be strictly increasing".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Which storage backend holds accounts and reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Single SQLite database file.
    Sqlite,
    /// Flat JSON files in a directory.
    Json,
    /// Nothing leaves the process.
    Memory,
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Preferred backend. Failures fall back sqlite -> json -> memory.
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Directory for the JSON file backend.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Use WAL mode for the SQLite backend.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Number of rotating SQLite backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
    /// Store a CRC-32 next to every account row.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            db_path: default_db_path(),
            data_dir: default_data_dir(),
            wal_mode: true,
            backup_count: 3,
            checksum_enabled: true,
        }
    }
}

/// Hourly claim tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimConfig {
    /// Minimum time between two claims.
    #[serde(default = "default_hour_ms")]
    pub cooldown_ms: i64,
    /// Lower bound of the uniform reward (inclusive).
    #[serde(default = "default_67")]
    pub reward_min: u64,
    /// Upper bound of the uniform reward (inclusive).
    #[serde(default = "default_677")]
    pub reward_max: u64,
    /// Added to the very first claim of an account.
    #[serde(default = "default_676")]
    pub first_claim_bonus: u64,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 3_600_000,
            reward_min: 67,
            reward_max: 677,
            first_claim_bonus: 676,
        }
    }
}

/// What happens when a borrower asks to repay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepayPolicy {
    /// Repayment pays down the debt.
    Allowed,
    /// Repayment is always refused; the loan can only end at its deadline.
    Denied,
}

/// Loan terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanConfig {
    /// Smallest loan handed out (inclusive).
    #[serde(default = "default_loan_min")]
    pub amount_min: u64,
    /// Largest loan handed out (inclusive).
    #[serde(default = "default_loan_max")]
    pub amount_max: u64,
    /// Time from grant to deadline.
    #[serde(default = "default_loan_duration_ms")]
    pub duration_ms: i64,
    /// Interest is charged once per interval.
    #[serde(default = "default_hour_ms")]
    pub interest_interval_ms: i64,
    /// Interest per interval in basis points (1000 = 10%), rounded up.
    #[serde(default = "default_interest_bp")]
    pub interest_basis_points: u64,
    /// Whether `repay` pays down the debt or is a trap.
    #[serde(default = "default_repay_policy")]
    pub repay_policy: RepayPolicy,
    /// Timeout seconds requested per unit of unpaid debt on default.
    #[serde(default = "default_penalty_rate")]
    pub penalty_seconds_per_debt: f64,
    /// Shortest timeout requested on default.
    #[serde(default = "default_60")]
    pub penalty_min_seconds: u64,
    /// Longest timeout requested on default (two weeks).
    #[serde(default = "default_penalty_max")]
    pub penalty_max_seconds: u64,
}

impl Default for LoanConfig {
    fn default() -> Self {
        Self {
            amount_min: default_loan_min(),
            amount_max: default_loan_max(),
            duration_ms: default_loan_duration_ms(),
            interest_interval_ms: 3_600_000,
            interest_basis_points: 1_000,
            repay_policy: RepayPolicy::Allowed,
            penalty_seconds_per_debt: 0.1,
            penalty_min_seconds: 60,
            penalty_max_seconds: default_penalty_max(),
        }
    }
}

/// Blackjack table rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackjackConfig {
    /// Dealer stops drawing at this total (soft totals count).
    #[serde(default = "default_17")]
    pub dealer_stand_total: u8,
    /// Natural blackjack payout numerator (stake included).
    #[serde(default = "default_5")]
    pub natural_payout_numerator: u64,
    /// Natural blackjack payout denominator; the result is rounded up.
    #[serde(default = "default_2_u64")]
    pub natural_payout_denominator: u64,
}

impl Default for BlackjackConfig {
    fn default() -> Self {
        Self {
            dealer_stand_total: 17,
            natural_payout_numerator: 5,
            natural_payout_denominator: 2,
        }
    }
}

/// Odd/even game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParityConfig {
    /// Secret is drawn uniformly from `0..secret_range`.
    #[serde(default = "default_68")]
    pub secret_range: u32,
    /// Multiplier paid on a correct guess (stake included).
    #[serde(default = "default_2_u64")]
    pub payout_multiplier: u64,
}

impl Default for ParityConfig {
    fn default() -> Self {
        Self {
            secret_range: 68,
            payout_multiplier: 2,
        }
    }
}

/// Slot gamble odds, as weights over a 100-slot roll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Weight of the jackpot outcome.
    #[serde(default = "default_1")]
    pub jackpot_weight: u32,
    /// Weight of a regular win.
    #[serde(default = "default_67_u32")]
    pub win_weight: u32,
    /// Weight of a near miss (two matching symbols, no payout).
    #[serde(default = "default_16")]
    pub near_miss_weight: u32,
    /// Weight of a full loss.
    #[serde(default = "default_16")]
    pub loss_weight: u32,
    /// Jackpot multiplier (stake included).
    #[serde(default = "default_3_u64")]
    pub jackpot_multiplier: u64,
    /// Win multiplier (stake included).
    #[serde(default = "default_2_u64")]
    pub win_multiplier: u64,
}

impl SlotConfig {
    /// Sum of all outcome weights.
    #[must_use]
    pub fn total_weight(&self) -> u32 {
        self.jackpot_weight + self.win_weight + self.near_miss_weight + self.loss_weight
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            jackpot_weight: 1,
            win_weight: 67,
            near_miss_weight: 16,
            loss_weight: 16,
            jackpot_multiplier: 3,
            win_multiplier: 2,
        }
    }
}

/// Level investment curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Cost of the first level.
    #[serde(default = "default_1000")]
    pub initial_cost: u64,
    /// Each level costs this many percent more than the last, rounded up.
    #[serde(default = "default_50")]
    pub growth_percent: u64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            initial_cost: 1_000,
            growth_percent: 50,
        }
    }
}

/// Periodic trigger cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Reminder and claim-notice sweep interval.
    #[serde(default = "default_10")]
    pub reminder_tick_seconds: u64,
    /// Loan interest/default sweep interval.
    #[serde(default = "default_60")]
    pub loan_tick_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reminder_tick_seconds: 10,
            loan_tick_seconds: 60,
        }
    }
}

/// Bounds on external collaborator calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    /// Hard timeout for emote lookups, moderation and sends.
    #[serde(default = "default_5000")]
    pub request_timeout_ms: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_backend() -> BackendKind { BackendKind::Sqlite }
fn default_db_path() -> PathBuf { PathBuf::from("starz.db") }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_repay_policy() -> RepayPolicy { RepayPolicy::Allowed }
fn default_penalty_rate() -> f64 { 0.1 }
fn default_hour_ms() -> i64 { 3_600_000 }
fn default_loan_duration_ms() -> i64 { 6 * 3_600_000 }
fn default_loan_min() -> u64 { 500 }
fn default_loan_max() -> u64 { 50_000 }
fn default_interest_bp() -> u64 { 1_000 }
fn default_penalty_max() -> u64 { 1_209_600 }
fn default_1() -> u32 { 1 }
fn default_2_u64() -> u64 { 2 }
fn default_3() -> u32 { 3 }
fn default_3_u64() -> u64 { 3 }
fn default_5() -> u64 { 5 }
fn default_10() -> u64 { 10 }
fn default_16() -> u32 { 16 }
fn default_17() -> u8 { 17 }
fn default_50() -> u64 { 50 }
fn default_60() -> u64 { 60 }
fn default_67() -> u64 { 67 }
fn default_67_u32() -> u32 { 67 }
fn default_68() -> u32 { 68 }
fn default_676() -> u64 { 676 }
fn default_677() -> u64 { 677 }
fn default_1000() -> u64 { 1_000 }
fn default_5000() -> u64 { 5_000 }
