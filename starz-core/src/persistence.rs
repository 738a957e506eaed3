//! Durable storage for accounts and the reminder queue.
//!
//! Business logic only ever sees the [`PersistenceAdapter`] trait. Three
//! implementations exist and one is chosen at startup by [`open_adapter`]:
//!
//! - [`SqliteStore`]: one row per account, JSON inside a BLOB column with an
//!   optional CRC-32 checksum, WAL mode, rotating backups.
//! - [`JsonFileStore`]: `accounts.json` and `reminders.json` in a directory,
//!   rewritten wholesale through a temp file and rename.
//! - [`MemoryStore`]: keeps everything in process; used when nothing else
//!   opens and in tests.
//!
//! All writes are idempotent: saving identical data twice has the same
//! effect as saving it once.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS accounts (
//!     username   TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! CREATE TABLE IF NOT EXISTS reminders (
//!     position INTEGER PRIMARY KEY,
//!     data     BLOB NOT NULL
//! );
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::config::{BackendKind, PersistenceConfig};
use crate::error::{EconomyError, Result};
use crate::reminder::Reminder;

/// Storage contract shared by every backend.
pub trait PersistenceAdapter: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Load every stored account keyed by username.
    ///
    /// # Errors
    /// Backend-specific I/O, database or decoding failures.
    fn load_all(&self) -> Result<BTreeMap<String, Account>>;

    /// Upsert a single account.
    ///
    /// # Errors
    /// Backend-specific I/O, database or encoding failures.
    fn save_one(&self, user: &str, account: &Account) -> Result<()>;

    /// Upsert every account in `accounts`.
    ///
    /// # Errors
    /// Backend-specific I/O, database or encoding failures.
    fn save_all(&self, accounts: &BTreeMap<String, Account>) -> Result<()>;

    /// Load the reminder queue in its stored order.
    ///
    /// # Errors
    /// Backend-specific I/O, database or decoding failures.
    fn load_reminders(&self) -> Result<Vec<Reminder>>;

    /// Replace the stored reminder queue with `reminders`.
    ///
    /// # Errors
    /// Backend-specific I/O, database or encoding failures.
    fn save_reminders(&self, reminders: &[Reminder]) -> Result<()>;
}

/// Open the configured backend, falling back sqlite -> json -> memory.
///
/// Each failed step is logged; the economy keeps running on whatever opened.
#[must_use]
pub fn open_adapter(config: &PersistenceConfig) -> Arc<dyn PersistenceAdapter> {
    if config.backend == BackendKind::Sqlite {
        match SqliteStore::open(&config.db_path, config) {
            Ok(store) => {
                match store.integrity_check() {
                    Ok(true) => {}
                    Ok(false) => warn!(path = %config.db_path.display(), "SQLite integrity check failed"),
                    Err(e) => warn!(error = %e, "SQLite integrity check could not run"),
                }
                if let Err(e) = store.create_rotating_backup() {
                    warn!(error = %e, "Startup backup failed");
                }
                return Arc::new(store);
            }
            Err(e) => warn!(error = %e, path = %config.db_path.display(), "SQLite unavailable, falling back to JSON files"),
        }
    }
    if matches!(config.backend, BackendKind::Sqlite | BackendKind::Json) {
        match JsonFileStore::open(&config.data_dir) {
            Ok(store) => return Arc::new(store),
            Err(e) => warn!(error = %e, dir = %config.data_dir.display(), "JSON store unavailable, running in memory"),
        }
    }
    Arc::new(MemoryStore::new())
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// Basic CRC-32 (ISO 3309 / ITU-T V.42) computation.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS accounts (
        username   TEXT PRIMARY KEY,
        data       BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT
    );
    CREATE TABLE IF NOT EXISTS reminders (
        position INTEGER PRIMARY KEY,
        data     BLOB NOT NULL
    );";

const UPSERT_ACCOUNT: &str = "INSERT INTO accounts (username, data, updated_at, checksum)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(username) DO UPDATE SET
        data = excluded.data,
        updated_at = excluded.updated_at,
        checksum = excluded.checksum";

/// SQLite-backed account and reminder storage.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database at `path` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns [`EconomyError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "SQLite store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    /// Returns [`EconomyError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn encode(&self, account: &Account) -> Result<(Vec<u8>, Option<String>)> {
        let json = serde_json::to_vec(account)?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        Ok((json, checksum))
    }

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    /// Returns [`EconomyError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Database backup completed"
        );
        Ok(())
    }

    /// Write `starz.db.bak.1`, shifting older backups up and keeping at
    /// most `config.backup_count`.
    ///
    /// # Errors
    /// Returns [`EconomyError::Database`] or [`EconomyError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if self.db_path.as_os_str() == ":memory:" || max == 0 {
            return Ok(());
        }

        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup(self.backup_path(1))?;

        info!(max_backups = max, "Rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension()
                .map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    /// Run `PRAGMA integrity_check`.
    ///
    /// # Errors
    /// Returns [`EconomyError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

impl PersistenceAdapter for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load_all(&self) -> Result<BTreeMap<String, Account>> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT username, data, checksum FROM accounts")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut accounts = BTreeMap::new();
        for row in rows {
            let (username, data, stored_checksum) = row?;
            if self.config.checksum_enabled {
                if let Some(expected) = stored_checksum.as_deref() {
                    let actual = crc32_hex(&data);
                    if expected != actual {
                        warn!(user = %username, %expected, %actual, "Checksum mismatch, possible corruption");
                    }
                }
            }
            match serde_json::from_slice::<Account>(&data) {
                Ok(account) => {
                    accounts.insert(username, account);
                }
                Err(e) => warn!(user = %username, error = %e, "Skipping undecodable account row"),
            }
        }

        debug!(accounts = accounts.len(), elapsed_us = start.elapsed().as_micros(), "Loaded accounts");
        Ok(accounts)
    }

    fn save_one(&self, user: &str, account: &Account) -> Result<()> {
        let (json, checksum) = self.encode(account)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .lock()
            .execute(UPSERT_ACCOUNT, params![user, json, now, checksum])?;
        debug!(user, balance = account.balance, "Saved account");
        Ok(())
    }

    fn save_all(&self, accounts: &BTreeMap<String, Account>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (user, account) in accounts {
            let (json, checksum) = self.encode(account)?;
            tx.execute(UPSERT_ACCOUNT, params![user, json, now, checksum])?;
        }
        tx.commit()?;
        debug!(accounts = accounts.len(), "Saved all accounts");
        Ok(())
    }

    fn load_reminders(&self) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT data FROM reminders ORDER BY position")?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

        let mut reminders = Vec::new();
        for row in rows {
            match serde_json::from_slice::<Reminder>(&row?) {
                Ok(reminder) => reminders.push(reminder),
                Err(e) => warn!(error = %e, "Skipping undecodable reminder row"),
            }
        }
        Ok(reminders)
    }

    fn save_reminders(&self, reminders: &[Reminder]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM reminders", [])?;
        for (position, reminder) in reminders.iter().enumerate() {
            let json = serde_json::to_vec(reminder)?;
            tx.execute(
                "INSERT INTO reminders (position, data) VALUES (?1, ?2)",
                params![i64::try_from(position).unwrap_or(i64::MAX), json],
            )?;
        }
        tx.commit()?;
        debug!(reminders = reminders.len(), "Saved reminder queue");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Flat-file storage: the whole account map and the whole queue are rewritten
/// on every save. A mirror of the account map is kept so `save_one` does not
/// have to read the file back.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    mirror: Mutex<BTreeMap<String, Account>>,
}

impl JsonFileStore {
    const ACCOUNTS: &'static str = "accounts.json";
    const REMINDERS: &'static str = "reminders.json";

    /// Use (and create if needed) `dir` for the data files.
    ///
    /// # Errors
    /// [`EconomyError::Io`] if the directory cannot be created, or an
    /// existing accounts file cannot be read or decoded.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let store = Self {
            dir,
            mirror: Mutex::new(BTreeMap::new()),
        };
        let existing = store.read_json::<BTreeMap<String, Account>>(Self::ACCOUNTS)?;
        *store.mirror.lock() = existing.unwrap_or_default();
        info!(dir = %store.dir.display(), "JSON file store opened");
        Ok(store)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn write_json<T: serde::Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl PersistenceAdapter for JsonFileStore {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load_all(&self) -> Result<BTreeMap<String, Account>> {
        Ok(self.mirror.lock().clone())
    }

    fn save_one(&self, user: &str, account: &Account) -> Result<()> {
        let mut mirror = self.mirror.lock();
        mirror.insert(user.to_string(), account.clone());
        self.write_json(Self::ACCOUNTS, &*mirror)
    }

    fn save_all(&self, accounts: &BTreeMap<String, Account>) -> Result<()> {
        let mut mirror = self.mirror.lock();
        mirror.extend(accounts.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_json(Self::ACCOUNTS, &*mirror)
    }

    fn load_reminders(&self) -> Result<Vec<Reminder>> {
        Ok(self.read_json(Self::REMINDERS)?.unwrap_or_default())
    }

    fn save_reminders(&self, reminders: &[Reminder]) -> Result<()> {
        self.write_json(Self::REMINDERS, reminders)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Keeps everything in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: Mutex<BTreeMap<String, Account>>,
    reminders: Mutex<Vec<Reminder>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceAdapter for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load_all(&self) -> Result<BTreeMap<String, Account>> {
        Ok(self.accounts.lock().clone())
    }

    fn save_one(&self, user: &str, account: &Account) -> Result<()> {
        self.accounts.lock().insert(user.to_string(), account.clone());
        Ok(())
    }

    fn save_all(&self, accounts: &BTreeMap<String, Account>) -> Result<()> {
        self.accounts
            .lock()
            .extend(accounts.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn load_reminders(&self) -> Result<Vec<Reminder>> {
        Ok(self.reminders.lock().clone())
    }

    fn save_reminders(&self, reminders: &[Reminder]) -> Result<()> {
        *self.reminders.lock() = reminders.to_vec();
        Ok(())
    }
}

/// Adapter that fails every call. Used to exercise the degraded path.
#[derive(Debug, Default)]
pub struct UnavailableStore;

impl PersistenceAdapter for UnavailableStore {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn load_all(&self) -> Result<BTreeMap<String, Account>> {
        Err(EconomyError::ExternalService("storage unavailable".into()))
    }

    fn save_one(&self, _user: &str, _account: &Account) -> Result<()> {
        Err(EconomyError::ExternalService("storage unavailable".into()))
    }

    fn save_all(&self, _accounts: &BTreeMap<String, Account>) -> Result<()> {
        Err(EconomyError::ExternalService("storage unavailable".into()))
    }

    fn load_reminders(&self) -> Result<Vec<Reminder>> {
        Err(EconomyError::ExternalService("storage unavailable".into()))
    }

    fn save_reminders(&self, _reminders: &[Reminder]) -> Result<()> {
        Err(EconomyError::ExternalService("storage unavailable".into()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            checksum_enabled: true,
            ..PersistenceConfig::default()
        }
    }

    fn sample_account(balance: u64) -> Account {
        let mut account = Account::new(1000);
        account.credit(balance);
        account.last_claim = Some(Utc::now());
        account.last_channel = "#stream".into();
        account
    }

    fn sample_reminder(target: &str) -> Reminder {
        let now = Utc::now();
        Reminder::new(target, "bob", "wäsche", Some(now + Duration::minutes(10)), "#stream", now)
    }

    fn exercise(adapter: &dyn PersistenceAdapter) {
        adapter.save_one("alice", &sample_account(10)).expect("save");
        adapter.save_one("alice", &sample_account(25)).expect("upsert");
        adapter.save_one("bob", &sample_account(5)).expect("save");

        let loaded = adapter.load_all().expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["alice"].balance, 25);

        let queue = vec![sample_reminder("carol"), sample_reminder("dave")];
        adapter.save_reminders(&queue).expect("save queue");
        assert_eq!(adapter.load_reminders().expect("load queue"), queue);

        adapter.save_reminders(&queue[1..]).expect("shrink queue");
        let reloaded = adapter.load_reminders().expect("load queue");
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].target, "dave");
    }

    #[test]
    fn sqlite_round_trip() {
        let store = SqliteStore::open_in_memory(&test_config()).expect("open");
        exercise(&store);
        assert!(store.integrity_check().expect("check"));
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("open");
        exercise(&store);

        // A second handle sees what the first one wrote.
        let reopened = JsonFileStore::open(dir.path()).expect("reopen");
        assert_eq!(reopened.load_all().expect("load")["alice"].balance, 25);
        assert_eq!(reopened.load_reminders().expect("load").len(), 1);
    }

    #[test]
    fn memory_round_trip() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn save_all_is_idempotent() {
        let store = SqliteStore::open_in_memory(&test_config()).expect("open");
        let mut accounts = BTreeMap::new();
        accounts.insert("alice".to_string(), sample_account(3));
        accounts.insert("bob".to_string(), sample_account(4));
        store.save_all(&accounts).expect("first");
        store.save_all(&accounts).expect("second");
        assert_eq!(store.load_all().expect("load"), accounts);
    }

    #[test]
    fn checksum_mismatch_still_loads() {
        let store = SqliteStore::open_in_memory(&test_config()).expect("open");
        store.save_one("alice", &sample_account(9)).expect("save");
        store
            .conn
            .lock()
            .execute("UPDATE accounts SET checksum = 'deadbeef' WHERE username = 'alice'", [])
            .expect("corrupt checksum");
        assert_eq!(store.load_all().expect("load")["alice"].balance, 9);
    }

    #[test]
    fn rotating_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config();
        config.backup_count = 2;
        let store = SqliteStore::open(dir.path().join("starz.db"), &config).expect("open");
        store.save_one("alice", &sample_account(1)).expect("save");

        store.create_rotating_backup().expect("backup 1");
        store.create_rotating_backup().expect("backup 2");
        store.create_rotating_backup().expect("backup 3");

        assert!(dir.path().join("starz.db.bak.1").exists());
        assert!(dir.path().join("starz.db.bak.2").exists());
        assert!(!dir.path().join("starz.db.bak.3").exists());

        let restored = SqliteStore::open(dir.path().join("starz.db.bak.1"), &config).expect("open backup");
        assert_eq!(restored.load_all().expect("load")["alice"].balance, 1);
    }

    #[test]
    fn fallback_to_json_when_sqlite_path_is_unusable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PersistenceConfig {
            backend: BackendKind::Sqlite,
            db_path: dir.path().join("missing").join("nested").join("starz.db"),
            data_dir: dir.path().join("data"),
            ..test_config()
        };
        let adapter = open_adapter(&config);
        assert_eq!(adapter.name(), "json");
    }

    #[test]
    fn memory_backend_selected_explicitly() {
        let config = PersistenceConfig {
            backend: BackendKind::Memory,
            ..test_config()
        };
        assert_eq!(open_adapter(&config).name(), "memory");
    }

    #[test]
    fn crc32_basic() {
        assert_eq!(crc32_compute(b"123456789"), 0xCBF4_3926);
    }
}
