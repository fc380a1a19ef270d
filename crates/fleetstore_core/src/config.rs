//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the number of rotating backups to keep.
pub const ENV_NUMBER_BACKUP_FILES: &str = "DATABASE_NUMBER_BACKUP_FILES";
/// Environment variable holding the periodic flush interval in minutes.
pub const ENV_SAVE_INTERVAL: &str = "DATABASE_SAVE_INTERVAL";
/// Environment variable holding the periodic backup interval in minutes.
pub const ENV_BACKUP_INTERVAL: &str = "DATABASE_BACKUP_INTERVAL";
/// Environment variable toggling residual-file recovery.
pub const ENV_AUTO_RECOVER: &str = "DATABASE_AUTO_RECOVER";
/// Environment variable holding the at-rest encryption passphrase.
pub const ENV_ENCRYPTION_KEY: &str = "ENCRYPTION_PRIVATE_KEY";

/// Configuration for opening a [`JsonDatabase`](crate::JsonDatabase).
#[derive(Clone)]
pub struct StoreConfig {
    /// Path of the document file.
    pub filename: PathBuf,

    /// Number of rotating `<file>.save.bak.<ts>` backups to keep.
    pub number_of_backup_files: usize,

    /// How often a dirty document is flushed in the background (zero = never).
    pub save_interval: Duration,

    /// How often a rotating backup is taken in the background (zero = never).
    pub backup_interval: Duration,

    /// Whether to recover from residual save files and backups on load.
    pub auto_recover: bool,

    /// Passphrase for at-rest encryption. `None` stores plain JSON.
    pub encryption_key: Option<String>,

    /// Capacity of the save queue before `save` callers block.
    pub save_queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            filename: PathBuf::from("data.json"),
            number_of_backup_files: 10,
            save_interval: Duration::from_secs(2 * 60),
            backup_interval: Duration::from_secs(2 * 60 * 60),
            auto_recover: true,
            encryption_key: None,
            save_queue_capacity: 64,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for the given document file with default values.
    #[must_use]
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Creates a configuration from the process environment.
    ///
    /// Missing, zero or unparsable values keep their defaults.
    #[must_use]
    pub fn from_env(filename: impl Into<PathBuf>) -> Self {
        Self::from_lookup(filename, |key| std::env::var(key).ok())
    }

    /// Creates a configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(filename: impl Into<PathBuf>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(filename);

        if let Some(count) = positive_number(&lookup, ENV_NUMBER_BACKUP_FILES) {
            config.number_of_backup_files = count as usize;
        }
        if let Some(minutes) = positive_number(&lookup, ENV_SAVE_INTERVAL) {
            config.save_interval = Duration::from_secs(minutes * 60);
        }
        if let Some(minutes) = positive_number(&lookup, ENV_BACKUP_INTERVAL) {
            config.backup_interval = Duration::from_secs(minutes * 60);
        }
        if let Some(value) = lookup(ENV_AUTO_RECOVER) {
            match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => config.auto_recover = true,
                "false" | "0" | "no" => config.auto_recover = false,
                other => tracing::warn!(key = ENV_AUTO_RECOVER, value = other, "ignoring invalid flag"),
            }
        }
        if let Some(key) = lookup(ENV_ENCRYPTION_KEY).filter(|k| !k.trim().is_empty()) {
            config.encryption_key = Some(key);
        }

        config
    }

    /// Sets the document file.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Sets the number of rotating backups to keep.
    #[must_use]
    pub const fn number_of_backup_files(mut self, count: usize) -> Self {
        self.number_of_backup_files = count;
        self
    }

    /// Sets the background flush interval.
    #[must_use]
    pub const fn save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Sets the background backup interval.
    #[must_use]
    pub const fn backup_interval(mut self, interval: Duration) -> Self {
        self.backup_interval = interval;
        self
    }

    /// Sets whether residual-file recovery runs on load.
    #[must_use]
    pub const fn auto_recover(mut self, value: bool) -> Self {
        self.auto_recover = value;
        self
    }

    /// Sets the encryption passphrase.
    #[must_use]
    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Sets the save queue capacity.
    #[must_use]
    pub const fn save_queue_capacity(mut self, capacity: usize) -> Self {
        self.save_queue_capacity = capacity;
        self
    }

    /// Disables both background tickers.
    #[must_use]
    pub const fn without_background_tasks(mut self) -> Self {
        self.save_interval = Duration::ZERO;
        self.backup_interval = Duration::ZERO;
        self
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("filename", &self.filename)
            .field("number_of_backup_files", &self.number_of_backup_files)
            .field("save_interval", &self.save_interval)
            .field("backup_interval", &self.backup_interval)
            .field("auto_recover", &self.auto_recover)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("save_queue_capacity", &self.save_queue_capacity)
            .finish()
    }
}

fn positive_number<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(0) => None,
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw.as_str(), "ignoring invalid number");
            None
        }
    }
}
