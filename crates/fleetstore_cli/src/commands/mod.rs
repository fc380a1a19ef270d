//! CLI command implementations.

pub mod backup;
pub mod inspect;
pub mod recover;
pub mod resources;
pub mod verify;

use fleetstore_core::crypto::DocumentCipher;
use fleetstore_core::models::Document;
use fleetstore_core::{ApiContext, JsonDatabase, StoreConfig};
use fleetstore_storage::DataFile;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type shared by the commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// The document a command works on and how to open it.
#[derive(Debug, Clone)]
pub struct Target {
    config: StoreConfig,
}

impl Target {
    /// Builds the store configuration from the environment, then applies the
    /// command-line overrides. Background tickers stay off.
    pub fn new(path: PathBuf, key: Option<String>, backups: Option<usize>) -> Self {
        let mut config = StoreConfig::from_env(path).without_background_tasks();
        if let Some(key) = key {
            config = config.encryption_key(key);
        }
        if let Some(count) = backups {
            config = config.number_of_backup_files(count);
        }
        Self { config }
    }

    /// Path of the document file.
    pub fn path(&self) -> &Path {
        &self.config.filename
    }

    /// The document file.
    pub fn file(&self) -> DataFile {
        DataFile::new(&self.config.filename)
    }

    /// Opens the store. This takes the file lock and may write.
    pub fn open(&self, ctx: &ApiContext) -> CliResult<Arc<JsonDatabase>> {
        Ok(JsonDatabase::open(ctx, self.config.clone())?)
    }

    /// Reads the document without opening the store.
    ///
    /// Returns the document and whether it was stored encrypted.
    pub fn read_document(&self) -> CliResult<(Document, bool)> {
        let file = self.file();
        if !file.exists() {
            return Err(format!("No document found at {}", self.path().display()).into());
        }
        let bytes = file.read_all()?;
        decode(&bytes, self.config.encryption_key.as_deref())
    }
}

/// Parses document bytes, plain JSON first, then decrypted with `key`.
pub fn decode(bytes: &[u8], key: Option<&str>) -> CliResult<(Document, bool)> {
    if bytes.is_empty() {
        return Ok((Document::new(), false));
    }
    match Document::from_json(bytes) {
        Ok(document) => Ok((document, false)),
        Err(plain_err) => {
            let Some(key) = key else {
                return Err(format!("document is not plain JSON ({plain_err}); pass --key").into());
            };
            let plain = DocumentCipher::from_passphrase(key)?.open(bytes)?;
            Ok((Document::from_json(&plain)?, true))
        }
    }
}

/// Context used by every command.
pub fn cli_context() -> ApiContext {
    ApiContext::root().with_request_id("cli")
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
