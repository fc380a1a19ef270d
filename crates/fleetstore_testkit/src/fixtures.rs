//! Store fixtures and context helpers.

use fleetstore_core::models::Document;
use fleetstore_core::{ApiContext, JsonDatabase, Principal, StoreConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// File name of the document inside a fixture directory.
pub const DATA_FILE: &str = "data.json";

/// A store over a temporary directory, removed on drop.
pub struct TestStore {
    /// The open store.
    pub db: Arc<JsonDatabase>,
    config: StoreConfig,
    dir: TempDir,
}

impl TestStore {
    /// Opens a fresh store with the background tickers disabled.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Opens a fresh store whose file is encrypted with `passphrase`.
    pub fn encrypted(passphrase: &str) -> Self {
        Self::with_config(|config| config.encryption_key(passphrase))
    }

    /// Opens a fresh store, letting `configure` adjust the configuration.
    pub fn with_config(configure: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let base = StoreConfig::new(dir.path().join(DATA_FILE)).without_background_tasks();
        let config = configure(base);
        let db = JsonDatabase::open(&root_context(), config.clone()).expect("Failed to open store");
        Self { db, config, dir }
    }

    /// Closes the store and opens the same file again.
    pub fn reopen(self) -> Self {
        let Self { db, config, dir } = self;
        db.close(&root_context()).expect("Failed to close store");
        drop(db);
        let db = JsonDatabase::open(&root_context(), config.clone()).expect("Failed to reopen store");
        Self { db, config, dir }
    }

    /// Path of the document file.
    pub fn path(&self) -> PathBuf {
        self.config.filename.clone()
    }

    /// The temporary directory holding the document and its backups.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// The configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Parses the document currently on disk. Only valid for plain files.
    pub fn document_on_disk(&self) -> Document {
        let bytes = std::fs::read(self.path()).expect("Failed to read document file");
        Document::from_json(&bytes).expect("Document file is not valid JSON")
    }

    /// Names of every file in the fixture directory, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .expect("Failed to list temp directory")
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = JsonDatabase;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test against a fresh temporary store.
///
/// # Example
///
/// ```rust
/// use fleetstore_testkit::{root_context, with_temp_store};
///
/// with_temp_store(|store| {
///     assert!(store.get_users(&root_context(), None).unwrap().is_empty());
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&TestStore) -> R,
{
    let store = TestStore::new();
    f(&store)
}

/// A silent root context.
pub fn root_context() -> ApiContext {
    ApiContext::root().silent()
}

/// A silent context for a regular user holding `roles` and `claims`.
pub fn user_context(username: &str, roles: &[&str], claims: &[&str]) -> ApiContext {
    let mut principal = Principal::new(format!("id-{username}"), username)
        .with_email(format!("{username}@example.com"));
    for role in roles {
        principal = principal.with_role(*role);
    }
    for claim in claims {
        principal = principal.with_claim(*claim);
    }
    ApiContext::for_user(principal).silent()
}
