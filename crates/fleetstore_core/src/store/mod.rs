//! The single-file JSON document engine.
//!
//! A [`JsonDatabase`] owns the whole [`Document`] in memory behind a
//! read-write lock and persists it as one JSON file. Writes to disk are
//! serialized by a save lock and fed by a bounded queue with a single
//! consumer; a maintenance thread flushes dirty state and takes rotating
//! backups on the configured intervals.

mod backup;
mod load;
mod maintenance;
mod queue;
mod record_lock;
mod recovery;
mod save;

pub use record_lock::RecordGuard;

use crate::config::StoreConfig;
use crate::context::ApiContext;
use crate::crypto::DocumentCipher;
use crate::error::{CoreError, CoreResult};
use crate::models::Document;
use crate::stats::StoreStats;
use fleetstore_storage::{DataFile, FileLock};
use maintenance::Maintenance;
use parking_lot::{Mutex, RwLock};
use queue::SaveQueue;
use record_lock::RecordLocks;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State shared between the handle and its background threads.
pub(crate) struct Shared {
    config: StoreConfig,
    file: DataFile,
    cipher: Option<DocumentCipher>,
    data: RwLock<Document>,
    save_lock: Mutex<()>,
    connected: AtomicBool,
    dirty: AtomicBool,
    records: RecordLocks,
    stats: StoreStats,
    /// Backup taken of the file this store was opened from; never a
    /// recovery candidate.
    open_backup: Mutex<Option<PathBuf>>,
    /// Context used for logging from background threads.
    background_ctx: ApiContext,
    _lock: FileLock,
}

impl Shared {
    fn ensure_connected(&self) -> CoreResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoreError::NotConnected)
        }
    }

    pub(crate) fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Parses stored bytes, plain JSON first, then decrypted JSON.
    fn decode(&self, bytes: &[u8]) -> CoreResult<Document> {
        match Document::from_json(bytes) {
            Ok(document) => Ok(document),
            Err(plain_err) => match &self.cipher {
                Some(cipher) => {
                    let plain = cipher.open(bytes)?;
                    Ok(Document::from_json(&plain)?)
                }
                None => Err(plain_err.into()),
            },
        }
    }

    fn replace_document(&self, document: Document) {
        *self.data.write() = document;
        self.mark_dirty();
    }
}

/// Handle on an open document store.
///
/// Opened with [`JsonDatabase::open`], shared as `Arc<JsonDatabase>` and
/// closed explicitly with [`close`](Self::close) or when the last handle is
/// dropped. Only one process may hold a document file open.
///
/// # Example
///
/// ```no_run
/// use fleetstore_core::{ApiContext, JsonDatabase, StoreConfig};
///
/// let ctx = ApiContext::root();
/// let db = JsonDatabase::open(&ctx, StoreConfig::new("/var/lib/fleet/data.json"))?;
/// let hosts = db.get_orchestrator_hosts(&ctx, None)?;
/// println!("{} hosts", hosts.len());
/// db.close(&ctx)?;
/// # Ok::<(), fleetstore_core::CoreError>(())
/// ```
pub struct JsonDatabase {
    shared: Arc<Shared>,
    queue: SaveQueue,
    maintenance: Mutex<Option<Maintenance>>,
    closed: AtomicBool,
}

impl JsonDatabase {
    /// Opens the document file, loads it and starts the background threads.
    ///
    /// # Errors
    ///
    /// Fails if another process holds the file, the encryption key cannot be
    /// derived, or the document cannot be loaded.
    pub fn open(ctx: &ApiContext, config: StoreConfig) -> CoreResult<Arc<Self>> {
        let file = DataFile::new(&config.filename);
        let lock = file.lock_exclusive()?;
        let cipher = match config.encryption_key.as_deref() {
            Some(passphrase) => Some(DocumentCipher::from_passphrase(passphrase)?),
            None => None,
        };

        let shared = Arc::new(Shared {
            file,
            cipher,
            data: RwLock::new(Document::new()),
            save_lock: Mutex::new(()),
            connected: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            records: RecordLocks::new(),
            stats: StoreStats::new(),
            open_backup: Mutex::new(None),
            background_ctx: ctx.clone().silent(),
            _lock: lock,
            config,
        });

        shared.load(ctx)?;

        let queue = SaveQueue::start(Arc::clone(&shared))?;
        let maintenance = Maintenance::start(Arc::clone(&shared))?;
        shared.connected.store(true, Ordering::Release);
        ctx.log_info(format!(
            "opened document {}",
            shared.file.path().display()
        ));

        Ok(Arc::new(Self {
            shared,
            queue,
            maintenance: Mutex::new(maintenance),
            closed: AtomicBool::new(false),
        }))
    }

    /// Marks the store connected.
    ///
    /// # Errors
    ///
    /// Fails once the store has been closed.
    pub fn connect(&self, ctx: &ApiContext) -> CoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::invalid_operation("the database has been closed"));
        }
        self.shared.connected.store(true, Ordering::Release);
        ctx.log_debug("database connected");
        Ok(())
    }

    /// Marks the store disconnected; repository calls fail until reconnected.
    pub fn disconnect(&self, ctx: &ApiContext) {
        self.shared.connected.store(false, Ordering::Release);
        ctx.log_debug("database disconnected");
    }

    /// Returns true while repository calls are accepted.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Flushes pending saves, stops the background threads and disconnects.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush.
    pub fn close(&self, ctx: &ApiContext) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(maintenance) = self.maintenance.lock().take() {
            maintenance.stop();
        }
        self.queue.shutdown();

        let result = if self.shared.is_dirty() {
            self.shared.write_document()
        } else {
            Ok(())
        };
        self.shared.connected.store(false, Ordering::Release);

        match &result {
            Ok(()) => ctx.log_info(format!(
                "closed document {}",
                self.shared.file.path().display()
            )),
            Err(err) => ctx.log_error(format!("final flush failed: {err}")),
        }
        result
    }

    /// Runs `f` with shared access to the document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotConnected`] when disconnected.
    pub fn with_document<T>(&self, f: impl FnOnce(&Document) -> T) -> CoreResult<T> {
        self.shared.ensure_connected()?;
        let data = self.shared.data.read();
        Ok(f(&data))
    }

    /// Runs `f` with exclusive access to the document.
    ///
    /// The document is marked dirty when `f` succeeds. Nothing is written to
    /// disk; call one of the save operations afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotConnected`] when disconnected, or the error
    /// returned by `f`.
    pub fn with_document_mut<T>(
        &self,
        f: impl FnOnce(&mut Document) -> CoreResult<T>,
    ) -> CoreResult<T> {
        self.shared.ensure_connected()?;
        let mut data = self.shared.data.write();
        let value = f(&mut data)?;
        self.shared.mark_dirty();
        Ok(value)
    }

    /// Like [`with_document_mut`](Self::with_document_mut), but `f` also
    /// reports whether it changed anything. The document is marked dirty
    /// only when it did; the flag is handed back to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotConnected`] when disconnected, or the error
    /// returned by `f`.
    pub fn with_document_mut_if<T>(
        &self,
        f: impl FnOnce(&mut Document) -> CoreResult<(T, bool)>,
    ) -> CoreResult<(T, bool)> {
        self.shared.ensure_connected()?;
        let mut data = self.shared.data.write();
        let (value, changed) = f(&mut data)?;
        if changed {
            self.shared.mark_dirty();
        }
        Ok((value, changed))
    }

    /// Returns true if the document file is missing or has no content.
    ///
    /// # Errors
    ///
    /// Fails if the file metadata cannot be read.
    pub fn is_data_file_empty(&self, _ctx: &ApiContext) -> CoreResult<bool> {
        Ok(self.shared.file.is_empty()?)
    }

    /// Returns true if the in-memory document has changes not yet on disk.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.shared.is_dirty()
    }

    /// Path of the document file.
    #[must_use]
    pub fn filename(&self) -> &Path {
        self.shared.file.path()
    }

    /// Configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Persistence counters.
    #[must_use]
    pub fn stats(&self) -> &StoreStats {
        &self.shared.stats
    }
}

impl std::fmt::Debug for JsonDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDatabase")
            .field("filename", &self.filename())
            .field("connected", &self.is_connected())
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

impl Drop for JsonDatabase {
    fn drop(&mut self) {
        let ctx = self.shared.background_ctx.clone();
        let _ = self.close(&ctx);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    pub(crate) fn ctx() -> ApiContext {
        ApiContext::root().silent()
    }

    pub(crate) fn open_temp() -> (TempDir, Arc<JsonDatabase>) {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("data.json")).without_background_tasks();
        let db = JsonDatabase::open(&ctx(), config).unwrap();
        (dir, db)
    }

    #[test]
    fn open_creates_file() {
        let (dir, db) = open_temp();
        assert!(db.is_connected());
        assert!(dir.path().join("data.json").exists());
        assert!(!db.is_data_file_empty(&ctx()).unwrap());
    }

    #[test]
    fn disconnected_store_refuses_access() {
        let (_dir, db) = open_temp();
        db.disconnect(&ctx());
        assert!(matches!(
            db.with_document(|doc| doc.users.len()),
            Err(CoreError::NotConnected)
        ));
        db.connect(&ctx()).unwrap();
        assert_eq!(db.with_document(|doc| doc.users.len()).unwrap(), 0);
    }

    #[test]
    fn mutation_marks_dirty() {
        let (_dir, db) = open_temp();
        assert!(!db.is_dirty());
        db.with_document_mut(|doc| {
            doc.configuration = Some(crate::models::Configuration { id: "x".into() });
            Ok(())
        })
        .unwrap();
        assert!(db.is_dirty());
    }

    #[test]
    fn unchanged_mutation_stays_clean() {
        let (_dir, db) = open_temp();
        let (count, changed) = db
            .with_document_mut_if(|doc| Ok((doc.claims.len(), false)))
            .unwrap();
        assert_eq!(count, 0);
        assert!(!changed);
        assert!(!db.is_dirty());

        db.with_document_mut_if(|doc| {
            doc.configuration = Some(crate::models::Configuration { id: "y".into() });
            Ok(((), true))
        })
        .unwrap();
        assert!(db.is_dirty());
    }

    #[test]
    fn failed_mutation_stays_clean() {
        let (_dir, db) = open_temp();
        let result: CoreResult<()> =
            db.with_document_mut(|_| Err(CoreError::invalid_operation("no")));
        assert!(result.is_err());
        assert!(!db.is_dirty());
    }

    #[test]
    fn second_open_is_locked() {
        let (dir, _db) = open_temp();
        let config = StoreConfig::new(dir.path().join("data.json")).without_background_tasks();
        let err = JsonDatabase::open(&ctx(), config).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Storage(fleetstore_storage::StorageError::Locked { .. })
        ));
    }

    #[test]
    fn close_flushes_and_disconnects() {
        let (dir, db) = open_temp();
        db.with_document_mut(|doc| {
            doc.configuration = Some(crate::models::Configuration { id: "svc".into() });
            Ok(())
        })
        .unwrap();
        db.close(&ctx()).unwrap();
        assert!(!db.is_connected());
        db.close(&ctx()).unwrap();

        let raw = std::fs::read(dir.path().join("data.json")).unwrap();
        let doc = Document::from_json(&raw).unwrap();
        assert_eq!(doc.configuration.unwrap().id, "svc");
    }
}
