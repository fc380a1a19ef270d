//! The write path.
//!
//! ```text
//! serialize -> [seal] -> <file>.<ts>.save (synced)
//!           -> copy <file> to <file>.<ts>.save_bak
//!           -> rename <file>.<ts>.save over <file>
//!           -> delete <file>.<ts>.save_bak
//! ```
//!
//! A crash between any two steps leaves either the old or the new document
//! in place plus residual files that the next load can recover from.

use super::{JsonDatabase, Shared};
use crate::context::ApiContext;
use crate::error::{CoreError, CoreResult};
use chrono::Utc;
use fleetstore_storage::{file_timestamp, remove_if_exists, write_durable, ResidualKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

impl Shared {
    /// Writes the in-memory document over the data file.
    ///
    /// When sealing fails the plain bytes are written anyway and the
    /// encryption error is returned afterwards, so the change is not lost.
    pub(crate) fn write_document(&self) -> CoreResult<()> {
        let _guard = self.save_lock.lock();
        // Cleared before serializing so a concurrent mutation re-marks it.
        self.dirty.store(false, Ordering::Release);

        let result = self.write_document_locked();
        if let Err(err) = &result {
            if !matches!(err, CoreError::EncryptionFailed { .. }) {
                self.mark_dirty();
            }
            self.stats.record_error();
            tracing::error!(file = %self.file.path().display(), error = %err, "save failed");
        }
        result
    }

    fn write_document_locked(&self) -> CoreResult<()> {
        let (bytes, seal_error) = self.serialize()?;
        let ts = file_timestamp(Utc::now());
        let temp = ResidualKind::Save.path(&self.file, &ts);
        let save_bak = ResidualKind::SaveBak.path(&self.file, &ts);

        write_durable(&temp, &bytes)?;
        if self.file.exists() {
            self.file.copy_to(&save_bak)?;
        }
        self.file.replace_with(&temp)?;
        remove_if_exists(&save_bak)?;

        self.stats.record_disk_write(bytes.len() as u64);
        tracing::debug!(file = %self.file.path().display(), bytes = bytes.len(), "document saved");

        match seal_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Serializes and, when keyed, seals the document.
    ///
    /// Returns the bytes to write and the sealing error, if any.
    fn serialize(&self) -> CoreResult<(Vec<u8>, Option<CoreError>)> {
        let plain = self.data.read().to_json_pretty()?;
        match &self.cipher {
            Some(cipher) => match cipher.seal(&plain) {
                Ok(sealed) => Ok((sealed, None)),
                Err(err) => Ok((plain, Some(err))),
            },
            None => Ok((plain, None)),
        }
    }

    /// Writes the document to `path` without touching the data file.
    fn write_copy(&self, path: &Path) -> CoreResult<()> {
        let _guard = self.save_lock.lock();
        let (bytes, seal_error) = self.serialize()?;
        write_durable(path, &bytes)?;
        match seal_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl JsonDatabase {
    /// Queues a save and waits until the consumer has written it.
    ///
    /// Blocks while the queue is full. Requests already queued when the
    /// consumer picks this one up are answered by the same write.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SaveQueueClosed`] after close, or the same
    /// write error [`save_now`](Self::save_now) would return.
    pub fn save(&self, ctx: &ApiContext) -> CoreResult<()> {
        self.shared.ensure_connected()?;
        let result = self.queue.save();
        if let Err(err) = &result {
            ctx.log_error(format!("save failed: {err}"));
        }
        result
    }

    /// Queues a save without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SaveQueueClosed`] after close.
    pub fn save_async(&self, ctx: &ApiContext) -> CoreResult<()> {
        self.shared.ensure_connected()?;
        ctx.log_debug("queued save");
        self.queue.save_async()
    }

    /// Writes the document immediately, bypassing the queue.
    ///
    /// # Errors
    ///
    /// Returns the write error.
    pub fn save_now(&self, ctx: &ApiContext) -> CoreResult<()> {
        self.shared.ensure_connected()?;
        ctx.log_debug("saving now");
        self.shared.write_document()
    }

    /// Writes a copy of the document to `filename`.
    ///
    /// A relative name resolves next to the data file. The active file is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns the write error.
    pub fn save_as(&self, ctx: &ApiContext, filename: impl AsRef<Path>) -> CoreResult<PathBuf> {
        self.shared.ensure_connected()?;
        let filename = filename.as_ref();
        let path = if filename.is_absolute() {
            filename.to_path_buf()
        } else {
            self.shared.file.dir().join(filename)
        };
        self.shared.write_copy(&path)?;
        ctx.log_info(format!("saved copy to {}", path.display()));
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{ctx, open_temp};
    use crate::config::StoreConfig;
    use crate::models::{Configuration, Document};
    use crate::JsonDatabase;
    use fleetstore_storage::{list_residuals, DataFile, ResidualKind};
    use tempfile::tempdir;

    fn set_id(db: &JsonDatabase, id: &str) {
        db.with_document_mut(|doc| {
            doc.configuration = Some(Configuration { id: id.into() });
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn save_writes_and_leaves_no_residuals() {
        let (dir, db) = open_temp();
        set_id(&db, "a");
        db.save(&ctx()).unwrap();
        assert!(!db.is_dirty());

        let file = DataFile::new(dir.path().join("data.json"));
        let doc = Document::from_json(&file.read_all().unwrap()).unwrap();
        assert_eq!(doc.configuration.unwrap().id, "a");
        for kind in ResidualKind::RECOVERY_ORDER {
            assert!(list_residuals(&file, kind).unwrap().is_empty());
        }
    }

    #[test]
    fn saved_file_is_indented() {
        let (dir, db) = open_temp();
        db.save_now(&ctx()).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("data.json")).unwrap();
        assert!(raw.contains("\n  \"schema\""));
    }

    #[test]
    fn save_as_resolves_relative_names() {
        let (dir, db) = open_temp();
        set_id(&db, "copy");
        let path = db.save_as(&ctx(), "export.json").unwrap();
        assert_eq!(path, dir.path().join("export.json"));
        assert_eq!(db.filename(), dir.path().join("data.json"));
        let doc = Document::from_json(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(doc.configuration.unwrap().id, "copy");
        assert!(db.is_dirty());
    }

    #[test]
    fn encrypted_save_is_not_plain_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        let config = StoreConfig::new(&path)
            .encryption_key("passphrase")
            .without_background_tasks();
        let db = JsonDatabase::open(&ctx(), config.clone()).unwrap();
        set_id(&db, "secret-id");
        db.save(&ctx()).unwrap();
        db.close(&ctx()).unwrap();
        drop(db);

        let raw = std::fs::read(&path).unwrap();
        assert!(Document::from_json(&raw).is_err());

        let db = JsonDatabase::open(&ctx(), config).unwrap();
        let id = db
            .with_document(|doc| doc.configuration.clone().unwrap().id)
            .unwrap();
        assert_eq!(id, "secret-id");
    }

    #[test]
    fn save_async_is_eventually_written() {
        let (dir, db) = open_temp();
        set_id(&db, "later");
        db.save_async(&ctx()).unwrap();
        db.close(&ctx()).unwrap();
        let doc = Document::from_json(&std::fs::read(dir.path().join("data.json")).unwrap())
            .unwrap();
        assert_eq!(doc.configuration.unwrap().id, "later");
    }
}
