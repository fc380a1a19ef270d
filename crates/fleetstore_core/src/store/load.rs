//! Loading the document at open.

use super::Shared;
use crate::context::ApiContext;
use crate::error::CoreResult;
use crate::models::Document;
use fleetstore_storage::SAFETY_COPY_SUFFIX;
use std::sync::atomic::Ordering;

impl Shared {
    /// Loads the data file into memory.
    ///
    /// 1. With `auto_recover`, residual files of an interrupted save are
    ///    recovered first. Failures there are logged and ignored.
    /// 2. A missing file is created holding an empty document.
    /// 3. An empty file starts an empty document, or with `auto_recover` the
    ///    newest readable rotating backup, and is saved right away.
    /// 4. Otherwise the file is copied to `<file>.bak` and parsed, plain
    ///    first, then decrypted. A rotating backup is taken once it parsed.
    pub(crate) fn load(&self, ctx: &ApiContext) -> CoreResult<()> {
        if self.config.auto_recover {
            match self.recover_residuals(ctx) {
                Ok(true) => ctx.log_info("recovered document from residual save files"),
                Ok(false) => {}
                Err(err) => ctx.log_warn(format!("residual recovery failed: {err}")),
            }
        }

        if !self.file.exists() {
            ctx.log_info(format!("creating document {}", self.file.path().display()));
            self.file.create_if_missing()?;
            *self.data.write() = Document::new();
            return self.write_document();
        }

        if self.file.is_empty()? {
            ctx.log_warn(format!("document {} is empty", self.file.path().display()));
            *self.data.write() = Document::new();
            if self.config.auto_recover {
                if let Some(path) = self.load_newest_backup(ctx)? {
                    ctx.log_info(format!("loaded backup {}", path.display()));
                }
            }
            return self.write_document();
        }

        self.file.copy_to(&self.file.sibling(SAFETY_COPY_SUFFIX))?;

        let bytes = self.file.read_all()?;
        self.stats.record_read(bytes.len() as u64);
        let document = self.decode(&bytes)?;
        // Only a readable file may take a slot in the backup rotation.
        let taken = self.backup(ctx)?;
        *self.open_backup.lock() = Some(taken);
        *self.data.write() = document;
        self.dirty.store(false, Ordering::Release);
        ctx.log_debug(format!(
            "loaded {} bytes from {}",
            bytes.len(),
            self.file.path().display()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::ctx;
    use crate::config::StoreConfig;
    use crate::models::{Claim, Configuration, Document};
    use crate::JsonDatabase;
    use fleetstore_storage::{list_backups, write_durable, DataFile, BACKUP_MARKER};
    use tempfile::tempdir;

    fn config(path: &std::path::Path) -> StoreConfig {
        StoreConfig::new(path).without_background_tasks()
    }

    #[test]
    fn existing_file_gets_safety_copy_and_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut doc = Document::new();
        doc.claims.push(Claim::new("READ_ONLY"));
        write_durable(&path, &doc.to_json_pretty().unwrap()).unwrap();

        let db = JsonDatabase::open(&ctx(), config(&path)).unwrap();
        assert_eq!(db.with_document(|d| d.claims.len()).unwrap(), 1);
        assert!(dir.path().join("data.json.bak").exists());
        assert_eq!(list_backups(&DataFile::new(&path)).unwrap().len(), 1);
        assert!(!db.is_dirty());
    }

    #[test]
    fn empty_file_recovers_newest_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        let file = DataFile::new(&path);
        write_durable(&path, b"").unwrap();

        let mut old = Document::new();
        old.configuration = Some(Configuration { id: "old".into() });
        let mut new = Document::new();
        new.configuration = Some(Configuration { id: "new".into() });
        write_durable(
            &file.sibling(&format!("{BACKUP_MARKER}20240101000000")),
            &old.to_json_pretty().unwrap(),
        )
        .unwrap();
        write_durable(
            &file.sibling(&format!("{BACKUP_MARKER}20240102000000")),
            &new.to_json_pretty().unwrap(),
        )
        .unwrap();
        // Newest by name, but unreadable.
        write_durable(&file.sibling(&format!("{BACKUP_MARKER}20240103000000")), b"{oops").unwrap();

        let db = JsonDatabase::open(&ctx(), config(&path)).unwrap();
        let id = db
            .with_document(|d| d.configuration.clone().map(|c| c.id))
            .unwrap();
        assert_eq!(id.as_deref(), Some("new"));
        assert!(!db.is_data_file_empty(&ctx()).unwrap());
    }

    #[test]
    fn empty_file_without_recovery_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_durable(&path, b"").unwrap();
        let file = DataFile::new(&path);
        let mut doc = Document::new();
        doc.claims.push(Claim::new("X"));
        write_durable(
            &file.sibling(&format!("{BACKUP_MARKER}20240101000000")),
            &doc.to_json_pretty().unwrap(),
        )
        .unwrap();

        let db = JsonDatabase::open(&ctx(), config(&path).auto_recover(false)).unwrap();
        assert_eq!(db.with_document(|d| d.claims.len()).unwrap(), 0);
    }

    #[test]
    fn unreadable_file_fails_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_durable(&path, b"not json at all").unwrap();
        assert!(JsonDatabase::open(&ctx(), config(&path)).is_err());
    }

    #[test]
    fn failed_opens_keep_good_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        let file = DataFile::new(&path);
        let mut doc = Document::new();
        doc.claims.push(Claim::new("KEPT"));
        for day in 1..=3 {
            write_durable(
                &file.sibling(&format!("{BACKUP_MARKER}2024010{day}000000")),
                &doc.to_json_pretty().unwrap(),
            )
            .unwrap();
        }
        write_durable(&path, b"{corrupt").unwrap();

        for _ in 0..3 {
            let result = JsonDatabase::open(&ctx(), config(&path).number_of_backup_files(3));
            assert!(result.is_err());
        }

        let backups = list_backups(&file).unwrap();
        assert_eq!(backups.len(), 3);
        for backup in &backups {
            let bytes = std::fs::read(backup).unwrap();
            assert_eq!(Document::from_json(&bytes).unwrap().claims.len(), 1);
        }
    }

    #[test]
    fn open_backup_is_not_a_recovery_candidate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut doc = Document::new();
        doc.configuration = Some(Configuration { id: "current".into() });
        write_durable(&path, &doc.to_json_pretty().unwrap()).unwrap();

        let db = JsonDatabase::open(&ctx(), config(&path)).unwrap();
        assert_eq!(db.backups(&ctx()).unwrap().len(), 1);
        assert_eq!(db.recover_from_backup_file(&ctx()).unwrap(), None);
        assert_eq!(db.stats().snapshot().recoveries, 0);
    }

    #[test]
    fn plain_file_loads_with_key_configured() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut doc = Document::new();
        doc.claims.push(Claim::new("PLAIN"));
        write_durable(&path, &doc.to_json_pretty().unwrap()).unwrap();

        let db = JsonDatabase::open(&ctx(), config(&path).encryption_key("k")).unwrap();
        assert_eq!(db.with_document(|d| d.claims.len()).unwrap(), 1);
    }
}
