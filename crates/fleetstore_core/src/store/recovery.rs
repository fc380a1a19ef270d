//! Recovery from residual save files and rotating backups.

use super::{JsonDatabase, Shared};
use crate::context::ApiContext;
use crate::error::CoreResult;
use crate::models::Document;
use fleetstore_storage::{list_backups, list_residuals, remove_if_exists, DataFile, ResidualKind};
use std::path::{Path, PathBuf};

impl Shared {
    /// Tries every residual kind in recovery order and stops at the first
    /// that yields a document.
    pub(crate) fn recover_residuals(&self, ctx: &ApiContext) -> CoreResult<bool> {
        for kind in ResidualKind::RECOVERY_ORDER {
            match self.recover_from_residual_files(ctx, kind) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => ctx.log_warn(format!("recovery from {kind} failed: {err}")),
            }
        }
        Ok(false)
    }

    /// Recovers from the newest readable residual file of `kind`, writes it
    /// back as the document and removes every residual file of that kind.
    pub(crate) fn recover_from_residual_files(
        &self,
        ctx: &ApiContext,
        kind: ResidualKind,
    ) -> CoreResult<bool> {
        let residuals = list_residuals(&self.file, kind)?;
        if residuals.is_empty() {
            return Ok(false);
        }
        ctx.log_info(format!("found {} residual {kind} files", residuals.len()));

        let recovered = match self.newest_readable(ctx, &residuals) {
            Some((path, document)) => {
                ctx.log_info(format!("recovering document from {}", path.display()));
                self.replace_document(document);
                self.write_document()?;
                self.stats.record_recovery();
                true
            }
            None => false,
        };

        for path in &residuals {
            if let Err(err) = remove_if_exists(path) {
                ctx.log_warn(format!("could not remove {}: {err}", path.display()));
            }
        }
        Ok(recovered)
    }

    /// Replaces the document with the newest readable rotating backup and
    /// writes it back. Returns the backup used. The backup taken when the
    /// store was opened holds the current document and is skipped.
    pub(crate) fn load_newest_backup(&self, ctx: &ApiContext) -> CoreResult<Option<PathBuf>> {
        let skip = self.open_backup.lock().clone();
        let backups: Vec<PathBuf> = list_backups(&self.file)?
            .into_iter()
            .filter(|path| Some(path) != skip.as_ref())
            .collect();
        let Some((path, document)) = self.newest_readable(ctx, &backups) else {
            return Ok(None);
        };
        self.replace_document(document);
        self.write_document()?;
        self.stats.record_recovery();
        Ok(Some(path))
    }

    /// Walks `candidates` (oldest first) from the newest end and returns the
    /// first that parses.
    fn newest_readable(
        &self,
        ctx: &ApiContext,
        candidates: &[PathBuf],
    ) -> Option<(PathBuf, Document)> {
        candidates.iter().rev().find_map(|path| match self.read_candidate(path) {
            Ok(document) => Some((path.clone(), document)),
            Err(err) => {
                ctx.log_warn(format!("skipping unreadable {}: {err}", path.display()));
                None
            }
        })
    }

    fn read_candidate(&self, path: &Path) -> CoreResult<Document> {
        let bytes = DataFile::new(path).read_all()?;
        self.decode(&bytes)
    }
}

impl JsonDatabase {
    /// Recovers from residual files of one kind.
    ///
    /// Returns true if a document was recovered and written back.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be listed or the write back fails.
    pub fn recover_from_residual_files(
        &self,
        ctx: &ApiContext,
        kind: ResidualKind,
    ) -> CoreResult<bool> {
        self.shared.ensure_connected()?;
        self.shared.recover_from_residual_files(ctx, kind)
    }

    /// Replaces the document with the newest readable rotating backup.
    ///
    /// Returns the backup used, or `None` when no backup could be read.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be listed or the write back fails.
    pub fn recover_from_backup_file(&self, ctx: &ApiContext) -> CoreResult<Option<PathBuf>> {
        self.shared.ensure_connected()?;
        self.shared.load_newest_backup(ctx)
    }

    /// Replaces the document with the content of `path` and saves it.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or the save fails.
    pub fn restore_backup(&self, ctx: &ApiContext, path: impl AsRef<Path>) -> CoreResult<()> {
        self.shared.ensure_connected()?;
        let path = path.as_ref();
        let document = self.shared.read_candidate(path)?;
        self.shared.replace_document(document);
        self.shared.write_document()?;
        self.shared.stats.record_recovery();
        ctx.log_info(format!("restored document from {}", path.display()));
        Ok(())
    }
}
