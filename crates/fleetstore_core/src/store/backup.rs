//! Rotating `<file>.save.bak.<ts>` backups.

use super::{JsonDatabase, Shared};
use crate::context::ApiContext;
use crate::error::CoreResult;
use chrono::Utc;
use fleetstore_storage::{
    file_timestamp, list_backups, order_key, remove_if_exists, timestamp_suffix, BACKUP_MARKER,
};
use std::path::PathBuf;

impl Shared {
    /// Copies the data file to a new rotating backup, pruning the oldest
    /// ones first so that at most `number_of_backup_files` remain.
    pub(crate) fn backup(&self, ctx: &ApiContext) -> CoreResult<PathBuf> {
        let _guard = self.save_lock.lock();
        let result = self.backup_locked(ctx);
        if let Err(err) = &result {
            self.stats.record_error();
            ctx.log_error(format!("backup failed: {err}"));
        }
        result
    }

    fn backup_locked(&self, ctx: &ApiContext) -> CoreResult<PathBuf> {
        let keep = self.config.number_of_backup_files.max(1);
        let mut existing = list_backups(&self.file)?;
        while existing.len() >= keep {
            let oldest = existing.remove(0);
            remove_if_exists(&oldest)?;
            ctx.log_debug(format!("removed old backup {}", oldest.display()));
        }

        let ts = file_timestamp(Utc::now());
        // Same-second backups continue after the newest counter so the new
        // file always sorts last.
        let newest_counter = existing
            .iter()
            .filter_map(|path| timestamp_suffix(path))
            .map(|suffix| order_key(&suffix))
            .filter(|(base, _)| *base == ts)
            .map(|(_, counter)| counter)
            .max();
        let name = match newest_counter {
            Some(counter) => format!("{BACKUP_MARKER}{ts}-{}", counter + 1),
            None => format!("{BACKUP_MARKER}{ts}"),
        };
        let dest = self.file.sibling(&name);

        self.file.copy_to(&dest)?;
        self.stats.record_backup();
        ctx.log_info(format!("backup written to {}", dest.display()));
        Ok(dest)
    }
}

impl JsonDatabase {
    /// Takes a rotating backup of the data file.
    ///
    /// # Errors
    ///
    /// Returns the first file-system error; it is also logged.
    pub fn backup(&self, ctx: &ApiContext) -> CoreResult<PathBuf> {
        self.shared.backup(ctx)
    }

    /// Lists the rotating backups, oldest first.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be read.
    pub fn backups(&self, _ctx: &ApiContext) -> CoreResult<Vec<PathBuf>> {
        Ok(list_backups(&self.shared.file)?)
    }
}
