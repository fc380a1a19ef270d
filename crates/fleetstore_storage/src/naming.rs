//! Names of the files that live next to the document.
//!
//! Every sibling is `<file>` plus a suffix. Timestamps use
//! [`TIMESTAMP_FORMAT`] so that lexicographic order is chronological order.
//! When two files would share a timestamp the later one gets a `-N` counter,
//! which still sorts after the plain timestamp.

use crate::error::StorageResult;
use crate::file::DataFile;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// `chrono` format of the timestamp embedded in sibling file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Marker between the document name and the timestamp of a rotating backup.
pub const BACKUP_MARKER: &str = ".save.bak.";

/// Suffix of the safety copy taken before a load.
pub const SAFETY_COPY_SUFFIX: &str = ".bak";

/// Suffix of the advisory lock file.
pub const LOCK_SUFFIX: &str = ".lock";

/// Formats `now` for use in a sibling file name.
#[must_use]
pub fn file_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// The residual files an interrupted save can leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResidualKind {
    /// `<file>.<ts>.save`, the new document written but not yet renamed.
    Save,
    /// `<file>.<ts>.save_bak`, the copy of the document being replaced.
    SaveBak,
    /// `<file>.<ts>.panic`, an emergency dump.
    Panic,
}

impl ResidualKind {
    /// Recovery order: the freshest candidate kind first.
    pub const RECOVERY_ORDER: [ResidualKind; 3] =
        [ResidualKind::Save, ResidualKind::SaveBak, ResidualKind::Panic];

    /// Returns the file extension without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::SaveBak => "save_bak",
            Self::Panic => "panic",
        }
    }

    /// Returns the path of a residual file for the given timestamp.
    #[must_use]
    pub fn path(self, file: &DataFile, timestamp: &str) -> PathBuf {
        file.sibling(&format!(".{timestamp}.{}", self.extension()))
    }
}

impl std::fmt::Display for ResidualKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "*.{}", self.extension())
    }
}

/// Returns the timestamp embedded in a backup or residual file name.
#[must_use]
pub fn timestamp_suffix(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if let Some(idx) = name.rfind(BACKUP_MARKER) {
        let ts = &name[idx + BACKUP_MARKER.len()..];
        return is_timestamp(ts).then(|| ts.to_string());
    }
    let (rest, _extension) = name.rsplit_once('.')?;
    let (_, ts) = rest.rsplit_once('.')?;
    is_timestamp(ts).then(|| ts.to_string())
}

/// Lists the rotating backups of `file`, oldest first.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_backups(file: &DataFile) -> StorageResult<Vec<PathBuf>> {
    let prefix = format!("{}{BACKUP_MARKER}", file_name(file));
    let mut found = scan(file, |name| {
        name.strip_prefix(&prefix)
            .filter(|ts| is_timestamp(ts))
            .map(str::to_string)
    })?;
    found.sort_by_cached_key(|(ts, _)| order_key(ts));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Lists the residual files of one kind, oldest first.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_residuals(file: &DataFile, kind: ResidualKind) -> StorageResult<Vec<PathBuf>> {
    let prefix = format!("{}.", file_name(file));
    let suffix = format!(".{}", kind.extension());
    let mut found = scan(file, |name| {
        name.strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .filter(|ts| is_timestamp(ts))
            .map(str::to_string)
    })?;
    found.sort_by_cached_key(|(ts, _)| order_key(ts));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

fn file_name(file: &DataFile) -> String {
    file.path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn scan<F>(file: &DataFile, mut matcher: F) -> StorageResult<Vec<(String, PathBuf)>>
where
    F: FnMut(&str) -> Option<String>,
{
    let dir = file.dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(ts) = matcher(name) {
            found.push((ts, dir.join(name)));
        }
    }
    Ok(found)
}

/// Splits a timestamp suffix into its base and numeric `-N` counter so that
/// `-10` sorts after `-9`.
#[must_use]
pub fn order_key(ts: &str) -> (String, u64) {
    match ts.split_once('-') {
        Some((base, counter)) => (base.to_string(), counter.parse().unwrap_or(0)),
        None => (ts.to_string(), 0),
    }
}

/// `YYYYMMDDHHMMSS` optionally followed by `-N`.
fn is_timestamp(value: &str) -> bool {
    let (base, counter) = match value.split_once('-') {
        Some((base, counter)) => (base, Some(counter)),
        None => (value, None),
    };
    let base_ok = base.len() == 14 && base.bytes().all(|b| b.is_ascii_digit());
    let counter_ok = counter.map_or(true, |c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()));
    base_ok && counter_ok
}
