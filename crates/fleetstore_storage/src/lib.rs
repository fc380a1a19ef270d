//! # fleetstore storage
//!
//! File primitives for the fleetstore document store.
//!
//! The store keeps its whole state in one JSON file. This crate knows how to
//! read and durably replace that file and how the files around it are named:
//! rotating backups, the pre-load safety copy and the residual files an
//! interrupted save leaves behind. It never interprets the bytes it moves.
//!
//! ## File family
//!
//! ```text
//! <file>                         # the document
//! <file>.lock                    # advisory single-process lock
//! <file>.bak                     # safety copy taken before every load
//! <file>.save.bak.<ts>           # rotating backups
//! <file>.<ts>.save               # residual: temp write not yet renamed
//! <file>.<ts>.save_bak           # residual: copy of the previous document
//! <file>.<ts>.panic              # residual: emergency dump
//! ```
//!
//! ## Example
//!
//! ```rust
//! use fleetstore_storage::{write_durable, DataFile};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let file = DataFile::new(dir.path().join("data.json"));
//! write_durable(file.path(), b"{}").unwrap();
//! assert_eq!(file.read_all().unwrap(), b"{}");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod naming;

pub use error::{StorageError, StorageResult};
pub use file::{remove_if_exists, write_durable, DataFile, FileLock};
pub use naming::{
    file_timestamp, list_backups, list_residuals, order_key, timestamp_suffix, ResidualKind,
    BACKUP_MARKER, LOCK_SUFFIX, SAFETY_COPY_SUFFIX, TIMESTAMP_FORMAT,
};
