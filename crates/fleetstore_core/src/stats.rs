//! Persistence counters.
//!
//! Counters are atomic and can be read while saves are in flight. The CLI
//! `inspect` command prints a [`StatsSnapshot`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters of one open [`JsonDatabase`](crate::JsonDatabase).
#[derive(Debug, Default)]
pub struct StoreStats {
    save_requests: AtomicU64,
    disk_writes: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    backups: AtomicU64,
    recoveries: AtomicU64,
    errors: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_save_requests(&self, count: u64) {
        self.save_requests.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_write(&self, bytes: u64) {
        self.disk_writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_backup(&self) {
        self.backups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Save requests answered by the queue consumer.
    pub fn save_requests(&self) -> u64 {
        self.save_requests.load(Ordering::Relaxed)
    }

    /// Physical writes of the document file.
    ///
    /// Lower than [`save_requests`](Self::save_requests) when requests were
    /// coalesced.
    pub fn disk_writes(&self) -> u64 {
        self.disk_writes.load(Ordering::Relaxed)
    }

    /// Bytes written to the document file.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Bytes read while loading.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Rotating backups taken.
    pub fn backups(&self) -> u64 {
        self.backups.load(Ordering::Relaxed)
    }

    /// Documents recovered from residual files or backups.
    pub fn recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }

    /// Persistence failures.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            save_requests: self.save_requests(),
            disk_writes: self.disk_writes(),
            bytes_written: self.bytes_written(),
            bytes_read: self.bytes_read(),
            backups: self.backups(),
            recoveries: self.recoveries(),
            errors: self.errors(),
        }
    }
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Save requests answered.
    pub save_requests: u64,
    /// Physical writes.
    pub disk_writes: u64,
    /// Bytes written.
    pub bytes_written: u64,
    /// Bytes read.
    pub bytes_read: u64,
    /// Backups taken.
    pub backups: u64,
    /// Recoveries performed.
    pub recoveries: u64,
    /// Persistence failures.
    pub errors: u64,
}
