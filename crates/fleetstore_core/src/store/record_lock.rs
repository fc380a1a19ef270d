//! Per-record blocking locks.
//!
//! A record lock is keyed by entity kind and lowercase id. Waiters park on a
//! condition variable until the holder drops its [`RecordGuard`]. Records
//! that embed a [`DbRecord`](crate::models::DbRecord) descriptor get it
//! stamped while the lock is held.

use super::{JsonDatabase, Shared};
use crate::context::ApiContext;
use crate::error::{CoreResult, EntityKind};
use crate::models::DbRecord;
use crate::models::Document;
use crate::util::now_rfc3339;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;

type RecordKey = (EntityKind, String);

pub(crate) struct RecordLocks {
    held: Mutex<HashSet<RecordKey>>,
    released: Condvar,
}

impl RecordLocks {
    pub(crate) fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    fn acquire(&self, key: RecordKey) {
        let mut held = self.held.lock();
        while held.contains(&key) {
            self.released.wait(&mut held);
        }
        held.insert(key);
    }

    fn release(&self, key: &RecordKey) {
        self.held.lock().remove(key);
        self.released.notify_all();
    }

    fn is_held(&self, key: &RecordKey) -> bool {
        self.held.lock().contains(key)
    }
}

fn descriptor<'a>(doc: &'a mut Document, kind: EntityKind, id: &str) -> Option<&'a mut DbRecord> {
    match kind {
        EntityKind::User => doc
            .users
            .iter_mut()
            .find(|u| u.id.eq_ignore_ascii_case(id))
            .map(|u| &mut u.lock),
        EntityKind::ApiKey => doc
            .api_keys
            .iter_mut()
            .find(|k| k.id.eq_ignore_ascii_case(id))
            .map(|k| &mut k.lock),
        _ => None,
    }
}

impl Shared {
    fn stamp(&self, kind: EntityKind, id: &str, holder: Option<&str>) {
        let mut data = self.data.write();
        if let Some(record) = descriptor(&mut data, kind, id) {
            match holder {
                Some(holder) => record.lock(holder, now_rfc3339()),
                None => record.unlock(),
            }
            drop(data);
            self.mark_dirty();
        }
    }
}

/// Holds a record lock until dropped.
///
/// Must not be created or dropped while the caller holds the document lock.
#[must_use = "the record is unlocked as soon as the guard is dropped"]
pub struct RecordGuard<'a> {
    shared: &'a Shared,
    key: RecordKey,
}

impl RecordGuard<'_> {
    /// Entity kind of the locked record.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.key.0
    }

    /// Id of the locked record, lowercased.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.key.1
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        self.shared.stamp(self.key.0, &self.key.1, None);
        self.shared.records.release(&self.key);
    }
}

impl std::fmt::Debug for RecordGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordGuard")
            .field("kind", &self.key.0)
            .field("id", &self.key.1)
            .finish()
    }
}

impl JsonDatabase {
    /// Blocks until the record `(kind, id)` is free and locks it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotConnected`](crate::CoreError::NotConnected)
    /// when disconnected.
    pub fn lock_record(
        &self,
        ctx: &ApiContext,
        kind: EntityKind,
        id: &str,
    ) -> CoreResult<RecordGuard<'_>> {
        self.shared.ensure_connected()?;
        let key = (kind, id.to_lowercase());
        self.shared.records.acquire(key.clone());
        self.shared.stamp(kind, id, Some(&ctx.acting_user()));
        ctx.log_debug(format!("locked {kind} {id}"));
        Ok(RecordGuard {
            shared: &self.shared,
            key,
        })
    }

    /// Returns true while some caller holds the record lock.
    #[must_use]
    pub fn is_record_locked(&self, kind: EntityKind, id: &str) -> bool {
        self.shared.records.is_held(&(kind, id.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{ctx, open_temp};
    use super::*;
    use crate::models::User;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_stamps_and_clears_descriptor() {
        let (_dir, db) = open_temp();
        db.with_document_mut(|doc| {
            let mut user = User::new("alice", "Alice", "alice@example.com");
            user.id = "U1".into();
            doc.users.push(user);
            Ok(())
        })
        .unwrap();

        {
            let guard = db.lock_record(&ctx(), EntityKind::User, "U1").unwrap();
            assert_eq!(guard.id(), "u1");
            assert!(db.is_record_locked(EntityKind::User, "u1"));
            let lock = db.with_document(|d| d.users[0].lock.clone()).unwrap();
            assert!(lock.is_locked);
            assert_eq!(lock.locked_by, "root@localhost");
        }

        assert!(!db.is_record_locked(EntityKind::User, "U1"));
        let lock = db.with_document(|d| d.users[0].lock.clone()).unwrap();
        assert!(!lock.is_locked);
    }

    #[test]
    fn waiters_are_serialized() {
        let (_dir, db) = open_temp();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = db.lock_record(&ctx(), EntityKind::ApiKey, "k").unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_records_do_not_block() {
        let (_dir, db) = open_temp();
        let _a = db.lock_record(&ctx(), EntityKind::User, "a").unwrap();
        let _b = db.lock_record(&ctx(), EntityKind::User, "b").unwrap();
        let _c = db.lock_record(&ctx(), EntityKind::ApiKey, "a").unwrap();
        assert!(db.is_record_locked(EntityKind::ApiKey, "A"));
    }
}
