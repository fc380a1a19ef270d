use serde::{Deserialize, Serialize};

/// Lock descriptor embedded in records that take record-level locks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbRecord {
    /// Whether the record is locked.
    #[serde(default)]
    pub is_locked: bool,
    /// Who holds the lock.
    #[serde(default)]
    pub locked_by: String,
    /// When the lock was taken.
    #[serde(default)]
    pub locked_at: String,
}

impl DbRecord {
    /// Stamps the descriptor as locked by `holder` at `at`.
    pub fn lock(&mut self, holder: impl Into<String>, at: impl Into<String>) {
        self.is_locked = true;
        self.locked_by = holder.into();
        self.locked_at = at.into();
    }

    /// Clears the locked flag.
    pub fn unlock(&mut self) {
        self.is_locked = false;
    }
}
