use serde::{Deserialize, Serialize};

/// A stored snapshot of one virtual machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineSnapshot {
    /// Snapshot id.
    pub id: String,
    /// Name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// When it was taken.
    #[serde(default)]
    pub date: String,
    /// Machine state at the time.
    #[serde(default)]
    pub state: String,
    /// Whether this is the current snapshot.
    #[serde(default)]
    pub current: bool,
    /// Parent snapshot id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
}

impl VirtualMachineSnapshot {
    /// Creates a snapshot entry.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the snapshot without its id, as listed by machine.
    #[must_use]
    pub fn details(&self) -> SnapshotDetails {
        SnapshotDetails {
            name: self.name.clone(),
            date: self.date.clone(),
            state: self.state.clone(),
            current: self.current,
            parent: self.parent.clone(),
        }
    }
}

/// Snapshot fields keyed externally by snapshot id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDetails {
    /// Name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// When it was taken.
    #[serde(default)]
    pub date: String,
    /// Machine state at the time.
    #[serde(default)]
    pub state: String,
    /// Whether this is the current snapshot.
    #[serde(default)]
    pub current: bool,
    /// Parent snapshot id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
}
