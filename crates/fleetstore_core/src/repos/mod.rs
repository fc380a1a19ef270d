//! Typed repositories over the document.
//!
//! Every operation is a method on [`JsonDatabase`](crate::JsonDatabase)
//! taking the caller's [`ApiContext`](crate::ApiContext). Operations fail
//! with [`CoreError::NotConnected`] while the store is disconnected, return
//! owned copies and persist mutations through the save queue.

mod api_keys;
mod catalog_managers;
mod catalog_manifests;
mod claims;
mod configuration;
mod orchestrator;
mod packer_templates;
mod resources;
mod reverse_proxy;
mod roles;
mod snapshots;
mod users;

pub use orchestrator::HostHealth;
pub use resources::{aggregate_resources, ResourceMap, ResourceSection, ResourcesOverview};

use crate::error::{CoreError, CoreResult, EntityKind};

/// Case-insensitive identifier comparison used by every collection.
pub(crate) fn same_id(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Fails with [`CoreError::EmptyRequiredField`] when `value` is blank.
pub(crate) fn require(kind: EntityKind, field: &'static str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        Err(CoreError::empty_field(kind, field))
    } else {
        Ok(())
    }
}
