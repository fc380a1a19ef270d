//! # fleetstore core
//!
//! Embedded JSON document store for the fleet control plane.
//!
//! This crate provides:
//! - [`JsonDatabase`], a single-file document engine with a thread-safe
//!   in-memory copy, a single-consumer save queue, rotating backups and
//!   crash recovery from the files an interrupted save leaves behind
//! - optional AES-256-GCM encryption of the document at rest
//! - a generic filter and ordering layer over any record type
//! - typed repositories for users, roles, claims, API keys, packer
//!   templates, catalog manifests and managers, orchestrator hosts,
//!   reverse-proxy hosts, service configuration and VM snapshots
//! - fleet-wide resource aggregation per CPU architecture
//!
//! ## Example
//!
//! ```rust
//! use fleetstore_core::{ApiContext, JsonDatabase, StoreConfig};
//! use fleetstore_core::models::Claim;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let ctx = ApiContext::root();
//! let config = StoreConfig::new(dir.path().join("data.json")).without_background_tasks();
//! let db = JsonDatabase::open(&ctx, config).unwrap();
//!
//! db.create_claim(&ctx, Claim::new("list vms")).unwrap();
//! assert_eq!(db.get_claim(&ctx, "LIST_VMS").unwrap().name, "LIST_VMS");
//! db.close(&ctx).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod crypto;
mod error;
pub mod models;
pub mod query;
mod repos;
mod stats;
mod store;
pub mod util;

pub use config::StoreConfig;
pub use context::{ApiContext, AuthorizedBy, Principal};
pub use error::{CoreError, CoreResult, EntityKind, ErrorClass, ProtectedAction};
pub use query::{Filter, Order};
pub use repos::{
    aggregate_resources, HostHealth, ResourceMap, ResourceSection, ResourcesOverview,
};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{JsonDatabase, RecordGuard};
pub use fleetstore_storage::ResidualKind;

/// Crate version, stamped into CLI output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
