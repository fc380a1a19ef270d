//! # fleetstore testkit
//!
//! Test utilities for fleetstore.
//!
//! This crate provides:
//! - [`TestStore`], a store over a temporary directory that cleans up after
//!   itself, plus context helpers
//! - seeders for common scenarios (identity, fleet, catalog)
//! - proptest strategies for records that keep the store's invariants
//! - a concurrent save stress driver
//!
//! ## Usage
//!
//! ```rust
//! use fleetstore_testkit::prelude::*;
//!
//! with_temp_store(|store| {
//!     let ctx = root_context();
//!     scenarios::seed_identity(store).unwrap();
//!     assert!(!store.get_roles(&ctx, None).unwrap().is_empty());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scenarios;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scenarios;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
