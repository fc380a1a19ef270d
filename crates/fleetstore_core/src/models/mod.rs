//! Persisted records and the root [`Document`].
//!
//! Field names follow the JSON keys of the document file. Collections written
//! as `null` by older files load as empty.

mod api_key;
mod catalog;
mod claim;
mod db_record;
mod orchestrator;
mod packer_template;
mod reverse_proxy;
mod snapshot;
mod user;

pub use api_key::ApiKey;
pub use catalog::{
    CatalogContentItem, CatalogManager, CatalogManifest, CatalogProvider, MinimumRequirements,
    LATEST_TAG,
};
pub use claim::{Claim, Role, RoleUser};
pub use db_record::DbRecord;
pub use orchestrator::{
    HealthState, HostAuthentication, HostResourceItem, HostResources, OrchestratorHost,
    VirtualMachine,
};
pub use packer_template::PackerTemplate;
pub use reverse_proxy::{
    HttpRoute, ReverseProxy, ReverseProxyHost, ReverseProxyHostCors, ReverseProxyHostTls, TcpRoute,
};
pub use snapshot::{SnapshotDetails, VirtualMachineSnapshot};
pub use user::{RecordRef, User};

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Schema version written into new documents.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Deserializes `null` as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Schema stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Version string.
    #[serde(default)]
    pub version: String,
}

impl Default for DatabaseSchema {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Service id.
    #[serde(default)]
    pub id: String,
}

/// The root aggregate persisted to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Schema stamp.
    #[serde(default, deserialize_with = "null_as_default")]
    pub schema: DatabaseSchema,
    /// Service configuration.
    #[serde(default)]
    pub configuration: Option<Configuration>,
    /// Users.
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: Vec<User>,
    /// Claims.
    #[serde(default, deserialize_with = "null_as_default")]
    pub claims: Vec<Claim>,
    /// Roles.
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<Role>,
    /// API keys.
    #[serde(default, deserialize_with = "null_as_default")]
    pub api_keys: Vec<ApiKey>,
    /// Packer templates.
    #[serde(
        default,
        rename = "virtual_machine_templates",
        deserialize_with = "null_as_default"
    )]
    pub packer_templates: Vec<PackerTemplate>,
    /// Catalog manifests.
    #[serde(default, deserialize_with = "null_as_default")]
    pub catalog_manifests: Vec<CatalogManifest>,
    /// Catalog managers.
    #[serde(default, deserialize_with = "null_as_default")]
    pub catalog_managers: Vec<CatalogManager>,
    /// Orchestrator hosts.
    #[serde(default, deserialize_with = "null_as_default")]
    pub orchestrator_hosts: Vec<OrchestratorHost>,
    /// Global reverse-proxy configuration.
    #[serde(default)]
    pub reverse_proxy: Option<ReverseProxy>,
    /// Reverse-proxy hosts.
    #[serde(default, deserialize_with = "null_as_default")]
    pub reverse_proxy_hosts: Vec<ReverseProxyHost>,
    /// Snapshot lists keyed by VM id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub vm_snapshots: BTreeMap<String, Vec<VirtualMachineSnapshot>>,
}

impl Document {
    /// Creates an empty document with the current schema stamp.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a document from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns a serde error when the bytes are not a document.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        let mut document: Self = serde_json::from_slice(bytes)?;
        if document.schema.version.is_empty() {
            document.schema = DatabaseSchema::default();
        }
        Ok(document)
    }

    /// Serializes the document as indented JSON.
    ///
    /// # Errors
    ///
    /// Returns a serde error if a value cannot be serialized.
    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Number of records per collection, keyed by JSON name.
    #[must_use]
    pub fn collection_counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("users", self.users.len()),
            ("claims", self.claims.len()),
            ("roles", self.roles.len()),
            ("api_keys", self.api_keys.len()),
            ("virtual_machine_templates", self.packer_templates.len()),
            ("catalog_manifests", self.catalog_manifests.len()),
            ("catalog_managers", self.catalog_managers.len()),
            ("orchestrator_hosts", self.orchestrator_hosts.len()),
            ("reverse_proxy_hosts", self.reverse_proxy_hosts.len()),
            ("vm_snapshots", self.vm_snapshots.len()),
        ])
    }
}
