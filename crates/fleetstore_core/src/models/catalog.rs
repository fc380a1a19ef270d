use super::null_as_default;
use crate::query::Authorized;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag marking the newest version of a catalog id.
pub const LATEST_TAG: &str = "latest";

/// Where a catalog artifact is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProvider {
    /// Provider type.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Host.
    #[serde(default)]
    pub host: String,
    /// Port.
    #[serde(default)]
    pub port: String,
    /// User.
    #[serde(rename = "user", default)]
    pub username: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// Provider specific settings.
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: BTreeMap<String, String>,
}

/// Minimum machine requirements of an artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumRequirements {
    /// CPU count.
    #[serde(default)]
    pub cpu: i64,
    /// Memory in MB.
    #[serde(default)]
    pub memory: i64,
    /// Disk in MB.
    #[serde(default)]
    pub disk: i64,
}

/// A file inside a catalog artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogContentItem {
    /// Whether the entry is a directory.
    #[serde(default)]
    pub is_dir: bool,
    /// Name.
    #[serde(default)]
    pub name: String,
    /// Path.
    #[serde(default)]
    pub path: String,
    /// Checksum.
    #[serde(rename = "hash", default)]
    pub checksum: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: i64,
    /// Creation time.
    #[serde(default)]
    pub created_at: String,
    /// Last update time.
    #[serde(default)]
    pub updated_at: String,
    /// Deletion time.
    #[serde(default)]
    pub deleted_at: String,
}

/// Versioned artifact descriptor keyed by `(catalog_id, version, architecture)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogManifest {
    /// Id.
    pub id: String,
    /// Catalog id shared by all versions.
    #[serde(default)]
    pub catalog_id: String,
    /// Name.
    #[serde(default)]
    pub name: String,
    /// Version.
    #[serde(default)]
    pub version: String,
    /// CPU architecture.
    #[serde(default)]
    pub architecture: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Artifact path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Pack file path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pack_path: String,
    /// Metadata file path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata_path: String,
    /// Artifact type.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Storage provider.
    #[serde(default)]
    pub provider: Option<CatalogProvider>,
    /// Size in bytes.
    #[serde(default)]
    pub size: i64,
    /// Packed size in bytes.
    #[serde(default)]
    pub pack_size: i64,
    /// Roles required to see the manifest.
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_roles: Vec<String>,
    /// Claims required to see the manifest.
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_claims: Vec<String>,
    /// Tags.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: String,
    /// Last update time.
    #[serde(default)]
    pub updated_at: String,
    /// Last download time.
    #[serde(default)]
    pub last_downloaded_at: String,
    /// Last user to download.
    #[serde(default)]
    pub last_downloaded_user: String,
    /// Number of downloads.
    #[serde(default)]
    pub download_count: i64,
    /// Files of the machine.
    #[serde(default, deserialize_with = "null_as_default")]
    pub virtual_machine_contents: Vec<CatalogContentItem>,
    /// Files of the pack.
    #[serde(default, deserialize_with = "null_as_default")]
    pub pack_contents: Vec<CatalogContentItem>,
    /// Minimum requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_requirements: Option<MinimumRequirements>,
    /// Whether the version is tainted.
    #[serde(default)]
    pub tainted: bool,
    /// Who tainted it.
    #[serde(default)]
    pub tainted_by: String,
    /// Who untainted it.
    #[serde(default)]
    pub untainted_by: String,
    /// When it was tainted.
    #[serde(default)]
    pub tainted_at: String,
    /// Whether the version is revoked.
    #[serde(default)]
    pub revoked: bool,
    /// Who revoked it.
    #[serde(default)]
    pub revoked_by: String,
    /// When it was revoked.
    #[serde(default)]
    pub revoked_at: String,
}

impl CatalogManifest {
    /// Creates a manifest for one version and architecture.
    #[must_use]
    pub fn new(
        catalog_id: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        let catalog_id = catalog_id.into();
        Self {
            name: catalog_id.clone(),
            catalog_id,
            version: version.into(),
            architecture: architecture.into(),
            ..Self::default()
        }
    }

    /// Adds `tag` unless already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
    }

    /// Removes every occurrence of `tag`.
    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| !t.eq_ignore_ascii_case(tag));
    }

    /// Returns true if the manifest carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Returns true if this is the given version of the given catalog id.
    #[must_use]
    pub fn is_version(&self, catalog_id: &str, version: &str) -> bool {
        self.catalog_id.eq_ignore_ascii_case(catalog_id) && self.version.eq_ignore_ascii_case(version)
    }

    /// Returns true if both manifests share catalog id, version and architecture.
    #[must_use]
    pub fn same_key(&self, other: &Self) -> bool {
        self.is_version(&other.catalog_id, &other.version)
            && self.architecture.eq_ignore_ascii_case(&other.architecture)
    }
}

impl Authorized for CatalogManifest {
    fn required_roles(&self) -> &[String] {
        &self.required_roles
    }

    fn required_claims(&self) -> &[String] {
        &self.required_claims
    }
}

crate::queryable!(CatalogManifest {
    "id" => id,
    "catalog_id" => catalog_id,
    "name" => name,
    "version" => version,
    "architecture" => architecture,
    "description" => description,
    "path" => path,
    "type" => kind,
    "size" => size,
    "created_at" => created_at,
    "updated_at" => updated_at,
    "last_downloaded_at" => last_downloaded_at,
    "download_count" => download_count,
    "tainted" => tainted,
    "revoked" => revoked,
});

/// A remote catalog the service talks to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogManager {
    /// Id.
    pub id: String,
    /// Name, unique.
    #[serde(default)]
    pub name: String,
    /// URL.
    #[serde(default)]
    pub url: String,
    /// System-seeded records are internal.
    #[serde(default)]
    pub internal: bool,
    /// Whether the manager is in use.
    #[serde(default)]
    pub active: bool,
    /// Authentication method.
    #[serde(default)]
    pub authentication_method: String,
    /// Username.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// Visible to every user.
    #[serde(default)]
    pub global: bool,
    /// Claims required to use the manager.
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_claims: Vec<String>,
    /// Owning user id.
    #[serde(default)]
    pub owner_id: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: String,
    /// Last update time.
    #[serde(default)]
    pub updated_at: String,
}

impl CatalogManager {
    /// Creates a manager with the given name and URL.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            active: true,
            ..Self::default()
        }
    }
}

crate::queryable!(CatalogManager {
    "id" => id,
    "name" => name,
    "url" => url,
    "internal" => internal,
    "active" => active,
    "global" => global,
    "owner_id" => owner_id,
    "created_at" => created_at,
    "updated_at" => updated_at,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags() {
        let mut manifest = CatalogManifest::new("ubuntu", "1.0", "arm64");
        manifest.add_tag("latest");
        manifest.add_tag("LATEST");
        assert_eq!(manifest.tags.len(), 1);
        assert!(manifest.has_tag("Latest"));
        manifest.remove_tag("latest");
        assert!(!manifest.has_tag("latest"));
    }

    #[test]
    fn keys() {
        let a = CatalogManifest::new("ubuntu", "1.0", "arm64");
        let b = CatalogManifest::new("UBUNTU", "1.0", "ARM64");
        let c = CatalogManifest::new("ubuntu", "1.0", "x86_64");
        assert!(a.same_key(&b));
        assert!(!a.same_key(&c));
        assert!(a.is_version("ubuntu", "1.0"));
    }

    #[test]
    fn type_field_is_renamed() {
        let mut manifest = CatalogManifest::new("ubuntu", "1.0", "arm64");
        manifest.kind = "pvm".into();
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["type"], "pvm");
        assert!(json.get("minimum_requirements").is_none());
    }
}
