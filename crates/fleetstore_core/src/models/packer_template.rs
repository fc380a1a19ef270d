use super::null_as_default;
use crate::error::{CoreError, CoreResult, EntityKind};
use crate::query::Authorized;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default machine specs applied when a template has none.
pub const DEFAULT_SPECS: [(&str, &str); 3] = [("memory", "2048"), ("cpu", "2"), ("disk", "20480")];

/// Machine template built with packer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackerTemplate {
    /// Id.
    pub id: String,
    /// Name, unique.
    #[serde(default)]
    pub name: String,
    /// Owner.
    #[serde(default)]
    pub owner: String,
    /// Hostname of built machines.
    #[serde(default)]
    pub hostname: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Folder holding the packer files.
    #[serde(default)]
    pub packer_folder: String,
    /// Packer variables.
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: BTreeMap<String, String>,
    /// Addons to install.
    #[serde(default, deserialize_with = "null_as_default")]
    pub addons: Vec<String>,
    /// Machine specs.
    #[serde(default, deserialize_with = "null_as_default")]
    pub specs: BTreeMap<String, String>,
    /// Default values.
    #[serde(default, deserialize_with = "null_as_default")]
    pub defaults: BTreeMap<String, String>,
    /// System-seeded records are internal.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub internal: bool,
    /// Last update time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    /// Creation time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    /// Roles required to see the template.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub required_roles: Vec<String>,
    /// Claims required to see the template.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub required_claims: Vec<String>,
}

impl PackerTemplate {
    /// Creates a template with the given id and name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Checks the required fields and fills in default specs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyRequiredField`] for an empty id or name.
    pub fn validate(&mut self) -> CoreResult<()> {
        if self.id.is_empty() {
            return Err(CoreError::empty_field(EntityKind::PackerTemplate, "id"));
        }
        if self.name.is_empty() {
            return Err(CoreError::empty_field(EntityKind::PackerTemplate, "name"));
        }
        if self.specs.is_empty() {
            self.specs = DEFAULT_SPECS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
        }
        Ok(())
    }
}

impl Authorized for PackerTemplate {
    fn required_roles(&self) -> &[String] {
        &self.required_roles
    }

    fn required_claims(&self) -> &[String] {
        &self.required_claims
    }
}

crate::queryable!(PackerTemplate {
    "id" => id,
    "name" => name,
    "owner" => owner,
    "hostname" => hostname,
    "description" => description,
    "packer_folder" => packer_folder,
    "internal" => internal,
    "created_at" => created_at,
    "updated_at" => updated_at,
});
