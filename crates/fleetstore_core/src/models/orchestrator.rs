use super::{null_as_default, ReverseProxy, ReverseProxyHost};
use crate::query::{Authorized, FieldValue, ToFieldValue};
use crate::util::now_rfc3339;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a host as last observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Answered the last health check.
    Healthy,
    /// Failed the last health check.
    Unhealthy,
    /// Never checked.
    #[default]
    #[serde(other)]
    Unknown,
}

impl HealthState {
    /// Returns true for [`HealthState::Unknown`].
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::Unknown
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        })
    }
}

impl ToFieldValue for HealthState {
    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Str(self.to_string()))
    }
}

/// Credentials used to reach a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAuthentication {
    /// Username.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// Password.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// API key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
}

/// One resource counter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostResourceItem {
    /// CPU architecture the counters belong to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_type: String,
    /// Physical CPU cores.
    #[serde(default)]
    pub physical_cpu_count: i64,
    /// Logical CPU cores.
    #[serde(default)]
    pub logical_cpu_count: i64,
    /// Memory in MB.
    #[serde(default)]
    pub memory_size: f64,
    /// Disk in MB.
    #[serde(default)]
    pub disk_size: f64,
    /// Free disk in MB.
    #[serde(default)]
    pub free_disk_size: f64,
    /// Running Apple virtual machines.
    #[serde(default)]
    pub total_apple_vms: i64,
}

impl HostResourceItem {
    /// Adds the counters of `other` to `self`.
    pub fn accumulate(&mut self, other: &Self) {
        self.physical_cpu_count += other.physical_cpu_count;
        self.logical_cpu_count += other.logical_cpu_count;
        self.memory_size += other.memory_size;
        self.disk_size += other.disk_size;
        self.free_disk_size += other.free_disk_size;
        self.total_apple_vms += other.total_apple_vms;
    }
}

crate::queryable!(HostResourceItem {
    "cpu_type" => cpu_type,
    "physical_cpu_count" => physical_cpu_count,
    "logical_cpu_count" => logical_cpu_count,
    "memory_size" => memory_size,
    "disk_size" => disk_size,
    "free_disk_size" => free_disk_size,
    "total_apple_vms" => total_apple_vms,
});

/// Resource snapshot reported by a host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostResources {
    /// CPU architecture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_type: String,
    /// CPU brand.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_brand: String,
    /// Agent version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub devops_version: String,
    /// OS name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os_name: String,
    /// OS version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os_version: String,
    /// External IP address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_ip_address: String,
    /// Hardware totals.
    #[serde(default)]
    pub total: HostResourceItem,
    /// Free capacity.
    #[serde(default)]
    pub total_available: HostResourceItem,
    /// Used by running machines.
    #[serde(default)]
    pub total_in_use: HostResourceItem,
    /// Reserved by stopped machines.
    #[serde(default)]
    pub total_reserved: HostResourceItem,
    /// Held back for the host itself.
    #[serde(default)]
    pub system_reserved: HostResourceItem,
}

crate::queryable!(HostResources {
    "cpu_type" => cpu_type,
    "cpu_brand" => cpu_brand,
    "devops_version" => devops_version,
    "os_name" => os_name,
    "os_version" => os_version,
    "external_ip_address" => external_ip_address,
} nested {
    "total" => total,
    "total_available" => total_available,
    "total_in_use" => total_in_use,
    "total_reserved" => total_reserved,
    "system_reserved" => system_reserved,
});

/// A virtual machine observed on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    /// Id.
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Owning host id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_id: String,
    /// Owning host address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    /// Health of the owning host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_state: String,
    /// External address of the owning host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_external_ip_address: String,
    /// Address inside the host network.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub internal_ip_address: String,
    /// Owner.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Machine type.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Power state.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    /// Guest OS.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
    /// Whether the machine is a template.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,
    /// Uptime.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uptime: String,
    /// Bundle path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub home: String,
    /// Creation time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    /// Last update time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
}

impl VirtualMachine {
    /// Creates a machine with the given id and name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

crate::queryable!(VirtualMachine {
    "id" => id,
    "host_id" => host_id,
    "host" => host,
    "host_state" => host_state,
    "user" => user,
    "name" => name,
    "description" => description,
    "type" => kind,
    "state" => state,
    "os" => os,
    "template" => template,
    "home" => home,
});

/// A registered fleet node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorHost {
    /// Id.
    pub id: String,
    /// Whether the host takes part in scheduling.
    #[serde(default)]
    pub enabled: bool,
    /// Host name or address.
    #[serde(default)]
    pub host: String,
    /// CPU architecture.
    #[serde(default)]
    pub architecture: String,
    /// CPU model.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_model: String,
    /// OS version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os_version: String,
    /// OS name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os_name: String,
    /// External IP address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_ip_address: String,
    /// Agent version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub devops_version: String,
    /// Description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Tags.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Port.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,
    /// URL scheme.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema: String,
    /// Path prefix of the agent API.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_prefix: String,
    /// Hypervisor version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parallels_desktop_version: String,
    /// Whether the hypervisor is licensed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parallels_desktop_licensed: bool,
    /// Credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<HostAuthentication>,
    /// Last reported resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<HostResources>,
    /// Health.
    #[serde(default, skip_serializing_if = "HealthState::is_unknown")]
    pub state: HealthState,
    /// When the host last became unhealthy.
    #[serde(rename = "last_seen", default, skip_serializing_if = "String::is_empty")]
    pub last_unhealthy: String,
    /// Why the host last became unhealthy.
    #[serde(
        rename = "last_seen_error_message",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub last_unhealthy_error_message: String,
    /// Machines observed on the host.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub virtual_machines: Vec<VirtualMachine>,
    /// Whether the host runs a reverse proxy.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_reverse_proxy_enabled: bool,
    /// Reverse proxy of the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_proxy: Option<ReverseProxy>,
    /// Reverse-proxy hosts served by the host.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub reverse_proxy_hosts: Vec<ReverseProxyHost>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    /// Last update time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    /// Claims required to see the host.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub required_claims: Vec<String>,
    /// Roles required to see the host.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub required_roles: Vec<String>,
}

impl OrchestratorHost {
    /// Creates a host entry for the given address.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Returns the agent base URL, `schema://host[:port][/path_prefix]`.
    ///
    /// A host that already carries a scheme is used as is; the scheme
    /// defaults to `http`.
    #[must_use]
    pub fn base_url(&self) -> String {
        let prefix = self.path_prefix.trim_matches('/');
        let mut url = if self.host.contains("://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            let schema = if self.schema.is_empty() {
                "http"
            } else {
                self.schema.trim_end_matches("://")
            };
            let mut url = format!("{schema}://{}", self.host);
            if !self.port.is_empty() {
                url.push(':');
                url.push_str(&self.port);
            }
            url
        };
        if !prefix.is_empty() {
            url.push('/');
            url.push_str(prefix);
        }
        url
    }

    /// Returns true if `key` is the id, the host name or the base URL.
    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key)
            || self.host.eq_ignore_ascii_case(key)
            || self.base_url().eq_ignore_ascii_case(key.trim_end_matches('/'))
    }

    /// Returns true for an enabled healthy host.
    #[must_use]
    pub fn is_schedulable(&self) -> bool {
        self.enabled && self.state == HealthState::Healthy
    }

    /// Marks the host healthy and clears the failure fields.
    pub fn set_healthy(&mut self) {
        if self.state == HealthState::Healthy {
            return;
        }
        self.state = HealthState::Healthy;
        self.last_unhealthy.clear();
        self.last_unhealthy_error_message.clear();
    }

    /// Marks the host unhealthy. A host already unhealthy keeps its first
    /// failure time and reason.
    pub fn set_unhealthy(&mut self, reason: impl Into<String>) {
        if self.state == HealthState::Unhealthy {
            return;
        }
        self.state = HealthState::Unhealthy;
        self.last_unhealthy = now_rfc3339();
        self.last_unhealthy_error_message = reason.into();
    }

    /// Returns true if any mutable field differs from `other`.
    ///
    /// Id and timestamps are not compared.
    #[must_use]
    pub fn diff(&self, other: &Self) -> bool {
        self.host != other.host
            || self.enabled != other.enabled
            || self.architecture != other.architecture
            || self.cpu_model != other.cpu_model
            || self.os_version != other.os_version
            || self.os_name != other.os_name
            || self.external_ip_address != other.external_ip_address
            || self.devops_version != other.devops_version
            || self.description != other.description
            || self.tags != other.tags
            || self.port != other.port
            || self.schema != other.schema
            || self.path_prefix != other.path_prefix
            || self.parallels_desktop_version != other.parallels_desktop_version
            || self.parallels_desktop_licensed != other.parallels_desktop_licensed
            || self.authentication != other.authentication
            || self.resources != other.resources
            || self.state != other.state
            || self.last_unhealthy != other.last_unhealthy
            || self.last_unhealthy_error_message != other.last_unhealthy_error_message
            || self.virtual_machines != other.virtual_machines
            || self.is_reverse_proxy_enabled != other.is_reverse_proxy_enabled
            || self.reverse_proxy != other.reverse_proxy
            || self.reverse_proxy_hosts != other.reverse_proxy_hosts
            || self.required_claims != other.required_claims
            || self.required_roles != other.required_roles
    }

    /// Copies every mutable field of `other` into `self`.
    pub fn apply(&mut self, other: &Self) {
        let id = std::mem::take(&mut self.id);
        let created_at = std::mem::take(&mut self.created_at);
        let updated_at = std::mem::take(&mut self.updated_at);
        *self = Self {
            id,
            created_at,
            updated_at,
            ..other.clone()
        };
    }
}

impl Authorized for OrchestratorHost {
    fn required_roles(&self) -> &[String] {
        &self.required_roles
    }

    fn required_claims(&self) -> &[String] {
        &self.required_claims
    }
}

crate::queryable!(OrchestratorHost {
    "id" => id,
    "enabled" => enabled,
    "host" => host,
    "architecture" => architecture,
    "cpu_model" => cpu_model,
    "os_version" => os_version,
    "os_name" => os_name,
    "external_ip_address" => external_ip_address,
    "devops_version" => devops_version,
    "description" => description,
    "port" => port,
    "schema" => schema,
    "path_prefix" => path_prefix,
    "state" => state,
    "created_at" => created_at,
    "updated_at" => updated_at,
} nested {
    "resources" => resources,
});
