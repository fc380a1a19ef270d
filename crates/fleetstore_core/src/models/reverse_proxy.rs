use super::null_as_default;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Global reverse-proxy listener settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseProxy {
    /// Id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Owning orchestrator host, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_id: String,
    /// Whether the proxy is running.
    #[serde(default)]
    pub enabled: bool,
    /// Listen address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    /// Listen port.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,
}

impl ReverseProxy {
    /// Returns true if any field but the id differs.
    #[must_use]
    pub fn diff(&self, other: &Self) -> bool {
        self.enabled != other.enabled
            || self.host != other.host
            || self.port != other.port
            || self.host_id != other.host_id
    }
}

/// TLS settings of a proxied host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseProxyHostTls {
    /// Whether TLS is terminated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,
    /// PEM certificate.
    #[serde(rename = "cert", default, skip_serializing_if = "String::is_empty")]
    pub certificate: String,
    /// PEM private key.
    #[serde(rename = "key", default, skip_serializing_if = "String::is_empty")]
    pub private_key: String,
}

/// CORS settings of a proxied host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseProxyHostCors {
    /// Whether CORS headers are emitted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,
    /// Allowed origins.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub allowed_origins: Vec<String>,
    /// Allowed methods.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub allowed_methods: Vec<String>,
    /// Allowed headers.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub allowed_headers: Vec<String>,
}

/// HTTP forwarding rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRoute {
    /// Id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Path prefix.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Target machine id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_vm_id: String,
    /// Target host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_host: String,
    /// Target port.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_port: String,
    /// Target scheme.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema: String,
    /// Regular expression matched against the request path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern: String,
    /// Headers added to the forwarded request.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: BTreeMap<String, String>,
    /// Headers added to the response.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: BTreeMap<String, String>,
}

impl HttpRoute {
    /// Returns the path, or the pattern when no path is set.
    #[must_use]
    pub fn route(&self) -> &str {
        if self.path.is_empty() {
            &self.pattern
        } else {
            &self.path
        }
    }

    /// Returns true if `key` is the id or the route of this rule.
    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key) || (!self.route().is_empty() && self.route() == key)
    }

    /// Returns true if any field but the id differs.
    #[must_use]
    pub fn diff(&self, other: &Self) -> bool {
        self.path != other.path
            || self.target_vm_id != other.target_vm_id
            || self.target_host != other.target_host
            || self.target_port != other.target_port
            || self.schema != other.schema
            || self.pattern != other.pattern
            || self.request_headers != other.request_headers
            || self.response_headers != other.response_headers
    }
}

/// TCP forwarding rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpRoute {
    /// Id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Target port.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_port: String,
    /// Target host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_host: String,
    /// Target machine id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_vm_id: String,
}

impl TcpRoute {
    /// Returns true if any field but the id differs.
    #[must_use]
    pub fn diff(&self, other: &Self) -> bool {
        self.target_port != other.target_port
            || self.target_host != other.target_host
            || self.target_vm_id != other.target_vm_id
    }
}

/// A virtual host served by the reverse proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseProxyHost {
    /// Id.
    #[serde(default)]
    pub id: String,
    /// Owning orchestrator host, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_id: String,
    /// Host name.
    #[serde(default)]
    pub host: String,
    /// Port.
    #[serde(default)]
    pub port: String,
    /// TLS settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ReverseProxyHostTls>,
    /// CORS settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<ReverseProxyHostCors>,
    /// HTTP rules. Exclusive with `tcp_route`.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub http_routes: Vec<HttpRoute>,
    /// TCP rule. Exclusive with `http_routes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_route: Option<TcpRoute>,
}

impl ReverseProxyHost {
    /// Creates a proxied host.
    #[must_use]
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            ..Self::default()
        }
    }

    /// Returns the lowercase `host:port`, or the host when no port is set.
    #[must_use]
    pub fn address(&self) -> String {
        if self.port.is_empty() {
            self.host.to_lowercase()
        } else {
            format!("{}:{}", self.host, self.port).to_lowercase()
        }
    }

    /// Returns true if `key` is the id or the address.
    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key) || self.address() == key.to_lowercase()
    }

    /// Returns true if any field but the ids differs.
    #[must_use]
    pub fn diff(&self, other: &Self) -> bool {
        if self.host_id != other.host_id
            || self.host != other.host
            || self.port != other.port
            || self.tls != other.tls
            || self.cors != other.cors
            || self.http_routes.len() != other.http_routes.len()
        {
            return true;
        }
        if self
            .http_routes
            .iter()
            .zip(&other.http_routes)
            .any(|(a, b)| a.diff(b))
        {
            return true;
        }
        match (&self.tcp_route, &other.tcp_route) {
            (None, None) => false,
            (Some(a), Some(b)) => a.diff(b),
            _ => true,
        }
    }
}

crate::queryable!(ReverseProxyHost {
    "id" => id,
    "host_id" => host_id,
    "host" => host,
    "port" => port,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_lowercase() {
        let host = ReverseProxyHost::new("Example.COM", "8080");
        assert_eq!(host.address(), "example.com:8080");
        assert!(host.matches_key("EXAMPLE.com:8080"));
        assert_eq!(ReverseProxyHost::new("A", "").address(), "a");
    }

    #[test]
    fn route_prefers_path() {
        let mut route = HttpRoute {
            pattern: "^/api/.*".into(),
            ..HttpRoute::default()
        };
        assert_eq!(route.route(), "^/api/.*");
        route.path = "/api".into();
        assert_eq!(route.route(), "/api");
        assert!(route.matches_key("/api"));
    }

    #[test]
    fn host_diff_ignores_route_ids() {
        let mut a = ReverseProxyHost::new("h", "80");
        a.http_routes.push(HttpRoute {
            id: "1".into(),
            path: "/".into(),
            ..HttpRoute::default()
        });
        let mut b = a.clone();
        b.id = "other".into();
        b.http_routes[0].id = "2".into();
        assert!(!a.diff(&b));

        b.tcp_route = Some(TcpRoute::default());
        assert!(a.diff(&b));
    }

    #[test]
    fn tls_keys() {
        let tls = ReverseProxyHostTls {
            enabled: true,
            certificate: "c".into(),
            private_key: "k".into(),
        };
        let json = serde_json::to_value(&tls).unwrap();
        assert_eq!(json["cert"], "c");
        assert_eq!(json["key"], "k");
    }

    #[test]
    fn proxy_diff() {
        let a = ReverseProxy {
            id: "1".into(),
            enabled: true,
            ..ReverseProxy::default()
        };
        let mut b = a.clone();
        b.id = "2".into();
        assert!(!a.diff(&b));
        b.port = "443".into();
        assert!(a.diff(&b));
    }
}
