use super::DbRecord;
use crate::util::parse_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// API key credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Id.
    pub id: String,
    /// Name, unique.
    #[serde(default)]
    pub name: String,
    /// Public key, unique.
    #[serde(default)]
    pub key: String,
    /// SHA-256 hex of the secret.
    #[serde(default)]
    pub secret: String,
    /// Whether the key was revoked.
    #[serde(default)]
    pub revoked: bool,
    /// When the key was revoked.
    #[serde(default)]
    pub revoked_at: String,
    /// RFC 3339 expiry; empty never expires.
    #[serde(default)]
    pub expires_at: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: String,
    /// Last update time.
    #[serde(default)]
    pub updated_at: String,
    /// Record lock.
    #[serde(flatten)]
    pub lock: DbRecord,
}

impl ApiKey {
    /// Creates a key with the required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Returns true if the key matches an id, name or key value.
    #[must_use]
    pub fn matches_key(&self, value: &str) -> bool {
        self.id.eq_ignore_ascii_case(value)
            || self.name.eq_ignore_ascii_case(value)
            || self.key.eq_ignore_ascii_case(value)
    }

    /// Returns true if the key is expired at `now`.
    ///
    /// An empty expiry never expires; an unparsable one counts as expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.expires_at.is_empty() {
            return false;
        }
        parse_rfc3339(&self.expires_at).map_or(true, |expiry| expiry <= now)
    }
}

crate::queryable!(ApiKey {
    "id" => id,
    "name" => name,
    "key" => key,
    "revoked" => revoked,
    "revoked_at" => revoked_at,
    "expires_at" => expires_at,
    "created_at" => created_at,
    "updated_at" => updated_at,
});
