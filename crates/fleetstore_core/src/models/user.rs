use super::{null_as_default, DbRecord};
use crate::context::{ROOT_EMAIL, ROOT_USERNAME};
use serde::{Deserialize, Serialize};

/// Denormalized `{id, name}` copy of a role or claim held by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    /// Referenced id.
    pub id: String,
    /// Referenced name at the time of the last propagation.
    #[serde(default)]
    pub name: String,
}

impl RecordRef {
    /// Creates a reference.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// User account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Id.
    pub id: String,
    /// Username, unique.
    #[serde(default)]
    pub username: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Email, unique.
    #[serde(default)]
    pub email: String,
    /// SHA-256 hex of the password.
    #[serde(default)]
    pub password: String,
    /// Roles held.
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<RecordRef>,
    /// Claims held.
    #[serde(default, deserialize_with = "null_as_default")]
    pub claims: Vec<RecordRef>,
    /// Whether sign-in is blocked.
    #[serde(default)]
    pub blocked: bool,
    /// Why sign-in is blocked.
    #[serde(default)]
    pub blocked_reason: String,
    /// Consecutive failed sign-ins.
    #[serde(default)]
    pub failed_login_attempts: i64,
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

impl User {
    /// Creates a user with the required fields.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            name: name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    /// Returns true for the built-in root account.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.username.eq_ignore_ascii_case(ROOT_USERNAME) || self.email.eq_ignore_ascii_case(ROOT_EMAIL)
    }

    /// Returns true if the user matches an id, email or username.
    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key)
            || self.email.eq_ignore_ascii_case(key)
            || self.username.eq_ignore_ascii_case(key)
    }

    /// Returns true if the user holds the role `id`.
    #[must_use]
    pub fn has_role(&self, id: &str) -> bool {
        self.roles.iter().any(|r| r.id.eq_ignore_ascii_case(id))
    }

    /// Returns true if the user holds the claim `id`.
    #[must_use]
    pub fn has_claim(&self, id: &str) -> bool {
        self.claims.iter().any(|c| c.id.eq_ignore_ascii_case(id))
    }
}

crate::queryable!(User {
    "id" => id,
    "username" => username,
    "name" => name,
    "email" => email,
    "blocked" => blocked,
    "blocked_reason" => blocked_reason,
    "failed_login_attempts" => failed_login_attempts,
    "created_at" => created_at,
    "updated_at" => updated_at,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_descriptor_is_flattened() {
        let mut user = User::new("alice", "Alice", "alice@example.com");
        user.lock.lock("root", "2024-01-01T00:00:00Z");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["is_locked"], true);
        assert_eq!(json["locked_by"], "root");
        assert!(json.get("lock").is_none());

        let back: User = serde_json::from_value(json).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn root_detection() {
        assert!(User::new("root", "Root", "x@y").is_root());
        assert!(User::new("admin", "Admin", "ROOT@localhost").is_root());
        assert!(!User::new("alice", "Alice", "alice@example.com").is_root());
    }

    #[test]
    fn key_matching() {
        let mut user = User::new("alice", "Alice", "alice@example.com");
        user.id = "u-1".to_string();
        assert!(user.matches_key("U-1"));
        assert!(user.matches_key("ALICE"));
        assert!(user.matches_key("alice@EXAMPLE.com"));
        assert!(!user.matches_key("Alice Smith"));
    }

    #[test]
    fn loads_without_optional_fields() {
        let user: User = serde_json::from_str(r#"{"id":"u","roles":null}"#).unwrap();
        assert!(user.roles.is_empty());
        assert!(!user.lock.is_locked);
    }
}
