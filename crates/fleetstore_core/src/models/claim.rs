use serde::{Deserialize, Serialize};

/// Authorization claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Normalized uppercase name.
    pub id: String,
    /// Name, unique.
    #[serde(default)]
    pub name: String,
    /// System-seeded records are internal.
    #[serde(default)]
    pub internal: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: String,
    /// Last update time.
    #[serde(default)]
    pub updated_at: String,
}

impl Claim {
    /// Creates a claim with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Marks the claim internal.
    #[must_use]
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// A user holding a role, derived on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUser {
    /// User id.
    pub id: String,
    /// Username.
    pub username: String,
}

/// Authorization role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Normalized uppercase name.
    pub id: String,
    /// Name, unique.
    #[serde(default)]
    pub name: String,
    /// System-seeded records are internal.
    #[serde(default)]
    pub internal: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: String,
    /// Last update time.
    #[serde(default)]
    pub updated_at: String,
    /// Users holding the role. Not persisted.
    #[serde(skip)]
    pub users: Vec<RoleUser>,
}

impl Role {
    /// Creates a role with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Marks the role internal.
    #[must_use]
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

crate::queryable!(Claim {
    "id" => id,
    "name" => name,
    "internal" => internal,
    "created_at" => created_at,
    "updated_at" => updated_at,
});

crate::queryable!(Role {
    "id" => id,
    "name" => name,
    "internal" => internal,
    "created_at" => created_at,
    "updated_at" => updated_at,
});
