//! Error types for fleetstore core.

use fleetstore_storage::StorageError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The entity family an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// The whole document.
    Document,
    /// Service configuration.
    Configuration,
    /// API key.
    ApiKey,
    /// Authorization claim.
    Claim,
    /// Authorization role.
    Role,
    /// User account.
    User,
    /// Packer template.
    PackerTemplate,
    /// Catalog manifest.
    CatalogManifest,
    /// Catalog manager.
    CatalogManager,
    /// Orchestrator host.
    OrchestratorHost,
    /// Virtual machine reported by a host.
    VirtualMachine,
    /// Global reverse-proxy configuration.
    ReverseProxy,
    /// Reverse-proxy host.
    ReverseProxyHost,
    /// HTTP route of a reverse-proxy host.
    HttpRoute,
    /// TCP route of a reverse-proxy host.
    TcpRoute,
    /// Virtual-machine snapshot list.
    Snapshot,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Document => "document",
            Self::Configuration => "configuration",
            Self::ApiKey => "api key",
            Self::Claim => "claim",
            Self::Role => "role",
            Self::User => "user",
            Self::PackerTemplate => "packer template",
            Self::CatalogManifest => "catalog manifest",
            Self::CatalogManager => "catalog manager",
            Self::OrchestratorHost => "orchestrator host",
            Self::VirtualMachine => "virtual machine",
            Self::ReverseProxy => "reverse proxy",
            Self::ReverseProxyHost => "reverse proxy host",
            Self::HttpRoute => "http route",
            Self::TcpRoute => "tcp route",
            Self::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

/// Mutation refused on an internal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedAction {
    /// Update of the record.
    Update,
    /// Removal of the record.
    Delete,
}

impl fmt::Display for ProtectedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Coarse classification of a [`CoreError`].
///
/// The core knows nothing about transports; callers map each class to their
/// own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The engine is not connected.
    NotConnected,
    /// The requested record does not exist.
    NotFound,
    /// A uniqueness rule was violated.
    AlreadyExists,
    /// The request itself is invalid.
    Validation,
    /// The principal is not allowed to touch the record.
    Forbidden,
    /// A referenced role or claim does not exist.
    DependencyMissing,
    /// Disk, serialization or encryption failure.
    Persistence,
}

/// Errors that can occur in fleetstore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The engine is not connected.
    #[error("the database is not connected")]
    NotConnected,

    /// Record not found.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// Entity family searched.
        kind: EntityKind,
        /// Identifier that was looked up.
        key: String,
    },

    /// A record with the same identifier or secondary key already exists.
    #[error("{kind} already exists: {key}")]
    AlreadyExists {
        /// Entity family.
        kind: EntityKind,
        /// Colliding key.
        key: String,
    },

    /// A required field was empty.
    #[error("{kind} {field} cannot be empty")]
    EmptyRequiredField {
        /// Entity family.
        kind: EntityKind,
        /// Name of the empty field.
        field: &'static str,
    },

    /// Update or removal of an internal record without root privileges.
    #[error("cannot {action} internal {kind} {key}")]
    ProtectedInternalRecord {
        /// Entity family.
        kind: EntityKind,
        /// Identifier of the protected record.
        key: String,
        /// The refused action.
        action: ProtectedAction,
    },

    /// A referenced role or claim does not exist.
    #[error("{kind} {key} does not exist")]
    DependencyMissing {
        /// Entity family of the missing dependency.
        kind: EntityKind,
        /// Identifier of the missing dependency.
        key: String,
    },

    /// The filter expression could not be parsed.
    #[error("invalid filter: {message}")]
    InvalidFilter {
        /// Description of the parse failure.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("{message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivationFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// The save queue consumer has stopped.
    #[error("save queue is closed")]
    SaveQueueClosed,

}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(kind: EntityKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(kind: EntityKind, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            key: key.into(),
        }
    }

    /// Creates an empty required field error.
    pub fn empty_field(kind: EntityKind, field: &'static str) -> Self {
        Self::EmptyRequiredField { kind, field }
    }

    /// Creates a protected internal record error.
    pub fn protected(kind: EntityKind, key: impl Into<String>, action: ProtectedAction) -> Self {
        Self::ProtectedInternalRecord {
            kind,
            key: key.into(),
            action,
        }
    }

    /// Creates a dependency missing error.
    pub fn dependency_missing(kind: EntityKind, key: impl Into<String>) -> Self {
        Self::DependencyMissing {
            kind,
            key: key.into(),
        }
    }

    /// Creates an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a key derivation failed error.
    pub fn key_derivation_failed(message: impl Into<String>) -> Self {
        Self::KeyDerivationFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Rebuilds an equal error of the same variant.
    ///
    /// I/O and serialization sources cannot be cloned; they are recreated
    /// from their kind and message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Storage(err) => Self::Storage(match err {
                StorageError::Io(io) => StorageError::Io(duplicate_io(io)),
                StorageError::NotFound { path } => StorageError::NotFound { path: path.clone() },
                StorageError::Locked { path } => StorageError::Locked { path: path.clone() },
            }),
            Self::Io(err) => Self::Io(duplicate_io(err)),
            Self::Serialization(err) => {
                Self::Serialization(<serde_json::Error as serde::de::Error>::custom(err))
            }
            Self::NotConnected => Self::NotConnected,
            Self::NotFound { kind, key } => Self::not_found(*kind, key.clone()),
            Self::AlreadyExists { kind, key } => Self::already_exists(*kind, key.clone()),
            Self::EmptyRequiredField { kind, field } => Self::empty_field(*kind, *field),
            Self::ProtectedInternalRecord { kind, key, action } => {
                Self::protected(*kind, key.clone(), *action)
            }
            Self::DependencyMissing { kind, key } => Self::dependency_missing(*kind, key.clone()),
            Self::InvalidFilter { message } => Self::invalid_filter(message.clone()),
            Self::InvalidOperation { message } => Self::invalid_operation(message.clone()),
            Self::EncryptionFailed { message } => Self::encryption_failed(message.clone()),
            Self::DecryptionFailed { message } => Self::decryption_failed(message.clone()),
            Self::KeyDerivationFailed { message } => Self::key_derivation_failed(message.clone()),
            Self::InvalidKeySize { expected, actual } => Self::invalid_key_size(*actual, *expected),
            Self::SaveQueueClosed => Self::SaveQueueClosed,
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotConnected => ErrorClass::NotConnected,
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::AlreadyExists { .. } => ErrorClass::AlreadyExists,
            Self::EmptyRequiredField { .. }
            | Self::InvalidFilter { .. }
            | Self::InvalidOperation { .. } => ErrorClass::Validation,
            Self::ProtectedInternalRecord { .. } => ErrorClass::Forbidden,
            Self::DependencyMissing { .. } => ErrorClass::DependencyMissing,
            Self::Storage(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::EncryptionFailed { .. }
            | Self::DecryptionFailed { .. }
            | Self::KeyDerivationFailed { .. }
            | Self::InvalidKeySize { .. }
            | Self::SaveQueueClosed => ErrorClass::Persistence,
        }
    }

    /// Returns the entity family the error refers to, if any.
    #[must_use]
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Self::NotFound { kind, .. }
            | Self::AlreadyExists { kind, .. }
            | Self::EmptyRequiredField { kind, .. }
            | Self::ProtectedInternalRecord { kind, .. }
            | Self::DependencyMissing { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true for a not found error of the given family.
    #[must_use]
    pub fn is_not_found(&self, expected: EntityKind) -> bool {
        matches!(self, Self::NotFound { kind, .. } if *kind == expected)
    }
}

fn duplicate_io(err: &io::Error) -> io::Error {
    io::Error::new(err.kind(), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_entity() {
        let err = CoreError::not_found(EntityKind::OrchestratorHost, "host-1");
        assert_eq!(err.to_string(), "orchestrator host not found: host-1");

        let err = CoreError::protected(EntityKind::Role, "SUPER_USER", ProtectedAction::Delete);
        assert_eq!(err.to_string(), "cannot delete internal role SUPER_USER");

        let err = CoreError::empty_field(EntityKind::User, "email");
        assert_eq!(err.to_string(), "user email cannot be empty");
    }

    #[test]
    fn classification() {
        assert_eq!(CoreError::NotConnected.class(), ErrorClass::NotConnected);
        assert_eq!(
            CoreError::already_exists(EntityKind::Claim, "X").class(),
            ErrorClass::AlreadyExists
        );
        assert_eq!(
            CoreError::dependency_missing(EntityKind::Role, "X").class(),
            ErrorClass::DependencyMissing
        );
        assert_eq!(
            CoreError::decryption_failed("bad tag").class(),
            ErrorClass::Persistence
        );
        assert_eq!(
            CoreError::invalid_filter("no value").class(),
            ErrorClass::Validation
        );
    }

    #[test]
    fn kind_lookup() {
        let err = CoreError::not_found(EntityKind::User, "u1");
        assert_eq!(err.entity_kind(), Some(EntityKind::User));
        assert!(err.is_not_found(EntityKind::User));
        assert!(!err.is_not_found(EntityKind::Role));
        assert_eq!(CoreError::SaveQueueClosed.entity_kind(), None);
    }

    #[test]
    fn duplicate_keeps_variant_and_message() {
        let err = CoreError::encryption_failed("seal");
        let copy = err.duplicate();
        assert!(matches!(copy, CoreError::EncryptionFailed { ref message } if message == "seal"));

        let err = CoreError::from(StorageError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "read-only",
        )));
        let copy = err.duplicate();
        assert!(matches!(
            &copy,
            CoreError::Storage(StorageError::Io(io)) if io.kind() == io::ErrorKind::PermissionDenied
        ));
        assert_eq!(copy.to_string(), err.to_string());

        let err = CoreError::from(serde_json::from_str::<u8>("x").unwrap_err());
        let copy = err.duplicate();
        assert!(matches!(copy, CoreError::Serialization(_)));
        assert_eq!(copy.to_string(), err.to_string());
    }
}
