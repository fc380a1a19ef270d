//! Request context handed to every repository call.
//!
//! An [`ApiContext`] carries who is acting (the [`Principal`], or root, or an
//! API key) and acts as the logging sink for the call. The core never builds a
//! principal on its own; callers authenticate and pass one in.

use std::fmt;
use uuid::Uuid;

/// Username of the built-in root account.
pub const ROOT_USERNAME: &str = "root";
/// Email of the built-in root account.
pub const ROOT_EMAIL: &str = "root@localhost";
/// Role that bypasses every role and claim requirement.
pub const SUPER_USER_ROLE: &str = "SUPER_USER";
/// Roles attached to a new user that did not ask for any.
pub const DEFAULT_ROLES: &[&str] = &["USER"];
/// Claims attached to a new user that did not ask for any.
pub const DEFAULT_CLAIMS: &[&str] = &["READ_ONLY"];

/// The authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// User id.
    pub id: String,
    /// Username.
    pub username: String,
    /// Email.
    pub email: String,
    /// Role ids held by the caller.
    pub roles: Vec<String>,
    /// Claim ids held by the caller.
    pub claims: Vec<String>,
}

impl Principal {
    /// Creates a principal with the given id and username.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            ..Self::default()
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Adds a claim.
    #[must_use]
    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.claims.push(claim.into());
        self
    }

    /// Returns true if the principal holds `role` (case-insensitive).
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Returns true if the principal holds `claim` (case-insensitive).
    #[must_use]
    pub fn has_claim(&self, claim: &str) -> bool {
        self.claims.iter().any(|c| c.eq_ignore_ascii_case(claim))
    }
}

/// How the caller was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizedBy {
    /// Not authorized.
    #[default]
    Anonymous,
    /// A user token.
    User,
    /// An API key.
    ApiKey,
    /// The in-process root context.
    Root,
}

/// Per-call context: principal, request id and logging switch.
#[derive(Debug, Clone)]
pub struct ApiContext {
    request_id: String,
    principal: Option<Principal>,
    authorized_by: AuthorizedBy,
    log_enabled: bool,
}

impl Default for ApiContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiContext {
    /// Creates an anonymous context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            principal: None,
            authorized_by: AuthorizedBy::Anonymous,
            log_enabled: true,
        }
    }

    /// Creates the in-process root context.
    #[must_use]
    pub fn root() -> Self {
        Self {
            principal: Some(
                Principal::new(ROOT_USERNAME, ROOT_USERNAME)
                    .with_email(ROOT_EMAIL)
                    .with_role(SUPER_USER_ROLE),
            ),
            authorized_by: AuthorizedBy::Root,
            ..Self::new()
        }
    }

    /// Creates a context for an authenticated user.
    #[must_use]
    pub fn for_user(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            authorized_by: AuthorizedBy::User,
            ..Self::new()
        }
    }

    /// Creates a context for a caller authenticated with an API key.
    #[must_use]
    pub fn for_api_key(key_name: impl Into<String>) -> Self {
        let name = key_name.into();
        Self {
            principal: Some(Principal::new(name.clone(), name)),
            authorized_by: AuthorizedBy::ApiKey,
            ..Self::new()
        }
    }

    /// Sets the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Silences the logging sink.
    pub fn disable_log(&mut self) {
        self.log_enabled = false;
    }

    /// Re-enables the logging sink.
    pub fn enable_log(&mut self) {
        self.log_enabled = true;
    }

    /// Returns a silenced copy.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.disable_log();
        self
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the principal, if any.
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Returns how the caller was authorized.
    #[must_use]
    pub fn authorized_by(&self) -> AuthorizedBy {
        self.authorized_by
    }

    /// Returns true for the root context.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.authorized_by == AuthorizedBy::Root
    }

    /// Returns true for root or a principal holding the super-user role.
    #[must_use]
    pub fn is_super_user(&self) -> bool {
        self.is_root() || self.is_user_in_role(SUPER_USER_ROLE)
    }

    /// Returns true if the principal holds `role`.
    #[must_use]
    pub fn is_user_in_role(&self, role: &str) -> bool {
        self.principal.as_ref().is_some_and(|p| p.has_role(role))
    }

    /// Returns true if the principal holds `claim`.
    #[must_use]
    pub fn user_has_claim(&self, claim: &str) -> bool {
        self.principal.as_ref().is_some_and(|p| p.has_claim(claim))
    }

    /// Returns the name stamped on audit fields and record locks.
    #[must_use]
    pub fn acting_user(&self) -> String {
        match &self.principal {
            Some(p) if !p.email.is_empty() => p.email.clone(),
            Some(p) if !p.username.is_empty() => p.username.clone(),
            Some(p) => p.id.clone(),
            None => "anonymous".to_string(),
        }
    }

    /// Logs at debug level.
    pub fn log_debug(&self, message: impl fmt::Display) {
        if self.log_enabled {
            tracing::debug!(request_id = %self.request_id, "{message}");
        }
    }

    /// Logs at info level.
    pub fn log_info(&self, message: impl fmt::Display) {
        if self.log_enabled {
            tracing::info!(request_id = %self.request_id, "{message}");
        }
    }

    /// Logs at warn level.
    pub fn log_warn(&self, message: impl fmt::Display) {
        if self.log_enabled {
            tracing::warn!(request_id = %self.request_id, "{message}");
        }
    }

    /// Logs at error level.
    pub fn log_error(&self, message: impl fmt::Display) {
        if self.log_enabled {
            tracing::error!(request_id = %self.request_id, "{message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_context() {
        let ctx = ApiContext::root();
        assert!(ctx.is_root());
        assert!(ctx.is_super_user());
        assert_eq!(ctx.acting_user(), ROOT_EMAIL);
    }

    #[test]
    fn anonymous_context() {
        let ctx = ApiContext::new();
        assert!(!ctx.is_root());
        assert!(!ctx.is_super_user());
        assert!(ctx.principal().is_none());
        assert!(!ctx.is_user_in_role("USER"));
        assert_eq!(ctx.acting_user(), "anonymous");
    }

    #[test]
    fn user_roles_are_case_insensitive() {
        let ctx = ApiContext::for_user(
            Principal::new("u1", "alice")
                .with_role("operator")
                .with_claim("LIST_VM"),
        );
        assert!(ctx.is_user_in_role("OPERATOR"));
        assert!(ctx.user_has_claim("list_vm"));
        assert!(!ctx.is_super_user());
        assert_eq!(ctx.acting_user(), "alice");
    }

    #[test]
    fn super_user_role() {
        let ctx = ApiContext::for_user(Principal::new("u2", "bob").with_role(SUPER_USER_ROLE));
        assert!(ctx.is_super_user());
        assert!(!ctx.is_root());
    }

    #[test]
    fn api_key_context() {
        let ctx = ApiContext::for_api_key("ci-key");
        assert_eq!(ctx.authorized_by(), AuthorizedBy::ApiKey);
        assert_eq!(ctx.acting_user(), "ci-key");
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(ApiContext::new().request_id(), ApiContext::new().request_id());
        let ctx = ApiContext::new().with_request_id("req-1").silent();
        assert_eq!(ctx.request_id(), "req-1");
        ctx.log_info("not emitted");
    }
}
