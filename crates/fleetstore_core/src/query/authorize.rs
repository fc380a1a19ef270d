//! Role and claim gating of records.

use crate::context::{ApiContext, AuthorizedBy};

/// A record that can require roles or claims of its reader.
pub trait Authorized {
    /// Roles of which the reader needs at least one.
    fn required_roles(&self) -> &[String];

    /// Claims of which the reader needs at least one.
    fn required_claims(&self) -> &[String];
}

/// Returns true if the context may see `record`.
///
/// Root, super users and API keys see everything. A record without
/// requirements is visible to anyone. Otherwise the principal must hold one
/// of the required roles (when any are listed) and one of the required claims
/// (when any are listed).
#[must_use]
pub fn is_authorized<T: Authorized + ?Sized>(ctx: &ApiContext, record: &T) -> bool {
    let privileged = matches!(ctx.authorized_by(), AuthorizedBy::Root | AuthorizedBy::ApiKey);
    if privileged || ctx.is_super_user() {
        return true;
    }

    let roles = record.required_roles();
    let claims = record.required_claims();
    if roles.is_empty() && claims.is_empty() {
        return true;
    }

    let Some(principal) = ctx.principal() else {
        return false;
    };

    let role_ok = roles.is_empty() || roles.iter().any(|r| principal.has_role(r));
    let claim_ok = claims.is_empty() || claims.iter().any(|c| principal.has_claim(c));
    role_ok && claim_ok
}

/// Keeps the records the context may see.
#[must_use]
pub fn authorized_records<T: Authorized>(ctx: &ApiContext, records: Vec<T>) -> Vec<T> {
    records
        .into_iter()
        .filter(|record| is_authorized(ctx, record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Principal, SUPER_USER_ROLE};

    struct Gated {
        roles: Vec<String>,
        claims: Vec<String>,
    }

    impl Authorized for Gated {
        fn required_roles(&self) -> &[String] {
            &self.roles
        }
        fn required_claims(&self) -> &[String] {
            &self.claims
        }
    }

    fn gated(roles: &[&str], claims: &[&str]) -> Gated {
        Gated {
            roles: roles.iter().map(|s| s.to_string()).collect(),
            claims: claims.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn open_records_are_visible_to_everyone() {
        let open = gated(&[], &[]);
        assert!(is_authorized(&ApiContext::new(), &open));
        assert!(is_authorized(&ApiContext::for_user(Principal::new("u", "u")), &open));
    }

    #[test]
    fn anonymous_cannot_see_gated_records() {
        assert!(!is_authorized(&ApiContext::new(), &gated(&["ADMIN"], &[])));
    }

    #[test]
    fn privileged_contexts_see_everything() {
        let record = gated(&["ADMIN"], &["WRITE"]);
        assert!(is_authorized(&ApiContext::root(), &record));
        assert!(is_authorized(&ApiContext::for_api_key("k"), &record));
        let su = ApiContext::for_user(Principal::new("u", "u").with_role(SUPER_USER_ROLE));
        assert!(is_authorized(&su, &record));
    }

    #[test]
    fn needs_one_role_and_one_claim() {
        let record = gated(&["ADMIN", "OPS"], &["WRITE"]);
        let role_only = ApiContext::for_user(Principal::new("u", "u").with_role("ops"));
        assert!(!is_authorized(&role_only, &record));

        let both = ApiContext::for_user(
            Principal::new("u", "u").with_role("ops").with_claim("write"),
        );
        assert!(is_authorized(&both, &record));

        let claim_gated = gated(&[], &["READ"]);
        let reader = ApiContext::for_user(Principal::new("u", "u").with_claim("READ"));
        assert!(is_authorized(&reader, &claim_gated));
    }

    #[test]
    fn filters_collections() {
        let records = vec![gated(&[], &[]), gated(&["ADMIN"], &[]), gated(&[], &[])];
        assert_eq!(authorized_records(&ApiContext::new(), records).len(), 2);
    }
}
