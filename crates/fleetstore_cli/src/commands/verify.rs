//! Verify command implementation.

use super::{CliResult, Target};
use fleetstore_core::models::{Document, LATEST_TAG};
use fleetstore_core::util::normalize_upper;
use std::collections::{BTreeMap, BTreeSet};

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// List of problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(target: &Target) -> CliResult<()> {
    println!("Verifying document at {}", target.path().display());
    println!();

    let (document, _) = target.read_document()?;
    let result = verify(&document);

    println!("Records checked: {}", result.records_checked);
    for error in &result.errors {
        println!("  - {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Document verification passed");
        Ok(())
    } else {
        println!("✗ Document verification failed ({} problems)", result.errors.len());
        Err("Verification failed".into())
    }
}

/// Checks the cross-record invariants the repositories maintain.
pub fn verify(doc: &Document) -> VerifyResult {
    let mut result = VerifyResult::default();

    let collections: [(&str, Vec<&str>); 9] = [
        ("users", doc.users.iter().map(|r| r.id.as_str()).collect()),
        ("claims", doc.claims.iter().map(|r| r.id.as_str()).collect()),
        ("roles", doc.roles.iter().map(|r| r.id.as_str()).collect()),
        ("api_keys", doc.api_keys.iter().map(|r| r.id.as_str()).collect()),
        (
            "virtual_machine_templates",
            doc.packer_templates.iter().map(|r| r.id.as_str()).collect(),
        ),
        (
            "catalog_manifests",
            doc.catalog_manifests.iter().map(|r| r.id.as_str()).collect(),
        ),
        (
            "catalog_managers",
            doc.catalog_managers.iter().map(|r| r.id.as_str()).collect(),
        ),
        (
            "orchestrator_hosts",
            doc.orchestrator_hosts.iter().map(|r| r.id.as_str()).collect(),
        ),
        (
            "reverse_proxy_hosts",
            doc.reverse_proxy_hosts.iter().map(|r| r.id.as_str()).collect(),
        ),
    ];
    for (name, ids) in &collections {
        result.records_checked += ids.len();
        check_ids(name, ids, &mut result.errors);
    }

    // Ids survive renames; names stay unique as a secondary key.
    check_names(
        "claim",
        doc.claims.iter().map(|c| (c.id.as_str(), c.name.as_str())),
        &mut result.errors,
    );
    check_names(
        "role",
        doc.roles.iter().map(|r| (r.id.as_str(), r.name.as_str())),
        &mut result.errors,
    );

    let claims: BTreeSet<&str> = doc.claims.iter().map(|c| c.id.as_str()).collect();
    let roles: BTreeSet<&str> = doc.roles.iter().map(|r| r.id.as_str()).collect();
    for user in &doc.users {
        for role in &user.roles {
            if !roles.contains(role.id.as_str()) {
                result
                    .errors
                    .push(format!("user {} references missing role {}", user.username, role.id));
            }
        }
        for claim in &user.claims {
            if !claims.contains(claim.id.as_str()) {
                result
                    .errors
                    .push(format!("user {} references missing claim {}", user.username, claim.id));
            }
        }
    }

    let mut latest: BTreeMap<String, usize> = BTreeMap::new();
    for manifest in doc.catalog_manifests.iter().filter(|m| m.has_tag(LATEST_TAG)) {
        *latest.entry(manifest.catalog_id.to_lowercase()).or_default() += 1;
    }
    for (catalog_id, count) in latest {
        if count > 1 {
            result.errors.push(format!(
                "catalog {catalog_id} has {count} manifests tagged {LATEST_TAG}"
            ));
        }
    }

    for host in &doc.reverse_proxy_hosts {
        if !host.http_routes.is_empty() && host.tcp_route.is_some() {
            result
                .errors
                .push(format!("reverse proxy host {} has both http and tcp routes", host.id));
        }
    }

    result
}

fn check_ids(collection: &str, ids: &[&str], errors: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    for id in ids {
        if id.is_empty() {
            errors.push(format!("{collection}: record without id"));
        } else if !seen.insert(id.to_lowercase()) {
            errors.push(format!("{collection}: duplicate id {id}"));
        }
    }
}

/// Reports a name that normalizes to the name or id of another record.
fn check_names<'a>(
    kind: &str,
    records: impl Iterator<Item = (&'a str, &'a str)> + Clone,
    errors: &mut Vec<String>,
) {
    let mut reported = BTreeSet::new();
    for (id, name) in records.clone() {
        let key = normalize_upper(name);
        let clash = records.clone().any(|(other, other_name)| {
            !other.eq_ignore_ascii_case(id)
                && (other.eq_ignore_ascii_case(&key) || normalize_upper(other_name) == key)
        });
        if clash && reported.insert(key.clone()) {
            errors.push(format!("{kind} name {key} is used by more than one record"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstore_core::models::{
        CatalogManifest, Claim, HttpRoute, RecordRef, ReverseProxyHost, Role, TcpRoute, User,
    };

    fn claim(name: &str) -> Claim {
        let mut claim = Claim::new(name);
        claim.id = name.to_string();
        claim
    }

    #[test]
    fn clean_document_passes() {
        let mut doc = Document::new();
        doc.claims.push(claim("READ_ONLY"));
        let mut user = User::new("alice", "Alice", "alice@example.com");
        user.id = "u1".into();
        user.claims.push(RecordRef::new("READ_ONLY", "READ_ONLY"));
        doc.users.push(user);

        let result = verify(&doc);
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.records_checked, 2);
    }

    #[test]
    fn problems_are_reported() {
        let mut doc = Document::new();
        doc.claims.push(claim("READ_ONLY"));
        doc.claims.push(claim("READ_ONLY"));
        let mut user = User::new("alice", "Alice", "alice@example.com");
        user.id = "u1".into();
        user.roles.push(RecordRef::new("GHOST", "GHOST"));
        doc.users.push(user);

        for version in ["1.0.0", "1.1.0"] {
            let mut manifest = CatalogManifest::new("ubuntu", version, "arm64");
            manifest.id = format!("m-{version}");
            manifest.tags = vec![LATEST_TAG.into()];
            doc.catalog_manifests.push(manifest);
        }

        let mut host = ReverseProxyHost::new("api.local", "443");
        host.id = "h1".into();
        host.http_routes.push(HttpRoute::default());
        host.tcp_route = Some(TcpRoute::default());
        doc.reverse_proxy_hosts.push(host);

        let result = verify(&doc);
        assert!(!result.is_ok());
        let all = result.errors.join("\n");
        assert!(all.contains("duplicate id READ_ONLY"));
        assert!(all.contains("missing role GHOST"));
        assert!(all.contains("has 2 manifests tagged"));
        assert!(all.contains("both http and tcp"));
    }

    #[test]
    fn renamed_records_keep_their_id() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::new(dir.path().join("data.json"), None, None);
        let ctx = crate::commands::cli_context();
        let db = target.open(&ctx).unwrap();

        let reader = db.create_claim(&ctx, Claim::new("reader")).unwrap();
        let operators = db.create_role(&ctx, Role::new("operators")).unwrap();
        let mut user = User::new("alice", "Alice", "alice@example.com");
        user.claims.push(RecordRef::new(reader.id.clone(), reader.name.clone()));
        user.roles.push(RecordRef::new(operators.id.clone(), operators.name.clone()));
        db.create_user(&ctx, user).unwrap();

        let mut renamed = reader.clone();
        renamed.name = "book_reader".into();
        db.update_claim(&ctx, &renamed).unwrap();
        let mut renamed = operators.clone();
        renamed.name = "ops_team".into();
        db.update_role(&ctx, &renamed).unwrap();
        db.close(&ctx).unwrap();

        let (doc, _) = target.read_document().unwrap();
        assert_eq!(doc.claims[0].id, "READER");
        assert_eq!(doc.users[0].claims[0].name, "BOOK_READER");
        assert_eq!(doc.users[0].roles[0].name, "OPS_TEAM");
        let result = verify(&doc);
        assert!(result.is_ok(), "{:?}", result.errors);
    }

    #[test]
    fn shared_names_are_reported() {
        let mut doc = Document::new();
        let mut alpha = claim("ALPHA");
        alpha.name = "BETA".into();
        doc.claims.push(alpha);
        doc.claims.push(claim("BETA"));

        let result = verify(&doc);
        assert_eq!(result.errors, vec!["claim name BETA is used by more than one record"]);
    }

    #[test]
    fn latest_is_exclusive_across_architectures() {
        let mut doc = Document::new();
        for (version, architecture) in [("1.0.0", "amd64"), ("1.1.0", "arm64")] {
            let mut manifest = CatalogManifest::new("ubuntu", version, architecture);
            manifest.id = format!("m-{version}");
            manifest.tags = vec![LATEST_TAG.into()];
            doc.catalog_manifests.push(manifest);
        }

        let result = verify(&doc);
        assert_eq!(result.errors, vec!["catalog ubuntu has 2 manifests tagged latest"]);
    }
}
