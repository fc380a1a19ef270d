//! Seeders for common store contents.
//!
//! Every seeder writes through the public repositories with a root
//! context, so seeded stores obey the same invariants as production ones.

use crate::fixtures::{root_context, TestStore};
use fleetstore_core::models::{
    CatalogManifest, Claim, HostResourceItem, HostResources, OrchestratorHost, RecordRef, Role,
    User,
};
use fleetstore_core::{CoreResult, HostHealth, JsonDatabase};

/// Claims created by [`seed_identity`].
pub const SEEDED_CLAIMS: &[&str] = &["READ_ONLY", "LIST_VM", "CREATE_VM"];
/// Roles created by [`seed_identity`].
pub const SEEDED_ROLES: &[&str] = &["USER", "SUPER_USER"];

/// Records created by [`seed_identity`].
#[derive(Debug, Clone)]
pub struct IdentitySeed {
    /// Created claims.
    pub claims: Vec<Claim>,
    /// Created roles.
    pub roles: Vec<Role>,
    /// Created users: a default user and an administrator.
    pub users: Vec<User>,
}

/// Creates the default roles and claims plus two users.
///
/// `SUPER_USER` is internal. The first user gets the defaults, the second
/// holds `SUPER_USER` and `CREATE_VM`.
pub fn seed_identity(db: &JsonDatabase) -> CoreResult<IdentitySeed> {
    let ctx = root_context();
    let claims = SEEDED_CLAIMS
        .iter()
        .map(|name| db.create_claim(&ctx, Claim::new(*name)))
        .collect::<CoreResult<Vec<_>>>()?;
    let roles = vec![
        db.create_role(&ctx, Role::new("USER"))?,
        db.create_role(&ctx, Role::new("SUPER_USER").internal())?,
    ];

    let mut member = User::new("alice", "Alice Doe", "alice@example.com");
    member.password = "alice-password".into();
    let mut admin = User::new("admin", "Fleet Admin", "admin@example.com");
    admin.password = "admin-password".into();
    admin.roles = vec![RecordRef::new("SUPER_USER", "SUPER_USER")];
    admin.claims = vec![RecordRef::new("CREATE_VM", "CREATE_VM")];
    let users = vec![db.create_user(&ctx, member)?, db.create_user(&ctx, admin)?];

    Ok(IdentitySeed {
        claims,
        roles,
        users,
    })
}

/// Hardware counters for a host with `cpus` physical cores.
pub fn resource_item(cpu_type: &str, cpus: i64) -> HostResourceItem {
    HostResourceItem {
        cpu_type: cpu_type.to_string(),
        physical_cpu_count: cpus,
        logical_cpu_count: cpus * 2,
        memory_size: (cpus * 4096) as f64,
        disk_size: 512_000.0,
        free_disk_size: 256_000.0,
        total_apple_vms: 2,
    }
}

/// A host description with resources for `cpus` cores, half of them free.
pub fn fleet_host(name: &str, cpu_type: &str, cpus: i64) -> OrchestratorHost {
    let mut host = OrchestratorHost::new(name);
    host.port = "8080".into();
    host.architecture = cpu_type.into();
    host.resources = Some(HostResources {
        cpu_type: cpu_type.into(),
        total: resource_item(cpu_type, cpus),
        total_available: resource_item(cpu_type, cpus / 2),
        total_in_use: resource_item(cpu_type, cpus / 2),
        system_reserved: resource_item(cpu_type, 1),
        ..HostResources::default()
    });
    host
}

/// Registers `per_arch` healthy hosts for each of `arm64` and `x86_64`.
///
/// Host `n` of an architecture has `8 * (n + 1)` cores.
pub fn seed_fleet(db: &JsonDatabase, per_arch: usize) -> CoreResult<Vec<OrchestratorHost>> {
    let ctx = root_context();
    let mut hosts = Vec::with_capacity(per_arch * 2);
    for arch in ["arm64", "x86_64"] {
        for n in 0..per_arch {
            let cpus = 8 * (n as i64 + 1);
            let created =
                db.create_orchestrator_host(&ctx, fleet_host(&format!("{arch}-{n}.fleet.local"), arch, cpus))?;
            hosts.push(db.set_orchestrator_host_health(&ctx, &created.id, HostHealth::Healthy)?);
        }
    }
    Ok(hosts)
}

/// Creates `versions` versions of `catalog_id` for arm64, oldest first.
pub fn seed_catalog(
    db: &JsonDatabase,
    catalog_id: &str,
    versions: usize,
) -> CoreResult<Vec<CatalogManifest>> {
    let ctx = root_context();
    (0..versions)
        .map(|n| {
            let mut manifest = CatalogManifest::new(catalog_id, format!("1.{n}.0"), "arm64");
            manifest.path = format!("/catalog/{catalog_id}/1.{n}.0");
            manifest.size = 1024 * (n as i64 + 1);
            db.create_catalog_manifest(&ctx, manifest)
        })
        .collect()
}

/// A store seeded with identity records and a two-host fleet.
pub fn populated_store() -> TestStore {
    let store = TestStore::new();
    seed_identity(&store).expect("Failed to seed identity");
    seed_fleet(&store, 1).expect("Failed to seed fleet");
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_seed() {
        let store = TestStore::new();
        let seed = seed_identity(&store).unwrap();
        assert_eq!(seed.claims.len(), SEEDED_CLAIMS.len());
        assert_eq!(seed.roles.len(), SEEDED_ROLES.len());
        assert!(seed.users[0].has_role("USER"));
        assert!(seed.users[0].has_claim("READ_ONLY"));
        assert!(seed.users[1].has_role("SUPER_USER"));
    }

    #[test]
    fn fleet_seed() {
        let store = TestStore::new();
        let hosts = seed_fleet(&store, 2).unwrap();
        assert_eq!(hosts.len(), 4);
        assert!(hosts.iter().all(OrchestratorHost::is_schedulable));
    }

    #[test]
    fn catalog_seed() {
        let store = TestStore::new();
        let manifests = seed_catalog(&store, "ubuntu", 3).unwrap();
        assert_eq!(manifests.len(), 3);
        let stored = store
            .get_catalog_manifests_by_catalog_id(&root_context(), "ubuntu")
            .unwrap();
        assert_eq!(stored.len(), 3);
    }
}
