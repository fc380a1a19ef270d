//! Benchmark utilities.

use fleetstore_core::models::{HostResourceItem, HostResources, OrchestratorHost, User};
use fleetstore_core::{ApiContext, JsonDatabase, StoreConfig};
use rand::Rng;
use std::sync::Arc;
use tempfile::TempDir;

/// Architectures used for generated hosts.
pub const CPU_TYPES: [&str; 2] = ["arm64", "x86_64"];

/// Silent root context, so logging stays out of the measurements.
pub fn bench_context() -> ApiContext {
    ApiContext::root().silent()
}

/// Opens a store in a fresh temp directory with background tasks off.
///
/// The directory must outlive the store.
pub fn temp_store(encryption_key: Option<&str>) -> (TempDir, Arc<JsonDatabase>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = StoreConfig::new(dir.path().join("data.json")).without_background_tasks();
    if let Some(key) = encryption_key {
        config = config.encryption_key(key);
    }
    let db = JsonDatabase::open(&bench_context(), config).expect("open store");
    (dir, db)
}

/// Generates `count` users with distinct usernames.
pub fn generate_users(count: usize) -> Vec<User> {
    (0..count)
        .map(|n| {
            let mut user = User::new(
                format!("user{n}"),
                format!("User {n}"),
                format!("user{n}@example.com"),
            );
            user.id = format!("id-{n}");
            user
        })
        .collect()
}

/// Generates `count` enabled healthy hosts with random resource counters.
pub fn generate_fleet(count: usize) -> Vec<OrchestratorHost> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|n| {
            let cpu_type = CPU_TYPES[n % CPU_TYPES.len()];
            let cpus: i64 = rng.gen_range(4..=64);
            let item = |physical: i64| HostResourceItem {
                cpu_type: cpu_type.to_string(),
                physical_cpu_count: physical,
                logical_cpu_count: physical * 2,
                memory_size: (physical * 4096) as f64,
                disk_size: 512_000.0,
                free_disk_size: 256_000.0,
                total_apple_vms: apple_vms(physical),
            };
            let mut host = OrchestratorHost::new(format!("host-{n}.bench.local"));
            host.id = format!("host-{n}");
            host.architecture = cpu_type.to_string();
            host.enabled = true;
            host.set_healthy();
            host.resources = Some(HostResources {
                cpu_type: cpu_type.to_string(),
                total: item(cpus),
                total_available: item(cpus / 2),
                total_in_use: item(cpus / 2),
                total_reserved: item(0),
                system_reserved: item(1),
                ..HostResources::default()
            });
            host
        })
        .collect()
}

fn apple_vms(cpus: i64) -> i64 {
    (cpus / 8).min(2)
}
