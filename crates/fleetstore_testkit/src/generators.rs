//! Property-based test generators using proptest.
//!
//! Strategies produce records that pass the repositories' validation, so
//! properties can focus on behavior rather than rejected input.

use fleetstore_core::models::{HealthState, HostResourceItem, HostResources, OrchestratorHost, User};
use proptest::prelude::*;

/// Architectures hosts report.
pub const CPU_TYPES: &[&str] = &["arm64", "x86_64"];

/// Strategy for record names: lowercase words with spaces and dashes, which
/// role and claim creation normalize.
pub fn record_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}([ -][a-z0-9]{1,6}){0,2}").expect("Invalid regex")
}

/// Strategy for usernames.
pub fn username_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{2,11}").expect("Invalid regex")
}

/// Strategy for a CPU architecture.
pub fn cpu_type_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(CPU_TYPES).prop_map(str::to_string)
}

/// Strategy for one set of resource counters.
pub fn resource_item_strategy() -> impl Strategy<Value = HostResourceItem> {
    (0i64..128, 0u32..64, 0u32..1_000_000, 0i64..3).prop_map(|(cpus, memory_gb, disk, vms)| {
        HostResourceItem {
            cpu_type: String::new(),
            physical_cpu_count: cpus,
            logical_cpu_count: cpus * 2,
            memory_size: f64::from(memory_gb) * 1024.0,
            disk_size: f64::from(disk),
            free_disk_size: f64::from(disk / 2),
            total_apple_vms: vms,
        }
    })
}

/// Strategy for a host health state.
pub fn health_state_strategy() -> impl Strategy<Value = HealthState> {
    prop_oneof![
        3 => Just(HealthState::Healthy),
        1 => Just(HealthState::Unhealthy),
        1 => Just(HealthState::Unknown),
    ]
}

/// Strategy for a host with random state and, usually, resources.
///
/// Host names are unique per index, so a generated vector can be stored
/// without collisions.
pub fn orchestrator_host_strategy(index: usize) -> impl Strategy<Value = OrchestratorHost> {
    (
        any::<bool>(),
        health_state_strategy(),
        cpu_type_strategy(),
        prop::option::weighted(0.9, (resource_item_strategy(), resource_item_strategy())),
    )
        .prop_map(move |(enabled, state, cpu_type, resources)| {
            let mut host = OrchestratorHost::new(format!("host-{index}.fleet.local"));
            host.enabled = enabled;
            host.state = state;
            host.resources = resources.map(|(total, available)| HostResources {
                cpu_type: cpu_type.clone(),
                total,
                total_available: available,
                ..HostResources::default()
            });
            host
        })
}

/// Strategy for a fleet of up to `max` hosts.
pub fn fleet_strategy(max: usize) -> impl Strategy<Value = Vec<OrchestratorHost>> {
    (0..=max).prop_flat_map(|len| {
        (0..len)
            .map(orchestrator_host_strategy)
            .collect::<Vec<_>>()
    })
}

/// Strategy for a valid new user.
pub fn user_strategy() -> impl Strategy<Value = User> {
    (username_strategy(), "[A-Z][a-z]{2,8} [A-Z][a-z]{2,8}", "[a-zA-Z0-9]{8,16}").prop_map(
        |(username, name, password)| {
            let mut user = User::new(username.clone(), name, format!("{username}@example.com"));
            user.password = password;
            user
        },
    )
}

/// One mutation applied to a store by model-based tests.
#[derive(Debug, Clone)]
pub enum ClaimOperation {
    /// Create a claim.
    Create {
        /// Claim name before normalization.
        name: String,
    },
    /// Delete a claim.
    Delete {
        /// Claim name before normalization.
        name: String,
    },
}

/// Strategy for a sequence of claim operations over a small name pool so
/// creates and deletes collide.
pub fn claim_operations_strategy(max_ops: usize) -> impl Strategy<Value = Vec<ClaimOperation>> {
    let name = prop::sample::select(vec!["list vm", "create-vm", "delete vm", "read only"]);
    let op = (any::<bool>(), name).prop_map(|(create, name)| {
        if create {
            ClaimOperation::Create { name: name.into() }
        } else {
            ClaimOperation::Delete { name: name.into() }
        }
    });
    prop::collection::vec(op, 0..max_ops)
}
