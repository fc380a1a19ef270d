//! Fleet resource totals through the store.

use fleetstore_core::{aggregate_resources, HostHealth, ResourceSection};
use fleetstore_testkit::prelude::*;
use proptest::prelude::*;

#[test]
fn totals_follow_host_state() {
    let store = TestStore::new();
    let ctx = root_context();
    let hosts = scenarios::seed_fleet(&store, 2).unwrap();

    let totals = store.get_orchestrator_total_resources(&ctx).unwrap();
    assert_eq!(totals.len(), 2);
    assert_eq!(totals["arm64"].physical_cpu_count, 8 + 16);
    assert_eq!(totals["arm64"].logical_cpu_count, 2 * (8 + 16));
    assert_eq!(totals["x86_64"].total_apple_vms, 4);

    let available = store.get_orchestrator_available_resources(&ctx).unwrap();
    assert_eq!(available["x86_64"].physical_cpu_count, 4 + 8);
    let reserved = store.get_orchestrator_system_reserved_resources(&ctx).unwrap();
    assert_eq!(reserved["arm64"].physical_cpu_count, 2);
    let stopped = store.get_orchestrator_reserved_resources(&ctx).unwrap();
    assert_eq!(stopped["arm64"].physical_cpu_count, 0);

    let big_arm = hosts.iter().find(|h| h.host == "arm64-1.fleet.local").unwrap();
    store.disable_orchestrator_host(&ctx, &big_arm.id).unwrap();
    let small_x86 = hosts.iter().find(|h| h.host == "x86_64-0.fleet.local").unwrap();
    store
        .set_orchestrator_host_health(&ctx, &small_x86.id, HostHealth::Unhealthy("timeout".into()))
        .unwrap();

    let totals = store.get_orchestrator_total_resources(&ctx).unwrap();
    assert_eq!(totals["arm64"].physical_cpu_count, 8);
    assert_eq!(totals["x86_64"].physical_cpu_count, 16);

    store.enable_orchestrator_host(&ctx, &big_arm.id).unwrap();
    store
        .set_orchestrator_host_health(&ctx, &small_x86.id, HostHealth::Healthy)
        .unwrap();
    let overview = store.get_orchestrator_resources_overview(&ctx).unwrap();
    assert_eq!(overview.total["x86_64"].physical_cpu_count, 24);
    assert_eq!(overview.total_in_use["arm64"].physical_cpu_count, 4 + 8);
}

#[test]
fn empty_fleet_has_no_totals() {
    let store = TestStore::new();
    let overview = store.get_orchestrator_resources_overview(&root_context()).unwrap();
    assert!(overview.total.is_empty());
    assert!(overview.total_available.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn store_totals_match_schedulable_hosts(fleet in fleet_strategy(10)) {
        let store = TestStore::new();
        let ctx = root_context();
        store
            .with_document_mut(|doc| {
                doc.orchestrator_hosts = fleet.clone();
                Ok(())
            })
            .unwrap();

        let totals = store.get_orchestrator_total_resources(&ctx).unwrap();
        prop_assert_eq!(&totals, &aggregate_resources(&fleet, ResourceSection::Total));

        for cpu_type in CPU_TYPES {
            let expected: i64 = fleet
                .iter()
                .filter(|h| h.enabled && h.state == fleetstore_core::models::HealthState::Healthy)
                .filter_map(|h| h.resources.as_ref())
                .filter(|r| r.cpu_type == *cpu_type)
                .map(|r| r.total.physical_cpu_count)
                .sum();
            let actual = totals.get(*cpu_type).map_or(0, |i| i.physical_cpu_count);
            prop_assert_eq!(actual, expected);
        }
    }
}
