//! Resources command implementation.

use super::{CliResult, Target};
use fleetstore_core::{aggregate_resources, ResourceMap, ResourceSection, ResourcesOverview};

/// Runs the resources command.
pub fn run(target: &Target, format: &str) -> CliResult<()> {
    let overview = overview(target)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&overview)?);
        }
        _ => {
            print_section("Total", &overview.total);
            print_section("Available", &overview.total_available);
            print_section("In use", &overview.total_in_use);
            print_section("Reserved", &overview.total_reserved);
            print_section("System reserved", &overview.system_reserved);
        }
    }

    Ok(())
}

/// Aggregates the resources of the stored fleet without opening the store.
pub fn overview(target: &Target) -> CliResult<ResourcesOverview> {
    let (document, _) = target.read_document()?;
    let hosts = &document.orchestrator_hosts;
    Ok(ResourcesOverview {
        total: aggregate_resources(hosts, ResourceSection::Total),
        total_available: aggregate_resources(hosts, ResourceSection::Available),
        total_in_use: aggregate_resources(hosts, ResourceSection::InUse),
        total_reserved: aggregate_resources(hosts, ResourceSection::Reserved),
        system_reserved: aggregate_resources(hosts, ResourceSection::SystemReserved),
    })
}

fn print_section(title: &str, map: &ResourceMap) {
    println!("{title}:");
    if map.is_empty() {
        println!("  (no schedulable hosts)");
    }
    for (cpu_type, item) in map {
        println!(
            "  {cpu_type:<8} cpus {}/{} logical, memory {:.0} MB, disk {:.0}/{:.0} MB free, {} apple vms",
            item.physical_cpu_count,
            item.logical_cpu_count,
            item.memory_size,
            item.free_disk_size,
            item.disk_size,
            item.total_apple_vms
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstore_core::models::{Document, HostResourceItem, HostResources, OrchestratorHost};
    use fleetstore_storage::write_durable;

    fn host(name: &str, cpus: i64, healthy: bool) -> OrchestratorHost {
        let mut host = OrchestratorHost::new(name);
        host.id = name.to_string();
        host.enabled = true;
        if healthy {
            host.set_healthy();
        }
        host.resources = Some(HostResources {
            cpu_type: "arm64".into(),
            total: HostResourceItem {
                cpu_type: "arm64".into(),
                physical_cpu_count: cpus,
                ..HostResourceItem::default()
            },
            ..HostResources::default()
        });
        host
    }

    #[test]
    fn only_schedulable_hosts_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut doc = Document::new();
        doc.orchestrator_hosts = vec![host("a", 8, true), host("b", 16, false)];
        write_durable(&path, &doc.to_json_pretty().unwrap()).unwrap();

        let overview = overview(&Target::new(path, None, None)).unwrap();
        assert_eq!(overview.total["arm64"].physical_cpu_count, 8);
        assert!(overview.total_available.contains_key("arm64"));
    }
}
