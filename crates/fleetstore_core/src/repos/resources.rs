//! Fleet-wide resource totals per CPU architecture.

use crate::context::ApiContext;
use crate::error::CoreResult;
use crate::models::{HostResourceItem, HostResources, OrchestratorHost};
use crate::JsonDatabase;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counters keyed by CPU architecture.
pub type ResourceMap = BTreeMap<String, HostResourceItem>;

/// Which counter set of a host's resources to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSection {
    /// Hardware totals.
    Total,
    /// Free capacity.
    Available,
    /// Used by running machines.
    InUse,
    /// Reserved by stopped machines.
    Reserved,
    /// Held back for the hosts themselves.
    SystemReserved,
}

impl ResourceSection {
    fn pick(self, resources: &HostResources) -> &HostResourceItem {
        match self {
            Self::Total => &resources.total,
            Self::Available => &resources.total_available,
            Self::InUse => &resources.total_in_use,
            Self::Reserved => &resources.total_reserved,
            Self::SystemReserved => &resources.system_reserved,
        }
    }
}

/// All five aggregates at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourcesOverview {
    /// Hardware totals.
    pub total: ResourceMap,
    /// Free capacity.
    pub total_available: ResourceMap,
    /// Used by running machines.
    pub total_in_use: ResourceMap,
    /// Reserved by stopped machines.
    pub total_reserved: ResourceMap,
    /// Held back for the hosts themselves.
    pub system_reserved: ResourceMap,
}

/// Sums one section over every enabled healthy host that reported
/// resources, grouped by `resources.cpu_type`.
#[must_use]
pub fn aggregate_resources(hosts: &[OrchestratorHost], section: ResourceSection) -> ResourceMap {
    let mut totals = ResourceMap::new();
    for host in hosts.iter().filter(|h| h.is_schedulable()) {
        let Some(resources) = &host.resources else {
            continue;
        };
        let item = totals
            .entry(resources.cpu_type.clone())
            .or_insert_with(|| HostResourceItem {
                cpu_type: resources.cpu_type.clone(),
                ..HostResourceItem::default()
            });
        item.accumulate(section.pick(resources));
    }
    totals
}

impl JsonDatabase {
    fn resources_of(&self, section: ResourceSection) -> CoreResult<ResourceMap> {
        self.with_document(|doc| aggregate_resources(&doc.orchestrator_hosts, section))
    }

    /// Free capacity per architecture.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_orchestrator_available_resources(&self, _ctx: &ApiContext) -> CoreResult<ResourceMap> {
        self.resources_of(ResourceSection::Available)
    }

    /// Hardware totals per architecture.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_orchestrator_total_resources(&self, _ctx: &ApiContext) -> CoreResult<ResourceMap> {
        self.resources_of(ResourceSection::Total)
    }

    /// Capacity used by running machines per architecture.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_orchestrator_in_use_resources(&self, _ctx: &ApiContext) -> CoreResult<ResourceMap> {
        self.resources_of(ResourceSection::InUse)
    }

    /// Capacity reserved by stopped machines per architecture.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_orchestrator_reserved_resources(&self, _ctx: &ApiContext) -> CoreResult<ResourceMap> {
        self.resources_of(ResourceSection::Reserved)
    }

    /// Capacity held back for the hosts themselves per architecture.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_orchestrator_system_reserved_resources(&self, _ctx: &ApiContext) -> CoreResult<ResourceMap> {
        self.resources_of(ResourceSection::SystemReserved)
    }

    /// Every aggregate, computed from one consistent view of the hosts.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_orchestrator_resources_overview(&self, ctx: &ApiContext) -> CoreResult<ResourcesOverview> {
        let overview = self.with_document(|doc| {
            let hosts = &doc.orchestrator_hosts;
            ResourcesOverview {
                total: aggregate_resources(hosts, ResourceSection::Total),
                total_available: aggregate_resources(hosts, ResourceSection::Available),
                total_in_use: aggregate_resources(hosts, ResourceSection::InUse),
                total_reserved: aggregate_resources(hosts, ResourceSection::Reserved),
                system_reserved: aggregate_resources(hosts, ResourceSection::SystemReserved),
            }
        })?;
        ctx.log_debug(format!("aggregated resources for {} architectures", overview.total.len()));
        Ok(overview)
    }
}
