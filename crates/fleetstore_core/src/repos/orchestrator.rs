use super::{require, same_id};
use crate::context::ApiContext;
use crate::error::{CoreError, CoreResult, EntityKind};
use crate::models::{
    Document, HealthState, HostResources, OrchestratorHost, ReverseProxy, ReverseProxyHost,
    VirtualMachine,
};
use crate::query::{authorized_records, filter_by_property, is_authorized, order_by_property, Filter, Order};
use crate::util::{generate_id, now_rfc3339};
use crate::JsonDatabase;

/// Outcome of a host health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostHealth {
    /// The health check succeeded.
    Healthy,
    /// The health check failed with a reason.
    Unhealthy(String),
}

fn find_host_mut<'a>(doc: &'a mut Document, key: &str) -> CoreResult<&'a mut OrchestratorHost> {
    doc.orchestrator_hosts
        .iter_mut()
        .find(|h| h.matches_key(key))
        .ok_or_else(|| CoreError::not_found(EntityKind::OrchestratorHost, key))
}

impl JsonDatabase {
    /// Applies `change` to a stored host and saves when it reports a change.
    fn change_host<F>(&self, ctx: &ApiContext, key: &str, change: F) -> CoreResult<OrchestratorHost>
    where
        F: FnOnce(&mut OrchestratorHost) -> bool,
    {
        let (host, changed) = self.with_document_mut_if(|doc| {
            let host = find_host_mut(doc, key)?;
            let changed = change(host);
            if changed {
                host.updated_at = now_rfc3339();
            }
            Ok((host.clone(), changed))
        })?;
        if changed {
            self.save(ctx)?;
        }
        Ok(host)
    }

    /// Lists the hosts the caller may see that match `filter`, most recently
    /// updated first.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_orchestrator_hosts(
        &self,
        ctx: &ApiContext,
        filter: Option<&Filter>,
    ) -> CoreResult<Vec<OrchestratorHost>> {
        let hosts = self.with_document(|doc| doc.orchestrator_hosts.clone())?;
        let visible = authorized_records(ctx, filter_by_property(hosts, filter));
        Ok(order_by_property(visible, Some(&Order::desc("updated_at"))))
    }

    /// Like [`get_orchestrator_hosts`](Self::get_orchestrator_hosts), enabled
    /// hosts only.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_active_orchestrator_hosts(
        &self,
        ctx: &ApiContext,
        filter: Option<&Filter>,
    ) -> CoreResult<Vec<OrchestratorHost>> {
        let mut hosts = self.get_orchestrator_hosts(ctx, filter)?;
        hosts.retain(|h| h.enabled);
        Ok(hosts)
    }

    /// Finds a visible host by id, host name or base URL.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no visible host matches.
    pub fn get_orchestrator_host(&self, ctx: &ApiContext, key: &str) -> CoreResult<OrchestratorHost> {
        self.with_document(|doc| {
            doc.orchestrator_hosts
                .iter()
                .find(|h| h.matches_key(key) && is_authorized(ctx, *h))
                .cloned()
        })?
        .ok_or_else(|| CoreError::not_found(EntityKind::OrchestratorHost, key))
    }

    /// Registers a new host. It starts enabled.
    ///
    /// # Errors
    ///
    /// Fails on an empty host or when the host is already registered.
    pub fn create_orchestrator_host(
        &self,
        ctx: &ApiContext,
        mut host: OrchestratorHost,
    ) -> CoreResult<OrchestratorHost> {
        require(EntityKind::OrchestratorHost, "host", &host.host)?;
        if host.id.is_empty() {
            host.id = generate_id();
        }
        host.enabled = true;
        let now = now_rfc3339();
        host.created_at.clone_from(&now);
        host.updated_at = now;

        let created = self.with_document_mut(|doc| {
            let base_url = host.base_url();
            if doc.orchestrator_hosts.iter().any(|h| {
                same_id(&h.id, &host.id) || h.matches_key(&host.host) || h.matches_key(&base_url)
            }) {
                return Err(CoreError::already_exists(
                    EntityKind::OrchestratorHost,
                    host.host.clone(),
                ));
            }
            doc.orchestrator_hosts.push(host.clone());
            Ok(host)
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("registered orchestrator host {}", created.base_url()));
        Ok(created)
    }

    /// Replaces the mutable fields of a stored host.
    ///
    /// Nothing is written when the record is unchanged; the stored copy is
    /// returned with its `updated_at` untouched.
    ///
    /// # Errors
    ///
    /// Fails on an empty id or an unknown host.
    pub fn update_orchestrator_host(
        &self,
        ctx: &ApiContext,
        host: &OrchestratorHost,
    ) -> CoreResult<OrchestratorHost> {
        require(EntityKind::OrchestratorHost, "id", &host.id)?;
        let (updated, changed) = self.with_document_mut_if(|doc| {
            let stored = doc
                .orchestrator_hosts
                .iter_mut()
                .find(|h| same_id(&h.id, &host.id))
                .ok_or_else(|| CoreError::not_found(EntityKind::OrchestratorHost, host.id.clone()))?;
            if !stored.diff(host) {
                return Ok((stored.clone(), false));
            }
            stored.apply(host);
            stored.updated_at = now_rfc3339();
            Ok((stored.clone(), true))
        })?;
        if changed {
            self.save(ctx)?;
        } else {
            ctx.log_debug(format!("no changes detected for host {}", updated.host));
        }
        Ok(updated)
    }

    /// Updates the connection and access details of a host: address, port,
    /// scheme, path prefix, description, tags, authentication and required
    /// roles and claims.
    ///
    /// # Errors
    ///
    /// Fails for an unknown host or when the new address belongs to another
    /// host.
    pub fn update_orchestrator_host_details(
        &self,
        ctx: &ApiContext,
        details: &OrchestratorHost,
    ) -> CoreResult<OrchestratorHost> {
        require(EntityKind::OrchestratorHost, "id", &details.id)?;
        require(EntityKind::OrchestratorHost, "host", &details.host)?;
        let (updated, changed) = self.with_document_mut_if(|doc| {
            if doc
                .orchestrator_hosts
                .iter()
                .any(|h| !same_id(&h.id, &details.id) && same_id(&h.host, &details.host))
            {
                return Err(CoreError::already_exists(
                    EntityKind::OrchestratorHost,
                    details.host.clone(),
                ));
            }
            let stored = find_host_mut(doc, &details.id)?;
            let mut next = stored.clone();
            next.host.clone_from(&details.host);
            next.port.clone_from(&details.port);
            next.schema.clone_from(&details.schema);
            next.path_prefix.clone_from(&details.path_prefix);
            next.description.clone_from(&details.description);
            next.tags.clone_from(&details.tags);
            next.authentication.clone_from(&details.authentication);
            next.required_roles.clone_from(&details.required_roles);
            next.required_claims.clone_from(&details.required_claims);
            if !next.diff(stored) {
                return Ok((stored.clone(), false));
            }
            next.updated_at = now_rfc3339();
            *stored = next;
            Ok((stored.clone(), true))
        })?;
        if changed {
            self.save(ctx)?;
        }
        Ok(updated)
    }

    /// Enables a host for scheduling.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown host.
    pub fn enable_orchestrator_host(&self, ctx: &ApiContext, key: &str) -> CoreResult<OrchestratorHost> {
        self.change_host(ctx, key, |host| !std::mem::replace(&mut host.enabled, true))
    }

    /// Disables a host. Disabled hosts are left out of scheduling and
    /// resource totals.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown host.
    pub fn disable_orchestrator_host(&self, ctx: &ApiContext, key: &str) -> CoreResult<OrchestratorHost> {
        self.change_host(ctx, key, |host| std::mem::replace(&mut host.enabled, false))
    }

    /// Records the outcome of a health check.
    ///
    /// A host that stays unhealthy keeps the time and reason of its first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown host.
    pub fn set_orchestrator_host_health(
        &self,
        ctx: &ApiContext,
        key: &str,
        health: HostHealth,
    ) -> CoreResult<OrchestratorHost> {
        let updated = self.change_host(ctx, key, |host| {
            let before = host.state;
            match &health {
                HostHealth::Healthy => host.set_healthy(),
                HostHealth::Unhealthy(reason) => host.set_unhealthy(reason.clone()),
            }
            host.state != before
        })?;
        if let HostHealth::Unhealthy(reason) = health {
            ctx.log_warn(format!("host {} unhealthy: {reason}", updated.host));
        }
        Ok(updated)
    }

    /// Removes a host by id or host name.
    ///
    /// # Errors
    ///
    /// Fails on an empty key or an unknown host.
    pub fn delete_orchestrator_host(&self, ctx: &ApiContext, key: &str) -> CoreResult<()> {
        require(EntityKind::OrchestratorHost, "id", key)?;
        self.with_document_mut(|doc| {
            let index = doc
                .orchestrator_hosts
                .iter()
                .position(|h| same_id(&h.id, key) || same_id(&h.host, key))
                .ok_or_else(|| CoreError::not_found(EntityKind::OrchestratorHost, key))?;
            doc.orchestrator_hosts.remove(index);
            Ok(())
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("removed orchestrator host {key}"));
        Ok(())
    }

    /// Removes one virtual machine from the stored host.
    ///
    /// # Errors
    ///
    /// Fails for an unknown host or machine.
    pub fn delete_orchestrator_virtual_machine(
        &self,
        ctx: &ApiContext,
        host_key: &str,
        vm_id: &str,
    ) -> CoreResult<()> {
        self.with_document_mut(|doc| {
            let host = find_host_mut(doc, host_key)?;
            let index = host
                .virtual_machines
                .iter()
                .position(|vm| same_id(&vm.id, vm_id))
                .ok_or_else(|| CoreError::not_found(EntityKind::VirtualMachine, vm_id))?;
            host.virtual_machines.remove(index);
            host.updated_at = now_rfc3339();
            Ok(())
        })?;
        self.save(ctx)
    }

    /// Lists the machines of every visible healthy host matching `filter`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_orchestrator_virtual_machines(
        &self,
        ctx: &ApiContext,
        filter: Option<&Filter>,
    ) -> CoreResult<Vec<VirtualMachine>> {
        let machines = self
            .get_orchestrator_hosts(ctx, None)?
            .into_iter()
            .filter(|h| h.state == HealthState::Healthy)
            .flat_map(|h| h.virtual_machines)
            .collect();
        Ok(filter_by_property(machines, filter))
    }

    /// Lists the machines of one host matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown host.
    pub fn get_orchestrator_host_virtual_machines(
        &self,
        ctx: &ApiContext,
        host_key: &str,
        filter: Option<&Filter>,
    ) -> CoreResult<Vec<VirtualMachine>> {
        let host = self.get_orchestrator_host(ctx, host_key)?;
        Ok(filter_by_property(host.virtual_machines, filter))
    }

    /// Finds one machine of a host.
    ///
    /// # Errors
    ///
    /// Fails for an unknown host or machine.
    pub fn get_orchestrator_host_virtual_machine(
        &self,
        ctx: &ApiContext,
        host_key: &str,
        vm_id: &str,
    ) -> CoreResult<VirtualMachine> {
        self.get_orchestrator_host(ctx, host_key)?
            .virtual_machines
            .into_iter()
            .find(|vm| same_id(&vm.id, vm_id))
            .ok_or_else(|| CoreError::not_found(EntityKind::VirtualMachine, vm_id))
    }

    /// Returns the last reported resources of a host.
    ///
    /// # Errors
    ///
    /// Fails for an unknown host or one that has not reported resources.
    pub fn get_orchestrator_host_resources(&self, ctx: &ApiContext, host_key: &str) -> CoreResult<HostResources> {
        self.get_orchestrator_host(ctx, host_key)?
            .resources
            .ok_or_else(|| CoreError::not_found(EntityKind::OrchestratorHost, format!("{host_key} resources")))
    }

    /// Returns the reverse-proxy configuration reported by a host.
    ///
    /// # Errors
    ///
    /// Fails for an unknown host or one without a reverse proxy.
    pub fn get_orchestrator_reverse_proxy_config(
        &self,
        ctx: &ApiContext,
        host_key: &str,
    ) -> CoreResult<ReverseProxy> {
        self.get_orchestrator_host(ctx, host_key)?
            .reverse_proxy
            .ok_or_else(|| CoreError::not_found(EntityKind::ReverseProxy, host_key))
    }

    /// Returns the reverse-proxy hosts reported by a host.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown host.
    pub fn get_orchestrator_reverse_proxy_hosts(
        &self,
        ctx: &ApiContext,
        host_key: &str,
    ) -> CoreResult<Vec<ReverseProxyHost>> {
        Ok(self.get_orchestrator_host(ctx, host_key)?.reverse_proxy_hosts)
    }

    /// Finds one reverse-proxy host reported by a host, by id or address.
    ///
    /// # Errors
    ///
    /// Fails for an unknown host or proxy host.
    pub fn get_orchestrator_reverse_proxy_host(
        &self,
        ctx: &ApiContext,
        host_key: &str,
        id_or_address: &str,
    ) -> CoreResult<ReverseProxyHost> {
        self.get_orchestrator_reverse_proxy_hosts(ctx, host_key)?
            .into_iter()
            .find(|p| p.matches_key(id_or_address))
            .ok_or_else(|| CoreError::not_found(EntityKind::ReverseProxyHost, id_or_address))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{root, store, user};
    use super::*;
    use crate::models::{HostResourceItem, VirtualMachine};

    fn host(name: &str) -> OrchestratorHost {
        let mut host = OrchestratorHost::new(name);
        host.port = "8080".into();
        host
    }

    #[test]
    fn create_and_lookup() {
        let (_dir, db) = store();
        let created = db.create_orchestrator_host(&root(), host("node-1")).unwrap();
        assert!(created.enabled);
        assert!(!created.id.is_empty());

        assert_eq!(db.get_orchestrator_host(&root(), "NODE-1").unwrap().id, created.id);
        assert_eq!(
            db.get_orchestrator_host(&root(), "http://node-1:8080").unwrap().id,
            created.id
        );
        assert!(matches!(
            db.create_orchestrator_host(&root(), host("node-1")),
            Err(CoreError::AlreadyExists { .. })
        ));
        assert!(matches!(
            db.create_orchestrator_host(&root(), OrchestratorHost::new("")),
            Err(CoreError::EmptyRequiredField { field: "host", .. })
        ));
    }

    #[test]
    fn update_without_changes_is_a_no_op() {
        let (_dir, db) = store();
        let created = db.create_orchestrator_host(&root(), host("node-1")).unwrap();
        let writes = db.stats().disk_writes();

        let same = db.update_orchestrator_host(&root(), &created).unwrap();
        assert_eq!(same.updated_at, created.updated_at);
        assert_eq!(db.stats().disk_writes(), writes);
        assert!(!db.is_dirty());

        let mut changed = created.clone();
        changed.description = "rack 4".into();
        let updated = db.update_orchestrator_host(&root(), &changed).unwrap();
        assert_eq!(updated.description, "rack 4");
        assert_eq!(updated.created_at, created.created_at);
        assert_ne!(updated.updated_at, created.updated_at);
    }

    #[test]
    fn unchanged_hosts_are_not_flushed_on_close() {
        let (_dir, db) = store();
        db.create_orchestrator_host(&root(), host("node-1")).unwrap();
        let created = db
            .set_orchestrator_host_health(&root(), "node-1", HostHealth::Healthy)
            .unwrap();
        let writes = db.stats().disk_writes();

        db.update_orchestrator_host(&root(), &created).unwrap();
        db.update_orchestrator_host_details(&root(), &created).unwrap();
        db.enable_orchestrator_host(&root(), &created.id).unwrap();
        db.set_orchestrator_host_health(&root(), &created.id, HostHealth::Healthy)
            .unwrap();
        assert!(!db.is_dirty());

        db.close(&root()).unwrap();
        assert_eq!(db.stats().disk_writes(), writes);
    }

    #[test]
    fn details_update_refuses_taken_host() {
        let (_dir, db) = store();
        let first = db.create_orchestrator_host(&root(), host("node-1")).unwrap();
        db.create_orchestrator_host(&root(), host("node-2")).unwrap();

        let mut details = first.clone();
        details.host = "NODE-2".into();
        assert!(matches!(
            db.update_orchestrator_host_details(&root(), &details),
            Err(CoreError::AlreadyExists { .. })
        ));

        details.host = "node-1.local".into();
        details.tags = vec!["gpu".into()];
        let updated = db.update_orchestrator_host_details(&root(), &details).unwrap();
        assert_eq!(updated.host, "node-1.local");
        assert_eq!(updated.tags, vec!["gpu"]);
    }

    #[test]
    fn enable_disable_and_active_listing() {
        let (_dir, db) = store();
        db.create_orchestrator_host(&root(), host("node-1")).unwrap();
        db.create_orchestrator_host(&root(), host("node-2")).unwrap();

        let disabled = db.disable_orchestrator_host(&root(), "node-2").unwrap();
        assert!(!disabled.enabled);
        let active = db.get_active_orchestrator_hosts(&root(), None).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].host, "node-1");

        db.enable_orchestrator_host(&root(), "node-2").unwrap();
        assert_eq!(db.get_active_orchestrator_hosts(&root(), None).unwrap().len(), 2);
    }

    #[test]
    fn health_transitions() {
        let (_dir, db) = store();
        db.create_orchestrator_host(&root(), host("node-1")).unwrap();

        let down = db
            .set_orchestrator_host_health(&root(), "node-1", HostHealth::Unhealthy("timeout".into()))
            .unwrap();
        assert_eq!(down.state, HealthState::Unhealthy);
        assert_eq!(down.last_unhealthy_error_message, "timeout");

        let still_down = db
            .set_orchestrator_host_health(&root(), "node-1", HostHealth::Unhealthy("refused".into()))
            .unwrap();
        assert_eq!(still_down.last_unhealthy_error_message, "timeout");

        let up = db
            .set_orchestrator_host_health(&root(), "node-1", HostHealth::Healthy)
            .unwrap();
        assert_eq!(up.state, HealthState::Healthy);
        assert!(up.last_unhealthy_error_message.is_empty());
    }

    #[test]
    fn virtual_machines_of_healthy_hosts() {
        let (_dir, db) = store();
        let mut healthy = host("node-1");
        healthy.state = HealthState::Healthy;
        healthy.virtual_machines = vec![VirtualMachine::new("vm-1", "build"), VirtualMachine::new("vm-2", "test")];
        let mut sick = host("node-2");
        sick.virtual_machines = vec![VirtualMachine::new("vm-3", "build")];
        let node1 = db.create_orchestrator_host(&root(), healthy).unwrap();
        db.create_orchestrator_host(&root(), sick).unwrap();

        let all = db.get_orchestrator_virtual_machines(&root(), None).unwrap();
        assert_eq!(all.len(), 2);
        let filter = Filter::new("name", "BUILD");
        let builds = db.get_orchestrator_virtual_machines(&root(), Some(&filter)).unwrap();
        assert_eq!(builds.len(), 1);

        let vm = db
            .get_orchestrator_host_virtual_machine(&root(), &node1.id, "VM-2")
            .unwrap();
        assert_eq!(vm.name, "test");

        db.delete_orchestrator_virtual_machine(&root(), &node1.id, "vm-1")
            .unwrap();
        let left = db
            .get_orchestrator_host_virtual_machines(&root(), "node-1", None)
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "vm-2");
        assert!(matches!(
            db.delete_orchestrator_virtual_machine(&root(), &node1.id, "vm-1"),
            Err(CoreError::NotFound { kind: EntityKind::VirtualMachine, .. })
        ));
    }

    #[test]
    fn host_sub_resources() {
        let (_dir, db) = store();
        let mut with_resources = host("node-1");
        let mut resources = HostResources::default();
        resources.cpu_type = "arm64".into();
        resources.total = HostResourceItem {
            logical_cpu_count: 8,
            ..HostResourceItem::default()
        };
        with_resources.resources = Some(resources);
        with_resources.reverse_proxy_hosts = vec![ReverseProxyHost::new("proxy.local", "80")];
        db.create_orchestrator_host(&root(), with_resources).unwrap();
        db.create_orchestrator_host(&root(), host("node-2")).unwrap();

        let found = db.get_orchestrator_host_resources(&root(), "node-1").unwrap();
        assert_eq!(found.total.logical_cpu_count, 8);
        assert!(db.get_orchestrator_host_resources(&root(), "node-2").is_err());
        assert!(db.get_orchestrator_reverse_proxy_config(&root(), "node-1").is_err());
        assert_eq!(db.get_orchestrator_reverse_proxy_hosts(&root(), "node-1").unwrap().len(), 1);
        assert!(db
            .get_orchestrator_reverse_proxy_host(&root(), "node-1", "PROXY.local:80")
            .is_ok());
    }

    #[test]
    fn listing_is_authorized_and_ordered() {
        let (_dir, db) = store();
        let mut gated = host("secure");
        gated.required_roles = vec!["OPS".into()];
        db.create_orchestrator_host(&root(), gated).unwrap();
        let open = db.create_orchestrator_host(&root(), host("open")).unwrap();

        let outsider = user(&[], &[]);
        let visible = db.get_orchestrator_hosts(&outsider, None).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, open.id);
        assert!(db.get_orchestrator_host(&outsider, "secure").is_err());

        let all = db.get_orchestrator_hosts(&user(&["OPS"], &[]), None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].host, "open");

        db.delete_orchestrator_host(&root(), "secure").unwrap();
        assert_eq!(db.get_orchestrator_hosts(&root(), None).unwrap().len(), 1);
    }
}
