use super::{require, same_id};
use crate::context::ApiContext;
use crate::error::{CoreResult, EntityKind};
use crate::models::{SnapshotDetails, VirtualMachineSnapshot};
use crate::JsonDatabase;
use std::collections::BTreeMap;

fn require_vm_id(vm_id: &str) -> CoreResult<()> {
    require(EntityKind::Snapshot, "vm_id", vm_id)
}

impl JsonDatabase {
    /// Returns the snapshots recorded for a machine, empty when none are.
    ///
    /// # Errors
    ///
    /// Fails on an empty VM id or when disconnected.
    pub fn get_snapshots_by_vm_id(
        &self,
        _ctx: &ApiContext,
        vm_id: &str,
    ) -> CoreResult<Vec<VirtualMachineSnapshot>> {
        require_vm_id(vm_id)?;
        self.with_document(|doc| doc.vm_snapshots.get(vm_id).cloned().unwrap_or_default())
    }

    /// Returns a machine's snapshots keyed by snapshot id.
    ///
    /// # Errors
    ///
    /// Fails on an empty VM id or when disconnected.
    pub fn get_snapshot_list(
        &self,
        ctx: &ApiContext,
        vm_id: &str,
    ) -> CoreResult<BTreeMap<String, SnapshotDetails>> {
        let snapshots = self.get_snapshots_by_vm_id(ctx, vm_id)?;
        Ok(snapshots
            .iter()
            .map(|s| (s.id.clone(), s.details()))
            .collect())
    }

    /// Replaces the snapshot list of a machine.
    ///
    /// # Errors
    ///
    /// Fails on an empty VM id or when the write fails.
    pub fn set_snapshots_by_vm_id(
        &self,
        ctx: &ApiContext,
        vm_id: &str,
        snapshots: Vec<VirtualMachineSnapshot>,
    ) -> CoreResult<()> {
        require_vm_id(vm_id)?;
        let count = snapshots.len();
        self.with_document_mut(|doc| {
            doc.vm_snapshots.insert(vm_id.to_string(), snapshots);
            Ok(())
        })?;
        self.save(ctx)?;
        ctx.log_debug(format!("stored {count} snapshots for vm {vm_id}"));
        Ok(())
    }

    /// Adds a snapshot to a machine, replacing one with the same id. A
    /// snapshot added as current clears the flag on its siblings.
    ///
    /// # Errors
    ///
    /// Fails on an empty VM or snapshot id, or when the write fails.
    pub fn add_snapshot_to_vm(
        &self,
        ctx: &ApiContext,
        vm_id: &str,
        snapshot: VirtualMachineSnapshot,
    ) -> CoreResult<Vec<VirtualMachineSnapshot>> {
        require_vm_id(vm_id)?;
        require(EntityKind::Snapshot, "id", &snapshot.id)?;
        let list = self.with_document_mut(|doc| {
            let list = doc.vm_snapshots.entry(vm_id.to_string()).or_default();
            if snapshot.current {
                for existing in list.iter_mut() {
                    existing.current = false;
                }
            }
            match list.iter_mut().find(|s| same_id(&s.id, &snapshot.id)) {
                Some(existing) => *existing = snapshot,
                None => list.push(snapshot),
            }
            Ok(list.clone())
        })?;
        self.save(ctx)?;
        Ok(list)
    }

    /// Forgets every snapshot of a machine. Unknown machines are ignored.
    ///
    /// # Errors
    ///
    /// Fails on an empty VM id or when the write fails.
    pub fn delete_snapshots_by_vm_id(&self, ctx: &ApiContext, vm_id: &str) -> CoreResult<()> {
        require_vm_id(vm_id)?;
        let removed = self.with_document_mut(|doc| Ok(doc.vm_snapshots.remove(vm_id).is_some()))?;
        if removed {
            self.save(ctx)?;
            ctx.log_debug(format!("removed snapshots of vm {vm_id}"));
        }
        Ok(())
    }
}
