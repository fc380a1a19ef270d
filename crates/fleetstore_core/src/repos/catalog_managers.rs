use super::{require, same_id};
use crate::context::ApiContext;
use crate::error::{CoreError, CoreResult, EntityKind, ProtectedAction};
use crate::models::CatalogManager;
use crate::query::{filter_by_property, Filter};
use crate::util::{generate_id, now_rfc3339};
use crate::JsonDatabase;

// Catalog managers are persisted without waiting for the disk write.

impl JsonDatabase {
    /// Lists catalog managers matching `filter`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_catalog_managers(
        &self,
        _ctx: &ApiContext,
        filter: Option<&Filter>,
    ) -> CoreResult<Vec<CatalogManager>> {
        let managers = self.with_document(|doc| doc.catalog_managers.clone())?;
        Ok(filter_by_property(managers, filter))
    }

    /// Finds a catalog manager by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown id.
    pub fn get_catalog_manager(&self, _ctx: &ApiContext, id: &str) -> CoreResult<CatalogManager> {
        self.with_document(|doc| {
            doc.catalog_managers
                .iter()
                .find(|m| same_id(&m.id, id))
                .cloned()
        })?
        .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManager, id))
    }

    /// Stores a new catalog manager.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or URL, or a duplicate id or name.
    pub fn add_catalog_manager(
        &self,
        ctx: &ApiContext,
        mut manager: CatalogManager,
    ) -> CoreResult<CatalogManager> {
        require(EntityKind::CatalogManager, "name", &manager.name)?;
        require(EntityKind::CatalogManager, "url", &manager.url)?;
        if manager.id.is_empty() {
            manager.id = generate_id();
        }
        let now = now_rfc3339();
        manager.created_at.clone_from(&now);
        manager.updated_at = now;

        let created = self.with_document_mut(|doc| {
            if doc
                .catalog_managers
                .iter()
                .any(|m| same_id(&m.id, &manager.id) || same_id(&m.name, &manager.name))
            {
                return Err(CoreError::already_exists(
                    EntityKind::CatalogManager,
                    manager.name.clone(),
                ));
            }
            doc.catalog_managers.push(manager.clone());
            Ok(manager)
        })?;
        self.save_async(ctx)?;
        ctx.log_info(format!("added catalog manager {}", created.name));
        Ok(created)
    }

    /// Replaces a stored catalog manager, keeping its id and creation time.
    ///
    /// # Errors
    ///
    /// Fails for an unknown manager, a name taken by another manager, or an
    /// internal manager unless root.
    pub fn update_catalog_manager(
        &self,
        ctx: &ApiContext,
        manager: &CatalogManager,
    ) -> CoreResult<CatalogManager> {
        let updated = self.with_document_mut(|doc| {
            if doc
                .catalog_managers
                .iter()
                .any(|m| same_id(&m.name, &manager.name) && !same_id(&m.id, &manager.id))
            {
                return Err(CoreError::already_exists(
                    EntityKind::CatalogManager,
                    manager.name.clone(),
                ));
            }
            let stored = doc
                .catalog_managers
                .iter_mut()
                .find(|m| same_id(&m.id, &manager.id))
                .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManager, manager.id.clone()))?;
            if stored.internal && !ctx.is_root() {
                return Err(CoreError::protected(
                    EntityKind::CatalogManager,
                    stored.id.clone(),
                    ProtectedAction::Update,
                ));
            }
            let created_at = std::mem::take(&mut stored.created_at);
            *stored = manager.clone();
            stored.created_at = created_at;
            stored.updated_at = now_rfc3339();
            Ok(stored.clone())
        })?;
        self.save_async(ctx)?;
        Ok(updated)
    }

    /// Removes a catalog manager.
    ///
    /// # Errors
    ///
    /// Fails for an unknown manager or an internal one unless root.
    pub fn delete_catalog_manager(&self, ctx: &ApiContext, id: &str) -> CoreResult<()> {
        self.with_document_mut(|doc| {
            let index = doc
                .catalog_managers
                .iter()
                .position(|m| same_id(&m.id, id))
                .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManager, id))?;
            if doc.catalog_managers[index].internal && !ctx.is_root() {
                return Err(CoreError::protected(
                    EntityKind::CatalogManager,
                    id,
                    ProtectedAction::Delete,
                ));
            }
            doc.catalog_managers.remove(index);
            Ok(())
        })?;
        self.save_async(ctx)?;
        ctx.log_info(format!("deleted catalog manager {id}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{root, store, user};
    use super::*;

    #[test]
    fn add_get_update_delete() {
        let (_dir, db) = store();
        let created = db
            .add_catalog_manager(&root(), CatalogManager::new("main", "https://catalog.local"))
            .unwrap();
        assert!(created.active);
        assert!(!created.id.is_empty());
        assert!(matches!(
            db.add_catalog_manager(&root(), CatalogManager::new("MAIN", "https://x")),
            Err(CoreError::AlreadyExists { .. })
        ));

        let mut change = created.clone();
        change.url = "https://catalog.example.com".into();
        change.active = false;
        let updated = db.update_catalog_manager(&root(), &change).unwrap();
        assert_eq!(updated.url, "https://catalog.example.com");
        assert_eq!(updated.created_at, created.created_at);
        assert!(!db.get_catalog_manager(&root(), &created.id).unwrap().active);

        db.delete_catalog_manager(&root(), &created.id).unwrap();
        assert!(db.get_catalog_managers(&root(), None).unwrap().is_empty());
    }

    #[test]
    fn internal_managers_are_protected() {
        let (_dir, db) = store();
        let mut internal = CatalogManager::new("builtin", "https://builtin");
        internal.internal = true;
        let created = db.add_catalog_manager(&root(), internal).unwrap();
        let caller = user(&[], &[]);

        assert!(matches!(
            db.update_catalog_manager(&caller, &created),
            Err(CoreError::ProtectedInternalRecord { action: ProtectedAction::Update, .. })
        ));
        assert!(matches!(
            db.delete_catalog_manager(&caller, &created.id),
            Err(CoreError::ProtectedInternalRecord { action: ProtectedAction::Delete, .. })
        ));
        db.delete_catalog_manager(&root(), &created.id).unwrap();
    }

    #[test]
    fn async_saves_reach_disk_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            crate::StoreConfig::new(dir.path().join("data.json")).without_background_tasks();
        let db = JsonDatabase::open(&root(), config.clone()).unwrap();
        db.add_catalog_manager(&root(), CatalogManager::new("main", "https://c"))
            .unwrap();
        db.close(&root()).unwrap();
        drop(db);

        let db = JsonDatabase::open(&root(), config).unwrap();
        let filter = Filter::new("name", "MAIN");
        assert_eq!(db.get_catalog_managers(&root(), Some(&filter)).unwrap().len(), 1);
    }
}
