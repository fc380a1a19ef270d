use super::packer_templates::check_requirements;
use super::{require, same_id};
use crate::context::ApiContext;
use crate::error::{CoreError, CoreResult, EntityKind};
use crate::models::{CatalogManifest, Document, LATEST_TAG};
use crate::query::{authorized_records, filter_by_property, is_authorized, Filter};
use crate::util::{generate_id, now_rfc3339};
use crate::JsonDatabase;

/// Keeps exactly one holder of the latest tag among the versions of
/// `catalog_id`.
///
/// `holder`, when given, takes the tag. Otherwise the current holder keeps it,
/// or the most recently created version is promoted when nobody holds it.
fn settle_latest(doc: &mut Document, catalog_id: &str, holder: Option<&str>) {
    let siblings = || {
        doc.catalog_manifests
            .iter()
            .enumerate()
            .filter(|(_, m)| same_id(&m.catalog_id, catalog_id))
    };
    let chosen = match holder {
        Some(id) => siblings().find(|(_, m)| same_id(&m.id, id)).map(|(i, _)| i),
        None => siblings()
            .find(|(_, m)| m.has_tag(LATEST_TAG))
            .or_else(|| siblings().max_by(|(_, a), (_, b)| a.created_at.cmp(&b.created_at)))
            .map(|(i, _)| i),
    };
    let Some(chosen) = chosen else {
        return;
    };
    for (index, manifest) in doc.catalog_manifests.iter_mut().enumerate() {
        if !same_id(&manifest.catalog_id, catalog_id) {
            continue;
        }
        if index == chosen {
            manifest.add_tag(LATEST_TAG);
        } else {
            manifest.remove_tag(LATEST_TAG);
        }
    }
}

/// Applies `change` to every architecture of one version and returns the
/// updated copies.
fn change_version<F>(
    doc: &mut Document,
    catalog_id: &str,
    version: &str,
    mut change: F,
) -> CoreResult<Vec<CatalogManifest>>
where
    F: FnMut(&mut CatalogManifest),
{
    let changed: Vec<CatalogManifest> = doc
        .catalog_manifests
        .iter_mut()
        .filter(|m| m.is_version(catalog_id, version))
        .map(|m| {
            change(m);
            m.updated_at = now_rfc3339();
            m.clone()
        })
        .collect();
    if changed.is_empty() {
        return Err(CoreError::not_found(
            EntityKind::CatalogManifest,
            format!("{catalog_id}/{version}"),
        ));
    }
    Ok(changed)
}

impl JsonDatabase {
    /// Lists the manifests the caller may see that match `filter`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_catalog_manifests(
        &self,
        ctx: &ApiContext,
        filter: Option<&Filter>,
    ) -> CoreResult<Vec<CatalogManifest>> {
        let manifests = self.with_document(|doc| doc.catalog_manifests.clone())?;
        Ok(authorized_records(ctx, filter_by_property(manifests, filter)))
    }

    /// Finds a visible manifest by id or name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no visible manifest matches.
    pub fn get_catalog_manifest(&self, ctx: &ApiContext, id_or_name: &str) -> CoreResult<CatalogManifest> {
        self.with_document(|doc| {
            doc.catalog_manifests
                .iter()
                .find(|m| {
                    (same_id(&m.id, id_or_name) || same_id(&m.name, id_or_name))
                        && is_authorized(ctx, *m)
                })
                .cloned()
        })?
        .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManifest, id_or_name))
    }

    /// Lists every visible version of one catalog id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the catalog id has no visible
    /// version.
    pub fn get_catalog_manifests_by_catalog_id(
        &self,
        ctx: &ApiContext,
        catalog_id: &str,
    ) -> CoreResult<Vec<CatalogManifest>> {
        let filter = Filter::new("catalog_id", catalog_id);
        let manifests = self.get_catalog_manifests(ctx, Some(&filter))?;
        if manifests.is_empty() {
            return Err(CoreError::not_found(EntityKind::CatalogManifest, catalog_id));
        }
        Ok(manifests)
    }

    /// Finds one version of a catalog id for an architecture.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the version is unknown or hidden.
    pub fn get_catalog_manifest_version(
        &self,
        ctx: &ApiContext,
        catalog_id: &str,
        version: &str,
        architecture: &str,
    ) -> CoreResult<CatalogManifest> {
        self.with_document(|doc| {
            doc.catalog_manifests
                .iter()
                .find(|m| {
                    m.is_version(catalog_id, version)
                        && same_id(&m.architecture, architecture)
                        && is_authorized(ctx, *m)
                })
                .cloned()
        })?
        .ok_or_else(|| {
            CoreError::not_found(
                EntityKind::CatalogManifest,
                format!("{catalog_id}/{version}/{architecture}"),
            )
        })
    }

    /// Stores a new manifest version.
    ///
    /// The new version takes the latest tag when it asks for it or when no
    /// other version of its catalog id holds it.
    ///
    /// # Errors
    ///
    /// Fails on an empty catalog id or version, a duplicate id or
    /// `(catalog_id, version, architecture)`, or a required role or claim that
    /// does not exist.
    pub fn create_catalog_manifest(
        &self,
        ctx: &ApiContext,
        mut manifest: CatalogManifest,
    ) -> CoreResult<CatalogManifest> {
        require(EntityKind::CatalogManifest, "catalog_id", &manifest.catalog_id)?;
        require(EntityKind::CatalogManifest, "version", &manifest.version)?;
        if manifest.id.is_empty() {
            manifest.id = generate_id();
        }
        if manifest.name.is_empty() {
            manifest.name.clone_from(&manifest.catalog_id);
        }
        let now = now_rfc3339();
        manifest.created_at.clone_from(&now);
        manifest.updated_at = now;

        let created = self.with_document_mut(|doc| {
            if doc
                .catalog_manifests
                .iter()
                .any(|m| same_id(&m.id, &manifest.id) || m.same_key(&manifest))
            {
                return Err(CoreError::already_exists(
                    EntityKind::CatalogManifest,
                    format!("{}/{}/{}", manifest.catalog_id, manifest.version, manifest.architecture),
                ));
            }
            check_requirements(doc, &manifest.required_roles, &manifest.required_claims)?;

            let wants_latest = manifest.has_tag(LATEST_TAG);
            let id = manifest.id.clone();
            let catalog_id = manifest.catalog_id.clone();
            doc.catalog_manifests.push(manifest);
            let holder = wants_latest.then_some(id.as_str());
            settle_latest(doc, &catalog_id, holder);
            doc.catalog_manifests
                .iter()
                .find(|m| same_id(&m.id, &id))
                .cloned()
                .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManifest, id.clone()))
        })?;
        self.save(ctx)?;
        ctx.log_info(format!(
            "created catalog manifest {} version {}",
            created.catalog_id, created.version
        ));
        Ok(created)
    }

    /// Updates the mutable fields of a manifest and bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// Fails for an unknown manifest or a required role or claim that does
    /// not exist.
    pub fn update_catalog_manifest(
        &self,
        ctx: &ApiContext,
        record: &CatalogManifest,
    ) -> CoreResult<CatalogManifest> {
        let updated = self.with_document_mut(|doc| {
            check_requirements(doc, &record.required_roles, &record.required_claims)?;
            let stored = doc
                .catalog_manifests
                .iter_mut()
                .find(|m| same_id(&m.id, &record.id))
                .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManifest, record.id.clone()))?;
            stored.description.clone_from(&record.description);
            stored.virtual_machine_contents.clone_from(&record.virtual_machine_contents);
            stored.pack_contents.clone_from(&record.pack_contents);
            stored.last_downloaded_at.clone_from(&record.last_downloaded_at);
            stored.last_downloaded_user.clone_from(&record.last_downloaded_user);
            stored.size = record.size;
            stored.pack_size = record.pack_size;
            stored.path.clone_from(&record.path);
            stored.metadata_path.clone_from(&record.metadata_path);
            stored.pack_path.clone_from(&record.pack_path);
            stored.kind.clone_from(&record.kind);
            stored.provider.clone_from(&record.provider);
            stored.minimum_requirements = record.minimum_requirements;
            stored.tags.clone_from(&record.tags);
            stored.required_claims.clone_from(&record.required_claims);
            stored.required_roles.clone_from(&record.required_roles);
            stored.updated_at = now_rfc3339();

            let id = stored.id.clone();
            let catalog_id = stored.catalog_id.clone();
            let holder = record.has_tag(LATEST_TAG).then_some(id.as_str());
            settle_latest(doc, &catalog_id, holder);
            doc.catalog_manifests
                .iter()
                .find(|m| same_id(&m.id, &id))
                .cloned()
                .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManifest, id.clone()))
        })?;
        self.save(ctx)?;
        Ok(updated)
    }

    /// Replaces the tags of a manifest.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown manifest.
    pub fn update_catalog_manifest_tags(
        &self,
        ctx: &ApiContext,
        id: &str,
        tags: &[String],
    ) -> CoreResult<CatalogManifest> {
        let mut manifest = self
            .with_document(|doc| {
                doc.catalog_manifests
                    .iter()
                    .find(|m| same_id(&m.id, id))
                    .cloned()
            })?
            .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManifest, id))?;
        manifest.tags = Vec::new();
        for tag in tags {
            manifest.add_tag(tag);
        }
        self.update_catalog_manifest(ctx, &manifest)
    }

    /// Counts a download by the acting user.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown manifest.
    pub fn record_catalog_manifest_download(&self, ctx: &ApiContext, id: &str) -> CoreResult<CatalogManifest> {
        let user = ctx.acting_user();
        let updated = self.with_document_mut(|doc| {
            let stored = doc
                .catalog_manifests
                .iter_mut()
                .find(|m| same_id(&m.id, id))
                .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManifest, id))?;
            stored.download_count += 1;
            stored.last_downloaded_at = now_rfc3339();
            stored.last_downloaded_user = user;
            Ok(stored.clone())
        })?;
        self.save(ctx)?;
        Ok(updated)
    }

    /// Marks every architecture of a version as tainted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown version.
    pub fn taint_catalog_manifest_version(
        &self,
        ctx: &ApiContext,
        catalog_id: &str,
        version: &str,
    ) -> CoreResult<Vec<CatalogManifest>> {
        let user = ctx.acting_user();
        let changed = self.with_document_mut(|doc| {
            change_version(doc, catalog_id, version, |m| {
                m.tainted = true;
                m.tainted_by.clone_from(&user);
                m.tainted_at = now_rfc3339();
            })
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("tainted {catalog_id} version {version}"));
        Ok(changed)
    }

    /// Clears the taint of every architecture of a version.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown version.
    pub fn untaint_catalog_manifest_version(
        &self,
        ctx: &ApiContext,
        catalog_id: &str,
        version: &str,
    ) -> CoreResult<Vec<CatalogManifest>> {
        let user = ctx.acting_user();
        let changed = self.with_document_mut(|doc| {
            change_version(doc, catalog_id, version, |m| {
                m.tainted = false;
                m.untainted_by.clone_from(&user);
                m.tainted_at.clear();
            })
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("untainted {catalog_id} version {version}"));
        Ok(changed)
    }

    /// Revokes every architecture of a version.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown version.
    pub fn revoke_catalog_manifest_version(
        &self,
        ctx: &ApiContext,
        catalog_id: &str,
        version: &str,
    ) -> CoreResult<Vec<CatalogManifest>> {
        let user = ctx.acting_user();
        let changed = self.with_document_mut(|doc| {
            change_version(doc, catalog_id, version, |m| {
                m.revoked = true;
                m.revoked_by.clone_from(&user);
                m.revoked_at = now_rfc3339();
            })
        })?;
        self.save(ctx)?;
        ctx.log_warn(format!("revoked {catalog_id} version {version}"));
        Ok(changed)
    }

    /// Removes one manifest by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown manifest.
    pub fn delete_catalog_manifest(&self, ctx: &ApiContext, id: &str) -> CoreResult<()> {
        self.with_document_mut(|doc| {
            let index = doc
                .catalog_manifests
                .iter()
                .position(|m| same_id(&m.id, id))
                .ok_or_else(|| CoreError::not_found(EntityKind::CatalogManifest, id))?;
            let removed = doc.catalog_manifests.remove(index);
            settle_latest(doc, &removed.catalog_id, None);
            Ok(())
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("deleted catalog manifest {id}"));
        Ok(())
    }

    /// Removes every architecture of one version.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown version.
    pub fn delete_catalog_manifest_version(
        &self,
        ctx: &ApiContext,
        catalog_id: &str,
        version: &str,
    ) -> CoreResult<()> {
        self.with_document_mut(|doc| {
            let before = doc.catalog_manifests.len();
            doc.catalog_manifests
                .retain(|m| !m.is_version(catalog_id, version));
            if doc.catalog_manifests.len() == before {
                return Err(CoreError::not_found(
                    EntityKind::CatalogManifest,
                    format!("{catalog_id}/{version}"),
                ));
            }
            settle_latest(doc, catalog_id, None);
            Ok(())
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("deleted {catalog_id} version {version}"));
        Ok(())
    }
}
