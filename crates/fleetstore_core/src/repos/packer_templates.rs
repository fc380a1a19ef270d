use super::claims::find_claim;
use super::roles::find_role;
use super::same_id;
use crate::context::ApiContext;
use crate::error::{CoreError, CoreResult, EntityKind, ProtectedAction};
use crate::models::{Document, PackerTemplate};
use crate::query::{authorized_records, filter_by_property, is_authorized, Filter};
use crate::util::now_rfc3339;
use crate::JsonDatabase;

/// Fails with [`CoreError::DependencyMissing`] for the first required role or
/// claim that is not stored.
pub(crate) fn check_requirements(doc: &Document, roles: &[String], claims: &[String]) -> CoreResult<()> {
    if let Some(claim) = claims.iter().find(|c| find_claim(doc, c).is_none()) {
        return Err(CoreError::dependency_missing(EntityKind::Claim, claim.clone()));
    }
    if let Some(role) = roles.iter().find(|r| find_role(doc, r).is_none()) {
        return Err(CoreError::dependency_missing(EntityKind::Role, role.clone()));
    }
    Ok(())
}

fn matches(template: &PackerTemplate, id_or_name: &str) -> bool {
    same_id(&template.id, id_or_name) || same_id(&template.name, id_or_name)
}

impl JsonDatabase {
    /// Lists the packer templates the caller may see that match `filter`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_packer_templates(
        &self,
        ctx: &ApiContext,
        filter: Option<&Filter>,
    ) -> CoreResult<Vec<PackerTemplate>> {
        let templates = self.with_document(|doc| doc.packer_templates.clone())?;
        Ok(authorized_records(ctx, filter_by_property(templates, filter)))
    }

    /// Finds a visible packer template by id or name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no visible template matches.
    pub fn get_packer_template(&self, ctx: &ApiContext, id_or_name: &str) -> CoreResult<PackerTemplate> {
        self.with_document(|doc| {
            doc.packer_templates
                .iter()
                .find(|t| matches(t, id_or_name) && is_authorized(ctx, *t))
                .cloned()
        })?
        .ok_or_else(|| CoreError::not_found(EntityKind::PackerTemplate, id_or_name))
    }

    /// Validates and stores a new template.
    ///
    /// # Errors
    ///
    /// Fails on an empty id or name, a duplicate id or name, or a required
    /// role or claim that does not exist.
    pub fn add_packer_template(
        &self,
        ctx: &ApiContext,
        mut template: PackerTemplate,
    ) -> CoreResult<PackerTemplate> {
        template.validate()?;
        let now = now_rfc3339();
        template.created_at.clone_from(&now);
        template.updated_at = now;

        let created = self.with_document_mut(|doc| {
            if doc
                .packer_templates
                .iter()
                .any(|t| matches(t, &template.id) || matches(t, &template.name))
            {
                return Err(CoreError::already_exists(
                    EntityKind::PackerTemplate,
                    template.id.clone(),
                ));
            }
            check_requirements(doc, &template.required_roles, &template.required_claims)?;
            doc.packer_templates.push(template.clone());
            Ok(template)
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("added packer template {}", created.id));
        Ok(created)
    }

    /// Replaces a stored template, keeping its id and creation time.
    ///
    /// # Errors
    ///
    /// Fails for an unknown template, an internal one unless root, or a
    /// required role or claim that does not exist.
    pub fn update_packer_template(
        &self,
        ctx: &ApiContext,
        template: &PackerTemplate,
    ) -> CoreResult<PackerTemplate> {
        let mut template = template.clone();
        template.validate()?;
        let updated = self.with_document_mut(|doc| {
            check_requirements(doc, &template.required_roles, &template.required_claims)?;
            let stored = doc
                .packer_templates
                .iter_mut()
                .find(|t| same_id(&t.id, &template.id))
                .ok_or_else(|| CoreError::not_found(EntityKind::PackerTemplate, template.id.clone()))?;
            if stored.internal && !ctx.is_root() {
                return Err(CoreError::protected(
                    EntityKind::PackerTemplate,
                    stored.id.clone(),
                    ProtectedAction::Update,
                ));
            }
            template.id.clone_from(&stored.id);
            template.created_at.clone_from(&stored.created_at);
            template.updated_at = now_rfc3339();
            *stored = template;
            Ok(stored.clone())
        })?;
        self.save(ctx)?;
        Ok(updated)
    }

    /// Removes a template by id or name.
    ///
    /// # Errors
    ///
    /// Fails for an unknown template or an internal one unless root.
    pub fn delete_packer_template(&self, ctx: &ApiContext, id_or_name: &str) -> CoreResult<()> {
        self.with_document_mut(|doc| {
            let index = doc
                .packer_templates
                .iter()
                .position(|t| matches(t, id_or_name))
                .ok_or_else(|| CoreError::not_found(EntityKind::PackerTemplate, id_or_name))?;
            if doc.packer_templates[index].internal && !ctx.is_root() {
                return Err(CoreError::protected(
                    EntityKind::PackerTemplate,
                    doc.packer_templates[index].id.clone(),
                    ProtectedAction::Delete,
                ));
            }
            doc.packer_templates.remove(index);
            Ok(())
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("deleted packer template {id_or_name}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{root, store, user};
    use super::*;
    use crate::models::{Claim, Role};

    #[test]
    fn add_fills_defaults_and_refuses_duplicates() {
        let (_dir, db) = store();
        let created = db
            .add_packer_template(&root(), PackerTemplate::new("ubuntu", "Ubuntu 22"))
            .unwrap();
        assert_eq!(created.specs["cpu"], "2");
        assert!(!created.created_at.is_empty());

        assert!(matches!(
            db.add_packer_template(&root(), PackerTemplate::new("other", "UBUNTU 22")),
            Err(CoreError::AlreadyExists { .. })
        ));
        assert!(matches!(
            db.add_packer_template(&root(), PackerTemplate::new("", "x")),
            Err(CoreError::EmptyRequiredField { field: "id", .. })
        ));
    }

    #[test]
    fn requirements_must_exist_and_gate_visibility() {
        let (_dir, db) = store();
        let mut gated = PackerTemplate::new("mac", "macOS");
        gated.required_claims.push("BUILD".into());
        assert!(matches!(
            db.add_packer_template(&root(), gated.clone()),
            Err(CoreError::DependencyMissing { kind: EntityKind::Claim, .. })
        ));

        db.create_claim(&root(), Claim::new("BUILD")).unwrap();
        db.create_role(&root(), Role::new("DEV")).unwrap();
        gated.required_roles.push("DEV".into());
        db.add_packer_template(&root(), gated).unwrap();
        db.add_packer_template(&root(), PackerTemplate::new("open", "Open"))
            .unwrap();

        let outsider = user(&["DEV"], &[]);
        let visible = db.get_packer_templates(&outsider, None).unwrap();
        assert_eq!(visible.len(), 1);
        assert!(db.get_packer_template(&outsider, "mac").is_err());

        let builder = user(&["DEV"], &["BUILD"]);
        assert_eq!(db.get_packer_templates(&builder, None).unwrap().len(), 2);
        assert_eq!(db.get_packer_template(&builder, "MACOS").unwrap().id, "mac");
    }

    #[test]
    fn internal_templates_are_protected() {
        let (_dir, db) = store();
        let mut internal = PackerTemplate::new("base", "Base");
        internal.internal = true;
        db.add_packer_template(&root(), internal.clone()).unwrap();

        let caller = user(&[], &[]);
        internal.description = "changed".into();
        assert!(matches!(
            db.update_packer_template(&caller, &internal),
            Err(CoreError::ProtectedInternalRecord { action: ProtectedAction::Update, .. })
        ));
        assert!(db.delete_packer_template(&caller, "base").is_err());

        let updated = db.update_packer_template(&root(), &internal).unwrap();
        assert_eq!(updated.description, "changed");
        db.delete_packer_template(&root(), "Base").unwrap();
        assert!(db.get_packer_templates(&root(), None).unwrap().is_empty());
    }
}
