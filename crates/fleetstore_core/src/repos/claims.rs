use super::{require, same_id};
use crate::context::ApiContext;
use crate::error::{CoreError, CoreResult, EntityKind, ProtectedAction};
use crate::models::{Claim, Document};
use crate::query::{filter_by_property, Filter};
use crate::util::{normalize_upper, now_rfc3339};
use crate::JsonDatabase;

pub(crate) fn find_claim<'a>(doc: &'a Document, id_or_name: &str) -> Option<&'a Claim> {
    doc.claims
        .iter()
        .find(|c| same_id(&c.id, id_or_name) || same_id(&c.name, id_or_name))
}

impl JsonDatabase {
    /// Lists claims matching `filter`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_claims(&self, _ctx: &ApiContext, filter: Option<&Filter>) -> CoreResult<Vec<Claim>> {
        let claims = self.with_document(|doc| doc.claims.clone())?;
        Ok(filter_by_property(claims, filter))
    }

    /// Finds a claim by id or name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no claim matches.
    pub fn get_claim(&self, _ctx: &ApiContext, id_or_name: &str) -> CoreResult<Claim> {
        self.with_document(|doc| find_claim(doc, id_or_name).cloned())?
            .ok_or_else(|| CoreError::not_found(EntityKind::Claim, id_or_name))
    }

    /// Stores a new claim. Its id and name become the normalized uppercase
    /// name.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or when the claim already exists.
    pub fn create_claim(&self, ctx: &ApiContext, mut claim: Claim) -> CoreResult<Claim> {
        require(EntityKind::Claim, "name", &claim.name)?;
        claim.name = normalize_upper(&claim.name);
        claim.id.clone_from(&claim.name);
        let now = now_rfc3339();
        claim.created_at.clone_from(&now);
        claim.updated_at = now;

        let created = self.with_document_mut(|doc| {
            if find_claim(doc, &claim.id).is_some() {
                return Err(CoreError::already_exists(EntityKind::Claim, claim.id.clone()));
            }
            doc.claims.push(claim.clone());
            Ok(claim)
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("created claim {}", created.id));
        Ok(created)
    }

    /// Renames a claim and propagates the new name to every user holding it.
    /// The id does not change.
    ///
    /// # Errors
    ///
    /// Fails on an empty id or name, an unknown claim, a name already used
    /// by another claim, or an internal claim when the caller is not root.
    pub fn update_claim(&self, ctx: &ApiContext, claim: &Claim) -> CoreResult<Claim> {
        require(EntityKind::Claim, "id", &claim.id)?;
        require(EntityKind::Claim, "name", &claim.name)?;
        let name = normalize_upper(&claim.name);

        let updated = self.with_document_mut(|doc| {
            let taken = doc.claims.iter().any(|c| {
                !same_id(&c.id, &claim.id) && (same_id(&c.id, &name) || same_id(&c.name, &name))
            });
            let stored = doc
                .claims
                .iter_mut()
                .find(|c| same_id(&c.id, &claim.id))
                .ok_or_else(|| CoreError::not_found(EntityKind::Claim, claim.id.clone()))?;
            if stored.internal && !ctx.is_root() {
                return Err(CoreError::protected(
                    EntityKind::Claim,
                    stored.id.clone(),
                    ProtectedAction::Update,
                ));
            }
            if taken {
                return Err(CoreError::already_exists(EntityKind::Claim, name.clone()));
            }
            stored.name.clone_from(&name);
            stored.updated_at = now_rfc3339();
            let updated = stored.clone();

            for user in &mut doc.users {
                for held in user.claims.iter_mut().filter(|c| same_id(&c.id, &updated.id)) {
                    held.name.clone_from(&updated.name);
                }
            }
            Ok(updated)
        })?;
        self.save(ctx)?;
        Ok(updated)
    }

    /// Removes a claim and strips it from every user.
    ///
    /// # Errors
    ///
    /// Fails on an empty key, an unknown claim, or an internal claim when the
    /// caller is not root.
    pub fn delete_claim(&self, ctx: &ApiContext, id_or_name: &str) -> CoreResult<()> {
        require(EntityKind::Claim, "id", id_or_name)?;
        let removed = self.with_document_mut(|doc| {
            let index = doc
                .claims
                .iter()
                .position(|c| same_id(&c.id, id_or_name) || same_id(&c.name, id_or_name))
                .ok_or_else(|| CoreError::not_found(EntityKind::Claim, id_or_name))?;
            if doc.claims[index].internal && !ctx.is_root() {
                return Err(CoreError::protected(
                    EntityKind::Claim,
                    doc.claims[index].id.clone(),
                    ProtectedAction::Delete,
                ));
            }
            let claim = doc.claims.remove(index);
            for user in &mut doc.users {
                user.claims.retain(|c| !same_id(&c.id, &claim.id));
            }
            Ok(claim)
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("deleted claim {}", removed.id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{root, store, user};
    use super::*;
    use crate::models::{RecordRef, User};

    #[test]
    fn create_normalizes_name() {
        let (_dir, db) = store();
        let claim = db.create_claim(&root(), Claim::new(" list vm ")).unwrap();
        assert_eq!(claim.id, "LIST_VM");
        assert_eq!(claim.name, "LIST_VM");
        assert!(db.get_claim(&root(), "list_vm").is_ok());
        assert!(matches!(
            db.create_claim(&root(), Claim::new("LIST-VM")),
            Err(CoreError::AlreadyExists { .. })
        ));
        assert!(matches!(
            db.create_claim(&root(), Claim::new("")),
            Err(CoreError::EmptyRequiredField { .. })
        ));
    }

    #[test]
    fn internal_claims_are_protected() {
        let (_dir, db) = store();
        db.create_claim(&root(), Claim::new("SYSTEM").internal()).unwrap();
        let caller = user(&["ADMIN"], &[]);

        let mut renamed = db.get_claim(&root(), "SYSTEM").unwrap();
        renamed.name = "OTHER".into();
        let err = db.update_claim(&caller, &renamed).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ProtectedInternalRecord { action: ProtectedAction::Update, .. }
        ));
        assert!(matches!(
            db.delete_claim(&caller, "SYSTEM"),
            Err(CoreError::ProtectedInternalRecord { action: ProtectedAction::Delete, .. })
        ));
        db.delete_claim(&root(), "SYSTEM").unwrap();
    }

    #[test]
    fn rename_propagates_and_delete_cascades() {
        let (_dir, db) = store();
        db.create_claim(&root(), Claim::new("READER")).unwrap();
        db.with_document_mut(|doc| {
            let mut u = User::new("alice", "Alice", "alice@example.com");
            u.id = "u1".into();
            u.claims.push(RecordRef::new("READER", "READER"));
            doc.users.push(u);
            Ok(())
        })
        .unwrap();

        let mut claim = db.get_claim(&root(), "READER").unwrap();
        claim.name = "book reader".into();
        let updated = db.update_claim(&root(), &claim).unwrap();
        assert_eq!(updated.id, "READER");
        assert_eq!(updated.name, "BOOK_READER");
        let held = db.with_document(|d| d.users[0].claims.clone()).unwrap();
        assert_eq!(held, vec![RecordRef::new("READER", "BOOK_READER")]);

        db.delete_claim(&root(), "book_reader").unwrap();
        assert!(db.with_document(|d| d.users[0].claims.is_empty()).unwrap());
        assert!(db.get_claims(&root(), None).unwrap().is_empty());
    }

    #[test]
    fn rename_refuses_a_taken_name() {
        let (_dir, db) = store();
        db.create_claim(&root(), Claim::new("alpha")).unwrap();
        db.create_claim(&root(), Claim::new("beta")).unwrap();

        let mut alpha = db.get_claim(&root(), "ALPHA").unwrap();
        alpha.name = "beta".into();
        assert!(matches!(
            db.update_claim(&root(), &alpha),
            Err(CoreError::AlreadyExists { kind: EntityKind::Claim, .. })
        ));
        assert_eq!(db.get_claim(&root(), "ALPHA").unwrap().name, "ALPHA");

        // A renamed claim still owns its id.
        alpha.name = "gamma".into();
        db.update_claim(&root(), &alpha).unwrap();
        let mut beta = db.get_claim(&root(), "BETA").unwrap();
        beta.name = "alpha".into();
        assert!(matches!(
            db.update_claim(&root(), &beta),
            Err(CoreError::AlreadyExists { .. })
        ));

        // Renaming back to its own id is fine.
        alpha.name = "alpha".into();
        assert_eq!(db.update_claim(&root(), &alpha).unwrap().name, "ALPHA");
    }
}
