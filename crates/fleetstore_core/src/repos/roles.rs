use super::{require, same_id};
use crate::context::ApiContext;
use crate::error::{CoreError, CoreResult, EntityKind, ProtectedAction};
use crate::models::{Document, Role, RoleUser};
use crate::query::{filter_by_property, Filter};
use crate::util::{normalize_upper, now_rfc3339};
use crate::JsonDatabase;

pub(crate) fn find_role<'a>(doc: &'a Document, id_or_name: &str) -> Option<&'a Role> {
    doc.roles
        .iter()
        .find(|r| same_id(&r.id, id_or_name) || same_id(&r.name, id_or_name))
}

/// Copy of `role` with the users currently holding it.
fn with_users(doc: &Document, role: &Role) -> Role {
    let mut role = role.clone();
    role.users = doc
        .users
        .iter()
        .filter(|u| u.has_role(&role.id))
        .map(|u| RoleUser {
            id: u.id.clone(),
            username: u.username.clone(),
        })
        .collect();
    role
}

impl JsonDatabase {
    /// Lists roles matching `filter`, each with the users holding it.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_roles(&self, _ctx: &ApiContext, filter: Option<&Filter>) -> CoreResult<Vec<Role>> {
        let roles = self.with_document(|doc| {
            doc.roles.iter().map(|r| with_users(doc, r)).collect::<Vec<_>>()
        })?;
        Ok(filter_by_property(roles, filter))
    }

    /// Finds a role by id or name, with the users holding it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no role matches.
    pub fn get_role(&self, _ctx: &ApiContext, id_or_name: &str) -> CoreResult<Role> {
        self.with_document(|doc| find_role(doc, id_or_name).map(|r| with_users(doc, r)))?
            .ok_or_else(|| CoreError::not_found(EntityKind::Role, id_or_name))
    }

    /// Stores a new role. Its id and name become the normalized uppercase
    /// name.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or when the role already exists.
    pub fn create_role(&self, ctx: &ApiContext, mut role: Role) -> CoreResult<Role> {
        require(EntityKind::Role, "name", &role.name)?;
        role.name = normalize_upper(&role.name);
        role.id.clone_from(&role.name);
        role.users.clear();
        let now = now_rfc3339();
        role.created_at.clone_from(&now);
        role.updated_at = now;

        let created = self.with_document_mut(|doc| {
            if find_role(doc, &role.id).is_some() {
                return Err(CoreError::already_exists(EntityKind::Role, role.id.clone()));
            }
            doc.roles.push(role.clone());
            Ok(role)
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("created role {}", created.id));
        Ok(created)
    }

    /// Renames a role and propagates the new name to every user holding it.
    /// The id does not change.
    ///
    /// # Errors
    ///
    /// Fails on an empty id or name, an unknown role, a name already used
    /// by another role, or an internal role when the caller is not root.
    pub fn update_role(&self, ctx: &ApiContext, role: &Role) -> CoreResult<Role> {
        require(EntityKind::Role, "id", &role.id)?;
        require(EntityKind::Role, "name", &role.name)?;
        let name = normalize_upper(&role.name);

        let updated = self.with_document_mut(|doc| {
            let taken = doc.roles.iter().any(|r| {
                !same_id(&r.id, &role.id) && (same_id(&r.id, &name) || same_id(&r.name, &name))
            });
            let stored = doc
                .roles
                .iter_mut()
                .find(|r| same_id(&r.id, &role.id))
                .ok_or_else(|| CoreError::not_found(EntityKind::Role, role.id.clone()))?;
            if stored.internal && !ctx.is_root() {
                return Err(CoreError::protected(
                    EntityKind::Role,
                    stored.id.clone(),
                    ProtectedAction::Update,
                ));
            }
            if taken {
                return Err(CoreError::already_exists(EntityKind::Role, name.clone()));
            }
            stored.name.clone_from(&name);
            stored.updated_at = now_rfc3339();
            let id = stored.id.clone();

            for user in &mut doc.users {
                for held in user.roles.iter_mut().filter(|r| same_id(&r.id, &id)) {
                    held.name.clone_from(&name);
                }
            }
            Ok(find_role(doc, &id).map(|r| with_users(doc, r)))
        })?;
        self.save(ctx)?;
        updated.ok_or_else(|| CoreError::not_found(EntityKind::Role, role.id.clone()))
    }

    /// Removes a role and strips it from every user.
    ///
    /// # Errors
    ///
    /// Fails on an empty key, an unknown role, or an internal role when the
    /// caller is not root.
    pub fn delete_role(&self, ctx: &ApiContext, id_or_name: &str) -> CoreResult<()> {
        require(EntityKind::Role, "id", id_or_name)?;
        let removed = self.with_document_mut(|doc| {
            let index = doc
                .roles
                .iter()
                .position(|r| same_id(&r.id, id_or_name) || same_id(&r.name, id_or_name))
                .ok_or_else(|| CoreError::not_found(EntityKind::Role, id_or_name))?;
            if doc.roles[index].internal && !ctx.is_root() {
                return Err(CoreError::protected(
                    EntityKind::Role,
                    doc.roles[index].id.clone(),
                    ProtectedAction::Delete,
                ));
            }
            let role = doc.roles.remove(index);
            for user in &mut doc.users {
                user.roles.retain(|r| !same_id(&r.id, &role.id));
            }
            Ok(role)
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("deleted role {}", removed.id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{root, store, user};
    use super::*;
    use crate::models::{RecordRef, User};

    fn seed_user(db: &JsonDatabase, id: &str, username: &str, roles: &[&str]) {
        db.with_document_mut(|doc| {
            let mut u = User::new(username, username, format!("{username}@example.com"));
            u.id = id.into();
            u.roles = roles.iter().map(|r| RecordRef::new(*r, *r)).collect();
            doc.users.push(u);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn getters_derive_users() {
        let (_dir, db) = store();
        db.create_role(&root(), Role::new("admin")).unwrap();
        db.create_role(&root(), Role::new("user")).unwrap();
        seed_user(&db, "u1", "alice", &["ADMIN", "USER"]);
        seed_user(&db, "u2", "bob", &["USER"]);

        let admin = db.get_role(&root(), "ADMIN").unwrap();
        assert_eq!(admin.users.len(), 1);
        assert_eq!(admin.users[0].username, "alice");

        let filter = Filter::new("id", "user");
        let roles = db.get_roles(&root(), Some(&filter)).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].users.len(), 2);
        // Derived users never reach the file.
        assert!(db.with_document(|d| d.roles.iter().all(|r| r.users.is_empty())).unwrap());
    }

    #[test]
    fn duplicate_and_protection() {
        let (_dir, db) = store();
        db.create_role(&root(), Role::new("SUPER_USER").internal()).unwrap();
        assert!(matches!(
            db.create_role(&root(), Role::new("super user")),
            Err(CoreError::AlreadyExists { kind: EntityKind::Role, .. })
        ));
        let caller = user(&["ADMIN"], &[]);
        assert!(matches!(
            db.delete_role(&caller, "SUPER_USER"),
            Err(CoreError::ProtectedInternalRecord { .. })
        ));
        assert!(db.get_role(&root(), "SUPER_USER").is_ok());
    }

    #[test]
    fn rename_and_cascade() {
        let (_dir, db) = store();
        db.create_role(&root(), Role::new("OPS")).unwrap();
        seed_user(&db, "u1", "alice", &["OPS"]);

        let mut role = db.get_role(&root(), "OPS").unwrap();
        role.name = "operators".into();
        let updated = db.update_role(&root(), &role).unwrap();
        assert_eq!(updated.id, "OPS");
        assert_eq!(updated.name, "OPERATORS");
        assert_eq!(updated.users.len(), 1);
        assert_eq!(
            db.with_document(|d| d.users[0].roles[0].name.clone()).unwrap(),
            "OPERATORS"
        );

        db.delete_role(&root(), "OPS").unwrap();
        assert!(db.with_document(|d| d.users[0].roles.is_empty()).unwrap());
        assert!(db.get_role(&root(), "OPS").unwrap_err().is_not_found(EntityKind::Role));
    }

    #[test]
    fn rename_refuses_a_taken_name() {
        let (_dir, db) = store();
        db.create_role(&root(), Role::new("admin")).unwrap();
        db.create_role(&root(), Role::new("user")).unwrap();
        seed_user(&db, "u1", "alice", &["ADMIN"]);

        let mut admin = db.get_role(&root(), "ADMIN").unwrap();
        admin.name = "user".into();
        assert!(matches!(
            db.update_role(&root(), &admin),
            Err(CoreError::AlreadyExists { kind: EntityKind::Role, .. })
        ));
        assert_eq!(db.get_role(&root(), "ADMIN").unwrap().name, "ADMIN");
        assert_eq!(
            db.with_document(|d| d.users[0].roles[0].name.clone()).unwrap(),
            "ADMIN"
        );
    }
}
