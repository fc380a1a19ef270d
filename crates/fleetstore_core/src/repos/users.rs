use super::claims::find_claim;
use super::roles::find_role;
use super::{require, same_id};
use crate::context::{ApiContext, DEFAULT_CLAIMS, DEFAULT_ROLES};
use crate::crypto::sha256_hex;
use crate::error::{CoreError, CoreResult, EntityKind, ProtectedAction};
use crate::models::{Document, RecordRef, User};
use crate::query::{filter_by_property, Filter};
use crate::util::{generate_id, now_rfc3339};
use crate::JsonDatabase;

fn find_user_mut<'a>(doc: &'a mut Document, key: &str) -> CoreResult<&'a mut User> {
    doc.users
        .iter_mut()
        .find(|u| u.matches_key(key))
        .ok_or_else(|| CoreError::not_found(EntityKind::User, key))
}

/// Resolves requested role references against the stored roles.
fn resolve_roles(doc: &Document, refs: &[RecordRef]) -> CoreResult<Vec<RecordRef>> {
    refs.iter()
        .map(|r| {
            find_role(doc, &r.id)
                .or_else(|| find_role(doc, &r.name))
                .map(|role| RecordRef::new(role.id.clone(), role.name.clone()))
                .ok_or_else(|| CoreError::dependency_missing(EntityKind::Role, r.id.clone()))
        })
        .collect()
}

fn resolve_claims(doc: &Document, refs: &[RecordRef]) -> CoreResult<Vec<RecordRef>> {
    refs.iter()
        .map(|c| {
            find_claim(doc, &c.id)
                .or_else(|| find_claim(doc, &c.name))
                .map(|claim| RecordRef::new(claim.id.clone(), claim.name.clone()))
                .ok_or_else(|| CoreError::dependency_missing(EntityKind::Claim, c.id.clone()))
        })
        .collect()
}

impl JsonDatabase {
    /// Lists users matching `filter`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_users(&self, _ctx: &ApiContext, filter: Option<&Filter>) -> CoreResult<Vec<User>> {
        let users = self.with_document(|doc| doc.users.clone())?;
        Ok(filter_by_property(users, filter))
    }

    /// Finds a user by id, email or username.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no user matches.
    pub fn get_user(&self, _ctx: &ApiContext, key: &str) -> CoreResult<User> {
        self.with_document(|doc| doc.users.iter().find(|u| u.matches_key(key)).cloned())?
            .ok_or_else(|| CoreError::not_found(EntityKind::User, key))
    }

    /// Stores a new user.
    ///
    /// The password is hashed. Requested roles and claims must exist; a user
    /// asking for none gets whichever of the default roles and claims exist.
    ///
    /// # Errors
    ///
    /// Fails on an empty email, username or name, a duplicate id, email or
    /// username, or a missing role or claim.
    pub fn create_user(&self, ctx: &ApiContext, mut user: User) -> CoreResult<User> {
        require(EntityKind::User, "email", &user.email)?;
        require(EntityKind::User, "username", &user.username)?;
        require(EntityKind::User, "name", &user.name)?;
        if user.id.is_empty() {
            user.id = generate_id();
        }
        if !user.password.is_empty() {
            user.password = sha256_hex(&user.password);
        }
        let now = now_rfc3339();
        user.created_at.clone_from(&now);
        user.updated_at = now;
        user.lock.unlock();

        let created = self.with_document_mut(|doc| {
            let taken = doc.users.iter().find(|u| {
                same_id(&u.id, &user.id)
                    || same_id(&u.email, &user.email)
                    || same_id(&u.username, &user.username)
            });
            if let Some(existing) = taken {
                return Err(CoreError::already_exists(EntityKind::User, existing.username.clone()));
            }

            user.roles = if user.roles.is_empty() {
                DEFAULT_ROLES
                    .iter()
                    .filter_map(|id| find_role(doc, id))
                    .map(|r| RecordRef::new(r.id.clone(), r.name.clone()))
                    .collect()
            } else {
                resolve_roles(doc, &user.roles)?
            };
            user.claims = if user.claims.is_empty() {
                DEFAULT_CLAIMS
                    .iter()
                    .filter_map(|id| find_claim(doc, id))
                    .map(|c| RecordRef::new(c.id.clone(), c.name.clone()))
                    .collect()
            } else {
                resolve_claims(doc, &user.claims)?
            };

            doc.users.push(user.clone());
            Ok(user)
        })?;
        self.save(ctx)?;
        ctx.log_info(format!("created user {}", created.username));
        Ok(created)
    }

    /// Updates name, email and password. Empty fields keep their value.
    ///
    /// # Errors
    ///
    /// Fails for an unknown or root user, or an email taken by another user.
    pub fn update_user(&self, ctx: &ApiContext, user: &User) -> CoreResult<User> {
        require(EntityKind::User, "id", &user.id)?;
        let updated = self.with_document_mut(|doc| {
            if !user.email.is_empty()
                && doc
                    .users
                    .iter()
                    .any(|u| same_id(&u.email, &user.email) && !same_id(&u.id, &user.id))
            {
                return Err(CoreError::already_exists(EntityKind::User, user.email.clone()));
            }
            let stored = find_user_mut(doc, &user.id)?;
            if stored.is_root() {
                return Err(CoreError::protected(
                    EntityKind::User,
                    stored.username.clone(),
                    ProtectedAction::Update,
                ));
            }
            if !user.name.is_empty() {
                stored.name.clone_from(&user.name);
            }
            if !user.email.is_empty() {
                stored.email.clone_from(&user.email);
            }
            if !user.password.is_empty() {
                stored.password = sha256_hex(&user.password);
            }
            stored.updated_at = now_rfc3339();
            Ok(stored.clone())
        })?;
        self.save(ctx)?;
        Ok(updated)
    }

    /// Sets the blocked flag, reason and failed sign-in counter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown user.
    pub fn update_user_block_status(&self, ctx: &ApiContext, user: &User) -> CoreResult<User> {
        require(EntityKind::User, "id", &user.id)?;
        let updated = self.with_document_mut(|doc| {
            let stored = find_user_mut(doc, &user.id)?;
            stored.blocked = user.blocked;
            stored.blocked_reason.clone_from(&user.blocked_reason);
            stored.failed_login_attempts = user.failed_login_attempts;
            stored.updated_at = now_rfc3339();
            Ok(stored.clone())
        })?;
        self.save(ctx)?;
        if updated.blocked {
            ctx.log_warn(format!("user {} blocked: {}", updated.username, updated.blocked_reason));
        }
        Ok(updated)
    }

    /// Sets the password of the built-in root account.
    ///
    /// # Errors
    ///
    /// Fails on an empty password or when no root account is stored.
    pub fn update_root_password(&self, ctx: &ApiContext, password: &str) -> CoreResult<()> {
        require(EntityKind::User, "password", password)?;
        self.with_document_mut(|doc| {
            let root = doc
                .users
                .iter_mut()
                .find(|u| u.is_root())
                .ok_or_else(|| CoreError::not_found(EntityKind::User, "root"))?;
            root.password = sha256_hex(password);
            root.updated_at = now_rfc3339();
            Ok(())
        })?;
        self.save(ctx)?;
        ctx.log_info("root password updated");
        Ok(())
    }

    /// Removes a user. The record lock is held during removal.
    ///
    /// # Errors
    ///
    /// Fails for an unknown or root user.
    pub fn delete_user(&self, ctx: &ApiContext, key: &str) -> CoreResult<()> {
        let user = self.get_user(ctx, key)?;
        if user.is_root() {
            return Err(CoreError::protected(
                EntityKind::User,
                user.username,
                ProtectedAction::Delete,
            ));
        }
        {
            let _guard = self.lock_record(ctx, EntityKind::User, &user.id)?;
            self.with_document_mut(|doc| {
                let before = doc.users.len();
                doc.users.retain(|u| !same_id(&u.id, &user.id));
                if doc.users.len() == before {
                    return Err(CoreError::not_found(EntityKind::User, key));
                }
                Ok(())
            })?;
        }
        self.save(ctx)?;
        ctx.log_info(format!("deleted user {}", user.username));
        Ok(())
    }

    /// Grants a stored role to a user.
    ///
    /// # Errors
    ///
    /// Fails for an unknown user, a missing role or a role already held.
    pub fn add_role_to_user(&self, ctx: &ApiContext, user_key: &str, role: &str) -> CoreResult<User> {
        let updated = self.with_document_mut(|doc| {
            let role = find_role(doc, role)
                .map(|r| RecordRef::new(r.id.clone(), r.name.clone()))
                .ok_or_else(|| CoreError::dependency_missing(EntityKind::Role, role))?;
            let user = find_user_mut(doc, user_key)?;
            if user.has_role(&role.id) {
                return Err(CoreError::already_exists(EntityKind::Role, role.id));
            }
            user.roles.push(role);
            user.updated_at = now_rfc3339();
            Ok(user.clone())
        })?;
        self.save(ctx)?;
        Ok(updated)
    }

    /// Revokes a role from a user.
    ///
    /// # Errors
    ///
    /// Fails for an unknown user or a role the user does not hold.
    pub fn remove_role_from_user(
        &self,
        ctx: &ApiContext,
        user_key: &str,
        role: &str,
    ) -> CoreResult<User> {
        let updated = self.with_document_mut(|doc| {
            let user = find_user_mut(doc, user_key)?;
            let index = user
                .roles
                .iter()
                .position(|r| same_id(&r.id, role) || same_id(&r.name, role))
                .ok_or_else(|| CoreError::dependency_missing(EntityKind::Role, role))?;
            user.roles.remove(index);
            user.updated_at = now_rfc3339();
            Ok(user.clone())
        })?;
        self.save(ctx)?;
        Ok(updated)
    }

    /// Grants a stored claim to a user.
    ///
    /// # Errors
    ///
    /// Fails for an unknown user, a missing claim or a claim already held.
    pub fn add_claim_to_user(
        &self,
        ctx: &ApiContext,
        user_key: &str,
        claim: &str,
    ) -> CoreResult<User> {
        let updated = self.with_document_mut(|doc| {
            let claim = find_claim(doc, claim)
                .map(|c| RecordRef::new(c.id.clone(), c.name.clone()))
                .ok_or_else(|| CoreError::dependency_missing(EntityKind::Claim, claim))?;
            let user = find_user_mut(doc, user_key)?;
            if user.has_claim(&claim.id) {
                return Err(CoreError::already_exists(EntityKind::Claim, claim.id));
            }
            user.claims.push(claim);
            user.updated_at = now_rfc3339();
            Ok(user.clone())
        })?;
        self.save(ctx)?;
        Ok(updated)
    }

    /// Revokes a claim from a user.
    ///
    /// # Errors
    ///
    /// Fails for an unknown user or a claim the user does not hold.
    pub fn remove_claim_from_user(
        &self,
        ctx: &ApiContext,
        user_key: &str,
        claim: &str,
    ) -> CoreResult<User> {
        let updated = self.with_document_mut(|doc| {
            let user = find_user_mut(doc, user_key)?;
            let index = user
                .claims
                .iter()
                .position(|c| same_id(&c.id, claim) || same_id(&c.name, claim))
                .ok_or_else(|| CoreError::dependency_missing(EntityKind::Claim, claim))?;
            user.claims.remove(index);
            user.updated_at = now_rfc3339();
            Ok(user.clone())
        })?;
        self.save(ctx)?;
        Ok(updated)
    }
}
