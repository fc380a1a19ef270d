use super::{require, same_id};
use crate::context::ApiContext;
use crate::crypto::sha256_hex;
use crate::error::{CoreError, CoreResult, EntityKind};
use crate::models::ApiKey;
use crate::query::{filter_by_property, Filter};
use crate::util::{generate_id, now_rfc3339};
use crate::JsonDatabase;

impl JsonDatabase {
    /// Lists API keys matching `filter`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_api_keys(&self, _ctx: &ApiContext, filter: Option<&Filter>) -> CoreResult<Vec<ApiKey>> {
        let keys = self.with_document(|doc| doc.api_keys.clone())?;
        Ok(filter_by_property(keys, filter))
    }

    /// Finds an API key by id, name or key value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no key matches.
    pub fn get_api_key(&self, _ctx: &ApiContext, id_or_name: &str) -> CoreResult<ApiKey> {
        self.with_document(|doc| {
            doc.api_keys
                .iter()
                .find(|k| k.matches_key(id_or_name))
                .cloned()
        })?
        .ok_or_else(|| CoreError::not_found(EntityKind::ApiKey, id_or_name))
    }

    /// Stores a new API key, hashing its secret.
    ///
    /// # Errors
    ///
    /// Fails on an empty name, key or secret, or when the id, name or key is
    /// already taken.
    pub fn create_api_key(&self, ctx: &ApiContext, mut key: ApiKey) -> CoreResult<ApiKey> {
        require(EntityKind::ApiKey, "name", &key.name)?;
        require(EntityKind::ApiKey, "key", &key.key)?;
        require(EntityKind::ApiKey, "secret", &key.secret)?;
        if key.id.is_empty() {
            key.id = generate_id();
        }
        key.secret = sha256_hex(&key.secret);
        let now = now_rfc3339();
        key.created_at.clone_from(&now);
        key.updated_at = now;

        let created = self.with_document_mut(|doc| {
            if let Some(existing) = doc.api_keys.iter().find(|k| {
                same_id(&k.id, &key.id) || same_id(&k.name, &key.name) || same_id(&k.key, &key.key)
            }) {
                return Err(CoreError::already_exists(EntityKind::ApiKey, existing.name.clone()));
            }
            doc.api_keys.push(key.clone());
            Ok(key)
        })?;

        self.save(ctx)?;
        ctx.log_info(format!("created api key {}", created.name));
        Ok(created)
    }

    /// Updates the revocation and expiry fields of a stored key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the id is unknown.
    pub fn update_api_key(&self, ctx: &ApiContext, key: &ApiKey) -> CoreResult<ApiKey> {
        let updated = self.with_document_mut(|doc| {
            let stored = doc
                .api_keys
                .iter_mut()
                .find(|k| same_id(&k.id, &key.id))
                .ok_or_else(|| CoreError::not_found(EntityKind::ApiKey, key.id.clone()))?;
            stored.revoked = key.revoked;
            stored.revoked_at.clone_from(&key.revoked_at);
            stored.expires_at.clone_from(&key.expires_at);
            stored.updated_at = now_rfc3339();
            Ok(stored.clone())
        })?;
        self.save(ctx)?;
        Ok(updated)
    }

    /// Revokes a key found by id, name or key value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no key matches.
    pub fn revoke_api_key(&self, ctx: &ApiContext, id_or_name: &str) -> CoreResult<ApiKey> {
        let mut key = self.get_api_key(ctx, id_or_name)?;
        key.revoked = true;
        key.revoked_at = now_rfc3339();
        let revoked = self.update_api_key(ctx, &key)?;
        ctx.log_info(format!("revoked api key {}", revoked.name));
        Ok(revoked)
    }

    /// Removes a key found by id, name or key value.
    ///
    /// The record lock is held while the key is removed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no key matches.
    pub fn delete_api_key(&self, ctx: &ApiContext, id_or_name: &str) -> CoreResult<()> {
        let key = self.get_api_key(ctx, id_or_name)?;
        {
            let _guard = self.lock_record(ctx, EntityKind::ApiKey, &key.id)?;
            self.with_document_mut(|doc| {
                let before = doc.api_keys.len();
                doc.api_keys.retain(|k| !same_id(&k.id, &key.id));
                if doc.api_keys.len() == before {
                    return Err(CoreError::not_found(EntityKind::ApiKey, id_or_name));
                }
                Ok(())
            })?;
        }
        self.save(ctx)?;
        ctx.log_info(format!("deleted api key {}", key.name));
        Ok(())
    }
}
