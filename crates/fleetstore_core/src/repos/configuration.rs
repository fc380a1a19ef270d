use super::require;
use crate::context::ApiContext;
use crate::error::{CoreError, CoreResult, EntityKind};
use crate::models::{Configuration, Document};
use crate::util::generate_service_id;
use crate::JsonDatabase;

/// Returns the configuration, creating it with a fresh service id when the
/// document has none. The flag reports whether anything was created.
fn ensure_configuration(doc: &mut Document) -> (&mut Configuration, bool) {
    let created = doc.configuration.is_none();
    let config = doc.configuration.get_or_insert_with(|| Configuration {
        id: generate_service_id(),
    });
    (config, created)
}

impl JsonDatabase {
    fn configuration_with<T>(
        &self,
        ctx: &ApiContext,
        f: impl FnOnce(&mut Configuration) -> CoreResult<(T, bool)>,
    ) -> CoreResult<T> {
        let (value, changed) = self.with_document_mut_if(|doc| {
            let (config, created) = ensure_configuration(doc);
            let (value, changed) = f(config)?;
            Ok((value, created || changed))
        })?;
        if changed {
            self.save(ctx)?;
        }
        Ok(value)
    }

    /// Returns the service configuration, creating it on first use.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or the first write fails.
    pub fn get_configuration(&self, ctx: &ApiContext) -> CoreResult<Configuration> {
        self.configuration_with(ctx, |config| Ok((config.clone(), false)))
    }

    /// Returns the service id, creating the configuration on first use.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or the first write fails.
    pub fn get_id(&self, ctx: &ApiContext) -> CoreResult<String> {
        self.configuration_with(ctx, |config| Ok((config.id.clone(), false)))
    }

    /// Returns the service id, generating one when the stored id is empty.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or the write fails.
    pub fn seed_id(&self, ctx: &ApiContext) -> CoreResult<String> {
        self.configuration_with(ctx, |config| {
            if config.id.is_empty() {
                config.id = generate_service_id();
                return Ok((config.id.clone(), true));
            }
            Ok((config.id.clone(), false))
        })
    }

    /// Sets the service id once.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] when an id is already set.
    pub fn set_id(&self, ctx: &ApiContext, id: &str) -> CoreResult<String> {
        require(EntityKind::Configuration, "id", id)?;
        let id = self.with_document_mut(|doc| {
            let config = doc.configuration.get_or_insert_with(Configuration::default);
            if !config.id.is_empty() {
                return Err(CoreError::invalid_operation("ID already exists"));
            }
            config.id = id.to_string();
            Ok(config.id.clone())
        })?;
        self.save(ctx)?;
        ctx.log_info("service id set");
        Ok(id)
    }
}
