//! Process-wide collaborators shared by the pipelines
//!
//! One [`Services`] is built per process from configuration and handed to
//! every coordinator. Everything inside is `Arc`-shared; the caches it owns
//! (schema artifacts, field order, encoding metadata) are invalidated
//! explicitly, never globally.

use crate::adapters::database::{create_stores, Stores};
use crate::config::ArborConfig;
use crate::core::compliance::ComplianceFilter;
use crate::core::encoding::{Charset, EncodingRegistry};
use crate::core::locks::TableLocks;
use crate::core::registry::{ComplianceRules, FieldRegistry};
use crate::domain::errors::ConfigError;
use crate::domain::Result;
use crate::schema::SchemaCatalog;
use std::sync::Arc;
use std::time::Duration;

/// Registries, stores and locks of one process
#[derive(Clone)]
pub struct Services {
    pub config: Arc<ArborConfig>,
    pub stores: Stores,
    pub catalog: Arc<SchemaCatalog>,
    pub registry: Arc<FieldRegistry>,
    pub encodings: Arc<EncodingRegistry>,
    pub locks: Arc<TableLocks>,
}

impl Services {
    /// Connects the configured stores and builds every registry
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unreadable rules file or an
    /// unknown default charset, or a store error if the backend can't be
    /// set up.
    pub async fn connect(config: ArborConfig) -> Result<Self> {
        let stores = create_stores(&config).await?;
        Self::with_stores(config, stores)
    }

    /// Builds the registries over already created stores
    ///
    /// # Errors
    ///
    /// See [`Services::connect`].
    pub fn with_stores(config: ArborConfig, stores: Stores) -> Result<Self> {
        let rules = match (&config.compliance.rules_path, config.compliance.enabled) {
            (Some(path), true) => ComplianceRules::from_file(path)?,
            _ => ComplianceRules::new(),
        };

        let charset = Charset::from_label(&config.encoding.default_charset).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "Unknown default charset '{}'",
                config.encoding.default_charset
            ))
        })?;

        let catalog = SchemaCatalog::new(
            &config.schema.config_dir,
            Duration::from_secs(config.schema.cache_ttl_seconds),
        );
        let registry = FieldRegistry::new(stores.relational.clone(), rules);
        let encodings =
            EncodingRegistry::new(stores.encoding.clone(), charset, config.encoding.default_bom);

        tracing::debug!(
            backend = stores.relational.backend_name(),
            schema_dir = %config.schema.config_dir,
            compliance = config.compliance.enabled,
            "Services initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            stores,
            catalog: Arc::new(catalog),
            registry: Arc::new(registry),
            encodings: Arc::new(encodings),
            locks: Arc::new(TableLocks::new()),
        })
    }

    /// Compliance filter over the shared registry
    pub fn compliance_filter(&self) -> ComplianceFilter {
        ComplianceFilter::new(self.registry.clone(), self.config.compliance.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::config::load_config_str;

    #[test]
    fn test_rules_ignored_when_compliance_disabled() {
        let mut config = load_config_str("database_target = \"memory\"").unwrap();
        config.compliance.enabled = false;
        config.compliance.rules_path = Some("/nonexistent/rules.toml".to_string());

        let services =
            Services::with_stores(config, Stores::in_memory(Arc::new(MemoryStore::new()))).unwrap();
        assert!(services.registry.rules().is_empty());
        assert!(!services.compliance_filter().is_enabled());
    }

    #[test]
    fn test_missing_rules_file_is_an_error() {
        let mut config = load_config_str("database_target = \"memory\"").unwrap();
        config.compliance.rules_path = Some("/nonexistent/rules.toml".to_string());
        let result = Services::with_stores(config, Stores::in_memory(Arc::new(MemoryStore::new())));
        assert!(result.is_err());
    }
}
