//! Validate config command implementation
//!
//! This module implements the `validate-config` command. It checks the
//! configuration file, the compliance rules file and every schema artifact
//! in the schema directory, without connecting to the store.

use super::{EXIT_CONFIG, EXIT_OK};
use crate::config::schema::DatabaseTarget;
use crate::config::secret::redacted_connection_string;
use crate::config::{load_config, ArborConfig};
use crate::core::registry::ComplianceRules;
use crate::schema::{all_table_names, SchemaCatalog};
use clap::Args;
use std::time::Duration;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also parse every schema artifact in the schema directory
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub schemas: bool,
}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as well
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG);
            }
        };
        print_config(&config);

        let mut failures = 0;

        if config.compliance.enabled {
            if let Some(path) = &config.compliance.rules_path {
                match ComplianceRules::from_file(path) {
                    Ok(_) => println!("✅ Compliance rules: {path}"),
                    Err(e) => {
                        println!("❌ Compliance rules: {e}");
                        failures += 1;
                    }
                }
            }
        }

        if self.schemas {
            failures += check_schemas(&config).await;
        }

        println!();
        if failures > 0 {
            println!("❌ {failures} problem(s) found");
            Ok(EXIT_CONFIG)
        } else {
            Ok(EXIT_OK)
        }
    }
}

fn print_config(config: &ArborConfig) {
    println!();
    println!("Configuration Summary:");
    println!("  Log Level: {}", config.application.log_level);
    println!("  Dry Run: {}", config.application.dry_run);

    match config.database_target {
        DatabaseTarget::PostgreSQL => {
            if let Some(ref pg_config) = config.postgresql {
                println!("  Database Target: PostgreSQL");
                println!(
                    "  PostgreSQL Connection: {}",
                    redacted_connection_string(&pg_config.connection_string)
                );
                println!("  Max Connections: {}", pg_config.max_connections);
            }
        }
        DatabaseTarget::Memory => {
            println!("  Database Target: in-memory");
            if let Some(seed) = &config.memory.seed_path {
                println!("  Seed File: {seed}");
            }
        }
    }

    println!("  Schema Directory: {}", config.schema.config_dir);
    println!("  Output Directory: {}", config.export.output_dir);
    println!(
        "  Pages: {} rows, {} in parallel",
        config.export.page_size, config.export.parallel_pages
    );
    println!("  Null Policy: {:?}", config.export.null_policy);
    println!(
        "  Repeated Tags: {:?} (separator '{}')",
        config.import.repeated_tag_policy, config.import.join_separator
    );
    println!(
        "  Default Encoding: {} (BOM: {})",
        config.encoding.default_charset, config.encoding.default_bom
    );
    println!();
}

/// Loads every artifact, returning the number that failed
async fn check_schemas(config: &ArborConfig) -> usize {
    let catalog = SchemaCatalog::new(&config.schema.config_dir, Duration::from_secs(0));
    let ids = match catalog.list().await {
        Ok(ids) => ids,
        Err(e) => {
            println!("❌ Schema directory: {e}");
            return 1;
        }
    };

    if ids.is_empty() {
        println!("⚠️  No schema artifacts in {}", config.schema.config_dir);
        return 0;
    }

    let mut failures = 0;
    for id in ids {
        match catalog.load(&id).await {
            Ok(root) => {
                let tables = all_table_names(&root);
                println!("✅ Schema '{id}': {} table(s)", tables.len());
            }
            Err(e) => {
                println!("❌ Schema '{id}': {e}");
                failures += 1;
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, schema_dir: &std::path::Path) -> String {
        let path = dir.join("arbor.toml");
        std::fs::write(
            &path,
            format!(
                "database_target = \"memory\"\n\n[schema]\nconfig_dir = \"{}\"\n",
                schema_dir.display()
            ),
        )
        .unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_valid_config_and_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let schemas = dir.path().join("schemas");
        std::fs::create_dir_all(&schemas).unwrap();
        std::fs::write(
            schemas.join("item.toml"),
            "table_name = \"item\"\nroot_tag = \"items\"\nitem_tag = \"item\"\nsql = \"SELECT * FROM item\"\n",
        )
        .unwrap();
        let config = write_config(dir.path(), &schemas);

        let code = ValidateArgs { schemas: true }.execute(&config).await.unwrap();
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn test_broken_schema_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let schemas = dir.path().join("schemas");
        std::fs::create_dir_all(&schemas).unwrap();
        std::fs::write(schemas.join("item.toml"), "table_name = ").unwrap();
        let config = write_config(dir.path(), &schemas);

        let code = ValidateArgs { schemas: true }.execute(&config).await.unwrap();
        assert_eq!(code, EXIT_CONFIG);

        let code = ValidateArgs { schemas: false }.execute(&config).await.unwrap();
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn test_missing_config() {
        let code = ValidateArgs { schemas: true }
            .execute("/nonexistent/arbor.toml")
            .await
            .unwrap();
        assert_eq!(code, EXIT_CONFIG);
    }
}
