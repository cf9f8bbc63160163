//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{ArborConfig, DatabaseTarget, PostgreSQLConfig};
use super::secret::secret_string;
use crate::domain::errors::{ArborError, ConfigError};
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ArborConfig
/// 4. Applies environment variable overrides (ARBOR_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`ArborError::Config`] if the file is missing or unreadable, a
/// referenced environment variable is unset, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use arbor::config::loader::load_config;
///
/// let config = load_config("arbor.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ArborConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::Missing(path.display().to_string()).into());
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ConfigError::Unreadable(format!(
            "Failed to read configuration file {}: {e}",
            path.display()
        ))
    })?;

    load_config_str(&contents)
}

/// Same as [`load_config`] for configuration text already in memory
pub fn load_config_str(contents: &str) -> Result<ArborConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: ArborConfig = toml::from_str(&contents)?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ArborError::from(ConfigError::Invalid(format!(
            "Configuration validation failed: {e}"
        )))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ConfigError::Invalid(format!("substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|m| m == name) {
                        missing_vars.push(name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        ))
        .into());
    }

    Ok(result)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_enum<T: serde::de::DeserializeOwned>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
            .map(Some)
            .map_err(|e| ConfigError::Invalid(format!("{name}: {e}")).into()),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using ARBOR_* prefix
///
/// Environment variables follow the pattern: ARBOR_<SECTION>_<KEY>
/// For example: ARBOR_EXPORT_PAGE_SIZE, ARBOR_IMPORT_BATCH_SIZE
fn apply_env_overrides(config: &mut ArborConfig) -> Result<()> {
    // Application
    if let Ok(val) = std::env::var("ARBOR_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_parse("ARBOR_APPLICATION_DRY_RUN") {
        config.application.dry_run = val;
    }

    // Store selection
    if let Some(target) = env_enum::<DatabaseTarget>("ARBOR_DATABASE_TARGET")? {
        config.database_target = target;
    }

    // PostgreSQL; a connection string alone is enough to create the section
    if let Ok(val) = std::env::var("ARBOR_POSTGRESQL_CONNECTION_STRING") {
        match config.postgresql.as_mut() {
            Some(pg) => pg.connection_string = secret_string(val),
            None => {
                config.postgresql = Some(PostgreSQLConfig {
                    connection_string: secret_string(val),
                    max_connections: 10,
                    connection_timeout_seconds: 30,
                    statement_timeout_seconds: 60,
                })
            }
        }
    }
    if let Some(pg) = config.postgresql.as_mut() {
        if let Some(val) = env_parse("ARBOR_POSTGRESQL_MAX_CONNECTIONS") {
            pg.max_connections = val;
        }
    }

    // Schema
    if let Ok(val) = std::env::var("ARBOR_SCHEMA_CONFIG_DIR") {
        config.schema.config_dir = val;
    }
    if let Some(val) = env_parse("ARBOR_SCHEMA_CACHE_TTL_SECONDS") {
        config.schema.cache_ttl_seconds = val;
    }

    // Export
    if let Ok(val) = std::env::var("ARBOR_EXPORT_OUTPUT_DIR") {
        config.export.output_dir = val;
    }
    if let Some(val) = env_parse("ARBOR_EXPORT_PAGE_SIZE") {
        config.export.page_size = val;
    }
    if let Some(val) = env_parse("ARBOR_EXPORT_PARALLEL_PAGES") {
        config.export.parallel_pages = val;
    }
    if let Some(policy) = env_enum("ARBOR_EXPORT_NULL_POLICY")? {
        config.export.null_policy = policy;
    }

    // Import
    if let Some(val) = env_parse("ARBOR_IMPORT_BATCH_SIZE") {
        config.import.batch_size = val;
    }
    if let Some(policy) = env_enum("ARBOR_IMPORT_REPEATED_TAG_POLICY")? {
        config.import.repeated_tag_policy = policy;
    }
    if let Ok(val) = std::env::var("ARBOR_IMPORT_JOIN_SEPARATOR") {
        config.import.join_separator = val;
    }
    if let Some(val) = env_parse("ARBOR_IMPORT_AUTO_WIDEN") {
        config.import.auto_widen = val;
    }
    if let Some(val) = env_parse("ARBOR_IMPORT_VERIFY_ROUNDTRIP") {
        config.import.verify_roundtrip = val;
    }

    // Encoding
    if let Ok(val) = std::env::var("ARBOR_ENCODING_DEFAULT_CHARSET") {
        config.encoding.default_charset = val;
    }
    if let Ok(val) = std::env::var("ARBOR_ENCODING_METADATA_PATH") {
        config.encoding.metadata_path = val;
    }

    // Compliance
    if let Some(val) = env_parse("ARBOR_COMPLIANCE_ENABLED") {
        config.compliance.enabled = val;
    }
    if let Ok(val) = std::env::var("ARBOR_COMPLIANCE_RULES_PATH") {
        config.compliance.rules_path = Some(val);
    }

    // Logging
    if let Some(val) = env_parse("ARBOR_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("ARBOR_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::NullPolicy;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Environment variables are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_substitute_env_vars() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("ARBOR_TEST_VAR", "test_value");
        let result = substitute_env_vars("password = \"${ARBOR_TEST_VAR}\"").unwrap();
        assert_eq!(result, "password = \"test_value\"\n");
        std::env::remove_var("ARBOR_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::remove_var("ARBOR_MISSING_VAR");
        let err = substitute_env_vars("password = \"${ARBOR_MISSING_VAR}\"").unwrap_err();
        assert!(err.to_string().contains("ARBOR_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_skips_comments() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::remove_var("ARBOR_COMMENTED_VAR");
        let result = substitute_env_vars("# uses ${ARBOR_COMMENTED_VAR}\nx = 1").unwrap();
        assert!(result.contains("${ARBOR_COMMENTED_VAR}"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("nonexistent.toml").unwrap_err();
        assert!(matches!(err, ArborError::Config(ConfigError::Missing(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
database_target = "memory"

[application]
log_level = "debug"

[export]
page_size = 250
null_policy = "omit"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.export.page_size, 250);
        assert_eq!(config.export.null_policy, NullPolicy::Omit);
    }

    #[test]
    fn test_env_override_wins() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("ARBOR_EXPORT_PAGE_SIZE", "42");
        std::env::set_var("ARBOR_EXPORT_NULL_POLICY", "OMIT");
        let config = load_config_str("database_target = \"memory\"");
        std::env::remove_var("ARBOR_EXPORT_PAGE_SIZE");
        std::env::remove_var("ARBOR_EXPORT_NULL_POLICY");

        let config = config.unwrap();
        assert_eq!(config.export.page_size, 42);
        assert_eq!(config.export.null_policy, NullPolicy::Omit);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let err = load_config_str("database_target = \"postgresql\"").unwrap_err();
        assert!(err.to_string().contains("postgresql configuration is required"));
    }
}
