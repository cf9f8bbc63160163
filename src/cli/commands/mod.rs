//! CLI command implementations
//!
//! This module contains all CLI command implementations plus the exit-code
//! mapping they share.

pub mod compare;
pub mod export;
pub mod import;
pub mod init;
pub mod validate;

use crate::config::{load_config, ArborConfig};
use crate::core::services::Services;
use crate::domain::errors::{ArborError, StoreError};

/// Success
pub const EXIT_OK: i32 = 0;
/// Completed with warnings or a diverging comparison
pub const EXIT_WARNINGS: i32 = 1;
/// Configuration error
pub const EXIT_CONFIG: i32 = 2;
/// Validation or parse failure
pub const EXIT_INVALID: i32 = 3;
/// Store connection error
pub const EXIT_CONNECTION: i32 = 4;
/// Any other failure
pub const EXIT_FATAL: i32 = 5;
/// Stopped by SIGINT/SIGTERM
pub const EXIT_INTERRUPTED: i32 = 130;

/// Process exit code for a job-ending error
pub fn exit_code_for(error: &ArborError) -> i32 {
    match error.root() {
        ArborError::Config(_) => EXIT_CONFIG,
        ArborError::Parse(_) | ArborError::Validation(_) => EXIT_INVALID,
        ArborError::Store(StoreError::ConnectionFailed(_)) => EXIT_CONNECTION,
        ArborError::Cancelled => EXIT_INTERRUPTED,
        _ => EXIT_FATAL,
    }
}

/// Loads configuration and connects the stores
///
/// Failures are printed and returned as the exit code to use.
pub(crate) async fn prepare(
    config_path: &str,
    adjust: impl FnOnce(&mut ArborConfig),
) -> Result<Services, i32> {
    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Configuration could not be loaded");
            eprintln!("Configuration error: {e}");
            return Err(EXIT_CONFIG);
        }
    };

    adjust(&mut config);
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Configuration validation failed");
        eprintln!("Configuration validation failed: {e}");
        return Err(EXIT_CONFIG);
    }

    match Services::connect(config).await {
        Ok(services) => Ok(services),
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize stores");
            eprintln!("Failed to initialize: {e}");
            Err(match exit_code_for(&e) {
                EXIT_CONFIG => EXIT_CONFIG,
                _ => EXIT_CONNECTION,
            })
        }
    }
}
