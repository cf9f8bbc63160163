//! Compare command implementation
//!
//! Compares two documents, or a document against one regenerated from the
//! store, under round-trip equivalence.

use super::{exit_code_for, prepare, EXIT_INVALID, EXIT_OK, EXIT_WARNINGS};
use crate::core::export::{ExportCoordinator, ExportJob};
use crate::core::verification::{compare_documents, ComparisonReport};
use crate::domain::ids::Variant;
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;

/// Arguments for the compare command
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Original document
    pub original: PathBuf,

    /// Document to compare against (omit together with --table to regenerate)
    #[arg(required_unless_present = "table")]
    pub regenerated: Option<PathBuf>,

    /// Regenerate the second document from this table instead of a file
    #[arg(long, conflicts_with = "regenerated")]
    pub table: Option<String>,

    /// Variant used when regenerating
    #[arg(long, requires = "table")]
    pub variant: Option<String>,

    /// Differences printed per category
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

impl CompareArgs {
    /// Execute the compare command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(original = %self.original.display(), "Starting compare command");

        let original = match tokio::fs::read(&self.original).await {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Failed to read {}: {e}", self.original.display());
                return Ok(EXIT_INVALID);
            }
        };

        let regenerated = match (&self.regenerated, &self.table) {
            (Some(path), _) => match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    eprintln!("Failed to read {}: {e}", path.display());
                    return Ok(EXIT_INVALID);
                }
            },
            (None, Some(table)) => {
                match self.regenerate(config_path, table, shutdown_signal).await {
                    Ok(bytes) => bytes,
                    Err(code) => return Ok(code),
                }
            }
            (None, None) => {
                eprintln!("Either a second document or --table is required");
                return Ok(super::EXIT_CONFIG);
            }
        };

        let report = match compare_documents(&original, &regenerated) {
            Ok(report) => report,
            Err(e) => {
                eprintln!("Comparison failed: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        Ok(report_exit_code(&report, self.limit))
    }

    async fn regenerate(
        &self,
        config_path: &str,
        table: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> Result<Vec<u8>, i32> {
        let variant = self
            .variant
            .as_deref()
            .map(Variant::new)
            .transpose()
            .map_err(|e| {
                eprintln!("Invalid variant: {e}");
                super::EXIT_CONFIG
            })?;

        let services = prepare(config_path, |_| {}).await?;
        let mut job = ExportJob::new(table);
        job.variant = variant;

        ExportCoordinator::new(&services, shutdown_signal)
            .render(&job)
            .await
            .map_err(|e| {
                eprintln!("Regeneration failed: {e}");
                exit_code_for(&e)
            })
    }
}

fn report_exit_code(report: &ComparisonReport, limit: usize) -> i32 {
    println!("{}", report.format_summary(limit));
    if report.matched() {
        println!("✅ Documents are equivalent");
        EXIT_OK
    } else {
        println!("⚠️  Documents differ ({} divergences)", report.divergence_count());
        EXIT_WARNINGS
    }
}
