//! Export command implementation
//!
//! This module implements the `export` command, which writes one table tree
//! to an XML document.

use super::{
    exit_code_for, prepare, EXIT_FATAL, EXIT_INTERRUPTED, EXIT_INVALID, EXIT_OK, EXIT_WARNINGS,
};
use crate::core::export::{ExportCoordinator, ExportJob, ExportSummary};
use crate::core::verification::compare_documents;
use crate::domain::ids::Variant;
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Schema identifier of the root table
    pub table: String,

    /// Value substituted for `$variant` in the queries
    #[arg(long)]
    pub variant: Option<String>,

    /// Output file (default: `<output_dir>/<table>[_<variant>].xml`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override root rows per page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Override pages processed concurrently
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Render in memory and report; write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Compare the written document with a reference document
    #[arg(long, value_name = "FILE")]
    pub compare_with: Option<PathBuf>,
}

impl ExportArgs {
    /// Execute the export command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(table = %self.table, "Starting export command");

        let variant = match self.variant.as_deref().map(Variant::new).transpose() {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Invalid variant: {e}");
                return Ok(super::EXIT_CONFIG);
            }
        };

        let services = match prepare(config_path, |config| {
            if let Some(page_size) = self.page_size {
                tracing::info!(page_size, "Overriding page size from CLI");
                config.export.page_size = page_size;
            }
            if let Some(parallel) = self.parallel {
                tracing::info!(parallel, "Overriding parallel pages from CLI");
                config.export.parallel_pages = parallel;
            }
            if self.dry_run {
                config.application.dry_run = true;
            }
        })
        .await
        {
            Ok(services) => services,
            Err(code) => return Ok(code),
        };

        let mut job = ExportJob::new(&self.table);
        job.variant = variant;
        job.output = self.output.clone();

        let shutdown_timeout = Duration::from_secs(services.config.export.shutdown_timeout_secs);
        let dry_run = services.config.application.dry_run;
        let coordinator = ExportCoordinator::new(&services, shutdown_signal.clone());

        if dry_run {
            println!("🔍 DRY RUN MODE - No document will be written");
            println!();
            return Ok(match coordinator.render(&job).await {
                Ok(bytes) => {
                    println!("✅ Rendered {} bytes for '{}'", bytes.len(), self.table);
                    EXIT_OK
                }
                Err(e) => {
                    eprintln!("Export failed: {e}");
                    exit_code_for(&e)
                }
            });
        }

        println!("🚀 Starting export of '{}'...", self.table);
        println!();

        let mut summary = tokio::select! {
            summary = coordinator.run(job) => summary,
            _ = grace_expired(shutdown_signal, shutdown_timeout) => {
                tracing::warn!(
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Pages did not stop within the shutdown timeout"
                );
                eprintln!("⚠️  Shutdown timeout reached; export abandoned");
                return Ok(EXIT_INTERRUPTED);
            }
        };

        if let (Some(reference), Some(output)) = (&self.compare_with, &summary.output_path) {
            match compare_with_reference(reference, output).await {
                Ok(report) => summary.comparison = Some(report),
                Err(e) => {
                    eprintln!("Comparison failed: {e}");
                    return Ok(EXIT_INVALID);
                }
            }
        }

        print_summary(&summary);
        Ok(exit_code(&summary))
    }
}

/// Resolves once a shutdown was requested and the grace period ran out
async fn grace_expired(mut shutdown: watch::Receiver<bool>, timeout: Duration) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            // sender gone: no shutdown will ever come
            std::future::pending::<()>().await;
        }
    }
    tokio::time::sleep(timeout).await;
}

async fn compare_with_reference(
    reference: &Path,
    output: &Path,
) -> crate::domain::Result<crate::core::verification::ComparisonReport> {
    let original = tokio::fs::read(reference).await?;
    let regenerated = tokio::fs::read(output).await?;
    compare_documents(&original, &regenerated)
}

fn print_summary(summary: &ExportSummary) {
    println!();
    println!("📊 Export Summary:");
    println!("  Table: {}", summary.table);
    if let Some(variant) = &summary.variant {
        println!("  Variant: {variant}");
    }
    println!("  Root rows: {}", summary.root_rows);
    println!("  Pages: {}/{}", summary.pages_completed, summary.pages_total);
    for (table, rows) in &summary.rows_per_table {
        println!("  Rows [{table}]: {rows}");
    }
    println!(
        "  Filtered: {} removed, {} corrected",
        summary.filtered.removed, summary.filtered.corrected
    );
    if let Some((record, source)) = &summary.encoding {
        println!(
            "  Encoding: {} (BOM: {}, from {:?})",
            record.charset, record.has_bom, source
        );
    }
    if let Some(path) = &summary.output_path {
        println!("  Output: {} ({} bytes)", path.display(), summary.bytes_written);
    }
    if let Some(checksum) = &summary.checksum {
        println!("  SHA-256: {checksum}");
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    if let Some(report) = &summary.comparison {
        println!("🔍 Comparison:");
        println!("{}", report.format_summary(20));
        println!();
    }

    if let Some(error) = &summary.failure {
        println!("⚠️  Error: {error}");
        println!();
    }
}

fn exit_code(summary: &ExportSummary) -> i32 {
    if summary.interrupted() {
        println!("⚠️  Export interrupted; no document was written.");
        tracing::info!("Export interrupted by user signal");
        EXIT_INTERRUPTED
    } else if let Some(error) = &summary.failure {
        println!("❌ Export failed");
        match exit_code_for(error) {
            EXIT_OK | EXIT_WARNINGS => EXIT_FATAL,
            code => code,
        }
    } else if summary.diverged() {
        println!("⚠️  Export completed; document differs from the reference");
        EXIT_WARNINGS
    } else {
        println!("✅ Export completed successfully!");
        EXIT_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::domain::errors::ArborError;
    use clap::Parser;
    use uuid::Uuid;

    #[test]
    fn test_export_args_parse() {
        let cli = Cli::parse_from([
            "arbor", "export", "item", "--variant", "map1", "--parallel", "8", "--dry-run",
        ]);
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.table, "item");
        assert_eq!(args.variant.as_deref(), Some("map1"));
        assert_eq!(args.parallel, Some(8));
        assert!(args.dry_run);
        assert!(args.output.is_none());
    }

    #[test]
    fn test_exit_code_from_summary() {
        let mut summary = ExportSummary::new(Uuid::new_v4(), "item", None);
        assert_eq!(exit_code(&summary), EXIT_OK);

        summary.failure = Some(ArborError::Export("two rows".to_string()));
        assert_eq!(exit_code(&summary), EXIT_FATAL);

        summary.failure = Some(ArborError::Cancelled);
        assert_eq!(exit_code(&summary), EXIT_INTERRUPTED);
    }

    #[tokio::test]
    async fn test_grace_period_waits_for_signal() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(grace_expired(rx, Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
