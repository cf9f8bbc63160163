//! Import command implementation
//!
//! This module implements the `import` command, which replaces the contents
//! of a table tree with the rows of an XML document.

use super::{exit_code_for, prepare, EXIT_FATAL, EXIT_INTERRUPTED, EXIT_OK, EXIT_WARNINGS};
use crate::core::import::{ImportCoordinator, ImportJob, ImportSummary};
use crate::domain::ids::Variant;
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;

/// Arguments for the import command
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Schema identifier of the root table
    pub table: String,

    /// Document to import
    pub input: PathBuf,

    /// Fallback association value and `$variant` substitution
    #[arg(long)]
    pub variant: Option<String>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Validate only - no transaction is opened
    #[arg(long)]
    pub dry_run: bool,

    /// Re-export after commit and compare with the input
    #[arg(long)]
    pub verify: bool,
}

impl ImportArgs {
    /// Execute the import command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(
            table = %self.table,
            input = %self.input.display(),
            "Starting import command"
        );

        let variant = match self.variant.as_deref().map(Variant::new).transpose() {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Invalid variant: {e}");
                return Ok(super::EXIT_CONFIG);
            }
        };

        let services = match prepare(config_path, |config| {
            if self.dry_run {
                tracing::info!("Enabling dry-run mode from CLI");
                config.application.dry_run = true;
            }
            if self.verify {
                config.import.verify_roundtrip = true;
            }
        })
        .await
        {
            Ok(services) => services,
            Err(code) => return Ok(code),
        };
        let dry_run = services.config.application.dry_run;

        if dry_run {
            println!("🔍 DRY RUN MODE - No data will be written to the database");
            println!();
        }

        // Every table of the tree is emptied before the insert
        if !self.yes && !dry_run {
            println!("Import Configuration:");
            println!("  Table: {}", self.table);
            println!("  Input: {}", self.input.display());
            println!("  Backend: {}", services.stores.relational.backend_name());
            println!("  Batch size: {}", services.config.import.batch_size);
            println!();
            print!("Existing rows of every table in the tree will be replaced. Proceed? [y/N]: ");
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Import cancelled.");
                return Ok(EXIT_OK);
            }
        }

        let mut job = ImportJob::new(&self.table, &self.input).with_dry_run(dry_run);
        job.variant = variant;

        println!("🚀 Starting import of '{}'...", self.table);
        let summary = ImportCoordinator::new(&services, shutdown_signal)
            .run(job)
            .await;

        print_summary(&summary);
        Ok(exit_code(&summary))
    }
}

fn print_summary(summary: &ImportSummary) {
    println!();
    println!("📊 Import Summary:");
    println!("  Table: {}", summary.table);
    println!("  State: {}", summary.state());
    for (table, rows) in &summary.rows_per_table {
        println!("  Rows [{table}]: {rows}");
    }
    println!("  Rows deleted: {}", summary.rows_deleted);
    println!("  Fields dropped: {}", summary.dropped_fields);
    println!("  Columns widened: {}", summary.widened_columns);
    if let Some(record) = &summary.encoding {
        println!("  Encoding: {} (BOM: {})", record.charset, record.has_bom);
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    if !summary.errors.is_empty() {
        println!("❌ Validation errors:");
        for issue in &summary.errors {
            println!("  - {issue}");
        }
        println!();
    }

    if !summary.warnings.is_empty() {
        println!("⚠️  Warnings:");
        for issue in &summary.warnings {
            println!("  - {issue}");
        }
        println!();
    }

    if summary.suppressed > 0 {
        println!("  ... and {} more issues", summary.suppressed);
        println!();
    }

    if let Some(report) = &summary.comparison {
        println!("🔍 Round-trip verification:");
        println!("{}", report.format_summary(20));
        println!();
    }

    if let Some(error) = &summary.failure {
        println!("⚠️  Error: {error}");
        println!();
    }
}

fn exit_code(summary: &ImportSummary) -> i32 {
    if summary.interrupted() {
        println!("⚠️  Import interrupted; the store was not changed.");
        EXIT_INTERRUPTED
    } else if let Some(error) = &summary.failure {
        println!("❌ Import failed ({})", summary.state());
        match exit_code_for(error) {
            EXIT_OK | EXIT_WARNINGS => EXIT_FATAL,
            code => code,
        }
    } else if summary.has_warnings() {
        println!("⚠️  Import completed with warnings");
        EXIT_WARNINGS
    } else {
        println!("✅ Import completed successfully!");
        EXIT_OK
    }
}
