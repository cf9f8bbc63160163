//! Import coordinator - main orchestrator for the import process
//!
//! A document is decoded, parsed and walked into rows, and the rows are
//! validated as a whole before any write. The write itself is one
//! transaction: every table of the tree is emptied, then refilled root
//! table first. Anything that fails inside the transaction rolls it back.

use crate::adapters::database::traits::{RelationalStore, StoreTransaction};
use crate::core::compliance::ComplianceFilter;
use crate::core::encoding::{decode, detect, EncodingRecord};
use crate::core::export::{ExportCoordinator, ExportJob};
use crate::core::import::summary::ImportSummary;
use crate::core::import::validate::{load_metadata, validate_batch};
use crate::core::import::walker::{DocumentWalker, WalkOptions};
use crate::core::services::Services;
use crate::core::state::{ImportState, TransactPhase};
use crate::core::verification::compare_documents;
use crate::domain::context::ResultExt;
use crate::domain::document::{parse_document, XmlElement};
use crate::domain::errors::{ArborError, ValidationFailure};
use crate::domain::ids::{TableName, Variant};
use crate::domain::row::RowBatch;
use crate::domain::Result;
use crate::schema::{all_table_names, SchemaNode};
use crate::{log_batch_processing, log_error_with_context, log_job_complete, log_job_start};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use uuid::Uuid;

/// One import request
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub job_id: Uuid,

    /// Schema identifier (`<config_dir>/<table_id>.toml`)
    pub table_id: String,

    /// Document to load
    pub input: PathBuf,

    pub variant: Option<Variant>,

    /// Validate only; overrides `application.dry_run` when set
    pub dry_run: Option<bool>,
}

impl ImportJob {
    pub fn new(table_id: impl Into<String>, input: impl Into<PathBuf>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            table_id: table_id.into(),
            input: input.into(),
            variant: None,
            dry_run: None,
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }
}

/// Parsed input, before any row exists
struct ParsedInput {
    bytes: Vec<u8>,
    record: EncodingRecord,
    root: Arc<SchemaNode>,
    document: XmlElement,
}

/// Import coordinator
pub struct ImportCoordinator {
    services: Services,
    store: Arc<dyn RelationalStore>,
    filter: ComplianceFilter,
    options: WalkOptions,
    shutdown: watch::Receiver<bool>,
}

impl ImportCoordinator {
    /// Create a new import coordinator
    pub fn new(services: &Services, shutdown: watch::Receiver<bool>) -> Self {
        let import = &services.config.import;
        Self {
            services: services.clone(),
            store: services.stores.relational.clone(),
            filter: services.compliance_filter(),
            options: WalkOptions {
                repeated: import.repeated_tag_policy,
                separator: import.join_separator.clone(),
            },
            shutdown,
        }
    }

    /// Execute the import
    ///
    /// Never returns an error: the summary carries the final state and the
    /// error that stopped the job.
    pub async fn run(&self, job: ImportJob) -> ImportSummary {
        let start = Instant::now();
        let config = &self.services.config;
        let mut summary = ImportSummary::new(
            job.job_id,
            &job.table_id,
            job.variant.clone(),
            config.import.max_reported_messages,
        );
        summary.dry_run = job.dry_run.unwrap_or(config.application.dry_run);
        log_job_start!(job.job_id, job.table_id, "import");

        if let Err(error) = self.execute(&job, &mut summary).await {
            let context = format!("Import of '{}' failed", job.table_id);
            log_error_with_context!(&error, context.as_str());
            summary.fail(error);
        }

        summary.duration = start.elapsed();
        if summary.is_successful() {
            log_job_complete!(job.job_id, job.table_id, summary.total_rows(), summary.duration);
            self.services.registry.log_usage();
        }
        summary.log_summary();
        summary
    }

    async fn execute(&self, job: &ImportJob, summary: &mut ImportSummary) -> Result<()> {
        let parsed = self.parse(job).await?;
        summary.encoding = Some(parsed.record.clone());
        summary.tracker.advance(ImportState::Validating);

        let root = parsed.root.clone();
        let _guard = self.services.locks.write(&all_table_names(&root)).await;

        let batch = self.validate(job, &parsed, summary).await?;
        if summary.dry_run {
            tracing::info!(
                table = %job.table_id,
                rows = batch.total_rows(),
                "Dry run; validation passed, nothing written"
            );
            summary.tracker.advance(ImportState::Committed);
            return Ok(());
        }

        if *self.shutdown.borrow() {
            return Err(ArborError::Cancelled);
        }

        summary.tracker.advance(ImportState::Transacting(TransactPhase::Deleting));
        let tx = self.store.begin().await?;
        self.transact(tx, &root, &batch, summary).await?;
        summary.tracker.advance(ImportState::Committed);

        // the store changed underneath the field-order cache
        self.services.registry.invalidate(None);

        if let Err(error) = self.services.encodings.record(parsed.record.clone()).await {
            tracing::warn!(
                error = %error,
                table = %root.table,
                "Import committed but its encoding could not be recorded"
            );
        }

        if self.services.config.import.verify_roundtrip {
            self.verify(job, &parsed.bytes, summary).await;
        }
        Ok(())
    }

    async fn parse(&self, job: &ImportJob) -> Result<ParsedInput> {
        let root = self.services.catalog.load(&job.table_id).await?;
        let bytes = tokio::fs::read(&job.input)
            .await
            .with_context(|| format!("Failed to read {}", job.input.display()))?;

        let detection = detect(&bytes);
        tracing::debug!(
            charset = %detection.charset,
            has_bom = detection.has_bom,
            confidence = detection.confidence,
            method = ?detection.method,
            "Input encoding detected"
        );
        let xml = decode(&bytes, &detection)?;
        let document = parse_document(&xml)?;
        let record = EncodingRecord::from_detection(
            root.table.clone(),
            Variant::key_of(job.variant.as_ref()),
            &detection,
        );

        Ok(ParsedInput {
            bytes,
            record,
            root,
            document,
        })
    }

    async fn validate(
        &self,
        job: &ImportJob,
        parsed: &ParsedInput,
        summary: &mut ImportSummary,
    ) -> Result<RowBatch> {
        self.services
            .registry
            .preload_all(parsed.root.walk().into_iter().map(|n| n.store_table()))
            .await?;

        let walker = DocumentWalker::new(
            &parsed.root,
            &self.services.registry,
            job.variant.as_ref(),
            &self.options,
        );
        let walked = walker.walk(&parsed.document)?;
        summary.dropped_fields = walked.dropped_fields;
        summary.rows_per_table = walked.batch.counts();

        let metadata = load_metadata(self.store.as_ref(), &walked.batch).await?;
        let auto_widen = self.services.config.import.auto_widen;
        let batch = walked.batch;
        let filter = self.filter.clone();
        let (checked, batch) = tokio::task::spawn_blocking(move || {
            let outcome = validate_batch(&batch, &metadata, &filter, auto_widen);
            (outcome, batch)
        })
        .await
        .map_err(|e| ArborError::Io(format!("Validation task failed: {e}")))?;

        let mut issues = walked.issues;
        issues.extend(checked.issues);
        let blocking: Vec<_> = issues.iter().filter(|i| i.is_blocking()).cloned().collect();
        summary.add_issues(issues);
        if !blocking.is_empty() {
            return Err(ValidationFailure::new(blocking).into());
        }

        for widening in &checked.widenings {
            if summary.dry_run {
                tracing::info!(
                    table = %widening.table,
                    column = %widening.column,
                    capacity = widening.capacity,
                    required = widening.required,
                    "Column would be widened"
                );
                continue;
            }
            self.store
                .widen_column(&widening.table, &widening.column, widening.required)
                .await
                .with_context(|| {
                    format!("Failed to widen {}.{}", widening.table, widening.column)
                })?;
            tracing::info!(
                table = %widening.table,
                column = %widening.column,
                from = widening.capacity,
                to = widening.required,
                "Column widened"
            );
            summary.widened_columns += 1;
        }

        Ok(batch)
    }

    /// Runs the write phases, rolling back on the first error
    async fn transact(
        &self,
        mut tx: Box<dyn StoreTransaction>,
        root: &SchemaNode,
        batch: &RowBatch,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        match self.write_all(tx.as_mut(), root, batch, summary).await {
            Ok(()) => {
                tx.commit().await?;
                tracing::info!(table = %root.table, rows = batch.total_rows(), "Import committed");
                Ok(())
            }
            Err(error) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, "Rollback failed");
                }
                Err(error)
            }
        }
    }

    async fn write_all(
        &self,
        tx: &mut dyn StoreTransaction,
        root: &SchemaNode,
        batch: &RowBatch,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        for table in deletion_order(root) {
            let table = TableName::new(table.as_str()).map_err(ArborError::Export)?;
            let removed = tx
                .delete_all(&table)
                .await
                .with_context(|| format!("Failed to empty {table}"))?;
            summary.rows_deleted += removed;
            tracing::debug!(table = %table, rows = removed, "Table emptied");
        }

        let batch_size = self.services.config.import.batch_size.max(1);
        for (position, (table, rows)) in batch.iter().enumerate() {
            let phase = if position == 0 {
                TransactPhase::InsertingRoot
            } else {
                TransactPhase::InsertingChildren
            };
            if summary.state() != ImportState::Transacting(phase) {
                summary.tracker.advance(ImportState::Transacting(phase));
            }

            let mut written = 0;
            for chunk in rows.chunks(batch_size) {
                tx.insert_batch(table, chunk)
                    .await
                    .with_context(|| format!("Failed to insert into {table}"))?;
                written += chunk.len();
                log_batch_processing!(table, written, rows.len());
            }
        }
        Ok(())
    }

    /// Regenerates the document from the store and compares it with the input
    async fn verify(&self, job: &ImportJob, original: &[u8], summary: &mut ImportSummary) {
        let mut export = ExportJob::new(job.table_id.clone());
        export.variant = job.variant.clone();
        let exporter = ExportCoordinator::new(&self.services, self.shutdown.clone());

        let report = exporter
            .render(&export)
            .await
            .and_then(|regenerated| compare_documents(original, &regenerated));
        match report {
            Ok(report) => {
                if !report.matched() {
                    tracing::warn!(
                        table = %job.table_id,
                        divergences = report.divergence_count(),
                        "Round trip diverged"
                    );
                }
                summary.comparison = Some(report);
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    table = %job.table_id,
                    "Round-trip verification failed"
                );
            }
        }
    }
}

/// Tables to empty, longest name first, then reverse lexicographic
pub fn deletion_order(root: &SchemaNode) -> Vec<String> {
    let mut tables: Vec<String> = all_table_names(root).into_iter().collect();
    tables.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| b.cmp(a)));
    tables
}
