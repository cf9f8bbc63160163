//! Export coordinator - main orchestrator for the export process
//!
//! An export loads the schema tree, warms the field-order cache, resolves
//! the output encoding and reads every child table once. Root rows are then
//! split into pages that run concurrently, each writing its items to a
//! scratch fragment. Once every page is done the fragments are merged in
//! page order under the root element, encoded, and moved into place.

use crate::adapters::database::traits::RelationalStore;
use crate::config::ArborConfig;
use crate::core::compliance::{ComplianceFilter, FilterTotals};
use crate::core::encoding::EncodingRegistry;
use crate::core::export::builder::{
    count_rows, fill_element, Prefetch, RecordBuilder, RenderOptions, SourceRow,
};
use crate::core::export::page::{process_page, PageContext, PageOutput, ProgressTracker};
use crate::core::export::summary::ExportSummary;
use crate::core::locks::TableLocks;
use crate::core::registry::FieldRegistry;
use crate::core::services::Services;
use crate::core::verification::calculate_checksum_bytes;
use crate::domain::context::ResultExt;
use crate::domain::document::{write_document, write_wrapped, XmlElement};
use crate::domain::errors::{ArborError, ConfigError};
use crate::domain::ids::Variant;
use crate::domain::Result;
use crate::schema::{all_table_names, SchemaCatalog, SchemaNode};
use crate::{log_error_with_context, log_job_complete, log_job_start};
use indexmap::IndexMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

/// One export request
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub job_id: Uuid,

    /// Schema identifier (`<config_dir>/<table_id>.toml`)
    pub table_id: String,

    pub variant: Option<Variant>,

    /// Explicit output file; defaults to `<output_dir>/<table_id>.xml`
    pub output: Option<PathBuf>,
}

impl ExportJob {
    pub fn new(table_id: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            table_id: table_id.into(),
            variant: None,
            output: None,
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Export coordinator
pub struct ExportCoordinator {
    config: Arc<ArborConfig>,
    store: Arc<dyn RelationalStore>,
    catalog: Arc<SchemaCatalog>,
    registry: Arc<FieldRegistry>,
    filter: ComplianceFilter,
    encodings: Arc<EncodingRegistry>,
    locks: Arc<TableLocks>,
    options: RenderOptions,
    shutdown: watch::Receiver<bool>,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    pub fn new(services: &Services, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            config: services.config.clone(),
            store: services.stores.relational.clone(),
            catalog: services.catalog.clone(),
            registry: services.registry.clone(),
            filter: services.compliance_filter(),
            encodings: services.encodings.clone(),
            locks: services.locks.clone(),
            options: RenderOptions::from_config(&services.config),
            shutdown,
        }
    }

    /// Where the job's document is written
    pub fn output_path(&self, job: &ExportJob) -> PathBuf {
        if let Some(path) = &job.output {
            return path.clone();
        }
        let file = match &job.variant {
            Some(variant) => format!("{}_{}.xml", job.table_id, variant),
            None => format!("{}.xml", job.table_id),
        };
        Path::new(&self.config.export.output_dir).join(file)
    }

    /// Execute the export
    ///
    /// Never returns an error: failures are carried by the summary, and no
    /// document is written when the job fails.
    pub async fn run(&self, job: ExportJob) -> ExportSummary {
        let start = Instant::now();
        let mut summary = ExportSummary::new(job.job_id, &job.table_id, job.variant.clone());
        log_job_start!(job.job_id, job.table_id, "export");

        if let Err(error) = self.execute(&job, &mut summary).await {
            let context = format!("Export of '{}' failed", job.table_id);
            log_error_with_context!(&error, context.as_str());
            summary.failure = Some(error);
        }

        summary.duration = start.elapsed();
        if summary.is_successful() {
            log_job_complete!(job.job_id, job.table_id, summary.total_rows(), summary.duration);
            self.registry.log_usage();
        }
        summary.log_summary();
        summary
    }

    /// Regenerates a document in memory
    ///
    /// Takes no table locks and writes no file, so it can run inside a job
    /// that already holds the tables.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped generation.
    pub async fn render(&self, job: &ExportJob) -> Result<Vec<u8>> {
        let root = self.catalog.load(&job.table_id).await?;
        let mut summary = ExportSummary::new(job.job_id, &job.table_id, job.variant.clone());
        self.render_document(&root, job, None, &mut summary).await
    }

    async fn execute(&self, job: &ExportJob, summary: &mut ExportSummary) -> Result<()> {
        let root = self.catalog.load(&job.table_id).await?;
        let _guard = self.locks.read(&all_table_names(&root)).await;

        let output = self.output_path(job);
        let bytes = self
            .render_document(&root, job, Some(&output), summary)
            .await?;

        write_atomic(&output, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        summary.bytes_written = bytes.len();
        if self.config.export.checksum {
            summary.checksum = Some(calculate_checksum_bytes(&bytes));
        }
        tracing::info!(
            path = %output.display(),
            bytes = bytes.len(),
            "Document written"
        );
        summary.output_path = Some(output);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if *self.shutdown.borrow() {
            Err(ArborError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn render_document(
        &self,
        root: &Arc<SchemaNode>,
        job: &ExportJob,
        prior_artifact: Option<&Path>,
        summary: &mut ExportSummary,
    ) -> Result<Vec<u8>> {
        self.check_cancelled()?;

        self.registry
            .preload_all(root.walk().into_iter().map(|n| n.store_table()))
            .await?;

        let resolved = self
            .encodings
            .resolve(&root.table, job.variant.as_ref(), prior_artifact)
            .await?;
        let declared = resolved.record.charset.declared_name();

        let prefetch = Prefetch::load(
            self.store.as_ref(),
            root,
            job.variant.as_ref(),
            &self.filter,
        )
        .await?;
        summary.add_filtered(prefetch.totals);

        let sql = root.query_for(job.variant.as_ref())?;
        let xml = if root.is_multi_row() {
            self.render_pages(root, job, sql, Arc::new(prefetch), declared, summary)
                .await?
        } else {
            self.render_single(root, job, &sql, &prefetch, declared, summary)
                .await?
        };

        let bytes = resolved.record.encode_document(&xml)?;
        summary.encoding = Some((resolved.record, resolved.source));
        Ok(bytes)
    }

    /// A table without `item_tag`: the root element holds its only row
    async fn render_single(
        &self,
        root: &SchemaNode,
        job: &ExportJob,
        sql: &str,
        prefetch: &Prefetch,
        declared: &str,
        summary: &mut ExportSummary,
    ) -> Result<String> {
        let rows = self.store.fetch_rows(sql, None).await?;
        summary.root_rows = rows.len() as u64;
        summary.pages_total = 1;
        if rows.len() > 1 {
            return Err(ArborError::Export(format!(
                "'{}' has no item_tag but its query returned {} rows",
                root.table,
                rows.len()
            )));
        }

        let mut element = root_element(root)?;
        if let Some(raw) = rows.into_iter().next() {
            let mut totals = FilterTotals::default();
            let source = SourceRow::filtered(root, raw, &self.filter, &mut totals);
            let record = RecordBuilder::new(&self.registry, prefetch, job.variant.as_ref())
                .build(root, &source)?;
            fill_element(&mut element, &record, &self.options);

            let mut counts = IndexMap::new();
            count_rows(&record, &mut counts);
            summary.add_rows(&counts);
            summary.add_filtered(totals);
        }
        summary.pages_completed = 1;
        write_document(&element, declared)
    }

    async fn render_pages(
        &self,
        root: &Arc<SchemaNode>,
        job: &ExportJob,
        sql: String,
        prefetch: Arc<Prefetch>,
        declared: &str,
        summary: &mut ExportSummary,
    ) -> Result<String> {
        let total = self.store.count_rows(&sql).await?;
        let page_size = self.config.export.page_size.max(1) as u64;
        let pages = total.div_ceil(page_size);
        summary.root_rows = total;
        summary.pages_total = pages;
        tracing::info!(
            table = %root.table,
            rows = total,
            pages = pages,
            parallel = self.config.export.parallel_pages,
            "Export planned"
        );

        // removed on drop, whether or not the export succeeds
        let scratch = tempfile::Builder::new().prefix("arbor-export-").tempdir()?;

        let ctx = Arc::new(PageContext {
            store: self.store.clone(),
            registry: self.registry.clone(),
            filter: self.filter.clone(),
            root: root.clone(),
            prefetch,
            options: self.options.clone(),
            variant: job.variant.clone(),
            sql,
            page_size,
            scratch_dir: scratch.path().to_path_buf(),
            shutdown: self.shutdown.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(self.config.export.parallel_pages.max(1)));

        let mut tasks = JoinSet::new();
        for index in 0..pages {
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ArborError::Export(format!("Page scheduler closed: {e}")))?;
                process_page(&ctx, index)
                    .await
                    .with_context(|| format!("Page {index} failed"))
            });
        }

        let mut outputs: Vec<PageOutput> = Vec::with_capacity(pages as usize);
        let mut progress = ProgressTracker::new(
            root.table.as_str(),
            pages,
            self.config.export.progress_interval_pct,
        );
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| ArborError::Export(format!("Page task failed: {e}")))
                .and_then(|result| result)
                .and_then(|output| self.check_cancelled().map(|_| output));

            match outcome {
                Ok(output) => {
                    progress.advance();
                    summary.pages_completed += 1;
                    outputs.push(output);
                }
                Err(error) => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    tracing::warn!(
                        table = %root.table,
                        pages_done = progress.done(),
                        pages_total = pages,
                        "Remaining pages aborted"
                    );
                    return Err(error);
                }
            }
        }

        outputs.sort_by_key(|o| o.index);
        let mut fragments = Vec::with_capacity(outputs.len());
        for output in &outputs {
            fragments.push(tokio::fs::read_to_string(&output.fragment).await?);
            summary.add_rows(&output.rows);
            summary.add_filtered(output.filter);
        }

        let element = root_element(root)?;
        if fragments.iter().all(String::is_empty) {
            write_document(&element, declared)
        } else {
            write_wrapped(&element, declared, fragments.iter().map(String::as_str))
        }
    }
}

fn root_element(root: &SchemaNode) -> Result<XmlElement> {
    let tag = root.root_tag.as_deref().ok_or_else(|| {
        ConfigError::Invalid(format!("root_tag is required for '{}'", root.table))
    })?;
    let mut element = XmlElement::new(tag);
    if let Some((key, value)) = &root.root_attr {
        element.attributes.push((key.clone(), value.clone()));
    }
    Ok(element)
}

/// Writes to a temporary file next to `path`, then renames it into place
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&path)
            .map_err(|e| ArborError::Io(format!("{}: {}", path.display(), e.error)))?;
        Ok(())
    })
    .await
    .map_err(|e| ArborError::Io(format!("Writer task failed: {e}")))?
}
