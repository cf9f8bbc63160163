//! One export page: fetch, filter, materialize, write a scratch fragment

use crate::adapters::database::traits::{PageWindow, RelationalStore};
use crate::core::compliance::{ComplianceFilter, FilterTotals};
use crate::core::export::builder::{
    count_rows, render_record, Prefetch, RecordBuilder, RenderOptions, SourceRow,
};
use crate::core::registry::FieldRegistry;
use crate::domain::document::write_fragment;
use crate::domain::errors::{ArborError, ConfigError};
use crate::domain::ids::Variant;
use crate::domain::Result;
use crate::log_page_progress;
use crate::schema::SchemaNode;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Read-only state shared by every page task of one export
pub struct PageContext {
    pub store: Arc<dyn RelationalStore>,
    pub registry: Arc<FieldRegistry>,
    pub filter: ComplianceFilter,
    pub root: Arc<SchemaNode>,
    pub prefetch: Arc<Prefetch>,
    pub options: RenderOptions,
    pub variant: Option<Variant>,
    pub sql: String,
    pub page_size: u64,
    pub scratch_dir: PathBuf,
    pub shutdown: watch::Receiver<bool>,
}

impl PageContext {
    fn check_cancelled(&self) -> Result<()> {
        if *self.shutdown.borrow() {
            Err(ArborError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What one page produced
#[derive(Debug, Clone)]
pub struct PageOutput {
    pub index: u64,
    pub fragment: PathBuf,
    pub rows: IndexMap<String, usize>,
    pub filter: FilterTotals,
}

/// Runs one page and writes its item elements to the scratch directory
///
/// # Errors
///
/// Returns [`ArborError::Cancelled`] when shutdown was requested, or the
/// store, materialization or I/O error that stopped the page.
pub async fn process_page(ctx: &PageContext, index: u64) -> Result<PageOutput> {
    ctx.check_cancelled()?;
    let item_tag = ctx.root.item_tag.as_deref().ok_or_else(|| {
        ConfigError::Invalid(format!("'{}' has no item_tag to page over", ctx.root.table))
    })?;

    let rows = ctx
        .store
        .fetch_rows(&ctx.sql, Some(PageWindow::page(index, ctx.page_size)))
        .await?;
    ctx.check_cancelled()?;

    let builder = RecordBuilder::new(&ctx.registry, &ctx.prefetch, ctx.variant.as_ref());
    let mut filter = FilterTotals::default();
    let mut counts = IndexMap::new();
    let mut items = Vec::with_capacity(rows.len());
    for raw in rows {
        let source = SourceRow::filtered(&ctx.root, raw, &ctx.filter, &mut filter);
        let record = builder.build(&ctx.root, &source)?;
        count_rows(&record, &mut counts);
        items.push(render_record(item_tag, &record, &ctx.options));
    }

    let fragment = ctx.scratch_dir.join(format!("page-{index:06}.xml"));
    tokio::fs::write(&fragment, write_fragment(&items)?).await?;

    tracing::debug!(
        table = %ctx.root.table,
        page = index,
        items = items.len(),
        removed = filter.removed,
        corrected = filter.corrected,
        "Page written"
    );

    Ok(PageOutput {
        index,
        fragment,
        rows: counts,
        filter,
    })
}

/// Logs progress each time another `interval_pct` percent of pages is done
#[derive(Debug)]
pub struct ProgressTracker {
    table: String,
    total: u64,
    done: u64,
    interval_pct: u64,
    next_pct: u64,
}

impl ProgressTracker {
    pub fn new(table: impl Into<String>, total: u64, interval_pct: u8) -> Self {
        let interval_pct = u64::from(interval_pct.max(1));
        Self {
            table: table.into(),
            total,
            done: 0,
            interval_pct,
            next_pct: interval_pct,
        }
    }

    /// Records a finished page; returns whether progress was logged
    pub fn advance(&mut self) -> bool {
        self.done += 1;
        let pct = self.done * 100 / self.total.max(1);
        if pct < self.next_pct && self.done < self.total {
            return false;
        }
        log_page_progress!(self.table, self.done, self.total);
        self.next_pct = (pct / self.interval_pct + 1) * self.interval_pct;
        true
    }

    pub fn done(&self) -> u64 {
        self.done
    }
}
