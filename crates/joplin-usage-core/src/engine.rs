use crate::aggregate::{aggregate, rank};
use crate::api::{DataApi, DEFAULT_PAGE_SIZE};
use crate::collector::collect_resources;
use crate::lifecycle::{
    active_notebook, begin, publish, sweep_pending, PendingLedger, SweepOutcome,
};
use crate::report::render_report;
use crate::resolver::{resolve_links_concurrent, NotebookCache};
use crate::trace_time;
use anyhow::Result;
use serde::Serialize;
use std::time::Instant;

pub const DEFAULT_REPORT_TITLE: &str = "Joplin Disk Usage Report";
pub const DEFAULT_PLACEHOLDER_BODY: &str =
    "Processing... this note will be replaced by the disk usage report.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportOptions {
    pub page_size: usize,
    /// 1 keeps linkage lookups strictly sequential.
    pub linkage_concurrency: usize,
    pub title: String,
    pub placeholder_body: String,
    /// Compute the report without touching any document.
    pub dry_run: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            linkage_concurrency: 1,
            title: DEFAULT_REPORT_TITLE.to_string(),
            placeholder_body: DEFAULT_PLACEHOLDER_BODY.to_string(),
            dry_run: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub resources: usize,
    pub orphaned_resources: usize,
    pub link_entries: usize,
    pub notebooks: usize,
    pub notebook_fetches: usize,
    pub notebook_cache_hits: usize,
    /// Sum of all notebook totals, counted per note reference.
    pub total_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltReport {
    pub body: String,
    pub stats: RunStats,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportRun {
    pub body: String,
    /// `None` for dry runs.
    pub report_id: Option<String>,
    pub stats: RunStats,
    pub swept: SweepOutcome,
}

/// Collect, resolve, aggregate, rank and render. Creates no documents.
pub fn build_report<A: DataApi + Sync + ?Sized>(
    api: &A,
    options: &ReportOptions,
) -> Result<BuiltReport> {
    let started = Instant::now();
    let resources = collect_resources(api, options.page_size)?;
    tracing::info!(resources = resources.len(), "resources collected");
    trace_time!(started, "collect");

    let started = Instant::now();
    let mut cache = NotebookCache::new();
    let linkage =
        resolve_links_concurrent(api, &resources, &mut cache, options.linkage_concurrency)?;
    tracing::info!(
        link_entries = linkage.entries.len(),
        orphaned = linkage.orphaned_resources,
        notebooks = cache.len(),
        "links resolved"
    );
    trace_time!(started, "resolve");

    let link_entries = linkage.entries.len();
    let ranked = rank(aggregate(linkage.entries));
    let body = render_report(&ranked, &cache);

    let stats = RunStats {
        resources: resources.len(),
        orphaned_resources: linkage.orphaned_resources,
        link_entries,
        notebooks: ranked.len(),
        notebook_fetches: cache.fetches(),
        notebook_cache_hits: cache.hits(),
        total_bytes: ranked
            .iter()
            .map(|notebook| notebook.total_size_bytes)
            .sum(),
    };
    Ok(BuiltReport { body, stats })
}

/// Runs a full report: check for an active notebook, sweep leftovers, publish
/// the placeholder, build the report, publish it and drop the placeholder.
///
/// Without an active notebook the run stops before any document is touched,
/// leftovers included.
///
/// A failure after the placeholder exists leaves it in the store and in the
/// ledger; the next run's sweep removes it.
pub fn generate_report<A: DataApi + Sync + ?Sized>(
    api: &A,
    ledger: &mut PendingLedger,
    options: &ReportOptions,
) -> Result<ReportRun> {
    if options.dry_run {
        let built = build_report(api, options)?;
        return Ok(ReportRun {
            body: built.body,
            report_id: None,
            stats: built.stats,
            swept: SweepOutcome::default(),
        });
    }

    let notebook = active_notebook(api)?;
    let swept = sweep_pending(api, ledger)?;
    let pending = begin(
        api,
        ledger,
        &notebook,
        &options.title,
        &options.placeholder_body,
    )?;
    let built = build_report(api, options)?;
    let report_id = publish(api, ledger, &pending, &options.title, &built.body)?;

    Ok(ReportRun {
        body: built.body,
        report_id: Some(report_id),
        stats: built.stats,
        swept,
    })
}
