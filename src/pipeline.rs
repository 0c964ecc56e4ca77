//! Run orchestration: fetch the panel, compute the requested families through
//! one shared context, and hand each table to the store.

use std::time::{Duration, Instant};

use chrono::NaiveDate;

use crate::domain::error::FactorError;
use crate::domain::factor::FactorContext;
use crate::domain::family::{compute_family, FactorFamily, FactorSettings, FactorTable};
use crate::domain::panel::Panel;
use crate::domain::universe::{resolve_universe, SkippedSymbol};
use crate::ports::data_port::DataPort;
use crate::ports::factor_store_port::FactorStorePort;

/// Days of history re-fetched before the last stored date on an incremental
/// refresh.
pub const REFRESH_OVERLAP_DAYS: i64 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    /// `None` selects every symbol in the store.
    pub symbols: Option<Vec<String>>,
    pub families: Vec<FactorFamily>,
    /// First date written. Earlier history is still read for warm-up.
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub settings: FactorSettings,
    pub dry_run: bool,
}

impl Default for PipelineRequest {
    fn default() -> Self {
        Self {
            symbols: None,
            families: FactorFamily::ALL.to_vec(),
            start: None,
            end: None,
            settings: FactorSettings::default(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub symbols: usize,
    pub skipped: Vec<SkippedSymbol>,
    pub panel_rows: usize,
    /// Rows per family; computed rows on a dry run, written rows otherwise.
    pub tables: Vec<(FactorFamily, usize)>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// Compute `families` over `panel`, sharing intermediate columns.
pub fn compute_tables(
    panel: &Panel,
    families: &[FactorFamily],
    settings: &FactorSettings,
) -> Vec<FactorTable> {
    let mut ctx = FactorContext::new(panel);
    families
        .iter()
        .map(|family| compute_family(&mut ctx, *family, settings))
        .collect()
}

/// Earliest date an incremental import should request, given the last stored
/// date.
pub fn refresh_start(latest: Option<NaiveDate>) -> Option<NaiveDate> {
    latest.map(|d| d - chrono::Duration::days(REFRESH_OVERLAP_DAYS))
}

pub fn run(
    data_port: &dyn DataPort,
    store: Option<&dyn FactorStorePort>,
    request: &PipelineRequest,
) -> Result<(RunSummary, Vec<FactorTable>), FactorError> {
    let started = Instant::now();

    let universe = resolve_universe(data_port, request.symbols.as_deref())?;
    tracing::info!(symbols = universe.count(), skipped = universe.skipped.len(), "universe resolved");

    // every factor is trailing, so history before `start` feeds the warm-up
    let bars = data_port.fetch_panel(&universe.symbols, None, request.end)?;
    let panel = Panel::new(bars)?;
    let in_window = panel
        .bars()
        .iter()
        .any(|b| request.start.is_none_or(|s| b.date >= s));
    if !in_window {
        return Err(FactorError::NoData {
            symbol: universe.symbols.join(","),
        });
    }
    tracing::info!(
        rows = panel.len(),
        symbols = panel.groups().len(),
        "panel loaded"
    );

    let mut tables = compute_tables(&panel, &request.families, &request.settings);
    for table in &mut tables {
        table.retain_dates(request.start, request.end);
    }

    let mut counts = Vec::with_capacity(tables.len());
    for table in &tables {
        let rows = match store {
            Some(store) if !request.dry_run => {
                let written = store.upsert_factors(table)?;
                tracing::info!(table = table.family.table_name(), rows = written, "factors upserted");
                written
            }
            _ => {
                tracing::info!(family = table.family.name(), rows = table.len(), "factors computed");
                table.len()
            }
        };
        counts.push((table.family, rows));
    }

    let summary = RunSummary {
        symbols: panel.groups().len(),
        skipped: universe.skipped,
        panel_rows: panel.len(),
        tables: counts,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        rows = summary.total_rows(),
        elapsed = %format_duration(summary.elapsed.as_secs()),
        "run complete"
    );

    Ok((summary, tables))
}

pub fn format_duration(secs: u64) -> String {
    let minutes = secs / 60;
    let seconds = secs % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
