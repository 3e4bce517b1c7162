//! Presentation-ready views: per-date ingestion summaries, per-symbol trend
//! series for charting, and the volume screener.

use crate::accumulation::{group_by_symbol, is_accumulating_series, window_start};
use crate::pipeline::{DateReport, IngestOutcome};
use crate::record::TradeRecord;
use crate::store::{RecordQuery, StoreError, TradeStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Outcomes of a rolling-window ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub end: NaiveDate,
    pub days: u32,
    pub dates: Vec<DateReport>,
}

impl WindowReport {
    pub fn new(end: NaiveDate, days: u32, dates: Vec<DateReport>) -> Self {
        WindowReport { end, days, dates }
    }

    pub fn succeeded(&self) -> usize {
        self.dates.iter().filter(|d| d.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.dates.len() - self.succeeded()
    }

    pub fn rows_ingested(&self) -> usize {
        self.dates.iter().map(|d| d.outcome.rows_ingested()).sum()
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestOutcome::Ingested {
                date,
                rows,
                duplicates,
                ..
            } => write!(f, "ingested {} rows from {} ({} duplicates skipped)", rows, date, duplicates),
            IngestOutcome::NoQualifyingRows { date, duplicates, .. } => {
                write!(f, "no qualifying rows in {} ({} duplicates)", date, duplicates)
            }
            IngestOutcome::SchemaError { date, error, .. } => write!(f, "schema error in {}: {}", date, error),
            IngestOutcome::NotFound {
                attempts,
                last_candidate,
            } => write!(
                f,
                "not found after {} attempts (searched back to {})",
                attempts, last_candidate
            ),
            IngestOutcome::TransportError { date, error } => {
                write!(f, "transport error fetching {}: {}", date, error)
            }
            IngestOutcome::StoreError { date, error } => write!(f, "store error for {}: {}", date, error),
        }
    }
}

impl fmt::Display for WindowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Window of {} days ending {}: {} succeeded, {} failed, {} rows ingested",
            self.days,
            self.end,
            self.succeeded(),
            self.failed(),
            self.rows_ingested()
        )?;
        for date in &self.dates {
            let marker = if date.outcome.is_success() { "ok" } else { "FAIL" };
            writeln!(f, "  [{}] {}: {}", marker, date.requested, date.outcome)?;
        }
        Ok(())
    }
}

/// One point of a symbol's delivery trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub delivery_percent: f64,
    pub delivery_qty: Option<u64>,
}

impl From<&TradeRecord> for TrendPoint {
    fn from(record: &TradeRecord) -> Self {
        TrendPoint {
            date: record.date,
            delivery_percent: record.delivery_percent,
            delivery_qty: record.delivery_qty,
        }
    }
}

/// Date-ascending delivery series for `symbol` since `since` (inclusive).
pub fn trend_series<S: TradeStore + ?Sized>(
    store: &S,
    symbol: &str,
    since: NaiveDate,
) -> Result<Vec<TrendPoint>, StoreError> {
    let records = store.query(&RecordQuery::all().since(since).symbol(symbol))?;
    Ok(records.iter().map(TrendPoint::from).collect())
}

/// Records passing the volume threshold, plus the symbols whose delivery
/// percentage never drops across them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Screener {
    pub since: NaiveDate,
    pub volume_threshold: u64,
    /// Ordered by symbol, then date
    pub records: Vec<TradeRecord>,
    pub accumulating: Vec<String>,
}

/// Builds the screener over the window of `window_days` ending at `today`.
/// Rows with an unknown traded quantity are excluded.
pub fn screen<S: TradeStore + ?Sized>(
    store: &S,
    today: NaiveDate,
    window_days: u32,
    volume_threshold: u64,
) -> Result<Screener, StoreError> {
    let since = window_start(today, window_days);
    let records: Vec<TradeRecord> = store
        .query(&RecordQuery::all().since(since))?
        .into_iter()
        .filter(|record| record.is_equity())
        .filter(|record| {
            record
                .total_traded_qty
                .map_or(false, |qty| qty >= volume_threshold)
        })
        .collect();

    let groups = group_by_symbol(records);
    let accumulating = groups
        .iter()
        .filter(|(_, rows)| is_accumulating_series(rows))
        .map(|(symbol, _)| symbol.clone())
        .collect();
    let records = groups.into_values().flatten().collect();

    Ok(Screener {
        since,
        volume_threshold,
        records,
        accumulating,
    })
}
