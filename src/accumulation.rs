//! Rolling per-symbol aggregates and accumulation flags.
//!
//! Everything here is computed from the store on demand; nothing is cached or
//! written back.

use crate::record::TradeRecord;
use crate::store::{RecordQuery, StoreError, TradeStore};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Thresholds and window for the accumulation views.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Trailing window in calendar days (default: 30)
    pub window_days: u32,
    /// Exclusive minimum average delivery percentage (default: 60.0)
    pub min_avg_delivery_percent: f64,
    /// Exclusive minimum average number of trades (default: 100000)
    pub min_avg_trades: f64,
    /// Minimum total traded quantity for the screener (default: 1000000)
    pub volume_threshold: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            window_days: 30,
            min_avg_delivery_percent: 60.0,
            min_avg_trades: 100_000.0,
            volume_threshold: 1_000_000,
        }
    }
}

/// Aggregates for one symbol over the analysis window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccumulationSummary {
    pub symbol: String,
    pub avg_delivery_percent: f64,
    /// `None` when no record in the window had a known delivery quantity
    pub avg_delivery_qty: Option<f64>,
    /// `None` when no record in the window had a known trade count
    pub avg_trades: Option<f64>,
    /// Records averaged
    pub days: usize,
    pub is_accumulating: bool,
}

/// First date included in a window of `window_days` ending at `today`.
pub fn window_start(today: NaiveDate, window_days: u32) -> NaiveDate {
    today - Duration::days(i64::from(window_days))
}

/// `true` when no value is smaller than the one before it. Equal neighbours
/// are allowed; a single decrease anywhere disqualifies the sequence.
pub fn is_non_decreasing(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] <= pair[1])
}

/// Whether delivery percentage never drops across `records` taken in date
/// order. `records` may be in any order and must belong to one symbol.
pub fn is_accumulating_series(records: &[TradeRecord]) -> bool {
    let mut ordered: Vec<&TradeRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.date);
    let percents: Vec<f64> = ordered.iter().map(|record| record.delivery_percent).collect();
    is_non_decreasing(&percents)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Groups records by symbol in ascending symbol order.
pub fn group_by_symbol(records: Vec<TradeRecord>) -> BTreeMap<String, Vec<TradeRecord>> {
    let mut groups: BTreeMap<String, Vec<TradeRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.symbol.clone()).or_default().push(record);
    }
    groups
}

/// Computes the summary for one symbol's records.
pub fn summarize_symbol(symbol: &str, records: &[TradeRecord]) -> Option<AccumulationSummary> {
    let avg_delivery_percent = mean(records.iter().map(|r| r.delivery_percent))?;
    Some(AccumulationSummary {
        symbol: symbol.to_string(),
        avg_delivery_percent,
        avg_delivery_qty: mean(records.iter().filter_map(|r| r.delivery_qty).map(|v| v as f64)),
        avg_trades: mean(records.iter().filter_map(|r| r.number_of_trades).map(|v| v as f64)),
        days: records.len(),
        is_accumulating: is_accumulating_series(records),
    })
}

/// Higher average delivery quantity first; unknown last; ties by symbol.
fn by_delivery_qty_desc(a: &AccumulationSummary, b: &AccumulationSummary) -> Ordering {
    match (a.avg_delivery_qty, b.avg_delivery_qty) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.symbol.cmp(&b.symbol))
}

/// Computes accumulation views over a trailing window of the store.
#[derive(Debug, Clone, Default)]
pub struct AccumulationAnalyzer {
    config: AnalysisConfig,
}

impl AccumulationAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        AccumulationAnalyzer { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Applies the retention thresholds and ordering to already-selected
    /// records.
    pub fn summarize_records(&self, records: Vec<TradeRecord>) -> Vec<AccumulationSummary> {
        let mut summaries: Vec<AccumulationSummary> = group_by_symbol(records)
            .iter()
            .filter_map(|(symbol, rows)| summarize_symbol(symbol, rows))
            .filter(|summary| {
                summary.avg_delivery_percent > self.config.min_avg_delivery_percent
                    && summary
                        .avg_trades
                        .map_or(false, |trades| trades > self.config.min_avg_trades)
            })
            .collect();
        summaries.sort_by(by_delivery_qty_desc);
        summaries
    }

    /// Summaries for every symbol passing the thresholds over the records
    /// dated on or after `today - window_days`, ordered by average delivery
    /// quantity descending.
    ///
    /// # Errors
    /// Returns a `StoreError` if the store cannot be queried.
    pub fn summarize<S: TradeStore + ?Sized>(
        &self,
        store: &S,
        today: NaiveDate,
    ) -> Result<Vec<AccumulationSummary>, StoreError> {
        let since = window_start(today, self.config.window_days);
        let records = store.query(&RecordQuery::all().since(since))?;
        Ok(self.summarize_records(records))
    }

    /// Accumulation flag for one symbol over the window. A symbol with no
    /// records in the window is not accumulating.
    pub fn is_accumulating<S: TradeStore + ?Sized>(
        &self,
        store: &S,
        symbol: &str,
        today: NaiveDate,
    ) -> Result<bool, StoreError> {
        let since = window_start(today, self.config.window_days);
        let records = store.query(&RecordQuery::all().since(since).symbol(symbol))?;
        Ok(!records.is_empty() && is_accumulating_series(&records))
    }
}
