//! EQ-series / delivery-percentage filter and deduplication against the store.

use crate::record::{RecordKey, TradeRecord};
use crate::store::{RecordQuery, StoreError, TradeStore};
use std::collections::{BTreeSet, HashSet};

/// Default minimum delivery percentage (exclusive) for a row to qualify.
pub const DEFAULT_DELIVERY_PERCENT_THRESHOLD: f64 = 60.0;

/// Result of filtering one normalized batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredBatch {
    /// Rows ready to append
    pub records: Vec<TradeRecord>,
    /// Rows rejected by the series or delivery threshold test
    pub below_threshold: usize,
    /// Qualifying rows whose key was already stored or repeated in the batch
    pub duplicates: usize,
}

impl FilteredBatch {
    /// `true` when nothing is left to append. Callers may retry with a lower
    /// threshold; this is not an error.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Keeps EQ rows whose delivery percentage is above `threshold`.
pub fn passes_threshold(record: &TradeRecord, threshold: f64) -> bool {
    record.is_equity() && record.delivery_percent > threshold
}

/// Applies the threshold filter, then drops rows whose `(date, symbol)` is
/// already in `store` or appears earlier in the same batch.
///
/// # Errors
/// Returns a `StoreError` if the existing keys cannot be read.
pub fn filter_new_records<S: TradeStore + ?Sized>(
    records: Vec<TradeRecord>,
    threshold: f64,
    store: &S,
) -> Result<FilteredBatch, StoreError> {
    let total = records.len();
    let qualifying: Vec<TradeRecord> = records
        .into_iter()
        .filter(|record| passes_threshold(record, threshold))
        .collect();
    let below_threshold = total - qualifying.len();

    let mut seen = existing_keys(store, &qualifying)?;
    let qualifying_count = qualifying.len();
    let fresh: Vec<TradeRecord> = qualifying
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect();

    Ok(FilteredBatch {
        duplicates: qualifying_count - fresh.len(),
        below_threshold,
        records: fresh,
    })
}

/// Keys already stored on any of the dates present in `records`.
fn existing_keys<S: TradeStore + ?Sized>(
    store: &S,
    records: &[TradeRecord],
) -> Result<HashSet<RecordKey>, StoreError> {
    let dates: BTreeSet<_> = records.iter().map(|record| record.date).collect();
    let mut keys = HashSet::new();
    for date in dates {
        for stored in store.query(&RecordQuery::all().on(date))? {
            keys.insert(stored.key());
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(symbol: &str, series: &str, percent: f64) -> TradeRecord {
        TradeRecord::new(date(15), symbol, series, percent, 100, 200, 10, 50.0)
    }

    #[test]
    fn test_threshold_is_exclusive_and_eq_only() {
        let batch = vec![
            record("A", "EQ", 60.0),
            record("B", "EQ", 60.01),
            record("C", "BE", 90.0),
            record("D", "EQ", 12.0),
        ];
        let filtered =
            filter_new_records(batch, DEFAULT_DELIVERY_PERCENT_THRESHOLD, &InMemoryStore::new()).unwrap();
        let symbols: Vec<&str> = filtered.records.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["B"]);
        assert_eq!(filtered.below_threshold, 3);
        assert_eq!(filtered.duplicates, 0);
    }

    #[test]
    fn test_removes_rows_already_stored() {
        let mut store = InMemoryStore::new();
        store.append_if_absent(&[record("A", "EQ", 70.0)]).unwrap();

        let filtered =
            filter_new_records(vec![record("A", "EQ", 75.0), record("B", "EQ", 80.0)], 60.0, &store).unwrap();
        assert_eq!(filtered.records.len(), 1);
        assert_eq!(filtered.records[0].symbol, "B");
        assert_eq!(filtered.duplicates, 1);
    }

    #[test]
    fn test_collapses_repeated_keys_keeping_first() {
        let filtered = filter_new_records(
            vec![record("A", "EQ", 70.0), record("A", "EQ", 90.0)],
            60.0,
            &InMemoryStore::new(),
        )
        .unwrap();
        assert_eq!(filtered.records.len(), 1);
        assert_eq!(filtered.records[0].delivery_percent, 70.0);
        assert_eq!(filtered.duplicates, 1);
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let filtered =
            filter_new_records(vec![record("A", "EQ", 10.0)], 60.0, &InMemoryStore::new()).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_same_symbol_on_other_date_is_not_a_duplicate() {
        let mut store = InMemoryStore::new();
        let mut earlier = record("A", "EQ", 70.0);
        earlier.date = date(12);
        store.append_if_absent(&[earlier]).unwrap();

        let filtered = filter_new_records(vec![record("A", "EQ", 72.0)], 60.0, &store).unwrap();
        assert_eq!(filtered.records.len(), 1);
    }
}
