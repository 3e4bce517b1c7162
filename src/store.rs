use crate::record::{RecordKey, TradeRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

/// Filter for [`TradeStore::query`]. Bounds are inclusive; `None` means
/// unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub symbol: Option<String>,
}

impl RecordQuery {
    pub fn all() -> Self {
        RecordQuery::default()
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.until = Some(date);
        self
    }

    pub fn on(self, date: NaiveDate) -> Self {
        self.since(date).until(date)
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn matches(&self, record: &TradeRecord) -> bool {
        self.since.map_or(true, |since| record.date >= since)
            && self.until.map_or(true, |until| record.date <= until)
            && self.symbol.as_ref().map_or(true, |symbol| &record.symbol == symbol)
    }
}

/// Errors raised by a [`TradeStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQL error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid date range: {since} > {until}")]
    InvalidDateRange { since: NaiveDate, until: NaiveDate },
}

/// Append-only persistence for trade records keyed by `(date, symbol)`.
///
/// Implementations must keep the key unique: appending a row whose key is
/// already stored leaves the existing row untouched and does not count it.
pub trait TradeStore {
    /// Inserts the records whose key is not yet present.
    ///
    /// # Returns
    /// Returns the number of rows actually inserted.
    fn append_if_absent(&mut self, records: &[TradeRecord]) -> Result<usize, StoreError>;

    /// Returns matching records ordered by date, then symbol.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidDateRange` when `since > until`.
    fn query(&self, query: &RecordQuery) -> Result<Vec<TradeRecord>, StoreError>;

    /// Returns every stored symbol in ascending order.
    fn list_distinct_symbols(&self) -> Result<Vec<String>, StoreError>;
}

pub(crate) fn validate_query(query: &RecordQuery) -> Result<(), StoreError> {
    match (query.since, query.until) {
        (Some(since), Some(until)) if since > until => {
            Err(StoreError::InvalidDateRange { since, until })
        }
        _ => Ok(()),
    }
}

/// In-memory store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    rows: BTreeMap<RecordKey, TradeRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TradeStore for InMemoryStore {
    fn append_if_absent(&mut self, records: &[TradeRecord]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for record in records {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.rows.entry(record.key()) {
                slot.insert(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn query(&self, query: &RecordQuery) -> Result<Vec<TradeRecord>, StoreError> {
        validate_query(query)?;
        // BTreeMap order on RecordKey is (date, symbol)
        Ok(self
            .rows
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }

    fn list_distinct_symbols(&self) -> Result<Vec<String>, StoreError> {
        let mut symbols: Vec<String> = self.rows.keys().map(|key| key.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(d: u32, symbol: &str, percent: f64) -> TradeRecord {
        TradeRecord::new(date(d), symbol, "EQ", percent, 100, 200, 10, 50.0)
    }

    #[test]
    fn test_append_if_absent_is_idempotent() {
        let mut store = InMemoryStore::new();
        let batch = vec![record(15, "INFY", 70.0), record(15, "TCS", 65.0)];
        assert_eq!(store.append_if_absent(&batch).unwrap(), 2);
        assert_eq!(store.append_if_absent(&batch).unwrap(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_does_not_overwrite() {
        let mut store = InMemoryStore::new();
        store.append_if_absent(&[record(15, "INFY", 70.0)]).unwrap();
        store.append_if_absent(&[record(15, "INFY", 99.0)]).unwrap();
        let rows = store.query(&RecordQuery::all()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].delivery_percent, 70.0);
    }

    #[test]
    fn test_query_filters_and_orders() {
        let mut store = InMemoryStore::new();
        store
            .append_if_absent(&[
                record(17, "INFY", 72.0),
                record(15, "TCS", 65.0),
                record(15, "INFY", 70.0),
                record(16, "INFY", 71.0),
            ])
            .unwrap();

        let rows = store.query(&RecordQuery::all().since(date(16))).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, date(16));

        let infy = store.query(&RecordQuery::all().symbol("INFY").until(date(16))).unwrap();
        let days: Vec<NaiveDate> = infy.iter().map(|r| r.date).collect();
        assert_eq!(days, vec![date(15), date(16)]);

        let first_day = store.query(&RecordQuery::all().on(date(15))).unwrap();
        let symbols: Vec<&str> = first_day.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["INFY", "TCS"]);

        assert_eq!(store.list_distinct_symbols().unwrap(), vec!["INFY", "TCS"]);
    }

    #[test]
    fn test_invalid_date_range() {
        let store = InMemoryStore::new();
        let result = store.query(&RecordQuery::all().since(date(16)).until(date(15)));
        assert!(matches!(result, Err(StoreError::InvalidDateRange { .. })));
    }
}
