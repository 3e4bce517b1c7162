use crate::record::TradeRecord;
use crate::store::{validate_query, RecordQuery, StoreError, TradeStore};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::path::Path;

/// SQLite-backed trade store.
///
/// Rows live in the `bhavcopy` table with `(date, symbol)` as primary key, so
/// the uniqueness invariant is enforced by the database itself. The schema is
/// created on first use.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a file-based store.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file. Created if missing.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established or the schema
    /// cannot be created.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = SqliteStore { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Creates a store backed by an in-memory database.
    ///
    /// Useful for testing.
    pub fn new_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> SqliteResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS bhavcopy (
                date TEXT NOT NULL,
                symbol TEXT NOT NULL,
                series TEXT NOT NULL,
                deliv_per REAL NOT NULL,
                deliv_qty INTEGER,
                total_traded_qty INTEGER,
                no_of_trades INTEGER,
                close_price REAL,
                PRIMARY KEY (date, symbol)
            )",
            [],
        )?;

        // Per-symbol trend queries
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_bhavcopy_symbol ON bhavcopy(symbol)",
            [],
        )?;

        Ok(())
    }

    /// Checks if a table exists in the database.
    pub fn table_exists(&self, table_name: &str) -> SqliteResult<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
        stmt.exists([table_name])
    }

    /// Returns the number of stored rows.
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM bhavcopy", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn record_from_row(row: &Row<'_>) -> SqliteResult<TradeRecord> {
    Ok(TradeRecord {
        date: row.get(0)?,
        symbol: row.get(1)?,
        series: row.get(2)?,
        delivery_percent: row.get(3)?,
        delivery_qty: row.get(4)?,
        total_traded_qty: row.get(5)?,
        number_of_trades: row.get(6)?,
        close_price: row.get(7)?,
    })
}

impl TradeStore for SqliteStore {
    fn append_if_absent(&mut self, records: &[TradeRecord]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO bhavcopy
                    (date, symbol, series, deliv_per, deliv_qty, total_traded_qty, no_of_trades, close_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in records {
                inserted += stmt.execute(params![
                    record.date,
                    record.symbol,
                    record.series,
                    record.delivery_percent,
                    record.delivery_qty,
                    record.total_traded_qty,
                    record.number_of_trades,
                    record.close_price,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn query(&self, query: &RecordQuery) -> Result<Vec<TradeRecord>, StoreError> {
        validate_query(query)?;

        let mut stmt = self.conn.prepare(
            "SELECT date, symbol, series, deliv_per, deliv_qty, total_traded_qty, no_of_trades, close_price
             FROM bhavcopy
             WHERE (?1 IS NULL OR date >= ?1)
               AND (?2 IS NULL OR date <= ?2)
               AND (?3 IS NULL OR symbol = ?3)
             ORDER BY date, symbol",
        )?;

        let rows = stmt.query_map(params![query.since, query.until, query.symbol], record_from_row)?;
        let records = rows.collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }

    fn list_distinct_symbols(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT symbol FROM bhavcopy ORDER BY symbol")?;
        let symbols = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(symbols)
    }
}
