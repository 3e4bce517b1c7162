//! Raw bhavcopy tables to typed [`TradeRecord`]s.
//!
//! Exchange files have changed their headers over the years (`DATE1` vs
//! `DATE`, `TTL_TRD_QNTY` vs `TOT_TRD_QTY`, leading spaces in ` SERIES`).
//! Headers are trimmed and uppercased, then resolved once per file through
//! [`COLUMN_ALIASES`] into a [`ColumnIndex`]; every row is afterwards read by
//! position.

use crate::record::TradeRecord;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Canonical fields a bhavcopy row must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Symbol,
    Series,
    Date,
    ClosePrice,
    TotalTradedQty,
    NumberOfTrades,
    DeliveryQty,
    DeliveryPercent,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 8] = [
        CanonicalField::Symbol,
        CanonicalField::Series,
        CanonicalField::Date,
        CanonicalField::ClosePrice,
        CanonicalField::TotalTradedQty,
        CanonicalField::NumberOfTrades,
        CanonicalField::DeliveryQty,
        CanonicalField::DeliveryPercent,
    ];

    /// Header name used in the current file vintage; used when reporting.
    pub fn primary_header(self) -> &'static str {
        match self {
            CanonicalField::Symbol => "SYMBOL",
            CanonicalField::Series => "SERIES",
            CanonicalField::Date => "DATE1",
            CanonicalField::ClosePrice => "CLOSE_PRICE",
            CanonicalField::TotalTradedQty => "TTL_TRD_QNTY",
            CanonicalField::NumberOfTrades => "NO_OF_TRADES",
            CanonicalField::DeliveryQty => "DELIV_QTY",
            CanonicalField::DeliveryPercent => "DELIV_PER",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primary_header())
    }
}

/// Known header spellings, already trimmed and uppercased.
pub const COLUMN_ALIASES: &[(&str, CanonicalField)] = &[
    ("SYMBOL", CanonicalField::Symbol),
    ("SERIES", CanonicalField::Series),
    ("DATE1", CanonicalField::Date),
    ("DATE", CanonicalField::Date),
    ("TIMESTAMP", CanonicalField::Date),
    ("TRADE_DATE", CanonicalField::Date),
    ("CLOSE_PRICE", CanonicalField::ClosePrice),
    ("CLOSE", CanonicalField::ClosePrice),
    ("CLOSE_PRIC", CanonicalField::ClosePrice),
    ("TTL_TRD_QNTY", CanonicalField::TotalTradedQty),
    ("TOT_TRD_QTY", CanonicalField::TotalTradedQty),
    ("TOTTRDQTY", CanonicalField::TotalTradedQty),
    ("TOTAL_TRADED_QTY", CanonicalField::TotalTradedQty),
    ("NO_OF_TRADES", CanonicalField::NumberOfTrades),
    ("TOTALTRADES", CanonicalField::NumberOfTrades),
    ("NUM_TRADES", CanonicalField::NumberOfTrades),
    ("DELIV_QTY", CanonicalField::DeliveryQty),
    ("DELIVERABLE_QTY", CanonicalField::DeliveryQty),
    ("DLY_QT", CanonicalField::DeliveryQty),
    ("DELIV_PER", CanonicalField::DeliveryPercent),
    ("DELIVERY_PERCENT", CanonicalField::DeliveryPercent),
    ("DLY_QT_TO_TRD_QTY", CanonicalField::DeliveryPercent),
];

/// Date layouts seen in the `DATE1`/`DATE` column across file vintages.
const DATE_FORMATS: &[&str] = &["%d-%b-%Y", "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d%m%Y"];

/// Reasons a file cannot be normalized at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Required columns are absent after alias resolution
    #[error("missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },
    /// The content is not readable as CSV
    #[error("malformed CSV: {0}")]
    Malformed(String),
}

/// A row that was dropped during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based data row number (header excluded)
    pub row: usize,
    /// `None` when the row itself could not be decoded as UTF-8
    pub field: Option<CanonicalField>,
    pub value: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(f, "row {}: unparseable {} value {:?}", self.row, field, self.value),
            None => write!(f, "row {}: not valid UTF-8", self.row),
        }
    }
}

/// Header row plus string cells, as read from a bhavcopy file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Ascending 1-based numbers of rows whose bytes were not UTF-8; their
    /// entry in `rows` is empty
    pub undecodable_rows: Vec<usize>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        RawTable {
            headers,
            rows,
            undecodable_rows: Vec::new(),
        }
    }

    /// Reads CSV bytes with a header row. Cells and headers are trimmed and
    /// short rows are tolerated. A row that is not valid UTF-8 is kept as a
    /// placeholder in `undecodable_rows` so that only that row is lost.
    ///
    /// # Errors
    /// Returns `SchemaError::Malformed` if the bytes cannot be read as CSV or
    /// the header row is not UTF-8.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|e| SchemaError::Malformed(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        let mut undecodable_rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|e| SchemaError::Malformed(e.to_string()))?;
            // Trailing blank lines in exchange files come through as one empty cell
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            let cells: Result<Vec<String>, _> = record
                .iter()
                .map(|cell| std::str::from_utf8(cell).map(str::to_string))
                .collect();
            match cells {
                Ok(cells) => rows.push(cells),
                Err(_) => {
                    rows.push(Vec::new());
                    undecodable_rows.push(rows.len());
                }
            }
        }

        Ok(RawTable {
            headers,
            rows,
            undecodable_rows,
        })
    }
}

/// Positions of each canonical field in a particular file's header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIndex {
    positions: [usize; 8],
}

impl ColumnIndex {
    /// Resolves `headers` against [`COLUMN_ALIASES`]. The first header that
    /// maps to a field wins.
    ///
    /// # Errors
    /// Returns `SchemaError::MissingColumns` naming every unresolved field.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<Self, SchemaError> {
        let mut found: [Option<usize>; 8] = [None; 8];
        for (position, header) in headers.iter().enumerate() {
            let normalized = header.as_ref().trim().to_uppercase();
            if let Some((_, field)) = COLUMN_ALIASES.iter().find(|(alias, _)| *alias == normalized) {
                found[field.slot()].get_or_insert(position);
            }
        }

        let missing: Vec<String> = CanonicalField::ALL
            .iter()
            .filter(|field| found[field.slot()].is_none())
            .map(|field| field.primary_header().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns { missing });
        }

        let mut positions = [0usize; 8];
        for field in CanonicalField::ALL {
            positions[field.slot()] = found[field.slot()].unwrap_or_default();
        }
        Ok(ColumnIndex { positions })
    }

    fn cell<'a>(&self, row: &'a [String], field: CanonicalField) -> &'a str {
        row.get(self.positions[field.slot()])
            .map(|cell| cell.trim())
            .unwrap_or("")
    }
}

/// Output of [`normalize`]: typed rows for one file, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    /// Date the file was fetched for
    pub date: NaiveDate,
    pub records: Vec<TradeRecord>,
    pub warnings: Vec<ParseWarning>,
}

/// Converts a raw table into typed records for `date`.
///
/// Rows without a symbol or with an unparseable delivery percentage are
/// dropped and reported as warnings. Other numeric cells that fail to parse
/// are kept as unknown.
///
/// # Errors
/// Returns `SchemaError::MissingColumns` when a required column is missing;
/// in that case no rows are produced.
pub fn normalize(table: &RawTable, date: NaiveDate) -> Result<NormalizedBatch, SchemaError> {
    let index = ColumnIndex::resolve(&table.headers)?;

    let mut records = Vec::with_capacity(table.rows.len());
    let mut warnings = Vec::new();

    for (i, row) in table.rows.iter().enumerate() {
        let row_number = i + 1;

        if table.undecodable_rows.binary_search(&row_number).is_ok() {
            warnings.push(ParseWarning {
                row: row_number,
                field: None,
                value: String::new(),
            });
            continue;
        }

        let symbol = index.cell(row, CanonicalField::Symbol);
        if symbol.is_empty() {
            warnings.push(ParseWarning {
                row: row_number,
                field: Some(CanonicalField::Symbol),
                value: String::new(),
            });
            continue;
        }

        let raw_percent = index.cell(row, CanonicalField::DeliveryPercent);
        let delivery_percent = match parse_delivery_percent(raw_percent) {
            Some(value) => value,
            None => {
                warnings.push(ParseWarning {
                    row: row_number,
                    field: Some(CanonicalField::DeliveryPercent),
                    value: raw_percent.to_string(),
                });
                continue;
            }
        };

        let row_date = parse_trade_date(index.cell(row, CanonicalField::Date)).unwrap_or(date);

        records.push(TradeRecord {
            date: row_date,
            symbol: symbol.to_string(),
            series: index.cell(row, CanonicalField::Series).to_string(),
            delivery_percent,
            delivery_qty: parse_quantity(index.cell(row, CanonicalField::DeliveryQty)),
            total_traded_qty: parse_quantity(index.cell(row, CanonicalField::TotalTradedQty)),
            number_of_trades: parse_quantity(index.cell(row, CanonicalField::NumberOfTrades)),
            close_price: parse_price(index.cell(row, CanonicalField::ClosePrice)),
        });
    }

    Ok(NormalizedBatch {
        date,
        records,
        warnings,
    })
}

/// Parses `"65.5"`, `"70%"` or `"1,200.3"`.
pub fn parse_delivery_percent(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    let cleaned = cleaned.strip_suffix('%').unwrap_or(&cleaned).trim();
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Largest quantity SQLite can hold in an INTEGER column.
const MAX_QUANTITY: u64 = i64::MAX as u64;

/// Parses a non-negative integer quantity, allowing thousands separators and
/// integral decimals such as `"1200.0"`. Values above `i64::MAX` are
/// unknown.
pub fn parse_quantity(raw: &str) -> Option<u64> {
    let cleaned = raw.trim().replace(',', "");
    if let Ok(value) = cleaned.parse::<u64>() {
        return (value <= MAX_QUANTITY).then_some(value);
    }
    match cleaned.parse::<f64>() {
        // i64::MAX as f64 rounds up to 2^63, hence the strict bound
        Ok(value) if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < MAX_QUANTITY as f64 => {
            Some(value as u64)
        }
        _ => None,
    }
}

/// Parses a non-negative price.
pub fn parse_price(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

/// Parses a trade date in any of the layouts the exchange has used.
pub fn parse_trade_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_HEADER: &str = "SYMBOL, SERIES, DATE1, PREV_CLOSE, OPEN_PRICE, HIGH_PRICE, LOW_PRICE, LAST_PRICE, CLOSE_PRICE, AVG_PRICE, TTL_TRD_QNTY, TURNOVER_LACS, NO_OF_TRADES, DELIV_QTY, DELIV_PER";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn table(csv: &str) -> RawTable {
        RawTable::from_csv_bytes(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_delivery_percent_decorations() {
        assert_eq!(parse_delivery_percent("65.5"), Some(65.5));
        assert_eq!(parse_delivery_percent("70%"), Some(70.0));
        assert_eq!(parse_delivery_percent("1,200.3"), Some(1200.3));
        assert_eq!(parse_delivery_percent(" 42.1 % "), Some(42.1));
        assert_eq!(parse_delivery_percent("-"), None);
        assert_eq!(parse_delivery_percent(""), None);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("1,20,000"), Some(120_000));
        assert_eq!(parse_quantity("500.0"), Some(500));
        assert_eq!(parse_quantity("12.5"), None);
        assert_eq!(parse_quantity("-3"), None);
        assert_eq!(parse_quantity("-"), None);
    }

    #[test]
    fn test_parse_quantity_rejects_values_beyond_sqlite_range() {
        assert_eq!(parse_quantity("9223372036854775807"), Some(i64::MAX as u64));
        assert_eq!(parse_quantity("9223372036854775808"), None);
        assert_eq!(parse_quantity("10000000000000000000"), None);
        assert_eq!(parse_quantity("1e30"), None);
        assert_eq!(parse_quantity("1e18"), Some(1_000_000_000_000_000_000));
    }

    #[test]
    fn test_undecodable_row_is_dropped_alone() {
        let mut bytes = b"SYMBOL,SERIES,DATE1,CLOSE_PRICE,TTL_TRD_QNTY,NO_OF_TRADES,DELIV_QTY,DELIV_PER\n\
                          INFY,EQ,15-Jan-2024,1612,1000,10,700,70\n"
            .to_vec();
        bytes.extend_from_slice(b"\xff\xfeBAD,EQ,15-Jan-2024,1,1000,10,700,80\n");
        bytes.extend_from_slice(b"TCS,EQ,15-Jan-2024,3600,1000,10,650,65\n");

        let table = RawTable::from_csv_bytes(&bytes).unwrap();
        assert_eq!(table.undecodable_rows, vec![2]);

        let batch = normalize(&table, date(2024, 1, 15)).unwrap();
        let symbols: Vec<&str> = batch.records.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["INFY", "TCS"]);
        assert_eq!(batch.warnings.len(), 1);
        assert_eq!(batch.warnings[0].row, 2);
        assert_eq!(batch.warnings[0].field, None);
        assert_eq!(batch.warnings[0].to_string(), "row 2: not valid UTF-8");
    }

    #[test]
    fn test_normalize_prebuilt_table() {
        let table = RawTable::new(
            ["SYMBOL", "SERIES", "DATE1", "CLOSE_PRICE", "TTL_TRD_QNTY", "NO_OF_TRADES", "DELIV_QTY", "DELIV_PER"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec![["SBIN", "EQ", "", "600", "1000", "10", "800", "80"]
                .iter()
                .map(|s| s.to_string())
                .collect()],
        );
        let batch = normalize(&table, date(2024, 1, 15)).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].delivery_percent, 80.0);
    }

    #[test]
    fn test_parse_trade_date_formats() {
        assert_eq!(parse_trade_date("15-Jan-2024"), Some(date(2024, 1, 15)));
        assert_eq!(parse_trade_date("2024-01-15"), Some(date(2024, 1, 15)));
        assert_eq!(parse_trade_date("15-01-2024"), Some(date(2024, 1, 15)));
        assert_eq!(parse_trade_date("15012024"), Some(date(2024, 1, 15)));
        assert_eq!(parse_trade_date("yesterday"), None);
    }

    #[test]
    fn test_normalize_current_vintage_with_padded_headers() {
        let csv = format!(
            "{FULL_HEADER}\nINFY, EQ, 15-Jan-2024, 1600, 1601, 1620, 1590, 1610, 1612.35, 1605.2, 500000, 8026.1, 120000, 350000, 70.00\n\
             TCS, BE, 15-Jan-2024, 3600, 3601, 3620, 3590, 3610, 3612.00, 3605.2, 1000, 36.1, 50, 300, -\n"
        );
        let batch = normalize(&table(&csv), date(2024, 1, 15)).unwrap();

        assert_eq!(batch.records.len(), 1);
        let infy = &batch.records[0];
        assert_eq!(infy.symbol, "INFY");
        assert_eq!(infy.series, "EQ");
        assert_eq!(infy.date, date(2024, 1, 15));
        assert_eq!(infy.delivery_percent, 70.0);
        assert_eq!(infy.delivery_qty, Some(350_000));
        assert_eq!(infy.total_traded_qty, Some(500_000));
        assert_eq!(infy.number_of_trades, Some(120_000));
        assert_eq!(infy.close_price, Some(1612.35));

        assert_eq!(batch.warnings.len(), 1);
        assert_eq!(batch.warnings[0].field, Some(CanonicalField::DeliveryPercent));
        assert_eq!(batch.warnings[0].row, 2);
    }

    #[test]
    fn test_normalize_resolves_older_aliases() {
        let csv = "symbol,series,date,close,tot_trd_qty,totaltrades,deliverable_qty,delivery_percent\n\
                   SBIN,EQ,2019-03-01,280.5,1000,10,700,70%\n";
        let batch = normalize(&table(csv), date(2019, 3, 1)).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].delivery_qty, Some(700));
        assert_eq!(batch.records[0].close_price, Some(280.5));
    }

    #[test]
    fn test_unparseable_numeric_becomes_unknown() {
        let csv = "SYMBOL,SERIES,DATE1,CLOSE_PRICE,TTL_TRD_QNTY,NO_OF_TRADES,DELIV_QTY,DELIV_PER\n\
                   WIPRO,EQ,15-Jan-2024,n/a,-,abc,700,65.5\n";
        let batch = normalize(&table(csv), date(2024, 1, 15)).unwrap();
        let record = &batch.records[0];
        assert_eq!(record.close_price, None);
        assert_eq!(record.total_traded_qty, None);
        assert_eq!(record.number_of_trades, None);
        assert_eq!(record.delivery_qty, Some(700));
        assert!(batch.warnings.is_empty());
    }

    #[test]
    fn test_missing_series_column_is_schema_error() {
        let csv = "SYMBOL,DATE1,CLOSE_PRICE,TTL_TRD_QNTY,NO_OF_TRADES,DELIV_QTY,DELIV_PER\n\
                   WIPRO,15-Jan-2024,450,1000,10,700,65.5\n";
        let err = normalize(&table(csv), date(2024, 1, 15)).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingColumns {
                missing: vec!["SERIES".to_string()]
            }
        );
        assert!(err.to_string().contains("SERIES"));
    }

    #[test]
    fn test_unparseable_date_cell_falls_back_to_target_date() {
        let csv = "SYMBOL,SERIES,DATE1,CLOSE_PRICE,TTL_TRD_QNTY,NO_OF_TRADES,DELIV_QTY,DELIV_PER\n\
                   WIPRO,EQ,,450,1000,10,700,65.5\n";
        let batch = normalize(&table(csv), date(2024, 1, 15)).unwrap();
        assert_eq!(batch.records[0].date, date(2024, 1, 15));
    }

    #[test]
    fn test_empty_symbol_and_short_rows_are_dropped() {
        let csv = "SYMBOL,SERIES,DATE1,CLOSE_PRICE,TTL_TRD_QNTY,NO_OF_TRADES,DELIV_QTY,DELIV_PER\n\
                   ,EQ,15-Jan-2024,450,1000,10,700,65.5\n\
                   HDFC,EQ\n";
        let batch = normalize(&table(csv), date(2024, 1, 15)).unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.warnings.len(), 2);
        assert_eq!(batch.warnings[0].field, Some(CanonicalField::Symbol));
        assert_eq!(batch.warnings[1].field, Some(CanonicalField::DeliveryPercent));
    }

    #[test]
    fn test_first_matching_header_wins() {
        let index = ColumnIndex::resolve(&[
            "SYMBOL", "SERIES", "DATE1", "DATE", "CLOSE_PRICE", "TTL_TRD_QNTY", "NO_OF_TRADES",
            "DELIV_QTY", "DELIV_PER",
        ])
        .unwrap();
        let row: Vec<String> = ["A", "EQ", "d1", "d2", "1", "2", "3", "4", "5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(index.cell(&row, CanonicalField::Date), "d1");
    }
}
