use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Series code of the cash-market equity segment.
pub const EQUITY_SERIES: &str = "EQ";

/// One end-of-day row for a security on a trading date.
///
/// `delivery_percent` is always known: rows whose delivery percentage cannot
/// be parsed never become a `TradeRecord`. The remaining numeric fields are
/// `None` when the source cell could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Trading date the row belongs to
    pub date: NaiveDate,
    /// Exchange symbol (e.g., "RELIANCE")
    pub symbol: String,
    /// Series code (e.g., "EQ", "BE")
    pub series: String,
    /// Delivered quantity as a percentage of traded quantity
    pub delivery_percent: f64,
    /// Delivered quantity
    pub delivery_qty: Option<u64>,
    /// Total traded quantity
    pub total_traded_qty: Option<u64>,
    /// Number of trades
    pub number_of_trades: Option<u64>,
    /// Closing price
    pub close_price: Option<f64>,
}

impl TradeRecord {
    /// Creates a record with every numeric field known.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        date: NaiveDate,
        symbol: impl Into<String>,
        series: impl Into<String>,
        delivery_percent: f64,
        delivery_qty: u64,
        total_traded_qty: u64,
        number_of_trades: u64,
        close_price: f64,
    ) -> Self {
        TradeRecord {
            date,
            symbol: symbol.into(),
            series: series.into(),
            delivery_percent,
            delivery_qty: Some(delivery_qty),
            total_traded_qty: Some(total_traded_qty),
            number_of_trades: Some(number_of_trades),
            close_price: Some(close_price),
        }
    }

    /// The store's uniqueness key.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            date: self.date,
            symbol: self.symbol.clone(),
        }
    }

    pub fn is_equity(&self) -> bool {
        self.series == EQUITY_SERIES
    }
}

/// `(date, symbol)` identity of a stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub date: NaiveDate,
    pub symbol: String,
}
