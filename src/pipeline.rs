//! Fetch-and-ingest orchestration.
//!
//! For each requested date the pipeline walks back over trading days until a
//! file is found (bounded by `max_attempts`), then normalizes, filters,
//! deduplicates and appends it. Every date yields an [`IngestOutcome`]; a
//! failure on one date never stops the others.

use crate::calendar::{latest_trading_day_on_or_before, previous_trading_day, trading_days_in_window};
use crate::dedup::{filter_new_records, DEFAULT_DELIVERY_PERCENT_THRESHOLD};
use crate::fetcher::{FileFetcher, TransportError};
use crate::normalizer::{normalize, RawTable, SchemaError};
use crate::report::WindowReport;
use crate::store::TradeStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Longest window accepted for ingestion or analysis, in calendar days.
pub const MAX_WINDOW_DAYS: u32 = 366;

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fetch attempts per requested date, each on an earlier trading day (default: 3)
    pub max_attempts: u32,
    /// Calendar days covered by a rolling-window run (default: 30)
    pub window_days: u32,
    /// Exclusive minimum delivery percentage (default: 60.0)
    pub delivery_percent_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_attempts: 3,
            window_days: 30,
            delivery_percent_threshold: DEFAULT_DELIVERY_PERCENT_THRESHOLD,
        }
    }
}

/// Where a [`FetchAttempt`] currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    Searching,
    Found,
    NotFound,
    TransportError(TransportError),
}

/// State of the backward search for a usable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub requested: NaiveDate,
    /// Date to try next, or the date that settled the search
    pub candidate: NaiveDate,
    pub remaining: u32,
    pub attempts: u32,
    pub status: AttemptStatus,
}

impl FetchAttempt {
    /// Starts a search at `requested`. A weekend date starts at the previous
    /// trading day without spending any budget.
    pub fn new(requested: NaiveDate, budget: u32) -> Self {
        FetchAttempt {
            requested,
            candidate: latest_trading_day_on_or_before(requested),
            remaining: budget,
            attempts: 0,
            status: if budget == 0 {
                AttemptStatus::NotFound
            } else {
                AttemptStatus::Searching
            },
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != AttemptStatus::Searching
    }

    /// Records the fetcher's answer for `candidate`. Returns the file content
    /// when the search is over with a hit.
    ///
    /// Empty content counts as not found. A transport error settles the
    /// search immediately.
    pub fn record(&mut self, result: Result<Option<Vec<u8>>, TransportError>) -> Option<Vec<u8>> {
        self.attempts += 1;
        self.remaining = self.remaining.saturating_sub(1);

        match result {
            Ok(Some(bytes)) if !bytes.is_empty() => {
                self.status = AttemptStatus::Found;
                Some(bytes)
            }
            Ok(_) => {
                if self.remaining == 0 {
                    self.status = AttemptStatus::NotFound;
                } else {
                    self.candidate = previous_trading_day(self.candidate);
                }
                None
            }
            Err(error) => {
                self.status = AttemptStatus::TransportError(error);
                None
            }
        }
    }
}

/// Runs the bounded backward search for `requested`.
///
/// # Returns
/// The settled attempt, plus the file content when one was found (in which
/// case `attempt.candidate` is the date it belongs to).
pub fn locate_file<F: FileFetcher + ?Sized>(
    fetcher: &F,
    requested: NaiveDate,
    max_attempts: u32,
) -> (FetchAttempt, Option<Vec<u8>>) {
    let mut attempt = FetchAttempt::new(requested, max_attempts);
    while !attempt.is_settled() {
        debug!(%requested, candidate = %attempt.candidate, remaining = attempt.remaining, "fetching bhavcopy");
        let result = fetcher.fetch(attempt.candidate);
        if let Some(bytes) = attempt.record(result) {
            return (attempt, Some(bytes));
        }
    }
    (attempt, None)
}

/// What happened to one requested date.
///
/// `date` is always the trading day whose file was used. Stored rows carry
/// the date from the file's own date column when it parses, which can differ
/// for a stale file; that case is logged as a warning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// `rows` new records were appended for `date`
    Ingested {
        date: NaiveDate,
        rows: usize,
        duplicates: usize,
        warnings: usize,
    },
    /// The file for `date` had nothing new above the threshold
    NoQualifyingRows {
        date: NaiveDate,
        duplicates: usize,
        warnings: usize,
    },
    /// The file for `date` could not be normalized
    SchemaError {
        date: NaiveDate,
        missing: Vec<String>,
        error: String,
    },
    /// No file on any of the attempted trading days
    NotFound { attempts: u32, last_candidate: NaiveDate },
    /// The source could not be reached while fetching `date`
    TransportError { date: NaiveDate, error: String },
    /// The store rejected a read or write for `date`
    StoreError { date: NaiveDate, error: String },
}

impl IngestOutcome {
    /// `true` for outcomes that leave the store consistent with the source.
    pub fn is_success(&self) -> bool {
        matches!(self, IngestOutcome::Ingested { .. } | IngestOutcome::NoQualifyingRows { .. })
    }

    pub fn rows_ingested(&self) -> usize {
        match self {
            IngestOutcome::Ingested { rows, .. } => *rows,
            _ => 0,
        }
    }
}

/// Outcome for a single requested date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateReport {
    pub requested: NaiveDate,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

/// Fetch, normalize, filter and persist bhavcopy files.
#[derive(Debug)]
pub struct IngestPipeline<F> {
    fetcher: F,
    config: PipelineConfig,
}

impl<F: FileFetcher> IngestPipeline<F> {
    pub fn new(fetcher: F, config: PipelineConfig) -> Self {
        IngestPipeline { fetcher, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Ingests the file for `requested`, walking back over earlier trading
    /// days when it is missing.
    pub fn ingest_date<S: TradeStore + ?Sized>(&self, store: &mut S, requested: NaiveDate) -> DateReport {
        let (attempt, content) = locate_file(&self.fetcher, requested, self.config.max_attempts);

        let outcome = match (attempt.status, content) {
            (AttemptStatus::Found, Some(bytes)) => self.ingest_bytes(store, attempt.candidate, &bytes),
            (AttemptStatus::TransportError(error), _) => {
                warn!(%requested, candidate = %attempt.candidate, %error, "transport error, giving up on date");
                IngestOutcome::TransportError {
                    date: attempt.candidate,
                    error: error.to_string(),
                }
            }
            _ => IngestOutcome::NotFound {
                attempts: attempt.attempts,
                last_candidate: attempt.candidate,
            },
        };

        info!(%requested, ?outcome, "date processed");
        DateReport { requested, outcome }
    }

    /// Normalizes, filters and appends one file's content for `date`.
    pub fn ingest_bytes<S: TradeStore + ?Sized>(&self, store: &mut S, date: NaiveDate, bytes: &[u8]) -> IngestOutcome {
        let batch = match RawTable::from_csv_bytes(bytes).and_then(|table| normalize(&table, date)) {
            Ok(batch) => batch,
            Err(error) => {
                warn!(%date, %error, "bhavcopy rejected");
                let missing = match &error {
                    SchemaError::MissingColumns { missing } => missing.clone(),
                    SchemaError::Malformed(_) => Vec::new(),
                };
                return IngestOutcome::SchemaError {
                    date,
                    missing,
                    error: error.to_string(),
                };
            }
        };

        let mismatched = batch.records.iter().filter(|record| record.date != date).count();
        if mismatched > 0 {
            warn!(%date, mismatched, "rows dated differently from the file they came from");
        }

        let warnings = batch.warnings.len();
        if warnings > 0 {
            debug!(%date, warnings, "rows dropped during normalization");
        }

        let filtered = match filter_new_records(batch.records, self.config.delivery_percent_threshold, &*store) {
            Ok(filtered) => filtered,
            Err(error) => {
                return IngestOutcome::StoreError {
                    date,
                    error: error.to_string(),
                }
            }
        };

        if filtered.is_empty() {
            return IngestOutcome::NoQualifyingRows {
                date,
                duplicates: filtered.duplicates,
                warnings,
            };
        }

        match store.append_if_absent(&filtered.records) {
            Ok(rows) => IngestOutcome::Ingested {
                date,
                rows,
                duplicates: filtered.duplicates + (filtered.records.len() - rows),
                warnings,
            },
            Err(error) => IngestOutcome::StoreError {
                date,
                error: error.to_string(),
            },
        }
    }

    /// Ingests every trading day among the `days` calendar days ending at
    /// `end`, oldest first. Always processes every date.
    pub fn ingest_window<S: TradeStore + ?Sized>(&self, store: &mut S, end: NaiveDate, days: u32) -> WindowReport {
        let dates: Vec<DateReport> = trading_days_in_window(end, days)
            .into_iter()
            .map(|date| self.ingest_date(store, date))
            .collect();

        let report = WindowReport::new(end, days, dates);
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            rows = report.rows_ingested(),
            "window ingestion complete"
        );
        report
    }
}
