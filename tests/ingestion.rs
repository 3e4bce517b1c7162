use bhavcopy::dedup::DEFAULT_DELIVERY_PERCENT_THRESHOLD;
use bhavcopy::fetcher::{cache_file_name, LocalDirFetcher};
use bhavcopy::pipeline::{IngestOutcome, IngestPipeline, PipelineConfig};
use bhavcopy::sqlite_store::SqliteStore;
use bhavcopy::store::{RecordQuery, TradeStore};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;

const HEADER: &str = "SYMBOL, SERIES, DATE1, PREV_CLOSE, OPEN_PRICE, HIGH_PRICE, LOW_PRICE, LAST_PRICE, CLOSE_PRICE, AVG_PRICE, TTL_TRD_QNTY, TURNOVER_LACS, NO_OF_TRADES, DELIV_QTY, DELIV_PER";

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn write_file(dir: &Path, date: NaiveDate, body: &str) {
    fs::write(dir.join(cache_file_name(date)), body).unwrap();
}

fn sample_day() -> String {
    [
        HEADER,
        "INFY, EQ, 19-Jan-2024, 1600.00, 1605.00, 1620.00, 1590.00, 1610.00, 1612.35, 1608.10, 5000000, 80405.00, 150000, 3500000, 70.00",
        "TCS, EQ, 19-Jan-2024, 3700.00, 3710.00, 3725.00, 3690.00, 3700.00, 3702.10, 3705.55, 2000000, 74111.00, 120000, 900000, 45.00",
        "RELIANCE, EQ, 19-Jan-2024, 2700.00, 2705.00, 2730.00, 2690.00, 2720.00, 2721.00, 2712.00, 8000000, 216960.00, 300000, 5200000, 65.00",
        "GOLDBEES, BE, 19-Jan-2024, 55.00, 55.10, 55.50, 54.90, 55.20, 55.25, 55.18, 100000, 55.18, 2000, 95000, 95.00",
        "NIFTYETF, N1, 19-Jan-2024, 210.00, 210.00, 211.00, 209.00, 210.50, 210.40, 210.20, 700, 1.47, 30, -, -",
    ]
    .join("\n")
}

#[test]
fn ingests_qualifying_equity_rows_from_disk() {
    let source = tempfile::tempdir().unwrap();
    write_file(source.path(), date(19), &sample_day());

    let db_dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::new(db_dir.path().join("bhavcopy.db")).unwrap();
    let pipeline = IngestPipeline::new(LocalDirFetcher::new(source.path()), PipelineConfig::default());

    let report = pipeline.ingest_date(&mut store, date(19));
    assert_eq!(
        report.outcome,
        IngestOutcome::Ingested {
            date: date(19),
            rows: 2,
            duplicates: 0,
            warnings: 1,
        }
    );

    let rows = store.query(&RecordQuery::all()).unwrap();
    let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["INFY", "RELIANCE"]);
    assert!(rows.iter().all(|r| r.delivery_percent > DEFAULT_DELIVERY_PERCENT_THRESHOLD));
    assert_eq!(rows[0].delivery_qty, Some(3_500_000));
    assert_eq!(rows[0].number_of_trades, Some(150_000));
    assert_eq!(rows[0].close_price, Some(1612.35));
}

#[test]
fn same_file_twice_keeps_row_count() {
    let source = tempfile::tempdir().unwrap();
    write_file(source.path(), date(19), &sample_day());

    let mut store = SqliteStore::new_in_memory().unwrap();
    let pipeline = IngestPipeline::new(LocalDirFetcher::new(source.path()), PipelineConfig::default());

    pipeline.ingest_date(&mut store, date(19));
    let once = store.count().unwrap();
    let second = pipeline.ingest_date(&mut store, date(19));

    assert_eq!(store.count().unwrap(), once);
    assert_eq!(
        second.outcome,
        IngestOutcome::NoQualifyingRows {
            date: date(19),
            duplicates: 2,
            warnings: 1,
        }
    );
}

#[test]
fn missing_series_column_rejects_whole_file() {
    let source = tempfile::tempdir().unwrap();
    write_file(
        source.path(),
        date(19),
        "SYMBOL,DATE1,CLOSE_PRICE,TTL_TRD_QNTY,NO_OF_TRADES,DELIV_QTY,DELIV_PER\nINFY,19-Jan-2024,1612.35,5000000,150000,3500000,70.00",
    );

    let mut store = SqliteStore::new_in_memory().unwrap();
    let pipeline = IngestPipeline::new(LocalDirFetcher::new(source.path()), PipelineConfig::default());
    let report = pipeline.ingest_date(&mut store, date(19));

    match report.outcome {
        IngestOutcome::SchemaError { date: d, missing, .. } => {
            assert_eq!(d, date(19));
            assert_eq!(missing, vec!["SERIES".to_string()]);
        }
        other => panic!("expected schema error, got {:?}", other),
    }
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn missing_files_report_not_found_without_touching_store() {
    let source = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::new_in_memory().unwrap();
    let pipeline = IngestPipeline::new(LocalDirFetcher::new(source.path()), PipelineConfig::default());

    // Monday 22nd walks back to Fri 19th and Thu 18th
    let report = pipeline.ingest_date(&mut store, date(22));
    assert_eq!(
        report.outcome,
        IngestOutcome::NotFound {
            attempts: 3,
            last_candidate: date(18),
        }
    );
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn window_run_continues_past_failures() {
    let source = tempfile::tempdir().unwrap();
    write_file(source.path(), date(18), "garbage without the expected columns\n1,2,3");
    write_file(source.path(), date(19), &sample_day());

    let mut store = SqliteStore::new_in_memory().unwrap();
    let pipeline = IngestPipeline::new(
        LocalDirFetcher::new(source.path()),
        PipelineConfig {
            max_attempts: 1,
            ..PipelineConfig::default()
        },
    );
    let report = pipeline.ingest_window(&mut store, date(19), 2);

    assert_eq!(report.dates.len(), 2);
    assert!(matches!(report.dates[0].outcome, IngestOutcome::SchemaError { .. }));
    assert!(report.dates[1].outcome.is_success());
    assert_eq!(report.rows_ingested(), 2);
}

#[test]
fn oversized_quantity_is_unknown_and_batch_still_lands() {
    let source = tempfile::tempdir().unwrap();
    write_file(
        source.path(),
        date(19),
        &[
            "SYMBOL,SERIES,DATE1,CLOSE_PRICE,TTL_TRD_QNTY,NO_OF_TRADES,DELIV_QTY,DELIV_PER",
            "INFY,EQ,19-Jan-2024,1612.35,5000000,150000,3500000,70.00",
            "BAD,EQ,19-Jan-2024,10.00,1e30,10000000000000000000,100,90.00",
        ]
        .join("\n"),
    );

    let mut store = SqliteStore::new_in_memory().unwrap();
    let pipeline = IngestPipeline::new(LocalDirFetcher::new(source.path()), PipelineConfig::default());
    let report = pipeline.ingest_date(&mut store, date(19));

    assert!(matches!(report.outcome, IngestOutcome::Ingested { rows: 2, .. }));
    let bad = store.query(&RecordQuery::all().symbol("BAD")).unwrap();
    assert_eq!(bad[0].total_traded_qty, None);
    assert_eq!(bad[0].number_of_trades, None);
    assert_eq!(bad[0].delivery_qty, Some(100));
}
