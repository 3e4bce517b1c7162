//! Bhavcopy ingestion and screening CLI
//!
//! Set RUST_LOG to control log output:
//!   RUST_LOG=debug bhavcopy ingest --window-days 5
//!   RUST_LOG=bhavcopy::fetcher=debug bhavcopy ingest

use anyhow::{anyhow, bail, Context, Result};
use bhavcopy::accumulation::{AccumulationAnalyzer, AccumulationSummary, AnalysisConfig};
use bhavcopy::config::Config;
use bhavcopy::fetcher::{CachingFetcher, FileFetcher, LocalDirFetcher, NseArchiveFetcher};
use bhavcopy::pipeline::{IngestPipeline, MAX_WINDOW_DAYS};
use bhavcopy::server::{run_server, ServerConfig};
use bhavcopy::sqlite_store::SqliteStore;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bhavcopy", about = "Ingest NSE bhavcopy files and screen for delivery accumulation")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "BHAVCOPY_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config and BHAVCOPY_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and store bhavcopy files for one date or a trailing window
    Ingest {
        /// Single date to ingest (YYYY-MM-DD)
        #[arg(long, conflicts_with = "window_days")]
        date: Option<NaiveDate>,

        /// Calendar days ending today to ingest
        #[arg(long)]
        window_days: Option<u32>,

        /// Read files from this directory instead of the exchange archive
        #[arg(long)]
        source_dir: Option<PathBuf>,
    },
    /// Print symbols showing delivery accumulation
    Report {
        /// Trailing window in calendar days
        #[arg(long)]
        window_days: Option<u32>,

        /// Window end date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Serve the read-only REST API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command {
        Command::Ingest {
            date,
            window_days,
            source_dir,
        } => ingest(&config, date, window_days, source_dir),
        Command::Report {
            window_days,
            as_of,
            json,
        } => {
            report(&config, window_days, as_of, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve { host, port } => {
            config.server = ServerConfig::new(
                host.unwrap_or(config.server.host),
                port.unwrap_or(config.server.port),
            );
            serve(config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn check_window(days: u32) -> Result<u32> {
    if days == 0 || days > MAX_WINDOW_DAYS {
        bail!("window must be between 1 and {} days, got {}", MAX_WINDOW_DAYS, days);
    }
    Ok(days)
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::new(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path.display()))
}

fn build_fetcher(config: &Config, source_dir: Option<PathBuf>) -> Result<Box<dyn FileFetcher>> {
    if let Some(dir) = source_dir {
        info!(dir = %dir.display(), "reading bhavcopy files from local directory");
        return Ok(Box::new(LocalDirFetcher::new(dir)));
    }

    let archive = NseArchiveFetcher::with_config(config.fetcher.clone())?;
    let fetcher: Box<dyn FileFetcher> = match &config.fetcher.cache_dir {
        Some(cache_dir) => Box::new(CachingFetcher::new(cache_dir.clone(), archive)),
        None => Box::new(archive),
    };
    Ok(fetcher)
}

fn ingest(
    config: &Config,
    date: Option<NaiveDate>,
    window_days: Option<u32>,
    source_dir: Option<PathBuf>,
) -> Result<ExitCode> {
    let mut store = open_store(config)?;
    let pipeline = IngestPipeline::new(build_fetcher(config, source_dir)?, config.pipeline.clone());

    let (succeeded, total) = match date {
        Some(date) => {
            let report = pipeline.ingest_date(&mut store, date);
            let ok = report.outcome.is_success();
            println!("[{}] {}: {}", if ok { "ok" } else { "FAIL" }, report.requested, report.outcome);
            (usize::from(ok), 1)
        }
        None => {
            let days = check_window(window_days.unwrap_or(config.pipeline.window_days))?;
            let report = pipeline.ingest_window(&mut store, Local::now().date_naive(), days);
            print!("{}", report);
            (report.succeeded(), report.dates.len())
        }
    };

    info!(rows = store.count()?, "store size after ingestion");
    if total > 0 && succeeded == 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn report(config: &Config, window_days: Option<u32>, as_of: Option<NaiveDate>, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let analysis = AnalysisConfig {
        window_days: check_window(window_days.unwrap_or(config.analysis.window_days))?,
        ..config.analysis.clone()
    };
    let today = as_of.unwrap_or_else(|| Local::now().date_naive());
    let summaries = AccumulationAnalyzer::new(analysis.clone()).summarize(&store, today)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print_table(&summaries, &analysis, today);
    }
    Ok(())
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.0}", v))
}

fn print_table(summaries: &[AccumulationSummary], analysis: &AnalysisConfig, today: NaiveDate) {
    println!(
        "Accumulation over {} days ending {} (delivery > {}%, trades > {})",
        analysis.window_days, today, analysis.min_avg_delivery_percent, analysis.min_avg_trades
    );
    if summaries.is_empty() {
        println!("  no symbols qualify");
        return;
    }
    println!(
        "{:<16} {:>10} {:>14} {:>12} {:>5} {:>6}",
        "SYMBOL", "DELIV_%", "DELIV_QTY", "TRADES", "DAYS", "TREND"
    );
    for s in summaries {
        println!(
            "{:<16} {:>10.2} {:>14} {:>12} {:>5} {:>6}",
            s.symbol,
            s.avg_delivery_percent,
            format_optional(s.avg_delivery_qty),
            format_optional(s.avg_trades),
            s.days,
            if s.is_accumulating { "up" } else { "-" }
        );
    }
}

fn serve(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    println!("Starting bhavcopy API server...");
    println!("   Database: {}", config.database_path.display());
    println!("   Available at: http://{}:{}", config.server.host, config.server.port);
    println!();
    println!("Available endpoints:");
    println!("  GET  /health                    - Health check");
    println!("  GET  /symbols                   - List symbols");
    println!("  GET  /symbols/:symbol/trend     - Delivery trend for one symbol");
    println!("  GET  /accumulation              - Accumulation summaries");
    println!("  GET  /screener                  - Volume screener");
    println!();

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime
        .block_on(run_server(config.server, store, config.analysis))
        .map_err(|e| anyhow!("server error: {}", e))
}
