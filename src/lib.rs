pub mod accumulation;
pub mod calendar;
pub mod config;
pub mod dedup;
pub mod fetcher;
pub mod normalizer;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod server;
pub mod sqlite_store;
pub mod store;


pub use accumulation::{AccumulationAnalyzer, AccumulationSummary, AnalysisConfig};
pub use config::{Config, ConfigError};
pub use dedup::{filter_new_records, FilteredBatch};
pub use fetcher::{CachingFetcher, FetcherConfig, FileFetcher, LocalDirFetcher, NseArchiveFetcher, TransportError};
pub use normalizer::{normalize, NormalizedBatch, ParseWarning, RawTable, SchemaError};
pub use pipeline::{DateReport, FetchAttempt, IngestOutcome, IngestPipeline, PipelineConfig};
pub use record::{RecordKey, TradeRecord};
pub use report::{Screener, TrendPoint, WindowReport};
pub use server::{run_server, ApiError, AppState, ServerConfig};
pub use sqlite_store::SqliteStore;
pub use store::{InMemoryStore, RecordQuery, StoreError, TradeStore};
