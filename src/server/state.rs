//! Shared application state for the API server

use crate::accumulation::AnalysisConfig;
use crate::sqlite_store::SqliteStore;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Trade store. Wrapped in Mutex because SQLite connections are not thread-safe
    pub store: Arc<Mutex<SqliteStore>>,
    /// Defaults for query parameters the client leaves out
    pub analysis: AnalysisConfig,
}

impl AppState {
    /// Creates a new application state
    pub fn new(store: SqliteStore, analysis: AnalysisConfig) -> Self {
        AppState {
            store: Arc::new(Mutex::new(store)),
            analysis,
        }
    }
}
