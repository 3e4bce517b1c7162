//! Read-only REST API over the trade store

mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

use crate::accumulation::AnalysisConfig;
use crate::sqlite_store::SqliteStore;
use serde::Deserialize;
use std::sync::Arc;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address (default: "127.0.0.1")
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServerConfig {
            host: host.into(),
            port,
        }
    }
}

/// Runs the API server until it is shut down
///
/// Tracing must be initialized by the caller.
///
/// # Example
/// ```rust,no_run
/// use bhavcopy::accumulation::AnalysisConfig;
/// use bhavcopy::server::{run_server, ServerConfig};
/// use bhavcopy::sqlite_store::SqliteStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = SqliteStore::new("bhavcopy.db")?;
///     run_server(ServerConfig::default(), store, AnalysisConfig::default()).await?;
///     Ok(())
/// }
/// ```
pub async fn run_server(
    config: ServerConfig,
    store: SqliteStore,
    analysis: AnalysisConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(store, analysis));
    let app = routes::create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
