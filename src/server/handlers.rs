//! HTTP request handlers for API endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::accumulation::{is_non_decreasing, window_start, AccumulationAnalyzer, AccumulationSummary, AnalysisConfig};
use crate::pipeline::MAX_WINDOW_DAYS;
use crate::report::{screen, trend_series, Screener, TrendPoint};
use crate::store::TradeStore;

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok"
    }))
}

fn resolve_as_of(as_of: Option<&str>) -> Result<NaiveDate, ApiError> {
    match as_of {
        Some(text) => Ok(NaiveDate::parse_from_str(text, "%Y-%m-%d")?),
        None => Ok(Local::now().date_naive()),
    }
}

fn resolve_window(window_days: Option<u32>, default: u32) -> Result<u32, ApiError> {
    let window = window_days.unwrap_or(default);
    if window == 0 || window > MAX_WINDOW_DAYS {
        return Err(ApiError::InvalidParameter(format!(
            "window_days must be between 1 and {}",
            MAX_WINDOW_DAYS
        )));
    }
    Ok(window)
}

/// Response for symbol listing
#[derive(Debug, Serialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<String>,
}

/// GET /symbols - List every stored symbol
pub async fn list_symbols(State(state): State<Arc<AppState>>) -> Result<Json<SymbolsResponse>, ApiError> {
    let store = state.store.lock().await;
    let symbols = store.list_distinct_symbols()?;
    Ok(Json(SymbolsResponse { symbols }))
}

/// Query parameters for the accumulation endpoint
#[derive(Debug, Default, Deserialize)]
pub struct AccumulationParams {
    pub window_days: Option<u32>,
    pub min_avg_delivery_percent: Option<f64>,
    pub min_avg_trades: Option<f64>,
    /// Window end date (YYYY-MM-DD); defaults to today
    pub as_of: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccumulationResponse {
    pub as_of: NaiveDate,
    pub since: NaiveDate,
    pub window_days: u32,
    pub summaries: Vec<AccumulationSummary>,
}

/// GET /accumulation - Symbols above the delivery and trade-count thresholds
pub async fn get_accumulation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AccumulationParams>,
) -> Result<Json<AccumulationResponse>, ApiError> {
    let as_of = resolve_as_of(params.as_of.as_deref())?;
    let window_days = resolve_window(params.window_days, state.analysis.window_days)?;

    let analyzer = AccumulationAnalyzer::new(AnalysisConfig {
        window_days,
        min_avg_delivery_percent: params
            .min_avg_delivery_percent
            .unwrap_or(state.analysis.min_avg_delivery_percent),
        min_avg_trades: params.min_avg_trades.unwrap_or(state.analysis.min_avg_trades),
        ..state.analysis.clone()
    });

    let store = state.store.lock().await;
    let summaries = analyzer.summarize(&*store, as_of)?;

    Ok(Json(AccumulationResponse {
        as_of,
        since: window_start(as_of, window_days),
        window_days,
        summaries,
    }))
}

/// Query parameters for the screener endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ScreenerParams {
    pub volume_threshold: Option<u64>,
    pub window_days: Option<u32>,
    pub as_of: Option<String>,
}

/// GET /screener - Rows above the volume threshold and the accumulating symbols among them
pub async fn get_screener(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScreenerParams>,
) -> Result<Json<Screener>, ApiError> {
    let as_of = resolve_as_of(params.as_of.as_deref())?;
    let window_days = resolve_window(params.window_days, state.analysis.window_days)?;
    let volume_threshold = params
        .volume_threshold
        .unwrap_or(state.analysis.volume_threshold);

    let store = state.store.lock().await;
    let screener = screen(&*store, as_of, window_days, volume_threshold)?;
    Ok(Json(screener))
}

/// Query parameters for the trend endpoint
#[derive(Debug, Default, Deserialize)]
pub struct TrendParams {
    pub window_days: Option<u32>,
    pub as_of: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub symbol: String,
    pub since: NaiveDate,
    pub is_accumulating: bool,
    pub points: Vec<TrendPoint>,
}

/// GET /symbols/{symbol}/trend - Delivery series for charting
pub async fn get_trend(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(params): Query<TrendParams>,
) -> Result<Json<TrendResponse>, ApiError> {
    let as_of = resolve_as_of(params.as_of.as_deref())?;
    let window_days = resolve_window(params.window_days, state.analysis.window_days)?;
    let since = window_start(as_of, window_days);

    let store = state.store.lock().await;
    let points = trend_series(&*store, &symbol, since)?;
    if points.is_empty() && !store.list_distinct_symbols()?.contains(&symbol) {
        return Err(ApiError::SymbolNotFound(symbol));
    }

    let percents: Vec<f64> = points.iter().map(|p| p.delivery_percent).collect();
    Ok(Json(TrendResponse {
        is_accumulating: !points.is_empty() && is_non_decreasing(&percents),
        symbol,
        since,
        points,
    }))
}
