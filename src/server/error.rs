//! Error types for the REST API server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// Symbol has no stored rows
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
    /// Invalid parameter in request
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Store query failed
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::SymbolNotFound(symbol) => (
                StatusCode::NOT_FOUND,
                "SymbolNotFound",
                format!("Symbol '{}' not found in database", symbol),
            ),
            ApiError::InvalidParameter(msg) => {
                (StatusCode::BAD_REQUEST, "InvalidParameter", msg.clone())
            }
            ApiError::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                msg.clone(),
            ),
        };

        let body = Json(json!({
            "error": error_type,
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidDateRange { .. } => ApiError::InvalidParameter(err.to_string()),
            StoreError::Sqlite(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<chrono::ParseError> for ApiError {
    fn from(err: chrono::ParseError) -> Self {
        ApiError::InvalidParameter(format!("Date parse error: {}", err))
    }
}
