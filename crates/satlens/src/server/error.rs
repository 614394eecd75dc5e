use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use satlens_core::CoreError;

// ==============================================================================
// Error Type
// ==============================================================================

#[derive(Debug)]
pub(crate) enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TxNotFound(txid) => Self::NotFound(format!("transaction not found: {txid}")),
            CoreError::MalformedInput(message) | CoreError::InvalidData(message) => {
                Self::BadRequest(message)
            }
            CoreError::AlreadyConfirmed(txid) => {
                Self::Conflict(format!("transaction already confirmed: {txid}"))
            }
            CoreError::Source(source) => Self::BadGateway(format!("upstream error: {source}")),
            CoreError::InvalidConfig(message) => Self::Internal(message),
        }
    }
}

pub(super) fn parse_txid(raw: &str) -> Result<bitcoin::Txid, AppError> {
    raw.parse()
        .map_err(|e| AppError::BadRequest(format!("invalid txid: {e}")))
}
