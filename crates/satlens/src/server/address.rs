use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use satlens_core::classify::TxFilter;
use satlens_core::enrich::EnrichedView;
use satlens_core::session::ClassifiedTx;
use satlens_core::types::Address;
use satlens_core::Selected;

use super::error::{parse_txid, AppError};
use super::SharedState;

pub(crate) const DEFAULT_TX_LIMIT: usize = 50;
/// The explorer serves at most this many transactions per history page.
pub(crate) const MAX_TX_LIMIT: usize = 100;

// ==============================================================================
// DTOs
// ==============================================================================

#[derive(Serialize)]
pub(super) struct AddressResponse {
    address: Address,
    balance_sats: Option<u64>,
    received_sats: Option<u64>,
    sent_sats: Option<u64>,
    balance_btc: Option<f64>,
    spot_price: Option<f64>,
    balance_fiat: Option<f64>,
}

#[derive(Deserialize)]
pub(super) struct HistoryQuery {
    #[serde(default)]
    filter: TxFilter,
    limit: Option<usize>,
}

#[derive(Serialize)]
pub(super) struct HistoryResponse {
    address: Address,
    filter: TxFilter,
    transactions: Vec<ClassifiedTx>,
}

// ==============================================================================
// Handlers
// ==============================================================================

pub(super) async fn get_address(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> Result<Json<AddressResponse>, AppError> {
    let address = parse_address(&address)?;
    let (summary, spot) = tokio::join!(
        state.source.get_address_summary(&address),
        state.source.get_spot_price(),
    );
    let summary = summary?;
    let spot_price = spot
        .inspect_err(|err| warn!(error = %err, "spot price unavailable"))
        .ok()
        .flatten();

    let balance_btc = summary.balance.map(|b| b.to_btc());
    Ok(Json(AddressResponse {
        balance_sats: summary.balance.map(|a| a.to_sat()),
        received_sats: summary.received.map(|a| a.to_sat()),
        sent_sats: summary.sent.map(|a| a.to_sat()),
        balance_fiat: balance_btc.zip(spot_price).map(|(btc, price)| btc * price),
        balance_btc,
        spot_price,
        address,
    }))
}

pub(super) async fn get_history(
    State(state): State<SharedState>,
    Path(address): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let address = parse_address(&address)?;
    let limit = resolve_limit(query.limit)?;

    let transactions = state
        .sessions
        .session_for(&address)
        .fetch_history(state.source.as_ref(), &address, query.filter, limit)
        .await?
        .ok_or_else(|| throttled(&state))?;

    Ok(Json(HistoryResponse {
        address,
        filter: query.filter,
        transactions,
    }))
}

pub(super) async fn get_receipt(
    State(state): State<SharedState>,
    Path((address, txid)): Path<(String, String)>,
) -> Result<Json<EnrichedView>, AppError> {
    let address = parse_address(&address)?;
    let txid = parse_txid(&txid)?;

    let selected = state
        .sessions
        .session_for(&address)
        .select(
            state.source.as_ref(),
            &address,
            txid,
            MAX_TX_LIMIT,
            &state.policy,
        )
        .await?;
    match selected {
        Selected::View(view) => Ok(Json(view)),
        Selected::Superseded => Err(AppError::Conflict(format!(
            "selection of {txid} was superseded by a newer one"
        ))),
        Selected::Throttled => Err(throttled(&state)),
    }
}

fn throttled(state: &SharedState) -> AppError {
    AppError::TooManyRequests(format!(
        "history requests are limited to one every {}ms",
        state.sessions.min_fetch_interval().as_millis()
    ))
}

// ==============================================================================
// Validation
// ==============================================================================

fn parse_address(raw: &str) -> Result<Address, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("address must not be empty".to_string()));
    }
    Ok(Address::from(trimmed))
}

fn resolve_limit(requested: Option<usize>) -> Result<usize, AppError> {
    match requested {
        None => Ok(DEFAULT_TX_LIMIT),
        Some(0) => Err(AppError::BadRequest("limit must be at least 1".to_string())),
        Some(n) if n > MAX_TX_LIMIT => Err(AppError::BadRequest(format!(
            "limit must be at most {MAX_TX_LIMIT}"
        ))),
        Some(n) => Ok(n),
    }
}
