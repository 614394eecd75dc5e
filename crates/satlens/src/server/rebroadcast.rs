use std::collections::HashSet;
use std::sync::Mutex;

use axum::extract::{Path, State};
use axum::Json;
use bitcoin::Txid;
use serde::Deserialize;

use satlens_core::accelerate::{rebroadcast, AccelerationRecord, RebroadcastResult};

use super::error::{parse_txid, AppError};
use super::SharedState;

#[derive(Deserialize)]
pub(super) struct RebroadcastRequest {
    fee_rate: Option<u64>,
}

/// Transactions with a rebroadcast currently running.
pub(crate) type InFlight = Mutex<HashSet<Txid>>;

/// Marks `txid` as in flight until dropped.
struct InFlightSlot<'a> {
    set: &'a InFlight,
    txid: Txid,
}

impl<'a> InFlightSlot<'a> {
    /// `None` when a rebroadcast for `txid` is already running.
    fn claim(set: &'a InFlight, txid: Txid) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.insert(txid).then(|| Self { set, txid })
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut guard = self
            .set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.remove(&self.txid);
    }
}

pub(super) async fn post_rebroadcast(
    State(state): State<SharedState>,
    Path(txid): Path<String>,
    body: Option<Json<RebroadcastRequest>>,
) -> Result<Json<RebroadcastResult>, AppError> {
    let txid = parse_txid(&txid)?;
    let fee_rate = body.and_then(|Json(req)| req.fee_rate);

    let _slot = InFlightSlot::claim(&state.in_flight, txid).ok_or_else(|| {
        AppError::Conflict(format!("rebroadcast of {txid} is already in progress"))
    })?;

    let result = rebroadcast(
        state.source.as_ref(),
        &state.push_client,
        &state.broadcast,
        state.sessions.accelerations(),
        txid,
        fee_rate,
    )
    .await?;
    Ok(Json(result))
}

pub(super) async fn list_accelerations(
    State(state): State<SharedState>,
) -> Json<Vec<AccelerationRecord>> {
    Json(state.sessions.accelerations().records().await)
}
