//! Rebroadcast of a stuck transaction and the session's acceleration log.
//!
//! "Acceleration" here is duplicate re-announcement of the already-signed
//! transaction to every push endpoint. Nothing is re-signed and no fee is
//! bumped; the declared fee rate is recorded for the user's reference only.

use bitcoin::Txid;
use rand::Rng;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::broadcast::{broadcast_everywhere, BroadcastConfig, BroadcastReport};
use crate::error::CoreError;
use crate::source::{ChainSource, MempoolStatus, RecommendedFees};

/// Declared rate used when the current fee rate is unknown, in sat/vB.
pub const FALLBACK_FEE_RATE: u64 = 20;
/// Block estimate used when fee tiers are unavailable.
pub const FALLBACK_CONFIRMATION_BLOCKS: u32 = 6;

const RECORD_ID_PREFIX: &str = "rebroadcast_";
const RECORD_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RECORD_ID_LEN: usize = 8;

// ==============================================================================
// Records
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccelerationRecord {
    pub record_id: String,
    pub txid: Txid,
    /// sat/vB the user asked for.
    pub declared_fee_rate: u64,
    pub issued_at_unix_millis: i64,
    pub estimated_confirmation_blocks: u32,
}

/// Append-only list of rebroadcasts issued during one session.
#[derive(Debug, Default)]
pub struct AccelerationLog {
    records: RwLock<Vec<AccelerationRecord>>,
}

impl AccelerationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record with a fresh id and timestamp and append it.
    pub async fn append(
        &self,
        txid: Txid,
        declared_fee_rate: u64,
        estimated_confirmation_blocks: u32,
    ) -> AccelerationRecord {
        let record = AccelerationRecord {
            record_id: new_record_id(),
            txid,
            declared_fee_rate,
            issued_at_unix_millis: unix_millis_now(),
            estimated_confirmation_blocks,
        };
        self.records.write().await.push(record.clone());
        record
    }

    /// Snapshot of every record, oldest first.
    pub async fn records(&self) -> Vec<AccelerationRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn new_record_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RECORD_ID_LEN)
        .map(|_| RECORD_ID_ALPHABET[rng.gen_range(0..RECORD_ID_ALPHABET.len())] as char)
        .collect();
    format!("{RECORD_ID_PREFIX}{suffix}")
}

fn unix_millis_now() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

// ==============================================================================
// Fee Heuristics
// ==============================================================================

/// Half again the current rate, rounded up; [`FALLBACK_FEE_RATE`] when
/// the current rate is unknown.
#[must_use]
pub fn suggested_fee_rate(current: Option<f64>) -> u64 {
    match current {
        Some(rate) if rate.is_finite() && rate > 0.0 => (rate * 1.5).ceil() as u64,
        _ => FALLBACK_FEE_RATE,
    }
}

/// Rough block count until confirmation for a fee rate, bucketed by the
/// mempool's recommended tiers.
#[must_use]
pub fn estimate_confirmation_blocks(fee_rate: u64, fees: Option<&RecommendedFees>) -> u32 {
    let Some(fees) = fees else {
        return FALLBACK_CONFIRMATION_BLOCKS;
    };
    if fee_rate >= fees.fastest_fee {
        1
    } else if fee_rate >= fees.half_hour_fee {
        3
    } else if fee_rate >= fees.hour_fee {
        6
    } else {
        12
    }
}

// ==============================================================================
// Rebroadcast Flow
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RebroadcastResult {
    pub report: BroadcastReport,
    pub record: AccelerationRecord,
}

/// Re-announce `txid` to every configured push endpoint and log it.
///
/// Refuses with [`CoreError::AlreadyConfirmed`] before broadcasting when the
/// mempool reports the transaction as confirmed. A record is appended
/// whenever the fan-out ran, whatever the per-endpoint outcomes were.
pub async fn rebroadcast(
    source: &dyn ChainSource,
    client: &reqwest::Client,
    config: &BroadcastConfig,
    log: &AccelerationLog,
    txid: Txid,
    declared_fee_rate: Option<u64>,
) -> Result<RebroadcastResult, CoreError> {
    if declared_fee_rate == Some(0) {
        return Err(CoreError::MalformedInput(
            "declared fee rate must be at least 1 sat/vB".to_owned(),
        ));
    }

    let (status, fees) = tokio::join!(
        source.get_mempool_status(&txid),
        source.get_recommended_fees(),
    );
    let status = match status {
        Ok(status) => status,
        Err(CoreError::TxNotFound(missing)) => return Err(CoreError::TxNotFound(missing)),
        Err(err) => {
            warn!(%txid, error = %err, "mempool status unavailable");
            MempoolStatus::default()
        }
    };
    if status.confirmed {
        return Err(CoreError::AlreadyConfirmed(txid));
    }
    let fees = fees
        .inspect_err(|err| warn!(error = %err, "recommended fees unavailable"))
        .ok();

    let raw_hex = source.get_raw_hex(&txid).await?;
    let declared = declared_fee_rate.unwrap_or_else(|| suggested_fee_rate(status.fee_rate()));
    let report = broadcast_everywhere(client, &raw_hex, config).await?;

    let estimated = estimate_confirmation_blocks(declared, fees.as_ref());
    let record = log.append(txid, declared, estimated).await;
    info!(
        %txid,
        record_id = %record.record_id,
        declared_fee_rate = declared,
        estimated_blocks = estimated,
        replaceable = status.replaceable,
        succeeded = report.succeeded_count(),
        total = report.total(),
        "rebroadcast recorded"
    );

    Ok(RebroadcastResult { report, record })
}
