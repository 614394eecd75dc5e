use bitcoin::{Amount, Txid};

use crate::error::CoreError;
use crate::price::{PriceObservation, PriceSeries};
use crate::source::types::MempoolStatus;
use crate::types::{Address, AddressSummary, BlockHeight, Transaction, TxDetail, TxInput, TxOutput};

/// Inputs with a sequence below this value signal opt-in RBF.
const RBF_SEQUENCE_THRESHOLD: u64 = 0xFFFF_FFFE;

// ==============================================================================
// blockchain.info
// ==============================================================================

/// Parse a `rawaddr` response into transactions.
///
/// Missing numeric fields decode as zero and missing addresses as `None`;
/// only a missing or malformed `hash` rejects a transaction.
pub(super) fn parse_address_transactions(
    raw: &serde_json::Value,
) -> Result<Vec<Transaction>, CoreError> {
    let Some(txs) = raw.get("txs").and_then(serde_json::Value::as_array) else {
        return Ok(Vec::new());
    };
    txs.iter().map(parse_raw_transaction).collect()
}

fn parse_raw_transaction(raw: &serde_json::Value) -> Result<Transaction, CoreError> {
    let txid = parse_txid(raw.get("hash"), "hash")?;

    let outputs = array_field(raw, "out")
        .map(|o| TxOutput {
            address: parse_address(o.get("addr")),
            value: parse_sats_field(o.get("value")),
        })
        .collect();

    let inputs = array_field(raw, "inputs")
        .map(|i| {
            let prev_out = i.get("prev_out");
            TxInput {
                address: parse_address(prev_out.and_then(|p| p.get("addr"))),
                value: parse_sats_field(prev_out.and_then(|p| p.get("value"))),
            }
        })
        .collect();

    let detail = parse_tx_detail(raw);

    Ok(Transaction {
        txid,
        timestamp: raw
            .get("time")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0),
        fee: parse_sats_field(raw.get("fee")),
        inputs,
        outputs,
        block_height: detail.block_height,
        size: detail.size,
    })
}

/// Containing block and byte size from a `rawtx` (or `rawaddr` entry)
/// response. Size falls back to `weight / 4` rounded to nearest.
pub(super) fn parse_tx_detail(raw: &serde_json::Value) -> TxDetail {
    let block_height = raw
        .get("block_height")
        .and_then(serde_json::Value::as_u64)
        .and_then(|h| u32::try_from(h).ok())
        .map(BlockHeight);

    let size = raw
        .get("size")
        .and_then(serde_json::Value::as_u64)
        .or_else(|| {
            raw.get("weight")
                .and_then(serde_json::Value::as_u64)
                .map(|w| (w + 2) / 4)
        });

    TxDetail { block_height, size }
}

pub(super) fn parse_block_count(body: &str) -> Result<BlockHeight, CoreError> {
    let trimmed = body.trim();
    trimmed
        .parse::<u32>()
        .map(BlockHeight)
        .map_err(|e| CoreError::InvalidData(format!("invalid block count `{trimmed}`: {e}")))
}

/// A bare integer satoshi figure from the `q/` endpoints. Anything that is
/// not a non-negative integer is treated as unknown.
pub(super) fn parse_sats_text(body: &str) -> Option<Amount> {
    body.trim().parse::<u64>().ok().map(Amount::from_sat)
}

pub(super) fn parse_address_summary(
    balance: &str,
    received: &str,
    sent: &str,
) -> AddressSummary {
    AddressSummary {
        balance: parse_sats_text(balance),
        received: parse_sats_text(received),
        sent: parse_sats_text(sent),
    }
}

/// USD spot price from a `ticker` response: `last`, falling back to `15m`.
pub(super) fn parse_ticker_usd(raw: &serde_json::Value) -> Option<f64> {
    let usd = raw.get("USD")?;
    ["last", "15m"]
        .iter()
        .filter_map(|key| usd.get(*key).and_then(serde_json::Value::as_f64))
        .find(|price| price.is_finite())
}

/// Parse a charts `market-price` response (`{"values":[{"x":ts,"y":price}]}`).
/// Points missing a numeric `x` or `y` are dropped.
pub(super) fn parse_price_series(raw: &serde_json::Value) -> PriceSeries {
    array_field(raw, "values")
        .filter_map(|point| {
            let timestamp = point.get("x").and_then(serde_json::Value::as_i64)?;
            let price = point.get("y").and_then(serde_json::Value::as_f64)?;
            Some(PriceObservation::new(timestamp, price))
        })
        .collect()
}

// ==============================================================================
// mempool.space
// ==============================================================================

/// Parse an Esplora `tx/{txid}` response.
pub(super) fn parse_mempool_status(raw: &serde_json::Value) -> MempoolStatus {
    let status = raw.get("status");
    let flagged_replaceable = status
        .and_then(|s| s.get("replaceable"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    let signals_rbf = array_field(raw, "vin").any(|input| {
        input
            .get("sequence")
            .and_then(serde_json::Value::as_u64)
            .is_some_and(|seq| seq < RBF_SEQUENCE_THRESHOLD)
    });

    let vsize = raw
        .get("vsize")
        .and_then(serde_json::Value::as_u64)
        .or_else(|| {
            raw.get("weight")
                .and_then(serde_json::Value::as_u64)
                .map(|w| w.div_ceil(4))
        });

    MempoolStatus {
        fee: raw
            .get("fee")
            .and_then(serde_json::Value::as_u64)
            .map(Amount::from_sat),
        vsize,
        replaceable: flagged_replaceable || signals_rbf,
        confirmed: status
            .and_then(|s| s.get("confirmed"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
    }
}

pub(super) fn parse_raw_hex(body: &str) -> Result<String, CoreError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidData("empty raw transaction hex".into()));
    }
    Ok(trimmed.to_owned())
}

// ==============================================================================
// Field Helpers
// ==============================================================================

fn array_field<'a>(
    raw: &'a serde_json::Value,
    field: &str,
) -> impl Iterator<Item = &'a serde_json::Value> {
    raw.get(field)
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
}

fn parse_txid(value: Option<&serde_json::Value>, field: &str) -> Result<Txid, CoreError> {
    let value = value
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CoreError::InvalidData(format!("missing {field}")))?;
    value
        .parse()
        .map_err(|e| CoreError::InvalidData(format!("invalid {field}: {e}")))
}

fn parse_address(value: Option<&serde_json::Value>) -> Option<Address> {
    value
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(Address::from)
}

fn parse_sats_field(value: Option<&serde_json::Value>) -> Amount {
    value
        .and_then(serde_json::Value::as_u64)
        .map(Amount::from_sat)
        .unwrap_or(Amount::ZERO)
}
