//! Valuation assembly: classification, fiat valuation, fee rate and
//! confirmation progress composed into one read-only view.
//!
//! [`assemble_view`] is pure. [`hydrate_view`] fetches the inputs it needs
//! concurrently and degrades every failed fetch to an unknown field, so it
//! always produces a view.

use bitcoin::{Amount, Txid};
use serde::Serialize;
use tracing::{debug, warn};

use crate::classify::{classify, counterparties, Counterparties};
use crate::confirm::{
    confirmation_depth, confirmation_label, status_for_depth, ConfirmationStatus,
    DEFAULT_TARGET_DEPTH,
};
use crate::error::CoreError;
use crate::guard::{Selection, SelectionToken};
use crate::price::resolve_fiat_price;
use crate::source::ChainSource;
use crate::types::{Address, BlockHeight, Direction, Transaction};

// ==============================================================================
// Policy
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentPolicy {
    target_depth: u32,
}

impl EnrichmentPolicy {
    pub fn new(target_depth: u32) -> Result<Self, CoreError> {
        if target_depth == 0 {
            return Err(CoreError::InvalidConfig(
                "target confirmation depth must be at least 1".to_owned(),
            ));
        }
        Ok(Self { target_depth })
    }

    pub fn target_depth(&self) -> u32 {
        self.target_depth
    }
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            target_depth: DEFAULT_TARGET_DEPTH,
        }
    }
}

// ==============================================================================
// Enriched View
// ==============================================================================

/// Everything a receipt renderer needs for one transaction. Each optional
/// field is `None` when its input was unavailable, never a zero stand-in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedView {
    pub txid: Txid,
    pub timestamp: i64,
    pub direction: Direction,
    pub title: &'static str,
    /// Magnitude of the net effect on the watched address.
    pub net_value_sats: u64,
    pub amount_btc: f64,
    pub fee_sats: u64,
    pub fee_btc: f64,
    pub fee_rate_sats_per_byte: Option<f64>,
    pub fiat_price: Option<f64>,
    pub fiat_value: Option<f64>,
    pub fiat_fee: Option<f64>,
    pub block_height: Option<BlockHeight>,
    pub tip_height: Option<BlockHeight>,
    pub status: ConfirmationStatus,
    pub status_phrase: String,
    pub confirmations_observed: u32,
    pub confirmation_label: String,
    pub is_unconfirmed: bool,
    pub counterparties: Counterparties,
}

/// Compose the view for `tx` from already-known inputs.
#[must_use]
pub fn assemble_view(
    tx: &Transaction,
    watched: &Address,
    fiat_price: Option<f64>,
    tip: Option<BlockHeight>,
    policy: &EnrichmentPolicy,
) -> EnrichedView {
    let classification = classify(tx, watched);
    let magnitude = classification.magnitude();
    let fiat_price = fiat_price.filter(|p| p.is_finite() && *p > 0.0);

    let depth = confirmation_depth(tip, tx.block_height);
    let status = status_for_depth(depth, policy.target_depth);

    EnrichedView {
        txid: tx.txid,
        timestamp: tx.timestamp,
        direction: classification.direction,
        title: classification.direction.title(),
        net_value_sats: magnitude.to_sat(),
        amount_btc: magnitude.to_btc(),
        fee_sats: tx.fee.to_sat(),
        fee_btc: tx.fee.to_btc(),
        fee_rate_sats_per_byte: fee_rate(tx.fee, tx.size),
        fiat_price,
        fiat_value: fiat_price.map(|price| magnitude.to_btc() * price),
        fiat_fee: fiat_price.map(|price| tx.fee.to_btc() * price),
        block_height: tx.block_height,
        tip_height: tip,
        status_phrase: status.phrase(),
        status,
        confirmations_observed: depth,
        confirmation_label: confirmation_label(depth, policy.target_depth),
        is_unconfirmed: depth == 0,
        counterparties: counterparties(tx, watched),
    }
}

/// Fee rate in sat/B, when the size is known and positive.
#[must_use]
pub fn fee_rate(fee: Amount, size: Option<u64>) -> Option<f64> {
    match size {
        Some(size) if size > 0 => Some(fee.to_sat() as f64 / size as f64),
        _ => None,
    }
}

// ==============================================================================
// Hydration
// ==============================================================================

/// Fetch transaction detail, tip height and the price series concurrently,
/// then assemble the view.
///
/// A successful detail fetch replaces the listing's containing block, since
/// it is the fresher of the two; its size only fills a missing one. Any
/// failed fetch leaves the corresponding fields unknown.
pub async fn hydrate_view(
    source: &dyn ChainSource,
    tx: &Transaction,
    watched: &Address,
    policy: &EnrichmentPolicy,
) -> EnrichedView {
    let (detail, tip, prices) = tokio::join!(
        source.get_transaction_detail(&tx.txid),
        source.get_tip_height(),
        source.get_price_series(tx.timestamp),
    );

    let mut hydrated = tx.clone();
    match detail {
        Ok(detail) => {
            hydrated.block_height = detail.block_height;
            hydrated.size = detail.size.or(tx.size);
        }
        Err(err) => warn!(txid = %tx.txid, error = %err, "transaction detail unavailable"),
    }

    let tip = tip
        .inspect_err(|err| warn!(error = %err, "tip height unavailable"))
        .ok();

    let fiat_price = match prices {
        Ok(series) => {
            let price = resolve_fiat_price(&series, tx.timestamp);
            if price.is_none() {
                warn!(txid = %tx.txid, points = series.len(), "no usable price observation");
            }
            price
        }
        Err(err) => {
            warn!(txid = %tx.txid, error = %err, "price series unavailable");
            None
        }
    };

    assemble_view(&hydrated, watched, fiat_price, tip, policy)
}

/// Hydrate `tx` on behalf of `token` and hand the view back only if no
/// newer selection was made while the fetches were in flight.
pub async fn hydrate_for_selection(
    source: &dyn ChainSource,
    selection: &Selection,
    token: SelectionToken,
    tx: &Transaction,
    watched: &Address,
    policy: &EnrichmentPolicy,
) -> Option<EnrichedView> {
    let view = hydrate_view(source, tx, watched, policy).await;
    let applied = selection.apply(&token, view);
    if applied.is_none() {
        debug!(txid = %token.txid(), "discarding stale enrichment");
    }
    applied
}
