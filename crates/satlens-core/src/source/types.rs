//! Source-specific types that do not belong to the shared domain model.

use bitcoin::Amount;
use serde::{Deserialize, Serialize};

// ==============================================================================
// Mempool Status
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MempoolStatus {
    pub fee: Option<Amount>,
    pub vsize: Option<u64>,
    /// Signals opt-in RBF.
    pub replaceable: bool,
    pub confirmed: bool,
}

impl MempoolStatus {
    /// Fee rate in sat/vB, when both fee and size are known.
    pub fn fee_rate(&self) -> Option<f64> {
        match (self.fee, self.vsize) {
            (Some(fee), Some(vsize)) if vsize > 0 => Some(fee.to_sat() as f64 / vsize as f64),
            _ => None,
        }
    }
}

// ==============================================================================
// Recommended Fees
// ==============================================================================

/// Fee tiers in sat/vB, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedFees {
    pub fastest_fee: u64,
    pub half_hour_fee: u64,
    pub hour_fee: u64,
    pub economy_fee: u64,
    pub minimum_fee: u64,
}
