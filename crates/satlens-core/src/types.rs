//! Domain types for satlens' single-address transaction model.
//!
//! Contains the decoded transaction types (`Transaction`, `TxInput`,
//! `TxOutput`) as supplied by a [`ChainSource`](crate::source::ChainSource),
//! the opaque watched `Address`, and shared enums like `Direction` and
//! `BlockHeight`.

use bitcoin::{Amount, Txid};
use serde::{Deserialize, Serialize};

// ==============================================================================
// Address
// ==============================================================================

/// An opaque account identifier. No format validation happens here; two
/// addresses match only when their strings are byte-for-byte equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ==============================================================================
// Block Height
// ==============================================================================

/// A Bitcoin block height, wrapped for type safety.
///
/// `#[serde(transparent)]` preserves the JSON representation as a bare
/// integer, so this newtype is wire-compatible with plain `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHeight(pub u32);

impl From<u32> for BlockHeight {
    fn from(h: u32) -> Self {
        Self(h)
    }
}

impl From<BlockHeight> for u32 {
    fn from(h: BlockHeight) -> Self {
        h.0
    }
}

impl std::ops::Deref for BlockHeight {
    type Target = u32;
    fn deref(&self) -> &u32 {
        &self.0
    }
}

impl std::fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ==============================================================================
// Transaction Types
// ==============================================================================

/// A decoded transaction as seen from the ledger-data collaborator.
///
/// Inputs are already resolved to the address and value of the output they
/// spend, so no prevout lookups are needed downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: Txid,
    /// Seconds since the Unix epoch, as reported by the explorer.
    pub timestamp: i64,
    pub fee: Amount,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Containing block; `None` while the transaction sits in the mempool.
    pub block_height: Option<BlockHeight>,
    pub size: Option<u64>,
}

/// A spent-from source, resolved to its previous output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    pub address: Option<Address>,
    pub value: Amount,
}

/// One destination of a transaction. `address` is `None` for outputs the
/// explorer could not decode (e.g. OP_RETURN).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Option<Address>,
    pub value: Amount,
}

/// Per-transaction data that is fetched separately from the address
/// history listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxDetail {
    pub block_height: Option<BlockHeight>,
    pub size: Option<u64>,
}

// ==============================================================================
// Direction
// ==============================================================================

/// Economic direction of a transaction relative to the watched address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    /// Heading shown above a rendered receipt.
    pub fn title(self) -> &'static str {
        match self {
            Self::Incoming => "Received BTC",
            Self::Outgoing => "Sent BTC",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incoming => write!(f, "incoming"),
            Self::Outgoing => write!(f, "outgoing"),
        }
    }
}

// ==============================================================================
// Address Summary
// ==============================================================================

/// Lifetime totals for an address. Each figure comes from a separate
/// upstream query and is independently optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressSummary {
    pub balance: Option<Amount>,
    pub received: Option<Amount>,
    pub sent: Option<Amount>,
}
