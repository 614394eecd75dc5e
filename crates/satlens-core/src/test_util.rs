//! Shared test helpers for `satlens-core` unit tests.
//!
//! Consolidates builder functions for transactions, inputs, outputs and
//! price observations so that tests across modules share a single source
//! of truth for dummy data construction.

use bitcoin::hashes::Hash;
use bitcoin::{Amount, Txid};

use crate::types::{Address, BlockHeight, Transaction, TxInput, TxOutput};

pub const WATCHED: &str = "bc1qwatchedaddressxxxxxxxxxxxxxxxxxxxxxx";
pub const OTHER: &str = "bc1qsomeoneelsexxxxxxxxxxxxxxxxxxxxxxxxx";
pub const THIRD: &str = "3ThirdPartyAddressXXXXXXXXXXXXXXXX";

/// 2024-03-09T12:00:00Z
pub const MIDDAY_2024_03_09: i64 = 1_709_985_600;

pub fn watched() -> Address {
    Address::from(WATCHED)
}

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

pub fn input(address: &str, sats: u64) -> TxInput {
    TxInput {
        address: Some(Address::from(address)),
        value: Amount::from_sat(sats),
    }
}

pub fn output(address: &str, sats: u64) -> TxOutput {
    TxOutput {
        address: Some(Address::from(address)),
        value: Amount::from_sat(sats),
    }
}

/// An output with no decodable address (e.g. OP_RETURN).
pub fn anonymous_output(sats: u64) -> TxOutput {
    TxOutput {
        address: None,
        value: Amount::from_sat(sats),
    }
}

/// Build a confirmed `Transaction` at height 100 with sane defaults.
/// Override individual fields after construction when needed.
pub fn make_tx(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, fee_sats: u64) -> Transaction {
    Transaction {
        txid: txid_from_byte(1),
        timestamp: MIDDAY_2024_03_09,
        fee: Amount::from_sat(fee_sats),
        inputs,
        outputs,
        block_height: Some(BlockHeight(100)),
        size: Some(250),
    }
}
