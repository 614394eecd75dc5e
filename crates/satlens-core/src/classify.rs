//! Net-value classification of a transaction against a watched address.
//!
//! The economic effect of a transaction on an address is the value it
//! receives minus the value it spends. Gross totals are misleading because
//! a spend usually returns change to the same address.

use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::types::{Address, Direction, Transaction};

/// How many counterparty addresses a receipt shows before collapsing the
/// rest into a count.
pub const COUNTERPARTY_PEEK: usize = 2;

// ==============================================================================
// Classification
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub direction: Direction,
    /// Outputs to the watched address minus inputs from it, in satoshis.
    pub net_value_sats: i64,
    pub inflow: Amount,
    pub outflow: Amount,
}

impl Classification {
    /// Absolute size of the net effect, used for display.
    pub fn magnitude(&self) -> Amount {
        Amount::from_sat(self.net_value_sats.unsigned_abs())
    }
}

/// Classify `tx` by its net effect on `watched`.
///
/// A zero net (self-payment, or a transaction that does not touch the
/// address at all) is `Outgoing`. Inputs and outputs without an address
/// never match.
#[must_use]
pub fn classify(tx: &Transaction, watched: &Address) -> Classification {
    let inflow = sum_matching(
        tx.outputs.iter().map(|o| (o.address.as_ref(), o.value)),
        watched,
    );
    let outflow = sum_matching(
        tx.inputs.iter().map(|i| (i.address.as_ref(), i.value)),
        watched,
    );
    let net_value_sats = signed_sats(inflow).saturating_sub(signed_sats(outflow));

    Classification {
        direction: if net_value_sats > 0 {
            Direction::Incoming
        } else {
            Direction::Outgoing
        },
        net_value_sats,
        inflow,
        outflow,
    }
}

fn sum_matching<'a>(
    entries: impl Iterator<Item = (Option<&'a Address>, Amount)>,
    watched: &Address,
) -> Amount {
    entries
        .filter(|(address, _)| *address == Some(watched))
        .fold(Amount::ZERO, |acc, (_, value)| {
            acc.checked_add(value).unwrap_or(Amount::MAX)
        })
}

fn signed_sats(amount: Amount) -> i64 {
    i64::try_from(amount.to_sat()).unwrap_or(i64::MAX)
}

// ==============================================================================
// Filtering
// ==============================================================================

/// List filter applied to classified transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxFilter {
    #[default]
    All,
    Incoming,
    Outgoing,
}

impl TxFilter {
    pub fn matches(self, direction: Direction) -> bool {
        match self {
            Self::All => true,
            Self::Incoming => direction == Direction::Incoming,
            Self::Outgoing => direction == Direction::Outgoing,
        }
    }
}

// ==============================================================================
// Counterparties
// ==============================================================================

/// The other side of a transaction, as shown on a receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparties {
    /// Up to [`COUNTERPARTY_PEEK`] input addresses other than the watched one.
    pub from_peek: Vec<Address>,
    /// Number of unique input addresses, the watched one included.
    pub from_count: usize,
    pub to_peek: Vec<Address>,
    pub to_count: usize,
}

/// Unique non-empty addresses on each side, in first-seen order.
#[must_use]
pub fn counterparties(tx: &Transaction, watched: &Address) -> Counterparties {
    let from = unique_addresses(tx.inputs.iter().filter_map(|i| i.address.as_ref()));
    let to = unique_addresses(tx.outputs.iter().filter_map(|o| o.address.as_ref()));

    Counterparties {
        from_peek: peek_excluding(&from, watched),
        from_count: from.len(),
        to_peek: peek_excluding(&to, watched),
        to_count: to.len(),
    }
}

fn unique_addresses<'a>(addresses: impl Iterator<Item = &'a Address>) -> Vec<&'a Address> {
    let mut seen: Vec<&Address> = Vec::new();
    for address in addresses {
        if !address.as_str().is_empty() && !seen.contains(&address) {
            seen.push(address);
        }
    }
    seen
}

fn peek_excluding(addresses: &[&Address], watched: &Address) -> Vec<Address> {
    addresses
        .iter()
        .filter(|a| **a != watched)
        .take(COUNTERPARTY_PEEK)
        .map(|a| (*a).clone())
        .collect()
}
