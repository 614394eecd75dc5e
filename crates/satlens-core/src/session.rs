//! Per-session state: the fetch guard, the current selection, the last
//! fetched listing and the acceleration log, plus the two guarded flows
//! that use them. [`SessionRegistry`] hands out one session per watched
//! address.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bitcoin::{Amount, Txid};
use lru::LruCache;
use serde::Serialize;
use tracing::debug;

use crate::accelerate::AccelerationLog;
use crate::classify::{classify, counterparties, Counterparties, TxFilter};
use crate::enrich::{hydrate_for_selection, EnrichedView, EnrichmentPolicy};
use crate::error::CoreError;
use crate::guard::{CallGuard, Selection, DEFAULT_MIN_INTERVAL};
use crate::source::ChainSource;
use crate::types::{Address, BlockHeight, Direction, Transaction};

/// Number of watched addresses whose sessions are kept before the least
/// recently used one is dropped.
pub const SESSION_REGISTRY_CAP: usize = 1024;

/// One row of a classified address history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedTx {
    pub txid: Txid,
    pub timestamp: i64,
    pub direction: Direction,
    pub net_value_sats: u64,
    pub amount_btc: f64,
    pub fee_sats: u64,
    pub block_height: Option<BlockHeight>,
    pub counterparties: Counterparties,
}

impl ClassifiedTx {
    pub fn from_transaction(tx: &Transaction, watched: &Address) -> Self {
        let classification = classify(tx, watched);
        let magnitude: Amount = classification.magnitude();
        Self {
            txid: tx.txid,
            timestamp: tx.timestamp,
            direction: classification.direction,
            net_value_sats: magnitude.to_sat(),
            amount_btc: magnitude.to_btc(),
            fee_sats: tx.fee.to_sat(),
            block_height: tx.block_height,
            counterparties: counterparties(tx, watched),
        }
    }
}

/// Result of [`Session::select`].
#[derive(Debug)]
pub enum Selected {
    View(EnrichedView),
    /// A newer selection replaced this one before its fetches completed.
    Superseded,
    /// The transaction was not in the held listing and the call guard
    /// dropped the refetch.
    Throttled,
}

/// The unfiltered listing from the last permitted history fetch.
#[derive(Debug)]
struct HeldListing {
    address: Address,
    txs: Vec<Transaction>,
}

// ==============================================================================
// Session
// ==============================================================================

/// State owned by one front-end session. Construct one per session (or
/// test); nothing here is global.
#[derive(Debug)]
pub struct Session {
    guard: CallGuard,
    selection: Selection,
    listing: Mutex<Option<HeldListing>>,
    accelerations: Arc<AccelerationLog>,
}

impl Session {
    pub fn new(min_fetch_interval: Duration) -> Self {
        Self::with_accelerations(min_fetch_interval, Arc::new(AccelerationLog::new()))
    }

    /// A session that appends to an existing acceleration log.
    pub fn with_accelerations(
        min_fetch_interval: Duration,
        accelerations: Arc<AccelerationLog>,
    ) -> Self {
        Self {
            guard: CallGuard::new(min_fetch_interval),
            selection: Selection::new(),
            listing: Mutex::new(None),
            accelerations,
        }
    }

    pub fn guard(&self) -> &CallGuard {
        &self.guard
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn accelerations(&self) -> &AccelerationLog {
        &self.accelerations
    }

    /// Fetch and classify the history of `address`.
    ///
    /// Returns `Ok(None)` when the call guard drops the attempt. A permitted
    /// fetch invalidates any enrichment still in flight for the previous
    /// listing, and the fetched listing is held for later selections.
    pub async fn fetch_history(
        &self,
        source: &dyn ChainSource,
        address: &Address,
        filter: TxFilter,
        limit: usize,
    ) -> Result<Option<Vec<ClassifiedTx>>, CoreError> {
        if !self.guard.should_run() {
            return Ok(None);
        }
        self.selection.clear();

        let txs = source.get_address_transactions(address, limit).await?;
        let total = txs.len();
        let rows: Vec<ClassifiedTx> = txs
            .iter()
            .map(|tx| ClassifiedTx::from_transaction(tx, address))
            .filter(|row| filter.matches(row.direction))
            .collect();
        debug!(%address, total, shown = rows.len(), ?filter, "address history classified");
        self.hold_listing(address, txs);
        Ok(Some(rows))
    }

    /// Select `txid` from the history of `watched` and hydrate its view.
    ///
    /// The selection changes before anything is fetched. The transaction is
    /// looked up in the held listing; only when it is missing there is the
    /// listing refetched, and that refetch goes through the call guard.
    pub async fn select(
        &self,
        source: &dyn ChainSource,
        watched: &Address,
        txid: Txid,
        lookup_limit: usize,
        policy: &EnrichmentPolicy,
    ) -> Result<Selected, CoreError> {
        let token = self.selection.begin(txid);

        let tx = match self.held_transaction(watched, txid) {
            Some(tx) => tx,
            None => {
                if !self.guard.should_run() {
                    return Ok(Selected::Throttled);
                }
                let txs = source.get_address_transactions(watched, lookup_limit).await?;
                let found = txs.iter().find(|tx| tx.txid == txid).cloned();
                self.hold_listing(watched, txs);
                found.ok_or(CoreError::TxNotFound(txid))?
            }
        };

        let view =
            hydrate_for_selection(source, &self.selection, token, &tx, watched, policy).await;
        Ok(view.map_or(Selected::Superseded, Selected::View))
    }

    fn held_transaction(&self, watched: &Address, txid: Txid) -> Option<Transaction> {
        let listing = self
            .listing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listing
            .as_ref()
            .filter(|held| held.address == *watched)?
            .txs
            .iter()
            .find(|tx| tx.txid == txid)
            .cloned()
    }

    fn hold_listing(&self, address: &Address, txs: Vec<Transaction>) {
        let mut listing = self
            .listing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *listing = Some(HeldListing {
            address: address.clone(),
            txs,
        });
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

// ==============================================================================
// Session Registry
// ==============================================================================

/// Hands out one [`Session`] per watched address, so selections and fetch
/// throttling for one address never affect another. Every session appends
/// to the same acceleration log.
#[derive(Debug)]
pub struct SessionRegistry {
    min_fetch_interval: Duration,
    sessions: Mutex<LruCache<Address, Arc<Session>>>,
    accelerations: Arc<AccelerationLog>,
}

impl SessionRegistry {
    pub fn new(min_fetch_interval: Duration) -> Self {
        Self {
            min_fetch_interval,
            sessions: Mutex::new(LruCache::new(
                NonZeroUsize::new(SESSION_REGISTRY_CAP)
                    .expect("SESSION_REGISTRY_CAP is non-zero"),
            )),
            accelerations: Arc::new(AccelerationLog::new()),
        }
    }

    pub fn min_fetch_interval(&self) -> Duration {
        self.min_fetch_interval
    }

    /// The session for `address`, created on first use.
    pub fn session_for(&self, address: &Address) -> Arc<Session> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .get_or_insert(address.clone(), || {
                debug!(%address, "new session");
                Arc::new(Session::with_accelerations(
                    self.min_fetch_interval,
                    self.accelerations.clone(),
                ))
            })
            .clone()
    }

    pub fn accelerations(&self) -> &AccelerationLog {
        &self.accelerations
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
