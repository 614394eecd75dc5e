//! Ledger and price data collaborator.
//!
//! Defines the [`ChainSource`] trait and provides an HTTP implementation
//! ([`HttpSource`]) against block-explorer style APIs plus a test mock
//! (`mock::MockSource`).

mod http_adapter;
#[cfg(test)]
pub mod mock;
pub mod types;

pub(crate) use http_adapter::parse_endpoint;
pub use http_adapter::{HttpSource, HttpSourceConfig};
pub use types::{MempoolStatus, RecommendedFees};

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::CoreError;
use crate::price::PriceSeries;
use crate::types::{Address, AddressSummary, BlockHeight, Transaction, TxDetail};

/// The read operations satlens needs from the outside world.
///
/// Implementations are expected to handle transport, decoding and any
/// rate limiting internally. Every call is independent, so callers are free
/// to issue several of them concurrently.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Most recent transactions touching `address`, newest first, with
    /// inputs resolved to the address and value they spend.
    async fn get_address_transactions(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError>;

    /// Containing block and size for a single transaction.
    async fn get_transaction_detail(&self, txid: &Txid) -> Result<TxDetail, CoreError>;

    /// Height of the current best block.
    async fn get_tip_height(&self) -> Result<BlockHeight, CoreError>;

    /// Daily fiat prices covering at least a few days either side of
    /// `around` (Unix seconds).
    async fn get_price_series(&self, around: i64) -> Result<PriceSeries, CoreError>;

    /// Latest fiat price, if the ticker reports one.
    async fn get_spot_price(&self) -> Result<Option<f64>, CoreError>;

    async fn get_address_summary(&self, address: &Address) -> Result<AddressSummary, CoreError>;

    /// Mempool view of a transaction: fee, virtual size, confirmation.
    async fn get_mempool_status(&self, txid: &Txid) -> Result<MempoolStatus, CoreError>;

    /// Fully signed transaction as a hex string.
    async fn get_raw_hex(&self, txid: &Txid) -> Result<String, CoreError>;

    async fn get_recommended_fees(&self) -> Result<RecommendedFees, CoreError>;
}
