use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::{CoreError, SourceError};
use crate::price::PriceSeries;
use crate::types::{Address, AddressSummary, BlockHeight, Transaction, TxDetail};

use super::types::{MempoolStatus, RecommendedFees};
use super::ChainSource;

/// A mock ledger/price source for testing. Returns canned data populated
/// via the builder pattern; anything left unset fails like an unavailable
/// upstream service.
pub struct MockSource {
    histories: HashMap<Address, Vec<Transaction>>,
    details: HashMap<Txid, TxDetail>,
    tip: Option<BlockHeight>,
    prices: Option<PriceSeries>,
    spot: Option<f64>,
    summaries: HashMap<Address, AddressSummary>,
    mempool: HashMap<Txid, MempoolStatus>,
    raw_hex: HashMap<Txid, String>,
    fees: Option<RecommendedFees>,
    detail_delay: Option<Duration>,
    history_calls: AtomicUsize,
}

impl MockSource {
    pub fn builder() -> MockSourceBuilder {
        MockSourceBuilder {
            histories: HashMap::new(),
            details: HashMap::new(),
            tip: Some(BlockHeight(100)),
            prices: Some(PriceSeries::default()),
            spot: None,
            summaries: HashMap::new(),
            mempool: HashMap::new(),
            raw_hex: HashMap::new(),
            fees: None,
            detail_delay: None,
        }
    }

    /// Number of address-history fetches served so far.
    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

pub struct MockSourceBuilder {
    histories: HashMap<Address, Vec<Transaction>>,
    details: HashMap<Txid, TxDetail>,
    tip: Option<BlockHeight>,
    prices: Option<PriceSeries>,
    spot: Option<f64>,
    summaries: HashMap<Address, AddressSummary>,
    mempool: HashMap<Txid, MempoolStatus>,
    raw_hex: HashMap<Txid, String>,
    fees: Option<RecommendedFees>,
    detail_delay: Option<Duration>,
}

impl MockSourceBuilder {
    pub fn with_history(mut self, address: &Address, txs: Vec<Transaction>) -> Self {
        self.histories.insert(address.clone(), txs);
        self
    }

    pub fn with_detail(mut self, txid: Txid, detail: TxDetail) -> Self {
        self.details.insert(txid, detail);
        self
    }

    /// `None` makes tip lookups fail.
    pub fn with_tip(mut self, tip: Option<BlockHeight>) -> Self {
        self.tip = tip;
        self
    }

    /// `None` makes price series lookups fail.
    pub fn with_prices(mut self, prices: Option<PriceSeries>) -> Self {
        self.prices = prices;
        self
    }

    pub fn with_spot(mut self, spot: f64) -> Self {
        self.spot = Some(spot);
        self
    }

    pub fn with_summary(mut self, address: &Address, summary: AddressSummary) -> Self {
        self.summaries.insert(address.clone(), summary);
        self
    }

    pub fn with_mempool(mut self, txid: Txid, status: MempoolStatus) -> Self {
        self.mempool.insert(txid, status);
        self
    }

    pub fn with_raw_hex(mut self, txid: Txid, hex: &str) -> Self {
        self.raw_hex.insert(txid, hex.to_owned());
        self
    }

    pub fn with_fees(mut self, fees: RecommendedFees) -> Self {
        self.fees = Some(fees);
        self
    }

    /// Delay every transaction-detail response, to hold an enrichment in
    /// flight while a test changes the selection.
    pub fn with_detail_delay(mut self, delay: Duration) -> Self {
        self.detail_delay = Some(delay);
        self
    }

    pub fn build(self) -> MockSource {
        MockSource {
            histories: self.histories,
            details: self.details,
            tip: self.tip,
            prices: self.prices,
            spot: self.spot,
            summaries: self.summaries,
            mempool: self.mempool,
            raw_hex: self.raw_hex,
            fees: self.fees,
            detail_delay: self.detail_delay,
            history_calls: AtomicUsize::new(0),
        }
    }
}

fn unavailable(what: &str) -> CoreError {
    SourceError::Status {
        status: 503,
        body: format!("mock {what} unavailable"),
    }
    .into()
}

#[async_trait]
impl ChainSource for MockSource {
    async fn get_address_transactions(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let mut txs = self.histories.get(address).cloned().unwrap_or_default();
        txs.truncate(limit);
        Ok(txs)
    }

    async fn get_transaction_detail(&self, txid: &Txid) -> Result<TxDetail, CoreError> {
        if let Some(delay) = self.detail_delay {
            tokio::time::sleep(delay).await;
        }
        self.details
            .get(txid)
            .cloned()
            .ok_or(CoreError::TxNotFound(*txid))
    }

    async fn get_tip_height(&self) -> Result<BlockHeight, CoreError> {
        self.tip.ok_or_else(|| unavailable("tip"))
    }

    async fn get_price_series(&self, _around: i64) -> Result<PriceSeries, CoreError> {
        self.prices.clone().ok_or_else(|| unavailable("price chart"))
    }

    async fn get_spot_price(&self) -> Result<Option<f64>, CoreError> {
        Ok(self.spot)
    }

    async fn get_address_summary(&self, address: &Address) -> Result<AddressSummary, CoreError> {
        Ok(self.summaries.get(address).cloned().unwrap_or_default())
    }

    async fn get_mempool_status(&self, txid: &Txid) -> Result<MempoolStatus, CoreError> {
        self.mempool
            .get(txid)
            .cloned()
            .ok_or(CoreError::TxNotFound(*txid))
    }

    async fn get_raw_hex(&self, txid: &Txid) -> Result<String, CoreError> {
        self.raw_hex
            .get(txid)
            .cloned()
            .ok_or(CoreError::TxNotFound(*txid))
    }

    async fn get_recommended_fees(&self) -> Result<RecommendedFees, CoreError> {
        self.fees.ok_or_else(|| unavailable("fee estimates"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[tokio::test]
    async fn history_is_truncated_and_counted() {
        let txs = vec![
            make_tx(vec![], vec![output(WATCHED, 1)], 0),
            make_tx(vec![], vec![output(WATCHED, 2)], 0),
        ];
        let source = MockSource::builder().with_history(&watched(), txs).build();

        let fetched = source
            .get_address_transactions(&watched(), 1)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        let unknown = source
            .get_address_transactions(&Address::from(OTHER), 10)
            .await
            .unwrap();
        assert!(unknown.is_empty());
        assert_eq!(source.history_calls(), 2);
    }

    #[tokio::test]
    async fn unset_collaborators_fail() {
        let source = MockSource::builder()
            .with_tip(None)
            .with_prices(None)
            .build();
        assert!(source.get_tip_height().await.is_err());
        assert!(source.get_price_series(0).await.is_err());
        assert!(source.get_recommended_fees().await.is_err());
        assert!(matches!(
            source.get_raw_hex(&txid_from_byte(9)).await,
            Err(CoreError::TxNotFound(_))
        ));
    }
}
