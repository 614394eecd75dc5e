use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Txid;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{StatusCode, Url};
use tracing::{debug, trace};

use crate::error::{CoreError, SourceError};
use crate::price::{chart_window_start, PriceSeries};
use crate::source::types::{MempoolStatus, RecommendedFees};
use crate::source::ChainSource;
use crate::types::{Address, AddressSummary, BlockHeight, Transaction, TxDetail};

use super::connection::{join_segments, parse_endpoint};
use super::parsing::{
    parse_address_summary, parse_address_transactions, parse_block_count, parse_mempool_status,
    parse_price_series, parse_raw_hex, parse_ticker_usd, parse_tx_detail,
};

pub const DEFAULT_BLOCKCHAIN_INFO_URL: &str = "https://blockchain.info";
pub const DEFAULT_CHARTS_URL: &str = "https://api.blockchain.info";
pub const DEFAULT_MEMPOOL_URL: &str = "https://mempool.space/api";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Days of price history requested before the target date.
const CHART_LEAD_DAYS: i64 = 5;
const CHART_TIMESPAN: &str = "60days";

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Endpoints and transport settings for [`HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub blockchain_info_url: String,
    pub charts_url: String,
    pub mempool_url: String,
    pub timeout: Duration,
    /// Outbound requests per second across all endpoints; `None` disables
    /// client-side limiting.
    pub requests_per_second: Option<u32>,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            blockchain_info_url: DEFAULT_BLOCKCHAIN_INFO_URL.to_owned(),
            charts_url: DEFAULT_CHARTS_URL.to_owned(),
            mempool_url: DEFAULT_MEMPOOL_URL.to_owned(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            requests_per_second: None,
        }
    }
}

/// Block-explorer client over HTTP(S).
///
/// Address history, transaction detail, tip height, balances and the spot
/// ticker come from blockchain.info; the daily price chart from its charts
/// API; mempool status, raw hex and fee estimates from an Esplora-style
/// API such as mempool.space.
pub struct HttpSource {
    client: reqwest::Client,
    blockchain_info: Url,
    charts: Url,
    mempool: Url,
    limiter: Option<DirectRateLimiter>,
}

impl HttpSource {
    pub fn new(config: &HttpSourceConfig) -> Result<Self, CoreError> {
        let blockchain_info = parse_endpoint(&config.blockchain_info_url)?;
        let charts = parse_endpoint(&config.charts_url)?;
        let mempool = parse_endpoint(&config.mempool_url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout)
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .expect("reqwest client builder uses valid static config");

        let limiter = match config.requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::InvalidConfig("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            blockchain_info,
            charts,
            mempool,
            limiter,
        })
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// GET `url` and return the body of a 2xx response.
    async fn get_text(&self, url: Url) -> Result<String, CoreError> {
        self.wait_for_rate_limit().await;
        debug!(source.url = %url, "source request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(SourceError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(SourceError::Transport)?;
        debug!(source.url = %url, %status, body_len = body.len(), "source response");
        trace!(source.url = %url, body = %body, "source response body");

        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            }
            .into());
        }
        Ok(body)
    }

    async fn get_json(&self, url: Url) -> Result<serde_json::Value, CoreError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| {
            SourceError::InvalidResponse(format!("decode JSON response: {e}; body={body}")).into()
        })
    }

    fn blockchain_info_url(&self, segments: &[&str]) -> Result<Url, CoreError> {
        join_segments(&self.blockchain_info, segments)
    }

    fn mempool_url(&self, segments: &[&str]) -> Result<Url, CoreError> {
        join_segments(&self.mempool, segments)
    }

    async fn get_address_figure(
        &self,
        query: &str,
        address: &Address,
    ) -> Result<String, CoreError> {
        let mut url = self.blockchain_info_url(&["q", query, address.as_str()])?;
        url.query_pairs_mut().append_pair("confirmations", "0");
        self.get_text(url).await
    }
}

#[async_trait]
impl ChainSource for HttpSource {
    async fn get_address_transactions(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError> {
        let mut url = self.blockchain_info_url(&["rawaddr", address.as_str()])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let raw = self.get_json(url).await?;
        let mut txs = parse_address_transactions(&raw)?;
        txs.truncate(limit);
        Ok(txs)
    }

    async fn get_transaction_detail(&self, txid: &Txid) -> Result<TxDetail, CoreError> {
        let url = self.blockchain_info_url(&["rawtx", &txid.to_string()])?;
        let raw = self
            .get_json(url)
            .await
            .map_err(|err| normalize_not_found(txid, err))?;
        Ok(parse_tx_detail(&raw))
    }

    async fn get_tip_height(&self) -> Result<BlockHeight, CoreError> {
        let url = self.blockchain_info_url(&["q", "getblockcount"])?;
        let body = self.get_text(url).await?;
        parse_block_count(&body)
    }

    async fn get_price_series(&self, around: i64) -> Result<PriceSeries, CoreError> {
        let start = chart_window_start(around, CHART_LEAD_DAYS).ok_or_else(|| {
            CoreError::InvalidData(format!("timestamp out of range for price chart: {around}"))
        })?;
        let mut url = join_segments(&self.charts, &["charts", "market-price"])?;
        url.query_pairs_mut()
            .append_pair("start", &start)
            .append_pair("timespan", CHART_TIMESPAN)
            .append_pair("format", "json");
        let raw = self.get_json(url).await?;
        Ok(parse_price_series(&raw))
    }

    async fn get_spot_price(&self) -> Result<Option<f64>, CoreError> {
        let url = self.blockchain_info_url(&["ticker"])?;
        let raw = self.get_json(url).await?;
        Ok(parse_ticker_usd(&raw))
    }

    async fn get_address_summary(&self, address: &Address) -> Result<AddressSummary, CoreError> {
        let (balance, received, sent) = tokio::try_join!(
            self.get_address_figure("addressbalance", address),
            self.get_address_figure("getreceivedbyaddress", address),
            self.get_address_figure("getsentbyaddress", address),
        )?;
        Ok(parse_address_summary(&balance, &received, &sent))
    }

    async fn get_mempool_status(&self, txid: &Txid) -> Result<MempoolStatus, CoreError> {
        let url = self.mempool_url(&["tx", &txid.to_string()])?;
        let raw = self
            .get_json(url)
            .await
            .map_err(|err| normalize_not_found(txid, err))?;
        Ok(parse_mempool_status(&raw))
    }

    async fn get_raw_hex(&self, txid: &Txid) -> Result<String, CoreError> {
        let url = self.mempool_url(&["tx", &txid.to_string(), "hex"])?;
        let body = self
            .get_text(url)
            .await
            .map_err(|err| normalize_not_found(txid, err))?;
        parse_raw_hex(&body)
    }

    async fn get_recommended_fees(&self) -> Result<RecommendedFees, CoreError> {
        let url = self.mempool_url(&["v1", "fees", "recommended"])?;
        let raw = self.get_json(url).await?;
        serde_json::from_value(raw)
            .map_err(|e| CoreError::InvalidData(format!("invalid recommended fees: {e}")))
    }
}

// ==============================================================================
// Error Normalization
// ==============================================================================

/// Convert an upstream 404 for a transaction lookup into `TxNotFound`, so
/// callers can tell a missing transaction from a failing service.
fn normalize_not_found(txid: &Txid, err: CoreError) -> CoreError {
    match err {
        CoreError::Source(SourceError::Status { status, .. })
            if status == StatusCode::NOT_FOUND.as_u16() =>
        {
            CoreError::TxNotFound(*txid)
        }
        other => other,
    }
}

const MAX_ERROR_BODY: usize = 200;

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_owned(),
    }
}
