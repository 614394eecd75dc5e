mod address;
mod error;
mod rebroadcast;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};

use satlens_core::broadcast::BroadcastConfig;
use satlens_core::enrich::EnrichmentPolicy;
use satlens_core::source::ChainSource;
use satlens_core::SessionRegistry;

pub(crate) use rebroadcast::InFlight;

// ==============================================================================
// Application State
// ==============================================================================

pub struct AppState {
    pub source: Arc<dyn ChainSource>,
    /// One session per watched address.
    pub sessions: SessionRegistry,
    pub policy: EnrichmentPolicy,
    pub broadcast: BroadcastConfig,
    pub push_client: reqwest::Client,
    pub in_flight: InFlight,
}

type SharedState = Arc<AppState>;

// ==============================================================================
// Router
// ==============================================================================

pub fn build_router(state: AppState, origin: &str) -> Router {
    // Only reflect the allowed origin when the request's Origin header
    // actually matches. Otherwise, omit the header entirely so browsers
    // get a clean CORS rejection instead of a mismatched origin value.
    let allowed: axum::http::HeaderValue = origin.parse().expect("valid origin header value");
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate({
            let allowed = allowed.clone();
            move |request_origin: &axum::http::HeaderValue, _| *request_origin == allowed
        }))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let shared = Arc::new(state);

    // Rebroadcast bodies carry at most a fee rate.
    const REBROADCAST_BODY_LIMIT: usize = 4 * 1024;

    let address_api = Router::new()
        .route("/api/v1/address/{address}", get(address::get_address))
        .route("/api/v1/address/{address}/txs", get(address::get_history))
        .route(
            "/api/v1/address/{address}/tx/{txid}",
            get(address::get_receipt),
        );

    let acceleration_api = Router::new()
        .route(
            "/api/v1/tx/{txid}/rebroadcast",
            post(rebroadcast::post_rebroadcast),
        )
        .route(
            "/api/v1/accelerations",
            get(rebroadcast::list_accelerations),
        )
        .layer(DefaultBodyLimit::max(REBROADCAST_BODY_LIMIT));

    Router::new()
        .route("/api/v1/health", get(health))
        .merge(address_api)
        .merge(acceleration_api)
        .route("/api", any(api_not_found))
        .route("/api/{*path}", any(api_not_found))
        .layer(cors)
        .with_state(shared)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn api_not_found() -> error::AppError {
    error::AppError::NotFound("API route not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use bitcoin::hashes::Hash;
    use bitcoin::{Amount, Txid};
    use satlens_core::broadcast::{BroadcastTarget, RequestShape};
    use satlens_core::error::{CoreError, SourceError};
    use satlens_core::price::{PriceObservation, PriceSeries};
    use satlens_core::source::{MempoolStatus, RecommendedFees};
    use satlens_core::types::{
        Address, AddressSummary, BlockHeight, Transaction, TxDetail, TxInput, TxOutput,
    };
    use tower::ServiceExt;

    const WATCHED: &str = "bc1qwatchedaddressxxxxxxxxxxxxxxxxxxxxxx";
    const SECOND_WATCHED: &str = "bc1qsecondwatchedxxxxxxxxxxxxxxxxxxxxxxx";
    const SENDER: &str = "bc1qsenderxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";
    /// 2024-03-09T12:00:00Z
    const TX_TIME: i64 = 1_709_985_600;

    #[derive(Clone, Copy)]
    enum FakeSourceMode {
        Ok,
        Confirmed,
        Unavailable,
    }

    struct FakeSource {
        mode: FakeSourceMode,
        detail_delay: Duration,
    }

    impl FakeSource {
        fn new(mode: FakeSourceMode) -> Self {
            Self {
                mode,
                detail_delay: Duration::ZERO,
            }
        }
    }

    fn unavailable() -> CoreError {
        CoreError::Source(SourceError::Status {
            status: 503,
            body: "maintenance".to_string(),
        })
    }

    #[async_trait]
    impl ChainSource for FakeSource {
        async fn get_address_transactions(
            &self,
            address: &Address,
            limit: usize,
        ) -> Result<Vec<Transaction>, CoreError> {
            if matches!(self.mode, FakeSourceMode::Unavailable) {
                return Err(unavailable());
            }
            let mut txs = match address.as_str() {
                WATCHED => vec![sample_receive(), sample_spend()],
                SECOND_WATCHED => vec![second_receive()],
                _ => Vec::new(),
            };
            txs.truncate(limit);
            Ok(txs)
        }

        async fn get_transaction_detail(&self, txid: &Txid) -> Result<TxDetail, CoreError> {
            tokio::time::sleep(self.detail_delay).await;
            if *txid == txid_n(1) {
                Ok(TxDetail {
                    block_height: Some(BlockHeight(834_000)),
                    size: Some(250),
                })
            } else {
                Err(CoreError::TxNotFound(*txid))
            }
        }

        async fn get_tip_height(&self) -> Result<BlockHeight, CoreError> {
            Ok(BlockHeight(834_001))
        }

        async fn get_price_series(&self, _around: i64) -> Result<PriceSeries, CoreError> {
            Ok(PriceSeries::new(vec![PriceObservation::new(
                TX_TIME - 43_200,
                60_000.0,
            )]))
        }

        async fn get_spot_price(&self) -> Result<Option<f64>, CoreError> {
            Err(unavailable())
        }

        async fn get_address_summary(
            &self,
            _address: &Address,
        ) -> Result<AddressSummary, CoreError> {
            if matches!(self.mode, FakeSourceMode::Unavailable) {
                return Err(unavailable());
            }
            Ok(AddressSummary {
                balance: Some(Amount::from_sat(1_500_000)),
                received: Some(Amount::from_sat(2_000_000)),
                sent: None,
            })
        }

        async fn get_mempool_status(&self, _txid: &Txid) -> Result<MempoolStatus, CoreError> {
            Ok(MempoolStatus {
                fee: Some(Amount::from_sat(1_410)),
                vsize: Some(141),
                replaceable: true,
                confirmed: matches!(self.mode, FakeSourceMode::Confirmed),
            })
        }

        async fn get_raw_hex(&self, _txid: &Txid) -> Result<String, CoreError> {
            Ok("0200000001ab".to_string())
        }

        async fn get_recommended_fees(&self) -> Result<RecommendedFees, CoreError> {
            Ok(RecommendedFees {
                fastest_fee: 30,
                half_hour_fee: 20,
                hour_fee: 10,
                economy_fee: 5,
                minimum_fee: 1,
            })
        }
    }

    fn txid_n(byte: u8) -> Txid {
        Txid::from_slice(&[byte; 32]).expect("test txid bytes must parse")
    }

    fn sample_receive() -> Transaction {
        Transaction {
            txid: txid_n(1),
            timestamp: TX_TIME,
            fee: Amount::from_sat(2_500),
            inputs: vec![TxInput {
                address: Some(Address::from(SENDER)),
                value: Amount::from_sat(2_000_000),
            }],
            outputs: vec![
                TxOutput {
                    address: Some(Address::from(WATCHED)),
                    value: Amount::from_sat(1_500_000),
                },
                TxOutput {
                    address: Some(Address::from(SENDER)),
                    value: Amount::from_sat(497_500),
                },
            ],
            block_height: Some(BlockHeight(834_000)),
            size: Some(250),
        }
    }

    fn sample_spend() -> Transaction {
        Transaction {
            txid: txid_n(2),
            timestamp: TX_TIME + 3_600,
            fee: Amount::from_sat(1_000),
            inputs: vec![TxInput {
                address: Some(Address::from(WATCHED)),
                value: Amount::from_sat(1_500_000),
            }],
            outputs: vec![TxOutput {
                address: Some(Address::from(SENDER)),
                value: Amount::from_sat(1_499_000),
            }],
            block_height: None,
            size: None,
        }
    }

    fn second_receive() -> Transaction {
        Transaction {
            txid: txid_n(3),
            timestamp: TX_TIME,
            fee: Amount::from_sat(1_000),
            inputs: vec![TxInput {
                address: Some(Address::from(SENDER)),
                value: Amount::from_sat(300_000),
            }],
            outputs: vec![TxOutput {
                address: Some(Address::from(SECOND_WATCHED)),
                value: Amount::from_sat(299_000),
            }],
            block_height: Some(BlockHeight(834_000)),
            size: Some(200),
        }
    }

    /// A broadcast target on a port nothing listens on.
    fn offline_broadcast() -> BroadcastConfig {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
        let addr = listener.local_addr().expect("free port address");
        drop(listener);
        let target = BroadcastTarget::new(
            "local",
            &format!("http://{addr}/tx"),
            RequestShape::RawBody,
        )
        .expect("test target must be valid");
        BroadcastConfig::new(vec![target], Duration::from_secs(2)).expect("test config")
    }

    fn test_router(mode: FakeSourceMode) -> Router {
        test_router_with_interval(mode, Duration::ZERO)
    }

    fn test_router_with_interval(mode: FakeSourceMode, min_interval: Duration) -> Router {
        test_router_with_source(FakeSource::new(mode), min_interval)
    }

    fn test_router_with_source(source: FakeSource, min_interval: Duration) -> Router {
        let state = AppState {
            source: Arc::new(source),
            sessions: SessionRegistry::new(min_interval),
            policy: EnrichmentPolicy::default(),
            broadcast: offline_broadcast(),
            push_client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .expect("test client must build"),
            in_flight: InFlight::default(),
        };
        build_router(state, "http://127.0.0.1:3090")
    }

    async fn response_body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .expect("response body must be readable");
        serde_json::from_slice(&bytes).expect("response body must be valid JSON")
    }

    fn get(uri: impl AsRef<str>) -> Request<Body> {
        Request::builder()
            .uri(uri.as_ref())
            .body(Body::empty())
            .expect("request must build")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_router(FakeSourceMode::Ok)
            .oneshot(get("/api/v1/health"))
            .await
            .expect("router should serve request");
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_api_route_returns_json_404() {
        let response = test_router(FakeSourceMode::Ok)
            .oneshot(get("/api/v1/does-not-exist"))
            .await
            .expect("router should serve request");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = response_body_json(response).await;
        assert_eq!(
            json.get("error").and_then(serde_json::Value::as_str),
            Some("API route not found")
        );
    }

    #[tokio::test]
    async fn address_summary_degrades_missing_spot_price() {
        let response = test_router(FakeSourceMode::Ok)
            .oneshot(get(format!("/api/v1/address/{WATCHED}")))
            .await
            .expect("router should serve request");

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_body_json(response).await;
        assert_eq!(json["balance_sats"], 1_500_000);
        assert_eq!(json["balance_btc"], 0.015);
        assert!(json["sent_sats"].is_null());
        assert!(json["spot_price"].is_null());
        assert!(json["balance_fiat"].is_null());
    }

    #[tokio::test]
    async fn history_is_classified_and_filtered() {
        let response = test_router(FakeSourceMode::Ok)
            .oneshot(get(format!(
                "/api/v1/address/{WATCHED}/txs?filter=incoming"
            )))
            .await
            .expect("router should serve request");

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_body_json(response).await;
        let txs = json["transactions"].as_array().expect("transactions array");
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0]["direction"], "incoming");
        assert_eq!(txs[0]["net_value_sats"], 1_500_000);
        assert_eq!(json["filter"], "incoming");
    }

    #[tokio::test]
    async fn rapid_history_requests_are_throttled() {
        let router = test_router_with_interval(FakeSourceMode::Ok, Duration::from_secs(60));
        let uri = format!("/api/v1/address/{WATCHED}/txs");

        let first = router
            .clone()
            .oneshot(get(&uri))
            .await
            .expect("router should serve request");
        assert_eq!(first.status(), StatusCode::OK);

        let second = router
            .oneshot(get(&uri))
            .await
            .expect("router should serve request");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn throttling_is_per_watched_address() {
        let router = test_router_with_interval(FakeSourceMode::Ok, Duration::from_secs(60));

        for address in [WATCHED, SECOND_WATCHED] {
            let response = router
                .clone()
                .oneshot(get(format!("/api/v1/address/{address}/txs")))
                .await
                .expect("router should serve request");
            assert_eq!(response.status(), StatusCode::OK, "{address}");
        }
    }

    #[tokio::test]
    async fn concurrent_receipts_for_different_addresses_both_succeed() {
        let source = FakeSource {
            mode: FakeSourceMode::Ok,
            detail_delay: Duration::from_millis(100),
        };
        let router = test_router_with_source(source, Duration::from_secs(60));

        let first = router.clone().oneshot(get(format!(
            "/api/v1/address/{WATCHED}/tx/{}",
            txid_n(1)
        )));
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            router
                .clone()
                .oneshot(get(format!(
                    "/api/v1/address/{SECOND_WATCHED}/tx/{}",
                    txid_n(3)
                )))
                .await
        };
        let (first, second) = tokio::join!(first, second);

        let first = first.expect("router should serve request");
        let second = second.expect("router should serve request");
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(response_body_json(second).await["net_value_sats"], 299_000);
    }

    #[tokio::test]
    async fn receipt_outside_held_listing_is_throttled() {
        let router = test_router_with_interval(FakeSourceMode::Ok, Duration::from_secs(60));

        let history = router
            .clone()
            .oneshot(get(format!("/api/v1/address/{WATCHED}/txs")))
            .await
            .expect("router should serve request");
        assert_eq!(history.status(), StatusCode::OK);

        let held = router
            .clone()
            .oneshot(get(format!(
                "/api/v1/address/{WATCHED}/tx/{}",
                txid_n(2)
            )))
            .await
            .expect("router should serve request");
        assert_eq!(held.status(), StatusCode::OK);

        let unknown = router
            .oneshot(get(format!(
                "/api/v1/address/{WATCHED}/tx/{}",
                txid_n(9)
            )))
            .await
            .expect("router should serve request");
        assert_eq!(unknown.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn history_limit_is_validated() {
        for bad in ["0", "101"] {
            let response = test_router(FakeSourceMode::Ok)
                .oneshot(get(format!("/api/v1/address/{WATCHED}/txs?limit={bad}")))
                .await
                .expect("router should serve request");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "limit={bad}");
        }
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_502() {
        let response = test_router(FakeSourceMode::Unavailable)
            .oneshot(get(format!("/api/v1/address/{WATCHED}/txs")))
            .await
            .expect("router should serve request");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn receipt_is_enriched() {
        let response = test_router(FakeSourceMode::Ok)
            .oneshot(get(format!(
                "/api/v1/address/{WATCHED}/tx/{}",
                txid_n(1)
            )))
            .await
            .expect("router should serve request");

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_body_json(response).await;
        assert_eq!(json["title"], "Received BTC");
        assert_eq!(json["net_value_sats"], 1_500_000);
        assert_eq!(json["fee_rate_sats_per_byte"], 10.0);
        let fiat_value = json["fiat_value"].as_f64().expect("fiat value present");
        assert!((fiat_value - 900.0).abs() < 1e-6);
        assert_eq!(json["status"]["state"], "confirming");
        assert_eq!(json["status"]["depth"], 2);
        assert_eq!(json["status_phrase"], "Confirming 2/4");
        assert_eq!(json["confirmation_label"], "2/4 confirmations");
    }

    #[tokio::test]
    async fn receipt_with_failed_detail_is_still_served() {
        let response = test_router(FakeSourceMode::Ok)
            .oneshot(get(format!(
                "/api/v1/address/{WATCHED}/tx/{}",
                txid_n(2)
            )))
            .await
            .expect("router should serve request");

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_body_json(response).await;
        assert_eq!(json["title"], "Sent BTC");
        assert_eq!(json["status"]["state"], "pending");
        assert_eq!(json["is_unconfirmed"], true);
        assert!(json["fee_rate_sats_per_byte"].is_null());
    }

    #[tokio::test]
    async fn receipt_for_unknown_txid_is_404_and_bad_txid_is_400() {
        let router = test_router(FakeSourceMode::Ok);
        let missing = router
            .clone()
            .oneshot(get(format!(
                "/api/v1/address/{WATCHED}/tx/{}",
                txid_n(9)
            )))
            .await
            .expect("router should serve request");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let malformed = router
            .oneshot(get(format!("/api/v1/address/{WATCHED}/tx/not-a-txid")))
            .await
            .expect("router should serve request");
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rebroadcast_records_attempt_even_when_endpoints_fail() {
        let router = test_router(FakeSourceMode::Ok);
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/tx/{}/rebroadcast", txid_n(2)))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"fee_rate":25}"#))
                    .expect("request must build"),
            )
            .await
            .expect("router should serve request");

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_body_json(response).await;
        assert_eq!(json["report"]["local"]["succeeded"], false);
        assert_eq!(json["record"]["declared_fee_rate"], 25);
        assert_eq!(json["record"]["estimated_confirmation_blocks"], 3);
        let record_id = json["record"]["record_id"]
            .as_str()
            .expect("record id string");
        assert!(record_id.starts_with("rebroadcast_"));

        let listed = router
            .oneshot(get("/api/v1/accelerations"))
            .await
            .expect("router should serve request");
        assert_eq!(listed.status(), StatusCode::OK);
        let records = response_body_json(listed).await;
        assert_eq!(records.as_array().map(Vec::len), Some(1));
        assert_eq!(records[0]["record_id"], record_id);
    }

    #[tokio::test]
    async fn rebroadcast_without_body_uses_suggested_rate() {
        let response = test_router(FakeSourceMode::Ok)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/tx/{}/rebroadcast", txid_n(2)))
                    .body(Body::empty())
                    .expect("request must build"),
            )
            .await
            .expect("router should serve request");

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_body_json(response).await;
        // 1410 sat / 141 vB = 10 sat/vB, suggested 15.
        assert_eq!(json["record"]["declared_fee_rate"], 15);
    }

    #[tokio::test]
    async fn rebroadcast_of_confirmed_tx_is_conflict() {
        let router = test_router(FakeSourceMode::Confirmed);
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/tx/{}/rebroadcast", txid_n(1)))
                    .body(Body::empty())
                    .expect("request must build"),
            )
            .await
            .expect("router should serve request");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let listed = router
            .oneshot(get("/api/v1/accelerations"))
            .await
            .expect("router should serve request");
        let records = response_body_json(listed).await;
        assert_eq!(records.as_array().map(Vec::len), Some(0));
    }
}
