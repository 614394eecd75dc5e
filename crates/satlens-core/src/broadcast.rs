//! Concurrent re-announcement of a signed transaction to several
//! independent push endpoints.
//!
//! Every configured target gets exactly one request, issued in parallel.
//! A target's transport error, timeout or non-2xx reply becomes a failed
//! [`BroadcastOutcome`] for that target alone; the report always carries
//! one outcome per target, in declaration order.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::Url;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::source::parse_endpoint;

/// Per-request deadline for each push endpoint.
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(20);

/// Cap on how much of an endpoint's reply is kept in an outcome.
const MAX_REPLY_BODY: usize = 512;

// ==============================================================================
// Targets
// ==============================================================================

/// How the raw hex travels in the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestShape {
    /// `application/x-www-form-urlencoded` with the hex under `field`.
    FormEncoded { field: String },
    /// The hex as an opaque `text/plain` body.
    RawBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTarget {
    pub name: String,
    pub endpoint: Url,
    pub shape: RequestShape,
}

impl BroadcastTarget {
    pub fn new(
        name: impl Into<String>,
        endpoint: &str,
        shape: RequestShape,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "broadcast target name must not be empty".to_owned(),
            ));
        }
        Ok(Self {
            name,
            endpoint: parse_endpoint(endpoint)?,
            shape,
        })
    }

    /// Build the POST for `payload` according to this target's shape.
    pub fn build_request(
        &self,
        client: &reqwest::Client,
        payload: &str,
    ) -> reqwest::RequestBuilder {
        let request = client.post(self.endpoint.clone());
        match &self.shape {
            RequestShape::FormEncoded { field } => request.form(&[(field.as_str(), payload)]),
            RequestShape::RawBody => request
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(payload.to_owned()),
        }
    }
}

/// Parses `name|raw|url` or `name|form=<field>|url`.
impl FromStr for BroadcastTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            CoreError::InvalidConfig(format!(
                "invalid broadcast target `{s}`: expected name|raw|url or name|form=<field>|url"
            ))
        };

        let mut parts = s.splitn(3, '|');
        let (Some(name), Some(shape), Some(endpoint)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let shape = match shape.trim() {
            "raw" => RequestShape::RawBody,
            other => {
                let field = other
                    .strip_prefix("form=")
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(invalid)?;
                RequestShape::FormEncoded {
                    field: field.to_owned(),
                }
            }
        };

        Self::new(name.trim(), endpoint.trim(), shape)
    }
}

/// The three public push services: blockchain.info takes a form field,
/// the Esplora instances take the hex as the raw body.
pub fn default_targets() -> Vec<BroadcastTarget> {
    [
        (
            "blockchain.info",
            "https://blockchain.info/pushtx",
            RequestShape::FormEncoded {
                field: "tx".to_owned(),
            },
        ),
        (
            "mempool.space",
            "https://mempool.space/api/tx",
            RequestShape::RawBody,
        ),
        (
            "blockstream.info",
            "https://blockstream.info/api/tx",
            RequestShape::RawBody,
        ),
    ]
    .into_iter()
    .map(|(name, endpoint, shape)| BroadcastTarget {
        name: name.to_owned(),
        endpoint: Url::parse(endpoint).expect("default broadcast endpoints are valid URLs"),
        shape,
    })
    .collect()
}

// ==============================================================================
// Configuration
// ==============================================================================

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    targets: Vec<BroadcastTarget>,
    timeout: Duration,
}

impl BroadcastConfig {
    /// Target names key the report, so they must be unique.
    pub fn new(targets: Vec<BroadcastTarget>, timeout: Duration) -> Result<Self, CoreError> {
        if targets.is_empty() {
            return Err(CoreError::InvalidConfig(
                "at least one broadcast target is required".to_owned(),
            ));
        }
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.name.as_str()) {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate broadcast target name `{}`",
                    target.name
                )));
            }
        }
        if timeout.is_zero() {
            return Err(CoreError::InvalidConfig(
                "broadcast timeout must be positive".to_owned(),
            ));
        }
        Ok(Self { targets, timeout })
    }

    pub fn targets(&self) -> &[BroadcastTarget] {
        &self.targets
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            timeout: DEFAULT_BROADCAST_TIMEOUT,
        }
    }
}

// ==============================================================================
// Outcomes
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastOutcome {
    pub target: String,
    pub succeeded: bool,
    /// `None` when no HTTP response arrived (transport error or timeout).
    pub http_status: Option<u16>,
    pub body: Option<String>,
    pub failure_reason: Option<String>,
}

impl BroadcastOutcome {
    fn failed(target: &str, reason: String) -> Self {
        Self {
            target: target.to_owned(),
            succeeded: false,
            http_status: None,
            body: None,
            failure_reason: Some(reason),
        }
    }
}

/// One outcome per configured target, in target declaration order.
///
/// Serializes as a JSON object keyed by target name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    outcomes: Vec<BroadcastOutcome>,
}

impl BroadcastReport {
    pub fn get(&self, target: &str) -> Option<&BroadcastOutcome> {
        self.outcomes.iter().find(|o| o.target == target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BroadcastOutcome> {
        self.outcomes.iter()
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.succeeded)
    }
}

impl Serialize for BroadcastReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.outcomes.len()))?;
        for outcome in &self.outcomes {
            map.serialize_entry(&outcome.target, outcome)?;
        }
        map.end()
    }
}

// ==============================================================================
// Fan-out
// ==============================================================================

/// Check that `raw_hex` is a non-empty run of hex digits once surrounding
/// whitespace is trimmed, and return the trimmed payload.
pub fn validate_raw_hex(raw_hex: &str) -> Result<&str, CoreError> {
    let trimmed = raw_hex.trim();
    if trimmed.is_empty() {
        return Err(CoreError::MalformedInput("raw transaction hex is empty".into()));
    }
    if let Some((pos, ch)) = trimmed
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_hexdigit())
    {
        return Err(CoreError::MalformedInput(format!(
            "non-hex character {ch:?} at offset {pos}"
        )));
    }
    Ok(trimmed)
}

/// Push `raw_hex` to every configured target concurrently and wait for all
/// of them.
///
/// Only malformed hex is an error, raised before any request is issued.
/// Endpoint failures are reported per target inside the returned report.
pub async fn broadcast_everywhere(
    client: &reqwest::Client,
    raw_hex: &str,
    config: &BroadcastConfig,
) -> Result<BroadcastReport, CoreError> {
    let payload = validate_raw_hex(raw_hex)?;
    let started = Instant::now();

    let outcomes = join_all(
        config
            .targets
            .iter()
            .map(|target| push_to_target(client, target, payload, config.timeout)),
    )
    .await;

    let report = BroadcastReport { outcomes };
    info!(
        succeeded = report.succeeded_count(),
        total = report.total(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "broadcast finished"
    );
    Ok(report)
}

async fn push_to_target(
    client: &reqwest::Client,
    target: &BroadcastTarget,
    payload: &str,
    timeout: Duration,
) -> BroadcastOutcome {
    let started = Instant::now();
    let attempt = async {
        let response = target.build_request(client, payload).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok::<_, reqwest::Error>((status, body))
    };

    let outcome = match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok((status, body))) => {
            let succeeded = status.is_success();
            BroadcastOutcome {
                target: target.name.clone(),
                succeeded,
                http_status: Some(status.as_u16()),
                body: Some(truncate_reply(body)),
                failure_reason: (!succeeded).then(|| format!("endpoint returned HTTP {status}")),
            }
        }
        Ok(Err(err)) => BroadcastOutcome::failed(&target.name, format!("request failed: {err}")),
        Err(_) => BroadcastOutcome::failed(
            &target.name,
            format!("timed out after {}ms", timeout.as_millis()),
        ),
    };

    debug!(
        broadcast.target = %target.name,
        succeeded = outcome.succeeded,
        http_status = outcome.http_status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "broadcast target finished"
    );
    outcome
}

fn truncate_reply(mut body: String) -> String {
    if let Some((idx, _)) = body.char_indices().nth(MAX_REPLY_BODY) {
        body.truncate(idx);
    }
    body
}
