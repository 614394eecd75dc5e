mod cli;
mod server;

use std::sync::Arc;
use std::time::Duration;

use bitcoin::Txid;
use clap::Parser;
use eyre::{eyre, WrapErr};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use satlens_core::accelerate::{rebroadcast, AccelerationLog};
use satlens_core::broadcast::{default_targets, BroadcastConfig, BroadcastTarget};
use satlens_core::enrich::EnrichmentPolicy;
use satlens_core::source::{ChainSource, HttpSource, HttpSourceConfig};
use satlens_core::types::Address;
use satlens_core::{Selected, Session, SessionRegistry};

use cli::{BroadcastArgs, Cli, Command, RebroadcastArgs, ServeArgs, SourceArgs, ViewArgs};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    match args.command {
        Command::Serve(args) => serve(args).await,
        Command::View(args) => view(args).await,
        Command::Rebroadcast(args) => run_rebroadcast(args).await,
    }
}

// ==============================================================================
// Subcommands
// ==============================================================================

async fn serve(args: ServeArgs) -> eyre::Result<()> {
    let state = server::AppState {
        source: build_source(&args.source)?,
        sessions: SessionRegistry::new(Duration::from_millis(args.min_fetch_interval_ms)),
        policy: build_policy(&args.source)?,
        broadcast: build_broadcast_config(&args.broadcast)?,
        push_client: build_push_client()?,
        in_flight: server::InFlight::default(),
    };

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let origin = format!("http://{}:{}", args.bind, args.port);
    let router = server::build_router(state, &origin);

    if args.bind == "0.0.0.0" {
        tracing::warn!("server is bound to 0.0.0.0, so it is reachable from the network");
    }

    println!();
    println!("  satlens is running:");
    println!("    API:       http://{bind_addr}/api/v1");
    println!();

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("bind TCP listener")?;

    tracing::info!("listening on {bind_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("run HTTP server")?;

    Ok(())
}

async fn view(args: ViewArgs) -> eyre::Result<()> {
    let source = build_source(&args.source)?;
    let policy = build_policy(&args.source)?;
    let address = Address::new(args.address.trim());
    let session = Session::default();

    if let Some(txid) = &args.txid {
        let txid = parse_txid(txid)?;
        let selected = session
            .select(source.as_ref(), &address, txid, args.limit, &policy)
            .await
            .with_context(|| format!("load receipt for {txid}"))?;
        let view = match selected {
            Selected::View(view) => view,
            Selected::Superseded => return Err(eyre!("selection of {txid} was superseded")),
            Selected::Throttled => return Err(eyre!("history fetch dropped by call guard")),
        };
        let rendered = serde_json::to_string_pretty(&view).context("serialize receipt")?;
        println!("{rendered}");
        return Ok(());
    }

    let rows = session
        .fetch_history(source.as_ref(), &address, args.filter.into(), args.limit)
        .await
        .with_context(|| format!("load history for {address}"))?
        .ok_or_else(|| eyre!("history fetch dropped by call guard"))?;

    if rows.is_empty() {
        println!("no matching transactions for {address}");
        return Ok(());
    }
    for row in rows {
        let when = OffsetDateTime::from_unix_timestamp(row.timestamp)
            .ok()
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_else(|| row.timestamp.to_string());
        let block = row
            .block_height
            .map(|h| h.to_string())
            .unwrap_or_else(|| "mempool".to_owned());
        println!(
            "{when}  {:<8}  {:>16.8} BTC  {:>8}  {}",
            row.direction.to_string(),
            row.amount_btc,
            block,
            row.txid
        );
    }
    Ok(())
}

async fn run_rebroadcast(args: RebroadcastArgs) -> eyre::Result<()> {
    let source = build_source(&args.source)?;
    let config = build_broadcast_config(&args.broadcast)?;
    let client = build_push_client()?;
    let txid = parse_txid(&args.txid)?;
    let log = AccelerationLog::new();

    let result = rebroadcast(source.as_ref(), &client, &config, &log, txid, args.fee_rate)
        .await
        .with_context(|| format!("rebroadcast {txid}"))?;

    for outcome in result.report.iter() {
        let status = outcome
            .http_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_owned());
        let detail = outcome
            .failure_reason
            .as_deref()
            .or(outcome.body.as_deref())
            .unwrap_or("");
        let mark = if outcome.succeeded { "ok" } else { "FAILED" };
        println!("{:<20} {mark:<6} {status:>4}  {detail}", outcome.target);
    }
    println!(
        "{}/{} endpoints accepted {txid}; record {} (declared {} sat/vB, ~{} blocks)",
        result.report.succeeded_count(),
        result.report.total(),
        result.record.record_id,
        result.record.declared_fee_rate,
        result.record.estimated_confirmation_blocks,
    );

    if !result.report.any_succeeded() {
        return Err(eyre!("no endpoint accepted the transaction"));
    }
    Ok(())
}

// ==============================================================================
// Construction Helpers
// ==============================================================================

fn build_source(args: &SourceArgs) -> eyre::Result<Arc<dyn ChainSource>> {
    let config = HttpSourceConfig {
        blockchain_info_url: args.blockchain_info_url.clone(),
        charts_url: args.charts_url.clone(),
        mempool_url: args.mempool_url.clone(),
        timeout: Duration::from_secs(args.fetch_timeout_secs),
        requests_per_second: args.requests_per_second,
    };
    let source = HttpSource::new(&config).context("configure explorer client")?;
    Ok(Arc::new(source))
}

fn build_policy(args: &SourceArgs) -> eyre::Result<EnrichmentPolicy> {
    EnrichmentPolicy::new(args.target_confirmations).context("configure confirmation target")
}

fn build_broadcast_config(args: &BroadcastArgs) -> eyre::Result<BroadcastConfig> {
    let targets = if args.broadcast_target.is_empty() {
        default_targets()
    } else {
        args.broadcast_target
            .iter()
            .map(|raw| raw.parse::<BroadcastTarget>())
            .collect::<Result<Vec<_>, _>>()
            .context("parse --broadcast-target")?
    };
    BroadcastConfig::new(targets, Duration::from_secs(args.broadcast_timeout_secs))
        .context("configure broadcast targets")
}

fn build_push_client() -> eyre::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("build push HTTP client")
}

fn parse_txid(raw: &str) -> eyre::Result<Txid> {
    raw.trim()
        .parse()
        .map_err(|e| eyre!("invalid txid `{raw}`: {e}"))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
