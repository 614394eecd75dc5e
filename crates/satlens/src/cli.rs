use clap::{Args, Parser, Subcommand, ValueEnum};

use satlens_core::classify::TxFilter;

/// satlens: single-address Bitcoin receipts, fiat valuation and rebroadcast.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the JSON API used by the receipt front-end.
    Serve(ServeArgs),
    /// Print the classified history of an address, or one enriched receipt.
    View(ViewArgs),
    /// Re-announce an unconfirmed transaction to every push endpoint.
    Rebroadcast(RebroadcastArgs),
}

// ==============================================================================
// Shared Argument Groups
// ==============================================================================

#[derive(Args)]
pub struct SourceArgs {
    /// Base URL of the blockchain.info-compatible explorer.
    #[arg(
        long,
        default_value = "https://blockchain.info",
        env = "SATLENS_BLOCKCHAIN_INFO_URL"
    )]
    pub blockchain_info_url: String,

    /// Base URL of the price chart API.
    #[arg(
        long,
        default_value = "https://api.blockchain.info",
        env = "SATLENS_CHARTS_URL"
    )]
    pub charts_url: String,

    /// Base URL of the Esplora-style mempool API.
    #[arg(
        long,
        default_value = "https://mempool.space/api",
        env = "SATLENS_MEMPOOL_URL"
    )]
    pub mempool_url: String,

    /// Per-request timeout for explorer and price lookups.
    #[arg(long, default_value = "15", env = "SATLENS_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: u64,

    /// Cap on outbound explorer requests per second (unlimited if omitted).
    #[arg(long, env = "SATLENS_REQUESTS_PER_SECOND")]
    pub requests_per_second: Option<u32>,

    /// Confirmations after which a transaction is shown as completed.
    #[arg(long, default_value = "4", env = "SATLENS_TARGET_CONFIRMATIONS")]
    pub target_confirmations: u32,
}

#[derive(Args)]
pub struct BroadcastArgs {
    /// Per-endpoint timeout for rebroadcast requests.
    #[arg(long, default_value = "20", env = "SATLENS_BROADCAST_TIMEOUT_SECS")]
    pub broadcast_timeout_secs: u64,

    /// Push endpoint as `name|raw|url` or `name|form=<field>|url`
    /// (repeat the flag for several; replaces the built-in list).
    #[arg(long, env = "SATLENS_BROADCAST_TARGET")]
    pub broadcast_target: Vec<String>,
}

// ==============================================================================
// Subcommands
// ==============================================================================

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind the web server to.
    #[arg(long, default_value = "127.0.0.1", env = "SATLENS_BIND")]
    pub bind: String,

    /// Port to listen on.
    #[arg(long, default_value = "3090", env = "SATLENS_PORT")]
    pub port: u16,

    /// Minimum spacing between address history fetches; earlier
    /// attempts are dropped.
    #[arg(long, default_value = "2000", env = "SATLENS_MIN_FETCH_INTERVAL_MS")]
    pub min_fetch_interval_ms: u64,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub broadcast: BroadcastArgs,
}

#[derive(Args)]
pub struct ViewArgs {
    /// Watched address.
    pub address: String,

    /// Show the enriched receipt for this transaction instead of the list.
    #[arg(long)]
    pub txid: Option<String>,

    #[arg(long, value_enum, default_value_t = FilterArg::All)]
    pub filter: FilterArg,

    /// Number of recent transactions to fetch.
    #[arg(long, default_value = "50")]
    pub limit: usize,

    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Args)]
pub struct RebroadcastArgs {
    /// Transaction to re-announce.
    pub txid: String,

    /// Fee rate to record, in sat/vB (defaults to 1.5x the current rate).
    #[arg(long)]
    pub fee_rate: Option<u64>,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub broadcast: BroadcastArgs,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FilterArg {
    All,
    Incoming,
    Outgoing,
}

impl From<FilterArg> for TxFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => TxFilter::All,
            FilterArg::Incoming => TxFilter::Incoming,
            FilterArg::Outgoing => TxFilter::Outgoing,
        }
    }
}
