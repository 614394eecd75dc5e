//! Block-explorer HTTP client.
//!
//! Implements [`ChainSource`](super::ChainSource) over the blockchain.info
//! query/raw APIs, the blockchain.info charts API and the mempool.space
//! Esplora-style API using `reqwest`, with optional request rate limiting.

mod client;
mod connection;
mod parsing;

pub use client::{HttpSource, HttpSourceConfig};
pub(crate) use connection::parse_endpoint;
