use bitcoin::Txid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("data source failure: {0}")]
    Source(#[from] SourceError),

    #[error("transaction not found: {0}")]
    TxNotFound(Txid),

    #[error("invalid upstream data: {0}")]
    InvalidData(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("transaction already confirmed: {0}")]
    AlreadyConfirmed(Txid),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failures talking to an upstream ledger or price service.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}
