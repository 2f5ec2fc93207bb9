//! Shared error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("pool error: {0}")]
    Pool(String),
    #[error("illegal status transition from {from:?} to {to:?}")]
    IllegalTransition {
        from: crate::models::RequestStatus,
        to: crate::models::RequestStatus,
    },
    #[error("migration error: {0}")]
    Migration(String),
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect to the bus after retrying: {0}")]
    ConnectFailed(String),
    #[error("failed to publish message: {0}")]
    Publish(String),
    #[error("failed to consume message: {0}")]
    Consume(String),
    #[error("failed to commit offset: {0}")]
    Commit(String),
    #[error("message payload was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FoldingError {
    #[error("tokenizer initialization failed: {0}")]
    Tokenizer(String),
    #[error("no items to fold")]
    Empty,
    #[error("reduced context is {tokens} tokens, which exceeds the {ctx_max} token ceiling")]
    ReduceOverflow { tokens: usize, ctx_max: usize },
}
