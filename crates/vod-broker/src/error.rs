//! Broker error types.

use thiserror::Error;

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur against the job broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to configure broker client: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl BrokerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
