//! Driver error types.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors surfaced by a driver implementation. A failed write transaction
/// is rolled back and its session closed before the error reaches the
/// caller; nothing in this layer retries.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Statement rejected: {0}")]
    Statement(String),
}

impl DriverError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }
}
