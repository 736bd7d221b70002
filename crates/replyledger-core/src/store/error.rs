//! Tenant store errors.

use thiserror::Error;

/// A tenant store read, write or commit failed.
#[derive(Debug, Error)]
pub enum StoreTransactionError {
    /// Database operation failed.
    #[error("tenant database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store file could not be created or removed.
    #[error("tenant store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be decoded.
    #[error("corrupt value in column {column}: {value:?}")]
    Corrupt {
        /// Column name.
        column: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Result type for tenant store operations.
pub type StoreResult<T> = std::result::Result<T, StoreTransactionError>;
