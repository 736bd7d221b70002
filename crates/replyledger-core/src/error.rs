//! Error types for the core library.

use thiserror::Error;

use crate::account::AuditorId;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Credential sealing or unsealing failed.
    #[error("Vault error: {0}")]
    Vault(#[from] crate::vault::VaultError),

    /// Tenant store operation failed.
    #[error("Storage error: {0}")]
    Store(#[from] crate::store::StoreTransactionError),

    /// A sync run failed.
    #[error("Sync failed: {0}")]
    Sync(#[from] crate::sync::SyncError),

    /// A directory upload was rejected as a whole.
    #[error("Directory error: {0}")]
    Directory(#[from] crate::directory::DirectoryError),

    /// Admin settings were invalid.
    #[error("Settings error: {0}")]
    Settings(#[from] crate::settings::SettingsError),

    /// Admin database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Auditor not found.
    #[error("Auditor not found: {0}")]
    AuditorNotFound(AuditorId),

    /// Credential failed validation.
    #[error("Invalid credential: {0:?}")]
    InvalidCredential(Vec<crate::account::CredentialValidationError>),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
