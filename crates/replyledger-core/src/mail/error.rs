//! Mail access errors.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::account::Security;

/// Failure to reach or talk to the mail server. Fatal to a sync run.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP connection failed.
    #[error("could not connect to {host}: {source}")]
    Connect {
        /// Server host.
        host: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// An operation exceeded its time budget.
    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        /// What was being waited on.
        operation: &'static str,
        /// Configured limit.
        after: Duration,
    },

    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Tls(std::io::Error),

    /// Hostname is not a valid TLS server name.
    #[error("invalid server name: {0}")]
    InvalidDnsName(String),

    /// Server rejected the login.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Server replied with an error or something unparsable.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Security mode not supported by this connector.
    #[error("{} connections are not supported", .0.display_name())]
    UnsupportedSecurity(Security),
}

impl ConnectionError {
    /// Whether the server refused the credential.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// One message could not be read. Logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("message {uid} in {folder}: {reason}")]
pub struct PartialFetchError {
    /// Folder the message lives in.
    pub folder: String,
    /// Server UID, zero when the server omitted it.
    pub uid: u32,
    /// What went wrong.
    pub reason: String,
}

impl PartialFetchError {
    pub(crate) fn new(folder: &str, uid: u32, reason: impl Into<String>) -> Self {
        Self {
            folder: folder.to_string(),
            uid,
            reason: reason.into(),
        }
    }
}
