//! Sync run outcomes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::state::SyncState;
use crate::account::AuditorId;
use crate::mail::{ConnectionError, PartialFetchError};
use crate::store::StoreTransactionError;
use crate::vault::VaultError;

/// Fetch window of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    /// Lower bound.
    pub start: DateTime<Utc>,
    /// Upper bound, inclusive.
    pub end: DateTime<Utc>,
    /// Whether `start` itself is included (first run only).
    pub start_inclusive: bool,
}

impl SyncWindow {
    /// Whether `ts` falls inside the window.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let after_start = if self.start_inclusive {
            ts >= self.start
        } else {
            ts > self.start
        };
        after_start && ts <= self.end
    }
}

/// Summary of a committed run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Tenant.
    pub auditor: AuditorId,
    /// Window the run covered.
    pub window: SyncWindow,
    /// Messages read successfully.
    pub fetched: usize,
    /// Messages skipped because they could not be read.
    pub partial_failures: Vec<PartialFetchError>,
    /// Messages outside the window.
    pub out_of_window: usize,
    /// Messages whose counterpart is internal.
    pub excluded: usize,
    /// Messages matching no company.
    pub unmatched: usize,
    /// New messages stored.
    pub inserted: usize,
    /// Messages already stored.
    pub duplicates: usize,
}

impl SyncReport {
    pub(crate) const fn new(auditor: AuditorId, window: SyncWindow) -> Self {
        Self {
            auditor,
            window,
            fetched: 0,
            partial_failures: Vec::new(),
            out_of_window: 0,
            excluded: 0,
            unmatched: 0,
            inserted: 0,
            duplicates: 0,
        }
    }
}

/// Coarse failure category for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// Another run for the tenant is active.
    Busy,
    /// The tenant is not ready to sync.
    Precondition,
    /// Vault key or sealed credential problem.
    Credential,
    /// Mail server unreachable or refused login.
    Connection,
    /// Tenant store write or commit failed.
    Storage,
    /// Cancelled before committing.
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Busy => "busy",
            Self::Precondition => "precondition",
            Self::Credential => "credential",
            Self::Connection => "connection",
            Self::Storage => "storage",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Failure of a sync run. The checkpoint never moves on failure.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A run for this tenant is already active; the trigger is rejected.
    #[error("a sync for auditor {0} is already running")]
    AlreadyRunning(AuditorId),

    /// The tenant has no companies to attribute mail to.
    #[error("auditor {0} has no companies in the directory")]
    EmptyDirectory(AuditorId),

    /// Credential could not be unsealed.
    #[error("credential error while {state}: {source}")]
    Vault {
        /// State the run failed in.
        state: SyncState,
        /// Underlying error.
        source: VaultError,
    },

    /// Mail server failure.
    #[error("connection error while {state}: {source}")]
    Connection {
        /// State the run failed in.
        state: SyncState,
        /// Underlying error.
        source: ConnectionError,
    },

    /// Tenant store failure.
    #[error("storage error while {state}: {source}")]
    Store {
        /// State the run failed in.
        state: SyncState,
        /// Underlying error.
        source: StoreTransactionError,
    },

    /// Cancelled before the commit began.
    #[error("sync cancelled while {state}")]
    Cancelled {
        /// State the run was in.
        state: SyncState,
    },
}

impl SyncError {
    /// Category for display.
    #[must_use]
    pub const fn reason(&self) -> FailureReason {
        match self {
            Self::AlreadyRunning(_) => FailureReason::Busy,
            Self::EmptyDirectory(_) => FailureReason::Precondition,
            Self::Vault { .. } => FailureReason::Credential,
            Self::Connection { source, .. } if source.is_authentication() => {
                FailureReason::Credential
            }
            Self::Connection { .. } => FailureReason::Connection,
            Self::Store { .. } => FailureReason::Storage,
            Self::Cancelled { .. } => FailureReason::Cancelled,
        }
    }

    /// State the run was in when it failed.
    #[must_use]
    pub const fn state(&self) -> SyncState {
        match self {
            Self::AlreadyRunning(_) | Self::EmptyDirectory(_) => SyncState::Idle,
            Self::Vault { state, .. }
            | Self::Connection { state, .. }
            | Self::Store { state, .. }
            | Self::Cancelled { state } => *state,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_incremental_window_excludes_start() {
        let window = SyncWindow {
            start: at(8),
            end: at(12),
            start_inclusive: false,
        };
        assert!(!window.contains(at(8)));
        assert!(window.contains(at(9)));
        assert!(window.contains(at(12)));
        assert!(!window.contains(at(13)));
    }

    #[test]
    fn test_first_window_includes_start() {
        let window = SyncWindow {
            start: at(8),
            end: at(12),
            start_inclusive: true,
        };
        assert!(window.contains(at(8)));
    }

    #[test]
    fn test_reason_classification() {
        let auth = SyncError::Connection {
            state: SyncState::Connecting,
            source: ConnectionError::Authentication("NO".to_string()),
        };
        assert_eq!(auth.reason(), FailureReason::Credential);
        assert_eq!(auth.state(), SyncState::Connecting);

        let vault = SyncError::Vault {
            state: SyncState::Connecting,
            source: VaultError::Authentication,
        };
        assert_eq!(vault.reason(), FailureReason::Credential);
        assert_eq!(
            SyncError::Cancelled { state: SyncState::Fetching }.reason(),
            FailureReason::Cancelled
        );
    }
}
