//! Per-run state machine.

use serde::Serialize;
use tracing::info;

use crate::account::AuditorId;

/// Stage of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    /// Not started.
    Idle,
    /// Opening an authenticated session.
    Connecting,
    /// Determining the fetch window.
    Listing,
    /// Retrieving message headers.
    Fetching,
    /// Attributing messages to companies.
    Classifying,
    /// Writing messages and the checkpoint.
    Committing,
    /// Committed.
    Done,
    /// Ended without committing.
    Failed,
}

impl SyncState {
    /// Short name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Listing => "listing",
            Self::Fetching => "fetching",
            Self::Classifying => "classifying",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether the run has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether a run in this state may still be cancelled.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        !matches!(self, Self::Committing | Self::Done | Self::Failed)
    }

    /// Whether `next` is a legal successor.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting)
                | (Self::Connecting, Self::Listing)
                | (Self::Listing, Self::Fetching)
                | (Self::Fetching, Self::Classifying)
                | (Self::Classifying, Self::Committing)
                | (Self::Committing, Self::Done)
        ) || (matches!(next, Self::Failed) && !self.is_terminal())
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and logs the state of one run.
#[derive(Debug)]
pub(crate) struct RunState {
    auditor: AuditorId,
    current: SyncState,
}

impl RunState {
    pub(crate) const fn new(auditor: AuditorId) -> Self {
        Self {
            auditor,
            current: SyncState::Idle,
        }
    }

    pub(crate) const fn current(&self) -> SyncState {
        self.current
    }

    pub(crate) fn advance(&mut self, next: SyncState) {
        debug_assert!(
            self.current.can_advance_to(next),
            "illegal sync transition {} -> {next}",
            self.current
        );
        info!(auditor = %self.auditor, from = %self.current, to = %next, "Sync state");
        self.current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            SyncState::Idle,
            SyncState::Connecting,
            SyncState::Listing,
            SyncState::Fetching,
            SyncState::Classifying,
            SyncState::Committing,
            SyncState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        assert!(SyncState::Fetching.can_advance_to(SyncState::Failed));
        assert!(SyncState::Committing.can_advance_to(SyncState::Failed));
        assert!(!SyncState::Done.can_advance_to(SyncState::Failed));
        assert!(!SyncState::Listing.can_advance_to(SyncState::Committing));
    }

    #[test]
    fn test_cancellable_until_commit() {
        assert!(SyncState::Classifying.is_cancellable());
        assert!(!SyncState::Committing.is_cancellable());
    }
}
