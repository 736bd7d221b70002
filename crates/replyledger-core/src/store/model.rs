//! Tenant store data models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a stored message relative to the auditor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by the auditor to a company.
    Outbound,
    /// Received by the auditor from a company.
    Inbound,
}

impl Direction {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "outbound" => Some(Self::Outbound),
            "inbound" => Some(Self::Inbound),
            _ => None,
        }
    }
}

/// A message attributed to a company. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message identifier, unique within the tenant.
    pub message_id: String,
    /// Outbound or inbound.
    pub direction: Direction,
    /// Reference code of the attributed company.
    pub company_ref: String,
    /// Message timestamp.
    pub timestamp: DateTime<Utc>,
    /// Folder the message was fetched from.
    pub folder: String,
    /// Sender address.
    pub from_addr: String,
    /// Recipient addresses.
    pub to_addrs: Vec<String>,
    /// Subject line.
    pub subject: String,
}

/// Criteria for listing messages. Empty matches everything.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    /// Only this company.
    pub company: Option<String>,
    /// Only this direction.
    pub direction: Option<Direction>,
    /// Timestamp at or after.
    pub since: Option<DateTime<Utc>>,
    /// Timestamp at or before.
    pub until: Option<DateTime<Utc>>,
    /// Maximum rows.
    pub limit: Option<u32>,
}

impl MessageFilter {
    /// Messages for one company.
    #[must_use]
    pub fn company(reference: impl Into<String>) -> Self {
        Self {
            company: Some(reference.into()),
            ..Self::default()
        }
    }

    /// Restrict to a direction.
    #[must_use]
    pub const fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New row written.
    Inserted,
    /// Identifier already stored; nothing changed.
    Duplicate,
}

/// Server-side position in one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderCursor {
    /// UIDVALIDITY of the folder when the cursor was taken.
    pub uid_validity: u32,
    /// Highest UID committed.
    pub last_uid: u32,
}

/// End of the last committed sync window plus per-folder cursors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// `None` until the first successful sync.
    pub last_sync: Option<DateTime<Utc>>,
    /// Cursor per folder name.
    pub cursors: BTreeMap<String, FolderCursor>,
}

/// Outcome of the last sync run, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Committed.
    Success,
    /// Failed; the checkpoint did not move.
    Failed(String),
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

impl SyncStatus {
    pub(crate) fn parse(value: &str) -> Self {
        match value.strip_prefix("failed: ") {
            Some(reason) => Self::Failed(reason.to_string()),
            None if value == "success" => Self::Success,
            None => Self::Failed(value.to_string()),
        }
    }
}

/// Last recorded sync status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncLogEntry {
    /// Status.
    pub status: SyncStatus,
    /// When it was recorded.
    pub recorded_at: DateTime<Utc>,
}
