//! Mailbox access seam used by the sync engine.

use std::future::Future;

use chrono::{DateTime, Utc};

use super::error::{ConnectionError, PartialFetchError};
use super::message::FetchedMessage;
use crate::store::FolderCursor;
use crate::vault::SessionCredential;

/// What to fetch from one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRequest {
    /// Folder name.
    pub folder: String,
    /// Lower bound for a date search when no cursor applies.
    pub since: DateTime<Utc>,
    /// Cursor from the last committed run.
    pub cursor: Option<FolderCursor>,
}

/// Result of fetching one folder.
#[derive(Debug, Clone)]
pub struct FolderFetch {
    /// Folder name.
    pub folder: String,
    /// UIDVALIDITY reported when the folder was selected.
    pub uid_validity: u32,
    /// Whether the request's cursor was honoured.
    pub used_cursor: bool,
    /// Fetched messages and per-message failures, in UID order.
    pub messages: Vec<Result<FetchedMessage, PartialFetchError>>,
}

impl FolderFetch {
    /// Lowest UID of a date-searched message stamped after `end`.
    ///
    /// Such a message is outside this run's window but must be seen again,
    /// so the cursor may not pass it. Cursor fetches keep every message
    /// and never hold anything back.
    #[must_use]
    pub fn first_dated_after(&self, end: DateTime<Utc>) -> Option<u32> {
        if self.used_cursor {
            return None;
        }
        self.messages
            .iter()
            .filter_map(|entry| entry.as_ref().ok())
            .filter(|message| message.timestamp > end)
            .map(|message| message.uid)
            .min()
    }

    /// Cursor to store after this fetch commits.
    ///
    /// Keeps the previous position when nothing newer was seen. With
    /// `hold_from` set the cursor stops just below that UID.
    #[must_use]
    pub fn next_cursor(
        &self,
        previous: Option<FolderCursor>,
        hold_from: Option<u32>,
    ) -> FolderCursor {
        let seen = self
            .messages
            .iter()
            .map(|entry| match entry {
                Ok(message) => message.uid,
                Err(failure) => failure.uid,
            })
            .max()
            .unwrap_or(0);
        let seen = hold_from.map_or(seen, |uid| seen.min(uid.saturating_sub(1)));
        let floor = previous
            .filter(|cursor| cursor.uid_validity == self.uid_validity)
            .map_or(0, |cursor| cursor.last_uid);
        FolderCursor {
            uid_validity: self.uid_validity,
            last_uid: seen.max(floor),
        }
    }
}

/// Opens authenticated mail sessions.
pub trait MailConnector: Send + Sync {
    /// Session type produced by this connector.
    type Session: MailSession;

    /// Connect and log in.
    ///
    /// The credential is only borrowed for the duration of this call.
    fn connect(
        &self,
        credential: &SessionCredential,
    ) -> impl Future<Output = Result<Self::Session, ConnectionError>> + Send;
}

/// An authenticated mailbox session.
pub trait MailSession: Send {
    /// Fetch message headers from one folder.
    ///
    /// Per-message problems are returned inside [`FolderFetch::messages`];
    /// only session-level failures are errors.
    fn fetch_folder(
        &mut self,
        request: &FolderRequest,
    ) -> impl Future<Output = Result<FolderFetch, ConnectionError>> + Send;

    /// End the session. Failures are ignored.
    fn logout(self) -> impl Future<Output = ()> + Send;
}
