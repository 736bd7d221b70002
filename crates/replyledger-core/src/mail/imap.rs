//! IMAP implementation of the mail seam.

use std::time::Duration;

use async_imap::Session;
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::config::ConnectionConfig;
use super::error::{ConnectionError, PartialFetchError};
use super::message::parse_fetched;
use super::source::{FolderFetch, FolderRequest, MailConnector, MailSession};
use super::stream::{MailStream, connect_plain, connect_tls, with_timeout};
use crate::account::Security;
use crate::config::AppConfig;
use crate::vault::SessionCredential;

/// Headers only; `PEEK` leaves `\Seen` untouched.
const FETCH_QUERY: &str = "(UID INTERNALDATE BODY.PEEK[HEADER])";

const DEFAULT_BATCH_SIZE: usize = 100;

/// Opens IMAP sessions with bounded timeouts.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    connect_timeout: Duration,
    io_timeout: Duration,
    batch_size: usize,
}

impl Default for ImapConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(60))
    }
}

impl ImapConnector {
    /// Create a connector with explicit timeouts.
    #[must_use]
    pub const fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            io_timeout,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Create a connector from application configuration.
    #[must_use]
    pub const fn from_config(config: &AppConfig) -> Self {
        Self::new(config.connect_timeout(), config.io_timeout())
    }

    /// UIDs per FETCH command.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = if batch_size == 0 { 1 } else { batch_size };
        self
    }

    fn connection_config(&self, credential: &SessionCredential) -> ConnectionConfig {
        ConnectionConfig::builder(credential.host())
            .port(credential.port())
            .security(credential.security())
            .connect_timeout(self.connect_timeout)
            .io_timeout(self.io_timeout)
            .build()
    }
}

impl MailConnector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self, credential: &SessionCredential) -> Result<ImapSession, ConnectionError> {
        let config = self.connection_config(credential);
        debug!(host = %config.host, port = config.port, security = ?config.security, "Connecting");

        let stream = match config.security {
            Security::Tls => connect_tls(&config.host, config.port, config.connect_timeout).await?,
            Security::None => {
                warn!(host = %config.host, "Using an unencrypted mail connection");
                connect_plain(&config.host, config.port, config.connect_timeout).await?
            }
            Security::StartTls => {
                return Err(ConnectionError::UnsupportedSecurity(Security::StartTls));
            }
        };

        let client = async_imap::Client::new(stream);
        let session = with_timeout(
            "login",
            config.io_timeout,
            client.login(credential.username(), credential.secret()),
        )
        .await?
        .map_err(|(e, _client)| ConnectionError::Authentication(e.to_string()))?;

        info!(host = %config.host, "Logged in");
        Ok(ImapSession {
            session,
            io_timeout: config.io_timeout,
            batch_size: self.batch_size,
        })
    }
}

/// An authenticated IMAP session.
pub struct ImapSession {
    session: Session<MailStream>,
    io_timeout: Duration,
    batch_size: usize,
}

impl std::fmt::Debug for ImapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSession")
            .field("io_timeout", &self.io_timeout)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn protocol_error(e: async_imap::error::Error) -> ConnectionError {
    ConnectionError::Protocol(e.to_string())
}

impl MailSession for ImapSession {
    async fn fetch_folder(&mut self, request: &FolderRequest) -> Result<FolderFetch, ConnectionError> {
        let folder = request.folder.as_str();
        let mailbox = with_timeout("EXAMINE", self.io_timeout, self.session.examine(folder))
            .await?
            .map_err(protocol_error)?;
        let uid_validity = mailbox.uid_validity.unwrap_or(0);

        let cursor = request
            .cursor
            .filter(|cursor| uid_validity != 0 && cursor.uid_validity == uid_validity);
        if request.cursor.is_some() && cursor.is_none() {
            warn!(folder, uid_validity, "UIDVALIDITY changed, falling back to date search");
        }

        let query = match cursor {
            Some(cursor) => format!("UID {}:*", cursor.last_uid.saturating_add(1)),
            None => format!("SINCE {}", request.since.format("%d-%b-%Y")),
        };
        let found = with_timeout("SEARCH", self.io_timeout, self.session.uid_search(&query))
            .await?
            .map_err(protocol_error)?;

        // `n:*` always matches the highest UID, even below n.
        let mut uids: Vec<u32> = found
            .into_iter()
            .filter(|uid| cursor.is_none_or(|cursor| *uid > cursor.last_uid))
            .collect();
        uids.sort_unstable();
        debug!(folder, %query, count = uids.len(), "Searched folder");

        let mut messages = Vec::with_capacity(uids.len());
        for chunk in uids.chunks(self.batch_size) {
            let uid_list = chunk
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");

            let session = &mut self.session;
            let responses = with_timeout("FETCH", self.io_timeout, async move {
                let stream = session.uid_fetch(&uid_list, FETCH_QUERY).await?;
                Ok::<_, async_imap::error::Error>(stream.collect::<Vec<_>>().await)
            })
            .await?
            .map_err(protocol_error)?;

            for response in responses {
                let entry = match response {
                    Ok(fetch) => match (fetch.uid, fetch.header()) {
                        (Some(uid), Some(header)) => parse_fetched(
                            folder,
                            uid_validity,
                            uid,
                            header,
                            fetch.internal_date().map(|date| date.with_timezone(&Utc)),
                        ),
                        (Some(uid), None) => {
                            Err(PartialFetchError::new(folder, uid, "server returned no headers"))
                        }
                        (None, _) => Err(PartialFetchError::new(folder, 0, "server omitted UID")),
                    },
                    Err(e) => Err(PartialFetchError::new(
                        folder,
                        0,
                        format!("unreadable response: {e}"),
                    )),
                };
                messages.push(entry);
            }
        }

        Ok(FolderFetch {
            folder: folder.to_string(),
            uid_validity,
            used_cursor: cursor.is_some(),
            messages,
        })
    }

    async fn logout(mut self) {
        match with_timeout("LOGOUT", self.io_timeout, self.session.logout()).await {
            Ok(Ok(())) => debug!("Logged out"),
            Ok(Err(e)) => debug!(error = %e, "Logout failed"),
            Err(e) => debug!(error = %e, "Logout timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_never_zero() {
        let connector = ImapConnector::default().batch_size(0);
        assert_eq!(connector.batch_size, 1);
    }

    #[test]
    fn test_from_config_uses_timeouts() {
        let config = AppConfig {
            connect_timeout_secs: 7,
            io_timeout_secs: 9,
            ..AppConfig::default()
        };
        let connector = ImapConnector::from_config(&config);
        assert_eq!(connector.connect_timeout, Duration::from_secs(7));
        assert_eq!(connector.io_timeout, Duration::from_secs(9));
    }
}
