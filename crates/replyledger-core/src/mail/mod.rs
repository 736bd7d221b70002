//! Mail access.
//!
//! A [`MailConnector`] opens authenticated [`MailSession`]s; the sync engine
//! only talks to these traits. [`ImapConnector`] is the production
//! implementation over TLS.

mod config;
mod error;
mod imap;
mod message;
mod source;
mod stream;

pub use config::{ConnectionConfig, ConnectionConfigBuilder};
pub use error::{ConnectionError, PartialFetchError};
pub use imap::{ImapConnector, ImapSession};
pub use message::{FetchedMessage, parse_fetched};
pub use source::{FolderFetch, FolderRequest, MailConnector, MailSession};
pub use stream::{MailStream, connect_plain, connect_tls, create_tls_connector};
