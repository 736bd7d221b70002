//! Transport for mail connections.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use super::error::ConnectionError;

/// A stream that can be either plaintext or TLS.
pub enum MailStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl MailStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl std::fmt::Debug for MailStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("MailStream::Plain"),
            Self::Tls(_) => f.write_str("MailStream::Tls"),
        }
    }
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with the webpki root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Bound a future by `after`, mapping expiry to [`ConnectionError::Timeout`].
pub(crate) async fn with_timeout<F: Future>(
    operation: &'static str,
    after: Duration,
    future: F,
) -> Result<F::Output, ConnectionError> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| ConnectionError::Timeout { operation, after })
}

async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    with_timeout("connect", timeout, TcpStream::connect((host, port)))
        .await?
        .map_err(|source| ConnectionError::Connect {
            host: host.to_string(),
            source,
        })
}

/// Connects with TLS from the start.
///
/// # Errors
///
/// Returns an error if the TCP connect or the handshake fails or times out.
pub async fn connect_tls(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<MailStream, ConnectionError> {
    let tcp = connect_tcp(host, port, timeout).await?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| ConnectionError::InvalidDnsName(host.to_string()))?;
    let tls = with_timeout(
        "TLS handshake",
        timeout,
        create_tls_connector().connect(server_name, tcp),
    )
    .await?
    .map_err(ConnectionError::Tls)?;

    debug!(host, port, "TLS connection established");
    Ok(MailStream::Tls(Box::new(tls)))
}

/// Connects without TLS (local test servers only).
///
/// # Errors
///
/// Returns an error if the TCP connect fails or times out.
pub async fn connect_plain(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<MailStream, ConnectionError> {
    let tcp = connect_tcp(host, port, timeout).await?;
    debug!(host, port, "Plaintext connection established");
    Ok(MailStream::Plain(tcp))
}
