//! Auditor and credential model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vault::SealedCredential;

/// Unique identifier for an auditor (and therefore for a tenant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuditorId(pub i64);

impl AuditorId {
    /// Create a new auditor ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AuditorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Security/encryption mode for mail-server connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// No encryption (local test servers only).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }

    /// Get default IMAP port for the security mode.
    #[must_use]
    pub const fn default_imap_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Tls => 993,
        }
    }
}

/// Mail-server credential for one auditor.
///
/// The secret only exists in this form transiently: when an administrator
/// enters it (before sealing) and inside a sync session (after unsealing).
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MailAccountCredential {
    /// IMAP server hostname.
    pub imap_host: String,
    /// IMAP server port.
    pub imap_port: u16,
    /// Connection security.
    #[serde(default)]
    pub security: Security,
    /// Login name, usually the mailbox address.
    pub username: String,
    /// Password or app password.
    pub secret: String,
    /// Outbound SMTP host, kept alongside for outbound tooling.
    #[serde(default)]
    pub smtp_host: Option<String>,
    /// Outbound SMTP port.
    #[serde(default)]
    pub smtp_port: Option<u16>,
}

impl MailAccountCredential {
    /// Create an implicit-TLS credential on the default port.
    #[must_use]
    pub fn new(
        imap_host: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            imap_host: imap_host.into(),
            imap_port: Security::Tls.default_imap_port(),
            security: Security::Tls,
            username: username.into(),
            secret: secret.into(),
            smtp_host: None,
            smtp_port: None,
        }
    }
}

impl std::fmt::Debug for MailAccountCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailAccountCredential")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .finish()
    }
}

/// A registered auditor.
#[derive(Debug, Clone)]
pub struct Auditor {
    /// Unique identifier.
    pub id: AuditorId,
    /// Login name.
    pub username: String,
    /// Display name.
    pub full_name: Option<String>,
    /// Contact address.
    pub email: Option<String>,
    /// Encrypted mail-server credential.
    pub credential: SealedCredential,
    /// When the auditor was created.
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new auditor.
#[derive(Debug, Clone)]
pub struct NewAuditor {
    /// Login name (unique).
    pub username: String,
    /// Display name.
    pub full_name: Option<String>,
    /// Contact address.
    pub email: Option<String>,
    /// Plaintext credential; sealed before it is stored.
    pub credential: MailAccountCredential,
}
