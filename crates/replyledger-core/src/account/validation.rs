//! Credential and address validation.

use super::model::MailAccountCredential;

/// Validation error for a mail-account credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialValidationError {
    /// IMAP host is empty.
    EmptyImapHost,
    /// IMAP port is invalid.
    InvalidImapPort,
    /// Username is empty.
    EmptyUsername,
    /// Secret is empty.
    EmptySecret,
    /// SMTP port given without a host, or zero.
    InvalidSmtpPort,
}

impl CredentialValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyImapHost => "IMAP server is required",
            Self::InvalidImapPort => "IMAP port must be 1-65535",
            Self::EmptyUsername => "Username is required",
            Self::EmptySecret => "Password is required",
            Self::InvalidSmtpPort => "SMTP port must be 1-65535 and needs an SMTP host",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyImapHost => "imap_host",
            Self::InvalidImapPort => "imap_port",
            Self::EmptyUsername => "username",
            Self::EmptySecret => "secret",
            Self::InvalidSmtpPort => "smtp_port",
        }
    }
}

impl std::fmt::Display for CredentialValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for CredentialValidationError {}

/// Validate a credential before it is sealed.
///
/// # Errors
///
/// Returns every problem found, not just the first.
pub fn validate_credential(
    credential: &MailAccountCredential,
) -> Result<(), Vec<CredentialValidationError>> {
    let mut errors = Vec::new();

    if credential.imap_host.trim().is_empty() {
        errors.push(CredentialValidationError::EmptyImapHost);
    }
    if credential.imap_port == 0 {
        errors.push(CredentialValidationError::InvalidImapPort);
    }
    if credential.username.trim().is_empty() {
        errors.push(CredentialValidationError::EmptyUsername);
    }
    if credential.secret.is_empty() {
        errors.push(CredentialValidationError::EmptySecret);
    }
    if let Some(port) = credential.smtp_port
        && (port == 0 || credential.smtp_host.is_none())
    {
        errors.push(CredentialValidationError::InvalidSmtpPort);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Basic email address validation.
pub(crate) fn is_valid_email(email: &str) -> bool {
    let email = email.trim();

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') || local.contains(char::is_whitespace) {
        return false;
    }

    if domain.is_empty() || !domain.contains('.') {
        return false;
    }

    !domain.split('.').any(str::is_empty)
}

/// Returns the lowercase domain part of an address, if any.
pub(crate) fn domain_of(address: &str) -> Option<String> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().to_lowercase())
        .filter(|domain| !domain.is_empty())
}
