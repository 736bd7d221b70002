//! Credential vault: encryption of mail-server credentials at rest.
//!
//! Uses AES-256-GCM with a single process-wide key supplied through the
//! `REPLYLEDGER_VAULT_KEY` environment variable (32 bytes, base64). The
//! ciphertext format is `base64(nonce || ciphertext || tag)`.
//!
//! Decrypted credentials are handed out as [`SessionCredential`], which is
//! meant to live only for the duration of one mail session.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::account::MailAccountCredential;

/// Environment variable holding the base64 vault key.
pub const VAULT_KEY_ENV: &str = "REPLYLEDGER_VAULT_KEY";

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Key size for AES-256.
const KEY_SIZE: usize = 32;

/// Vault errors. None of them carry plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VaultError {
    /// No key configured.
    #[error("vault key is not configured (set {VAULT_KEY_ENV})")]
    MissingKey,

    /// Key present but not 32 bytes of base64.
    #[error("vault key is invalid: {0}")]
    InvalidKey(&'static str),

    /// Ciphertext is not valid base64 or is too short.
    #[error("sealed value is malformed")]
    Malformed,

    /// Ciphertext failed authentication (tampered or wrong key).
    #[error("sealed value failed authentication (tampered or sealed with another key)")]
    Authentication,

    /// Encryption failed.
    #[error("encryption failed")]
    Encryption,

    /// Decrypted payload is not a credential.
    #[error("sealed value does not contain a valid credential")]
    Payload,
}

/// A 256-bit vault key.
#[derive(Clone)]
pub struct VaultKey([u8; KEY_SIZE]);

impl VaultKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Decode a base64 key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the value is not base64 or not 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| VaultError::InvalidKey("not valid base64"))?;
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| VaultError::InvalidKey("expected 32 bytes"))?;
        Ok(Self(bytes))
    }

    /// Read the key from `REPLYLEDGER_VAULT_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` if the variable is unset or empty, `InvalidKey`
    /// if it cannot be decoded.
    pub fn from_env() -> Result<Self, VaultError> {
        match std::env::var(VAULT_KEY_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::from_base64(&value),
            _ => Err(VaultError::MissingKey),
        }
    }

    /// Generate a fresh random key, base64 encoded.
    #[must_use]
    pub fn generate() -> String {
        BASE64.encode(Aes256Gcm::generate_key(OsRng))
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(<redacted>)")
    }
}

/// An encrypted credential as stored in the admin database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedCredential(String);

impl SealedCredential {
    /// Wrap a stored ciphertext.
    #[must_use]
    pub const fn from_stored(ciphertext: String) -> Self {
        Self(ciphertext)
    }

    /// The ciphertext as stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A decrypted credential scoped to one mail session.
///
/// Not `Clone`; it is produced by [`CredentialVault::unseal`] and should be
/// dropped as soon as the session is authenticated.
pub struct SessionCredential(MailAccountCredential);

impl SessionCredential {
    /// IMAP server hostname.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.0.imap_host
    }

    /// IMAP server port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.0.imap_port
    }

    /// Connection security.
    #[must_use]
    pub const fn security(&self) -> crate::account::Security {
        self.0.security
    }

    /// Login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.0.username
    }

    /// The clear-text secret. Never log this.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0.secret
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("host", &self.0.imap_host)
            .field("username", &self.0.username)
            .finish_non_exhaustive()
    }
}

/// Symmetric encryption of credentials with the process-wide key.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    /// Create a vault from a key.
    #[must_use]
    pub fn new(key: &VaultKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(&key.0.into()),
        }
    }

    /// Create a vault from `REPLYLEDGER_VAULT_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing or malformed.
    pub fn from_env() -> Result<Self, VaultError> {
        VaultKey::from_env().map(|key| Self::new(&key))
    }

    /// Encrypt arbitrary bytes.
    ///
    /// # Errors
    ///
    /// Returns `Encryption` if the cipher fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| VaultError::Encryption)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        debug!(
            plaintext_len = plaintext.len(),
            ciphertext_len = ciphertext.len(),
            "Encrypted value"
        );
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for undecodable input and `Authentication` when the
    /// tag does not verify.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, VaultError> {
        let combined = BASE64
            .decode(encoded.trim())
            .map_err(|_| VaultError::Malformed)?;
        if combined.len() <= NONCE_SIZE {
            return Err(VaultError::Malformed);
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::Authentication)
    }

    /// Seal a credential for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn seal(&self, credential: &MailAccountCredential) -> Result<SealedCredential, VaultError> {
        let json = serde_json::to_vec(credential).map_err(|_| VaultError::Payload)?;
        self.encrypt(&json).map(SealedCredential)
    }

    /// Unseal a stored credential for one session.
    ///
    /// # Errors
    ///
    /// Returns an error if the ciphertext is malformed, fails authentication,
    /// or does not hold a credential.
    pub fn unseal(&self, sealed: &SealedCredential) -> Result<SessionCredential, VaultError> {
        let plaintext = self.decrypt(&sealed.0)?;
        let credential: MailAccountCredential =
            serde_json::from_slice(&plaintext).map_err(|_| VaultError::Payload)?;
        Ok(SessionCredential(credential))
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialVault")
    }
}
