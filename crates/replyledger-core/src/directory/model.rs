//! Company model.

use serde::{Deserialize, Serialize};

/// A tracked client company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Reference code, unique within a tenant.
    pub reference: String,
    /// Display name.
    pub name: String,
    /// Primary email, stored lowercase.
    pub email: String,
    /// Alternate email, stored lowercase.
    pub alt_email: Option<String>,
}

impl Company {
    /// Create a company with no alternate email.
    #[must_use]
    pub fn new(
        reference: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            name: name.into(),
            email: email.into().trim().to_lowercase(),
            alt_email: None,
        }
    }

    /// Set the alternate email.
    #[must_use]
    pub fn with_alt_email(mut self, alt_email: impl Into<String>) -> Self {
        self.alt_email = Some(alt_email.into().trim().to_lowercase());
        self
    }

    /// Case-insensitive match against the primary or alternate address.
    #[must_use]
    pub fn matches_address(&self, address: &str) -> bool {
        let address = address.trim();
        self.email.eq_ignore_ascii_case(address)
            || self
                .alt_email
                .as_deref()
                .is_some_and(|alt| alt.eq_ignore_ascii_case(address))
    }
}
