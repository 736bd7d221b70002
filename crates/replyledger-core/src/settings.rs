//! Admin-managed follow-up settings.
//!
//! A sync run or report takes one [`Settings`] snapshot and uses it
//! unchanged for its whole duration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::domain_of;

/// Default follow-up threshold in working days.
pub const DEFAULT_FOLLOWUP_DAYS: u32 = 3;

/// Errors in settings values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Threshold must be at least one working day.
    #[error("follow-up threshold must be a positive number of working days")]
    InvalidThreshold,

    /// A domain entry was empty or contained spaces.
    #[error("invalid internal domain: {0:?}")]
    InvalidDomain(String),
}

/// Follow-up settings shared by all tenants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    followup_threshold: u32,
    internal_domains: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            followup_threshold: DEFAULT_FOLLOWUP_DAYS,
            internal_domains: Vec::new(),
        }
    }
}

impl Settings {
    /// Build validated settings.
    ///
    /// Domains are lowercased, a leading `@` is stripped and duplicates are
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero threshold or a malformed domain.
    pub fn new<I, S>(followup_threshold: u32, internal_domains: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if followup_threshold == 0 {
            return Err(SettingsError::InvalidThreshold);
        }

        let mut domains = Vec::new();
        for raw in internal_domains {
            let domain = normalize_domain(raw.as_ref())?;
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }

        Ok(Self {
            followup_threshold,
            internal_domains: domains,
        })
    }

    /// Working days after which an unanswered company is overdue.
    #[must_use]
    pub const fn followup_threshold(&self) -> u32 {
        self.followup_threshold
    }

    /// Normalized internal domains.
    #[must_use]
    pub fn internal_domains(&self) -> &[String] {
        &self.internal_domains
    }

    /// Whether an address belongs to an internal domain.
    ///
    /// Matches the exact domain after `@` or any subdomain of it.
    #[must_use]
    pub fn is_internal(&self, address: &str) -> bool {
        let Some(domain) = domain_of(address) else {
            return false;
        };
        self.internal_domains.iter().any(|internal| {
            domain == *internal
                || domain
                    .strip_suffix(internal.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

fn normalize_domain(raw: &str) -> Result<String, SettingsError> {
    let domain = raw.trim().trim_start_matches('@').to_lowercase();
    if domain.is_empty() || domain.contains(char::is_whitespace) || domain.contains('@') {
        return Err(SettingsError::InvalidDomain(raw.to_string()));
    }
    Ok(domain)
}
