//! Attribution of fetched messages to companies.

use std::collections::HashMap;

use crate::directory::Company;
use crate::mail::FetchedMessage;
use crate::settings::Settings;
use crate::store::Direction;

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Attributed to a company.
    Matched {
        /// Company reference code.
        company_ref: String,
        /// Address that matched.
        counterpart: String,
    },
    /// Counterpart is in an internal domain.
    Excluded,
    /// No company matches the counterpart.
    Unmatched,
}

/// Matches counterpart addresses against a company directory.
///
/// When several companies share an address the lowest reference code wins.
#[derive(Debug)]
pub struct Classifier<'a> {
    by_address: HashMap<String, &'a str>,
    settings: &'a Settings,
}

impl<'a> Classifier<'a> {
    /// Index `companies` by primary and alternate address.
    #[must_use]
    pub fn new(companies: &'a [Company], settings: &'a Settings) -> Self {
        let mut by_address: HashMap<String, &'a str> = HashMap::new();
        for company in companies {
            let addresses = std::iter::once(&company.email).chain(company.alt_email.as_ref());
            for address in addresses {
                by_address
                    .entry(address.to_lowercase())
                    .and_modify(|existing| {
                        if company.reference.as_str() < *existing {
                            *existing = company.reference.as_str();
                        }
                    })
                    .or_insert(company.reference.as_str());
            }
        }
        Self {
            by_address,
            settings,
        }
    }

    /// Classify a message fetched from a folder of the given direction.
    ///
    /// Inbound messages are attributed by sender; outbound messages by any
    /// `To`/`Cc` recipient outside the internal domains.
    #[must_use]
    pub fn classify(&self, message: &FetchedMessage, direction: Direction) -> Classification {
        let candidates: Vec<&str> = match direction {
            Direction::Inbound => message.from.as_deref().into_iter().collect(),
            Direction::Outbound => message.recipients.iter().map(String::as_str).collect(),
        };
        if candidates.is_empty() {
            return Classification::Unmatched;
        }

        let external: Vec<&str> = candidates
            .into_iter()
            .filter(|address| !self.settings.is_internal(address))
            .collect();
        if external.is_empty() {
            return Classification::Excluded;
        }

        external
            .into_iter()
            .filter_map(|address| {
                self.by_address
                    .get(&address.to_lowercase())
                    .map(|reference| (*reference, address))
            })
            .min_by_key(|(reference, _)| *reference)
            .map_or(Classification::Unmatched, |(reference, address)| {
                Classification::Matched {
                    company_ref: reference.to_string(),
                    counterpart: address.to_string(),
                }
            })
    }
}
