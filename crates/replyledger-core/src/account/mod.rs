//! Auditor registry.
//!
//! Provides auditor records, mail-account credentials, admin storage and
//! validation.

mod model;
mod repository;
mod validation;

pub use model::{Auditor, AuditorId, MailAccountCredential, NewAuditor, Security};
pub use repository::AdminRepository;
pub use validation::{CredentialValidationError, validate_credential};

pub(crate) use validation::{domain_of, is_valid_email};
