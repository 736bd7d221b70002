//! Company directory.
//!
//! Validation of uploaded company lists before they reach a tenant store.

mod import;
mod model;

pub use import::{
    DirectoryError, DirectoryRecord, DirectoryValidationError, ImportReport, ParsedDirectory,
    RejectReason, parse_directory, records_from_json,
};
pub use model::Company;
