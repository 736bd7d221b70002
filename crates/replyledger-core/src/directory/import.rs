//! Directory upload parsing and per-row validation.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::model::Company;
use crate::account::is_valid_email;

/// One uploaded row: header to cell value.
pub type DirectoryRecord = HashMap<String, String>;

/// Canonical column a header maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Reference,
    Name,
    Email,
    AltEmail,
}

impl Column {
    const REQUIRED: [Self; 3] = [Self::Reference, Self::Name, Self::Email];

    const fn label(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Name => "name",
            Self::Email => "email",
            Self::AltEmail => "alt_email",
        }
    }

    fn from_header(header: &str) -> Option<Self> {
        match normalize_header(header).as_str() {
            "UIF_REF" | "UIF_REF_NUMBER" | "UIF_REFERENCE" | "UIF_REFERENCE_NUMBER"
            | "UIF_NUMBER" | "UIFNO" | "REFERENCE" | "REF" => Some(Self::Reference),
            "TRADE_NAME" | "TRADENAME" | "COMPANY_NAME" | "NAME" => Some(Self::Name),
            "EMAIL" | "EMAIL_ADDRESS" | "PRIMARY_EMAIL" => Some(Self::Email),
            "ALT_EMAIL" | "ALTERNATE_EMAIL" | "ALTERNATIVE_EMAIL" | "ALTENATIVE_EMAIL"
            | "SECONDARY_EMAIL" => Some(Self::AltEmail),
            _ => None,
        }
    }
}

/// Uppercase, with runs of non-alphanumerics collapsed to one `_`.
fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    for c in header.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Batch-level upload failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Upload had no rows.
    #[error("directory upload is empty")]
    Empty,

    /// Required columns are absent from the headers.
    #[error("directory upload is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    /// Upload is not a list of flat records.
    #[error("directory upload is not a list of records: {0}")]
    Format(String),
}

/// Why a row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    /// Reference cell empty.
    MissingReference,
    /// Neither email cell holds a valid address.
    NoValidEmail,
    /// Reference already seen earlier in the same upload.
    DuplicateReference,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::MissingReference => "missing reference code",
            Self::NoValidEmail => "no valid email address",
            Self::DuplicateReference => "duplicate reference code in upload",
        })
    }
}

/// A rejected row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("row {row}: {reason}")]
pub struct DirectoryValidationError {
    /// 1-based row number in the upload.
    pub row: usize,
    /// Reference code, when the row had one.
    pub reference: Option<String>,
    /// Rejection reason.
    pub reason: RejectReason,
}

/// Result of parsing an upload.
#[derive(Debug, Clone, Default)]
pub struct ParsedDirectory {
    /// Companies ready to upsert.
    pub companies: Vec<Company>,
    /// Rejected rows.
    pub rejected: Vec<DirectoryValidationError>,
    /// Non-fatal problems, such as a dropped alternate email.
    pub warnings: Vec<String>,
}

/// Outcome of an import into a tenant store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Rows written (inserted or updated).
    pub accepted: usize,
    /// Rejected rows.
    pub rejected: Vec<DirectoryValidationError>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

/// Validate an upload.
///
/// Bad rows are rejected individually; only missing columns or an empty
/// upload fail the whole batch.
///
/// # Errors
///
/// Returns `Empty` or `MissingColumns`.
pub fn parse_directory(records: &[DirectoryRecord]) -> Result<ParsedDirectory, DirectoryError> {
    if records.is_empty() {
        return Err(DirectoryError::Empty);
    }

    let present: HashSet<Column> = records
        .iter()
        .flat_map(HashMap::keys)
        .filter_map(|header| Column::from_header(header))
        .collect();
    let missing: Vec<&'static str> = Column::REQUIRED
        .iter()
        .filter(|column| !present.contains(column))
        .map(|column| column.label())
        .collect();
    if !missing.is_empty() {
        return Err(DirectoryError::MissingColumns(missing));
    }

    let mut parsed = ParsedDirectory::default();
    let mut seen = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let row = index + 1;
        let cells = canonical_cells(record);
        let cell = |column| cells.get(&column).copied().unwrap_or_default();

        let reference = cell(Column::Reference);
        if reference.is_empty() {
            parsed.rejected.push(DirectoryValidationError {
                row,
                reference: None,
                reason: RejectReason::MissingReference,
            });
            continue;
        }
        let reject = |reason| DirectoryValidationError {
            row,
            reference: Some(reference.to_string()),
            reason,
        };

        let email = cell(Column::Email).to_lowercase();
        let alt = cell(Column::AltEmail).to_lowercase();
        let (primary, alternate) = match (is_valid_email(&email), is_valid_email(&alt)) {
            (true, true) if alt != email => (email, Some(alt)),
            (true, _) => {
                if !alt.is_empty() && alt != email {
                    parsed
                        .warnings
                        .push(format!("row {row}: dropped invalid alternate email {alt:?}"));
                }
                (email, None)
            }
            (false, true) => {
                parsed.warnings.push(format!(
                    "row {row}: primary email {email:?} invalid, using alternate"
                ));
                (alt, None)
            }
            (false, false) => {
                parsed.rejected.push(reject(RejectReason::NoValidEmail));
                continue;
            }
        };

        if !seen.insert(reference.to_string()) {
            parsed.rejected.push(reject(RejectReason::DuplicateReference));
            continue;
        }

        let name = match cell(Column::Name) {
            "" => reference,
            name => name,
        };
        let mut company = Company::new(reference, name, primary);
        if let Some(alternate) = alternate {
            company = company.with_alt_email(alternate);
        }
        parsed.companies.push(company);
    }

    for warning in &parsed.warnings {
        warn!("{warning}");
    }
    debug!(
        accepted = parsed.companies.len(),
        rejected = parsed.rejected.len(),
        "Parsed directory upload"
    );
    Ok(parsed)
}

/// Map a record's cells onto canonical columns, trimmed.
///
/// When several headers alias the same column, the first non-empty wins.
fn canonical_cells(record: &DirectoryRecord) -> HashMap<Column, &str> {
    let mut headers: Vec<&String> = record.keys().collect();
    headers.sort();

    let mut cells = HashMap::new();
    for header in headers {
        let Some(column) = Column::from_header(header) else {
            continue;
        };
        let value = record[header].trim();
        if !value.is_empty() {
            cells.entry(column).or_insert(value);
        }
    }
    cells
}

/// Decode a JSON array of objects into records.
///
/// Scalar cells are stringified so numeric reference codes survive; nulls
/// become empty cells.
///
/// # Errors
///
/// Returns `Format` if the document is not an array of objects.
pub fn records_from_json(json: &str) -> Result<Vec<DirectoryRecord>, DirectoryError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| DirectoryError::Format(e.to_string()))?;
    let serde_json::Value::Array(rows) = value else {
        return Err(DirectoryError::Format("expected a JSON array".to_string()));
    };

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            let serde_json::Value::Object(map) = row else {
                return Err(DirectoryError::Format(format!(
                    "row {} is not an object",
                    index + 1
                )));
            };
            Ok(map
                .into_iter()
                .map(|(header, cell)| {
                    let cell = match cell {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (header, cell)
                })
                .collect())
        })
        .collect()
}
