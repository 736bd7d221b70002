//! # replyledger-core
//!
//! Core engine for `ReplyLedger`, a follow-up tracker for auditors who email
//! client companies and need to know which of them have gone quiet.
//!
//! This crate provides:
//! - **Credential Vault** - AES-256-GCM sealing of mail-server credentials
//! - **Tenant Store** - one isolated `SQLite` store per auditor
//! - **Working-Day Calendar** - business-day arithmetic over a holiday set
//! - **Mail Sync Engine** - incremental IMAP fetch, attribution and dedup
//! - **Follow-Up Analyzer** - overdue detection and activity statistics
//! - **Company Directory** - validation of uploaded company lists

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod calendar;
pub mod config;
pub mod directory;
mod error;
pub mod followup;
pub mod mail;
pub mod service;
pub mod settings;
pub mod store;
pub mod sync;
pub mod vault;

pub use account::{
    AdminRepository, Auditor, AuditorId, CredentialValidationError, MailAccountCredential,
    NewAuditor, Security, validate_credential,
};
pub use calendar::{CalendarHandle, HolidayCalendar, working_days_between};
pub use config::AppConfig;
pub use directory::{
    Company, DirectoryError, DirectoryRecord, DirectoryValidationError, ImportReport,
    ParsedDirectory, RejectReason, parse_directory, records_from_json,
};
pub use error::{Error, Result};
pub use followup::{
    CompanyActivity, FollowUpAnalyzer, FollowUpStatus, NON_COMPLIANT_SENT, OverdueRecord,
    OverviewStats,
};
pub use mail::{
    ConnectionError, FetchedMessage, FolderFetch, FolderRequest, ImapConnector, ImapSession,
    MailConnector, MailSession, PartialFetchError, parse_fetched,
};
pub use service::Tracker;
pub use settings::{Settings, SettingsError};
pub use store::{
    CommitBatch, Direction, FolderCursor, InsertOutcome, MessageFilter, StoreResult,
    StoreTransactionError, StoredMessage, SyncCheckpoint, SyncLogEntry, SyncStatus, TenantHandle,
    TenantStores,
};
pub use sync::{
    ActiveSyncs, Classification, Classifier, FailureReason, SyncEngine, SyncError, SyncOptions,
    SyncPermit, SyncReport, SyncRequest, SyncState, SyncWindow,
};
pub use vault::{CredentialVault, SealedCredential, SessionCredential, VaultError, VaultKey};
