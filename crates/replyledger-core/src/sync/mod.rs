//! Mail sync engine.
//!
//! One run connects with a freshly unsealed credential, fetches the inbox
//! and sent folders since the tenant's checkpoint, attributes messages to
//! companies and commits them together with the advanced checkpoint.

mod classify;
mod engine;
mod report;
mod state;

pub use classify::{Classification, Classifier};
pub use engine::{ActiveSyncs, SyncEngine, SyncOptions, SyncPermit, SyncRequest};
pub use report::{FailureReason, SyncError, SyncReport, SyncWindow};
pub use state::SyncState;
