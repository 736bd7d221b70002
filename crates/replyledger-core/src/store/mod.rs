//! Tenant store.
//!
//! One physically separate `SQLite` file per auditor, addressed through
//! [`TenantStores`]. Writes within a tenant are serialized; different
//! tenants share nothing.

mod error;
mod model;
mod registry;
mod tenant;

pub use error::{StoreResult, StoreTransactionError};
pub use model::{
    Direction, FolderCursor, InsertOutcome, MessageFilter, StoredMessage, SyncCheckpoint,
    SyncLogEntry, SyncStatus,
};
pub use registry::TenantStores;
pub use tenant::{CommitBatch, TenantHandle};
