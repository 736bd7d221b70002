//! Registry of tenant stores, one storage unit per auditor.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use super::error::StoreResult;
use super::tenant::TenantHandle;
use crate::account::AuditorId;

/// Hands out isolated [`TenantHandle`]s keyed by auditor.
///
/// File-backed stores live at `<root>/auditor_<id>.db`. The registry lock
/// only guards the handle map and is never held across I/O.
#[derive(Debug, Clone)]
pub struct TenantStores {
    root: Option<PathBuf>,
    handles: Arc<Mutex<HashMap<AuditorId, TenantHandle>>>,
}

impl TenantStores {
    /// Stores under `root`, created on demand.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            handles: Arc::default(),
        }
    }

    /// In-memory stores for testing; each tenant gets its own database.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            root: None,
            handles: Arc::default(),
        }
    }

    /// Path of a tenant's store file, if file-backed.
    #[must_use]
    pub fn path_for(&self, id: AuditorId) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("auditor_{id}.db")))
    }

    fn cached(&self, id: AuditorId) -> Option<TenantHandle> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Handle for a tenant, opening its store on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be created or opened.
    pub async fn for_tenant(&self, id: AuditorId) -> StoreResult<TenantHandle> {
        if let Some(handle) = self.cached(id) {
            return Ok(handle);
        }

        let opened = match self.path_for(id) {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                TenantHandle::open(id, &path).await?
            }
            None => TenantHandle::in_memory(id).await?,
        };

        // Another task may have opened the same tenant meanwhile; keep the first.
        let (handle, loser) = {
            let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
            match handles.entry(id) {
                Entry::Occupied(entry) => (entry.get().clone(), Some(opened)),
                Entry::Vacant(entry) => (entry.insert(opened).clone(), None),
            }
        };
        if let Some(loser) = loser {
            debug!(auditor = %id, "Closing duplicate tenant store");
            loser.close().await;
        }
        Ok(handle)
    }

    /// Drop a tenant's store and remove its files.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be removed.
    pub async fn delete_tenant(&self, id: AuditorId) -> StoreResult<()> {
        let handle = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(handle) = handle {
            handle.close().await;
        }

        if let Some(path) = self.path_for(id) {
            for file in sidecar_files(&path) {
                match tokio::fs::remove_file(&file).await {
                    Ok(()) => debug!(path = %file.display(), "Removed tenant file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        info!(auditor = %id, "Deleted tenant store");
        Ok(())
    }
}

/// The database file and its WAL companions.
fn sidecar_files(path: &Path) -> [PathBuf; 3] {
    let base = path.as_os_str().to_os_string();
    let with_suffix = |suffix: &str| {
        let mut name = base.clone();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::directory::Company;
    use crate::store::{Direction, MessageFilter, StoredMessage};
    use chrono::Utc;

    fn message(id: &str) -> StoredMessage {
        StoredMessage {
            message_id: id.to_string(),
            direction: Direction::Outbound,
            company_ref: "U1".to_string(),
            timestamp: Utc::now(),
            folder: "Sent".to_string(),
            from_addr: "auditor@firm.com".to_string(),
            to_addrs: vec!["client@acme.com".to_string()],
            subject: String::new(),
        }
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let stores = TenantStores::ephemeral();
        let a = stores.for_tenant(AuditorId(1)).await.unwrap();
        let b = stores.for_tenant(AuditorId(2)).await.unwrap();

        a.upsert_companies(&[Company::new("U1", "Acme", "client@acme.com")])
            .await
            .unwrap();
        a.insert_message_if_absent(&message("<1>")).await.unwrap();

        // Same identifier in another tenant is independent, and fails there
        // only because tenant 2 has no such company.
        assert!(b.insert_message_if_absent(&message("<1>")).await.is_err());
        assert_eq!(a.message_count().await.unwrap(), 1);
        assert!(b.list_companies().await.unwrap().is_empty());
        assert!(b.list_messages(&MessageFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_batch_does_not_block_other_tenant() {
        let stores = TenantStores::ephemeral();
        let a = stores.for_tenant(AuditorId(1)).await.unwrap();
        let b = stores.for_tenant(AuditorId(2)).await.unwrap();
        b.upsert_companies(&[Company::new("U1", "Acme", "client@acme.com")])
            .await
            .unwrap();

        let _batch = a.begin_commit().await.unwrap();
        let msg = message("<1>");
        let insert = b.insert_message_if_absent(&msg);
        tokio::time::timeout(std::time::Duration::from_secs(2), insert)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_for_tenant_returns_same_store() {
        let stores = TenantStores::ephemeral();
        let first = stores.for_tenant(AuditorId(3)).await.unwrap();
        first
            .upsert_companies(&[Company::new("U1", "Acme", "client@acme.com")])
            .await
            .unwrap();
        let again = stores.for_tenant(AuditorId(3)).await.unwrap();
        assert_eq!(again.list_companies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_open_shares_one_store() {
        let stores = TenantStores::ephemeral();
        let (a, b) = tokio::join!(
            stores.for_tenant(AuditorId(4)),
            stores.for_tenant(AuditorId(4))
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(!a.is_closed());
        assert!(!b.is_closed());

        // Ephemeral stores are separate databases, so a shared view proves
        // both callers got the winning handle.
        a.upsert_companies(&[Company::new("U1", "Acme", "client@acme.com")])
            .await
            .unwrap();
        assert_eq!(b.list_companies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_backed_delete_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let stores = TenantStores::new(dir.path());
        let handle = stores.for_tenant(AuditorId(9)).await.unwrap();
        handle
            .upsert_companies(&[Company::new("U1", "Acme", "client@acme.com")])
            .await
            .unwrap();
        let path = stores.path_for(AuditorId(9)).unwrap();
        assert!(path.exists());
        drop(handle);

        stores.delete_tenant(AuditorId(9)).await.unwrap();
        assert!(!path.exists());

        let reopened = stores.for_tenant(AuditorId(9)).await.unwrap();
        assert!(reopened.list_companies().await.unwrap().is_empty());
    }
}
