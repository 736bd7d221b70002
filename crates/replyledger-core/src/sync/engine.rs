//! Sync run orchestration.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Days, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::classify::{Classification, Classifier};
use super::report::{SyncError, SyncReport, SyncWindow};
use super::state::{RunState, SyncState};
use crate::account::AuditorId;
use crate::config::AppConfig;
use crate::directory::Company;
use crate::mail::{FolderFetch, FolderRequest, MailConnector, MailSession};
use crate::settings::Settings;
use crate::store::{
    Direction, StoreTransactionError, StoredMessage, SyncCheckpoint, SyncStatus, TenantHandle,
};
use crate::vault::{CredentialVault, SealedCredential};

/// Folder and window options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Days to look back on the first run.
    pub lookback_days: u32,
    /// Inbound folder.
    pub inbox_folder: String,
    /// Outbound folder.
    pub sent_folder: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl SyncOptions {
    /// Options from application configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lookback_days: config.lookback_days,
            inbox_folder: config.inbox_folder.clone(),
            sent_folder: config.sent_folder.clone(),
        }
    }

    fn direction_of(&self, folder: &str) -> Direction {
        if folder == self.sent_folder {
            Direction::Outbound
        } else {
            Direction::Inbound
        }
    }
}

/// Everything one run needs.
#[derive(Debug)]
pub struct SyncRequest<'a> {
    /// Tenant to sync.
    pub auditor: AuditorId,
    /// The tenant's store.
    pub store: &'a TenantHandle,
    /// The tenant's sealed mail credential.
    pub credential: &'a SealedCredential,
    /// Vault holding the process key.
    pub vault: &'a CredentialVault,
    /// Settings snapshot for this run.
    pub settings: &'a Settings,
    /// End of the fetch window.
    pub now: DateTime<Utc>,
    /// Cancellation, honoured until the commit begins.
    pub cancel: CancellationToken,
}

/// Set of tenants with a run in progress.
#[derive(Debug, Clone, Default)]
pub struct ActiveSyncs {
    inner: Arc<Mutex<HashSet<AuditorId>>>,
}

impl ActiveSyncs {
    /// Mark `auditor` as syncing, unless it already is.
    #[must_use]
    pub fn try_acquire(&self, auditor: AuditorId) -> Option<SyncPermit> {
        let inserted = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(auditor);
        inserted.then(|| SyncPermit {
            auditor,
            active: Arc::clone(&self.inner),
        })
    }

    /// Whether a run for `auditor` is in progress.
    #[must_use]
    pub fn is_running(&self, auditor: AuditorId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&auditor)
    }
}

/// Proof of the per-tenant run flag. Released on drop.
#[derive(Debug)]
pub struct SyncPermit {
    auditor: AuditorId,
    active: Arc<Mutex<HashSet<AuditorId>>>,
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.auditor);
    }
}

/// Runs syncs through a [`MailConnector`].
#[derive(Debug)]
pub struct SyncEngine<C> {
    connector: C,
    options: SyncOptions,
    active: ActiveSyncs,
}

impl<C: MailConnector> SyncEngine<C> {
    /// Create an engine.
    #[must_use]
    pub fn new(connector: C, options: SyncOptions) -> Self {
        Self {
            connector,
            options,
            active: ActiveSyncs::default(),
        }
    }

    /// Folder and window options.
    #[must_use]
    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Whether a run for `auditor` is in progress.
    #[must_use]
    pub fn is_running(&self, auditor: AuditorId) -> bool {
        self.active.is_running(auditor)
    }

    /// Mark `auditor` busy without running a sync.
    ///
    /// Used by administrative actions that must not overlap a run.
    #[must_use]
    pub fn try_reserve(&self, auditor: AuditorId) -> Option<SyncPermit> {
        self.active.try_acquire(auditor)
    }

    /// Run one sync for a tenant.
    ///
    /// Rejected immediately if a run for the same tenant is active. The
    /// outcome is recorded in the tenant's sync log.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`] naming the failing state. The checkpoint and
    /// stored messages are unchanged on any error.
    pub async fn run(&self, request: SyncRequest<'_>) -> Result<SyncReport, SyncError> {
        let Some(_permit) = self.active.try_acquire(request.auditor) else {
            warn!(auditor = %request.auditor, "Sync rejected, already running");
            return Err(SyncError::AlreadyRunning(request.auditor));
        };

        let mut state = RunState::new(request.auditor);
        let result = self.execute(&request, &mut state).await;
        if result.is_err() {
            state.advance(SyncState::Failed);
        }

        let status = match &result {
            Ok(report) => {
                info!(
                    auditor = %request.auditor,
                    fetched = report.fetched,
                    inserted = report.inserted,
                    duplicates = report.duplicates,
                    skipped = report.partial_failures.len(),
                    "Sync completed"
                );
                SyncStatus::Success
            }
            Err(e) => {
                error!(
                    auditor = %request.auditor,
                    state = %e.state(),
                    reason = %e.reason(),
                    error = %e,
                    "Sync failed"
                );
                SyncStatus::Failed(format!("{}: {e}", e.reason()))
            }
        };
        if let Err(e) = request.store.record_sync_status(&status, Utc::now()).await {
            warn!(auditor = %request.auditor, error = %e, "Could not record sync status");
        }

        result
    }

    async fn execute(
        &self,
        request: &SyncRequest<'_>,
        state: &mut RunState,
    ) -> Result<SyncReport, SyncError> {
        let companies = request
            .store
            .list_companies()
            .await
            .map_err(store_error(state))?;
        if companies.is_empty() {
            return Err(SyncError::EmptyDirectory(request.auditor));
        }
        let checkpoint = request
            .store
            .checkpoint()
            .await
            .map_err(store_error(state))?;

        state.advance(SyncState::Connecting);
        check_cancelled(&request.cancel, state)?;
        let mut session = {
            let credential = request
                .vault
                .unseal(request.credential)
                .map_err(|source| SyncError::Vault {
                    state: state.current(),
                    source,
                })?;
            tokio::select! {
                biased;
                () = request.cancel.cancelled() => {
                    return Err(SyncError::Cancelled { state: state.current() });
                }
                session = self.connector.connect(&credential) => {
                    session.map_err(|source| SyncError::Connection {
                        state: state.current(),
                        source,
                    })?
                }
            }
        };

        state.advance(SyncState::Listing);
        let window = self.window(&checkpoint, request.now);
        let folder_requests: Vec<FolderRequest> =
            [&self.options.inbox_folder, &self.options.sent_folder]
                .into_iter()
                .map(|folder| FolderRequest {
                    folder: folder.clone(),
                    since: window.start,
                    cursor: checkpoint.cursors.get(folder).copied(),
                })
                .collect();
        info!(
            auditor = %request.auditor,
            start = %window.start,
            end = %window.end,
            "Fetch window"
        );

        state.advance(SyncState::Fetching);
        let fetched = fetch_all(&mut session, &folder_requests, &request.cancel, state).await;
        session.logout().await;
        let fetches = fetched?;

        state.advance(SyncState::Classifying);
        let mut report = SyncReport::new(request.auditor, window);
        let accepted = self.classify(&fetches, &companies, request.settings, &mut report);

        check_cancelled(&request.cancel, state)?;
        state.advance(SyncState::Committing);
        let mut next = SyncCheckpoint {
            last_sync: Some(request.now),
            cursors: checkpoint.cursors.clone(),
        };
        for fetch in &fetches {
            if fetch.uid_validity != 0 {
                let previous = checkpoint.cursors.get(&fetch.folder).copied();
                let hold_from = fetch.first_dated_after(window.end);
                next.cursors.insert(
                    fetch.folder.clone(),
                    fetch.next_cursor(previous, hold_from),
                );
            }
        }

        let mut batch = request
            .store
            .begin_commit()
            .await
            .map_err(store_error(state))?;
        for message in &accepted {
            batch
                .insert_message_if_absent(message)
                .await
                .map_err(store_error(state))?;
        }
        batch
            .set_checkpoint(&next)
            .await
            .map_err(store_error(state))?;
        report.inserted = batch.inserted();
        report.duplicates = batch.duplicates();
        batch.commit().await.map_err(store_error(state))?;

        state.advance(SyncState::Done);
        Ok(report)
    }

    fn window(&self, checkpoint: &SyncCheckpoint, now: DateTime<Utc>) -> SyncWindow {
        match checkpoint.last_sync {
            Some(last_sync) => SyncWindow {
                start: last_sync.min(now),
                end: now,
                start_inclusive: false,
            },
            None => SyncWindow {
                start: now
                    .checked_sub_days(Days::new(u64::from(self.options.lookback_days)))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
                end: now,
                start_inclusive: true,
            },
        }
    }

    /// Turn fetched messages into rows to store, counting the rest.
    fn classify(
        &self,
        fetches: &[FolderFetch],
        companies: &[Company],
        settings: &Settings,
        report: &mut SyncReport,
    ) -> Vec<StoredMessage> {
        let classifier = Classifier::new(companies, settings);
        let mut accepted = Vec::new();

        for fetch in fetches {
            let direction = self.options.direction_of(&fetch.folder);
            for entry in &fetch.messages {
                let message = match entry {
                    Ok(message) => message,
                    Err(failure) => {
                        warn!(auditor = %report.auditor, error = %failure, "Skipping unreadable message");
                        report.partial_failures.push(failure.clone());
                        continue;
                    }
                };
                report.fetched += 1;

                // A UID cursor already bounds what is new.
                if !fetch.used_cursor && !report.window.contains(message.timestamp) {
                    report.out_of_window += 1;
                    continue;
                }

                match classifier.classify(message, direction) {
                    Classification::Matched { company_ref, .. } => {
                        accepted.push(StoredMessage {
                            message_id: message.message_id.clone(),
                            direction,
                            company_ref,
                            timestamp: message.timestamp,
                            folder: message.folder.clone(),
                            from_addr: message.from.clone().unwrap_or_default(),
                            to_addrs: message.recipients.clone(),
                            subject: message.subject.clone(),
                        });
                    }
                    Classification::Excluded => report.excluded += 1,
                    Classification::Unmatched => report.unmatched += 1,
                }
            }
        }
        accepted
    }
}

fn store_error(state: &RunState) -> impl FnOnce(StoreTransactionError) -> SyncError + use<> {
    let state = state.current();
    move |source| SyncError::Store { state, source }
}

fn check_cancelled(cancel: &CancellationToken, state: &RunState) -> Result<(), SyncError> {
    if cancel.is_cancelled() && state.current().is_cancellable() {
        return Err(SyncError::Cancelled {
            state: state.current(),
        });
    }
    Ok(())
}

async fn fetch_all<S: MailSession>(
    session: &mut S,
    requests: &[FolderRequest],
    cancel: &CancellationToken,
    state: &RunState,
) -> Result<Vec<FolderFetch>, SyncError> {
    let mut fetches = Vec::with_capacity(requests.len());
    for request in requests {
        let fetch = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(SyncError::Cancelled { state: state.current() });
            }
            fetch = session.fetch_folder(request) => fetch.map_err(|source| SyncError::Connection {
                state: state.current(),
                source,
            })?,
        };
        info!(
            folder = %fetch.folder,
            messages = fetch.messages.len(),
            incremental = fetch.used_cursor,
            "Fetched folder"
        );
        fetches.push(fetch);
    }
    Ok(fetches)
}
