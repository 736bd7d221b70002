//! Application service tying the admin store, tenant stores and sync engine
//! together.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::account::{
    AdminRepository, Auditor, AuditorId, MailAccountCredential, NewAuditor, validate_credential,
};
use crate::calendar::{CalendarHandle, HolidayCalendar};
use crate::config::AppConfig;
use crate::directory::{Company, DirectoryRecord, ImportReport, parse_directory};
use crate::error::{Error, Result};
use crate::followup::{CompanyActivity, FollowUpAnalyzer, OverdueRecord, OverviewStats};
use crate::mail::{ImapConnector, MailConnector};
use crate::settings::Settings;
use crate::store::{MessageFilter, StoredMessage, SyncLogEntry, SyncStatus, TenantHandle, TenantStores};
use crate::sync::{SyncEngine, SyncError, SyncOptions, SyncReport, SyncRequest, SyncState};
use crate::vault::{CredentialVault, VaultError};

/// Entry point for administrative actions, sync triggers and reports.
#[derive(Debug)]
pub struct Tracker<C = ImapConnector> {
    admin: AdminRepository,
    tenants: TenantStores,
    calendar: CalendarHandle,
    vault: std::result::Result<Arc<CredentialVault>, VaultError>,
    engine: SyncEngine<C>,
    holidays_path: Option<PathBuf>,
}

impl Tracker<ImapConnector> {
    /// Open the data directory described by `config`.
    ///
    /// A missing or invalid vault key is not fatal here; it fails the
    /// operations that need it.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory, admin store or holiday file
    /// cannot be opened.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let admin_path = config.admin_db_path();
        let admin_path = admin_path
            .to_str()
            .ok_or_else(|| Error::Config(format!("data dir is not valid UTF-8: {}", admin_path.display())))?;
        let admin = AdminRepository::new(admin_path).await?;

        let calendar = match &config.holidays_path {
            Some(path) => HolidayCalendar::load(path).await?,
            None => HolidayCalendar::new(),
        };

        let vault = CredentialVault::from_env();
        if let Err(e) = &vault {
            warn!(error = %e, "Vault unavailable; syncs and credential changes will fail");
        }

        let engine = SyncEngine::new(
            ImapConnector::from_config(config),
            SyncOptions::from_config(config),
        );

        info!(data_dir = %config.data_dir.display(), holidays = calendar.len(), "Tracker ready");
        Ok(Self {
            admin,
            tenants: TenantStores::new(config.tenants_dir()),
            calendar: CalendarHandle::new(calendar),
            vault: vault.map(Arc::new),
            engine,
            holidays_path: config.holidays_path.clone(),
        })
    }
}

impl<C: MailConnector> Tracker<C> {
    /// Assemble a tracker from parts.
    #[must_use]
    pub fn new(
        admin: AdminRepository,
        tenants: TenantStores,
        calendar: HolidayCalendar,
        vault: std::result::Result<CredentialVault, VaultError>,
        engine: SyncEngine<C>,
    ) -> Self {
        Self {
            admin,
            tenants,
            calendar: CalendarHandle::new(calendar),
            vault: vault.map(Arc::new),
            engine,
            holidays_path: None,
        }
    }

    /// Set the file used by [`Self::reload_holidays`].
    #[must_use]
    pub fn with_holidays_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.holidays_path = Some(path.into());
        self
    }

    fn vault(&self) -> std::result::Result<&CredentialVault, VaultError> {
        self.vault.as_deref().map_err(|e| *e)
    }

    async fn auditor(&self, id: AuditorId) -> Result<Auditor> {
        self.admin.get(id).await?.ok_or(Error::AuditorNotFound(id))
    }

    async fn tenant(&self, id: AuditorId) -> Result<TenantHandle> {
        self.auditor(id).await?;
        Ok(self.tenants.for_tenant(id).await?)
    }

    // ========== Auditors ==========

    /// Register an auditor and create their tenant store.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is invalid, the vault is
    /// unavailable, the username is taken or the store cannot be created.
    pub async fn create_auditor(&self, new: NewAuditor) -> Result<Auditor> {
        validate_credential(&new.credential).map_err(Error::InvalidCredential)?;
        let sealed = self.vault()?.seal(&new.credential)?;

        let auditor = self
            .admin
            .insert_auditor(
                &new.username,
                new.full_name.as_deref(),
                new.email.as_deref(),
                &sealed,
            )
            .await?;

        if let Err(e) = self.tenants.for_tenant(auditor.id).await {
            warn!(auditor = %auditor.id, error = %e, "Tenant store creation failed, removing auditor");
            self.admin.delete(auditor.id).await?;
            return Err(e.into());
        }
        Ok(auditor)
    }

    /// Replace an auditor's mail credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is invalid, the vault is
    /// unavailable or the auditor does not exist.
    pub async fn update_credential(
        &self,
        id: AuditorId,
        credential: &MailAccountCredential,
    ) -> Result<()> {
        validate_credential(credential).map_err(Error::InvalidCredential)?;
        let sealed = self.vault()?.seal(credential)?;
        self.admin.update_credential(id, &sealed).await
    }

    /// Remove an auditor together with their tenant store.
    ///
    /// Refused while a sync for the auditor is running.
    ///
    /// # Errors
    ///
    /// Returns an error if a sync is running or the store cannot be removed.
    pub async fn delete_auditor(&self, id: AuditorId) -> Result<bool> {
        let Some(_permit) = self.engine.try_reserve(id) else {
            return Err(SyncError::AlreadyRunning(id).into());
        };
        self.tenants.delete_tenant(id).await?;
        let deleted = self.admin.delete(id).await?;
        info!(auditor = %id, deleted, "Deleted auditor");
        Ok(deleted)
    }

    /// Look up an auditor.
    ///
    /// # Errors
    ///
    /// Returns an error if the auditor does not exist.
    pub async fn get_auditor(&self, id: AuditorId) -> Result<Auditor> {
        self.auditor(id).await
    }

    /// All auditors, by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the admin store query fails.
    pub async fn list_auditors(&self) -> Result<Vec<Auditor>> {
        self.admin.list().await
    }

    // ========== Settings and calendar ==========

    /// Current admin settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the admin store query fails.
    pub async fn settings(&self) -> Result<Settings> {
        self.admin.settings().await
    }

    /// Replace admin settings. Applies from the next sync or report.
    ///
    /// # Errors
    ///
    /// Returns an error if the admin store write fails.
    pub async fn update_settings(&self, settings: &Settings) -> Result<()> {
        self.admin.update_settings(settings).await
    }

    /// Reload the holiday file.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is configured or it cannot be parsed; the
    /// previous calendar stays in place.
    pub async fn reload_holidays(&self) -> Result<usize> {
        let path = self
            .holidays_path
            .as_deref()
            .ok_or_else(|| Error::Config("no holiday file configured".to_string()))?;
        let count = self.calendar.reload(path).await?;
        info!(path = %path.display(), holidays = count, "Reloaded holidays");
        Ok(count)
    }

    // ========== Directory ==========

    /// Validate an upload and upsert the accepted companies.
    ///
    /// # Errors
    ///
    /// Returns an error if the auditor does not exist, the upload fails
    /// batch-level validation or the store write fails.
    pub async fn import_directory(
        &self,
        id: AuditorId,
        records: &[DirectoryRecord],
    ) -> Result<ImportReport> {
        let store = self.tenant(id).await?;
        let parsed = parse_directory(records)?;
        let accepted = store.upsert_companies(&parsed.companies).await?;

        info!(
            auditor = %id,
            accepted,
            rejected = parsed.rejected.len(),
            warnings = parsed.warnings.len(),
            "Imported directory"
        );
        Ok(ImportReport {
            accepted,
            rejected: parsed.rejected,
            warnings: parsed.warnings,
        })
    }

    /// Companies in an auditor's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the auditor does not exist or the store read fails.
    pub async fn companies(&self, id: AuditorId) -> Result<Vec<Company>> {
        Ok(self.tenant(id).await?.list_companies().await?)
    }

    // ========== Sync ==========

    /// Run a sync for one auditor now.
    ///
    /// Rejected if a sync for the same auditor is running. Syncs for other
    /// auditors may run concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sync`] for run failures; the checkpoint is unchanged.
    pub async fn sync_now(&self, id: AuditorId, cancel: CancellationToken) -> Result<SyncReport> {
        let auditor = self.auditor(id).await?;
        let store = self.tenants.for_tenant(id).await?;

        let vault = match self.vault() {
            Ok(vault) => vault,
            Err(source) => {
                let error = SyncError::Vault {
                    state: SyncState::Idle,
                    source,
                };
                if !self.engine.is_running(id) {
                    let status = SyncStatus::Failed(format!("{}: {error}", error.reason()));
                    if let Err(e) = store.record_sync_status(&status, Utc::now()).await {
                        warn!(auditor = %id, error = %e, "Could not record sync status");
                    }
                }
                return Err(error.into());
            }
        };
        let settings = self.admin.settings().await?;

        let report = self
            .engine
            .run(SyncRequest {
                auditor: id,
                store: &store,
                credential: &auditor.credential,
                vault,
                settings: &settings,
                now: Utc::now(),
                cancel,
            })
            .await?;
        Ok(report)
    }

    /// Whether a sync for `id` is running.
    #[must_use]
    pub fn is_syncing(&self, id: AuditorId) -> bool {
        self.engine.is_running(id)
    }

    /// Outcome of the auditor's last sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the auditor does not exist or the store read fails.
    pub async fn last_sync_status(&self, id: AuditorId) -> Result<Option<SyncLogEntry>> {
        Ok(self.tenant(id).await?.last_sync_status().await?)
    }

    // ========== Reports ==========

    async fn snapshot(&self, id: AuditorId) -> Result<(Vec<Company>, Vec<StoredMessage>, Settings)> {
        let store = self.tenant(id).await?;
        let companies = store.list_companies().await?;
        let messages = store.list_messages(&MessageFilter::default()).await?;
        let settings = self.admin.settings().await?;
        Ok((companies, messages, settings))
    }

    /// Follow-up report as of `now`.
    ///
    /// With `include_all` false only overdue companies are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the auditor does not exist or a store read fails.
    pub async fn overdue_report(
        &self,
        id: AuditorId,
        include_all: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<OverdueRecord>> {
        let (companies, messages, settings) = self.snapshot(id).await?;
        let calendar = self.calendar.snapshot();
        let analyzer = FollowUpAnalyzer::new(&calendar, &settings);
        Ok(if include_all {
            analyzer.evaluate(&companies, &messages, now)
        } else {
            analyzer.overdue_only(&companies, &messages, now)
        })
    }

    /// Per-company message counts as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the auditor does not exist or a store read fails.
    pub async fn activity(&self, id: AuditorId, now: DateTime<Utc>) -> Result<Vec<CompanyActivity>> {
        let (companies, messages, settings) = self.snapshot(id).await?;
        let calendar = self.calendar.snapshot();
        Ok(FollowUpAnalyzer::new(&calendar, &settings).activity(&companies, &messages, now))
    }

    /// Dashboard counts as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the auditor does not exist or a store read fails.
    pub async fn overview(&self, id: AuditorId, now: DateTime<Utc>) -> Result<OverviewStats> {
        let (companies, messages, settings) = self.snapshot(id).await?;
        let calendar = self.calendar.snapshot();
        Ok(FollowUpAnalyzer::new(&calendar, &settings).overview(&companies, &messages, now))
    }
}
