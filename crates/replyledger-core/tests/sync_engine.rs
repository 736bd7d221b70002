//! End-to-end tests for the sync engine.
//!
//! A scripted in-process mailbox stands in for the IMAP server. It honours
//! UID cursors the way a real server does, so incremental behaviour is
//! exercised without a network.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use replyledger_core::{
    AuditorId, Company, ConnectionError, CredentialVault, Direction, FailureReason, FetchedMessage,
    FolderFetch, FolderRequest, MailAccountCredential, MailConnector, MailSession, MessageFilter,
    PartialFetchError, SealedCredential, SessionCredential, Settings, SyncEngine, SyncError,
    SyncOptions, SyncRequest, SyncState, SyncStatus, TenantHandle, VaultError, VaultKey,
    parse_fetched,
};

const PASSWORD: &str = "correct horse";

struct ScriptedMessage {
    uid: u32,
    header: String,
    internal_date: Option<DateTime<Utc>>,
}

struct ScriptedFolder {
    uid_validity: u32,
    messages: Vec<ScriptedMessage>,
}

struct MailboxState {
    folders: BTreeMap<String, ScriptedFolder>,
    refuse_connections: bool,
    connects: usize,
}

impl Default for MailboxState {
    fn default() -> Self {
        let empty = || ScriptedFolder {
            uid_validity: 7,
            messages: Vec::new(),
        };
        Self {
            folders: BTreeMap::from([("INBOX".to_string(), empty()), ("Sent".to_string(), empty())]),
            refuse_connections: false,
            connects: 0,
        }
    }
}

/// Holds one user's connect until released.
#[derive(Clone)]
struct Gate {
    username: String,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[derive(Clone, Default)]
struct Mailbox {
    state: Arc<Mutex<MailboxState>>,
    gate: Option<Gate>,
}

impl Mailbox {
    fn deliver(&self, folder: &str, header: String, internal_date: Option<DateTime<Utc>>) -> u32 {
        let mut state = self.state.lock().unwrap();
        let folder = state.folders.get_mut(folder).unwrap();
        let uid = folder.messages.last().map_or(1, |m| m.uid + 1);
        folder.messages.push(ScriptedMessage {
            uid,
            header,
            internal_date,
        });
        uid
    }

    fn refuse_connections(&self) {
        self.state.lock().unwrap().refuse_connections = true;
    }

    fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    fn gated(mut self, username: &str) -> (Self, Gate) {
        let gate = Gate {
            username: username.to_string(),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        self.gate = Some(gate.clone());
        (self, gate)
    }
}

struct ScriptedSession {
    mailbox: Mailbox,
}

impl MailConnector for Mailbox {
    type Session = ScriptedSession;

    async fn connect(&self, credential: &SessionCredential) -> Result<ScriptedSession, ConnectionError> {
        if let Some(gate) = self.gate.as_ref().filter(|g| g.username == credential.username()) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if state.refuse_connections {
            return Err(ConnectionError::Connect {
                host: credential.host().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        if credential.secret() != PASSWORD {
            return Err(ConnectionError::Authentication("invalid credentials".to_string()));
        }
        Ok(ScriptedSession {
            mailbox: self.clone(),
        })
    }
}

impl MailSession for ScriptedSession {
    async fn fetch_folder(&mut self, request: &FolderRequest) -> Result<FolderFetch, ConnectionError> {
        let state = self.mailbox.state.lock().unwrap();
        let Some(folder) = state.folders.get(&request.folder) else {
            return Err(ConnectionError::Protocol(format!("no such folder {}", request.folder)));
        };

        let cursor = request
            .cursor
            .filter(|cursor| cursor.uid_validity == folder.uid_validity);
        let since = request.since.date_naive();
        let messages: Vec<Result<FetchedMessage, PartialFetchError>> = folder
            .messages
            .iter()
            .filter(|m| match cursor {
                Some(cursor) => m.uid > cursor.last_uid,
                None => m.internal_date.is_none_or(|d| d.date_naive() >= since),
            })
            .map(|m| {
                parse_fetched(
                    &request.folder,
                    folder.uid_validity,
                    m.uid,
                    m.header.as_bytes(),
                    m.internal_date,
                )
            })
            .collect();

        Ok(FolderFetch {
            folder: request.folder.clone(),
            uid_validity: folder.uid_validity,
            used_cursor: cursor.is_some(),
            messages,
        })
    }

    async fn logout(self) {}
}

fn header(id: &str, from: &str, to: &str, date: DateTime<Utc>) -> String {
    format!(
        "Message-ID: <{id}>\r\nFrom: {from}\r\nTo: {to}\r\nSubject: Follow-up {id}\r\nDate: {}\r\n\r\n",
        date.to_rfc2822()
    )
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

struct Tenant {
    store: TenantHandle,
    credential: SealedCredential,
}

struct Fixture {
    vault: CredentialVault,
    settings: Settings,
}

impl Fixture {
    fn new() -> Self {
        Self {
            vault: CredentialVault::new(&VaultKey::from_bytes([7; 32])),
            settings: Settings::new(3, ["firm.co.za"]).unwrap(),
        }
    }

    async fn tenant(&self, id: i64, username: &str, password: &str) -> Tenant {
        let store = TenantHandle::in_memory(AuditorId(id)).await.unwrap();
        store
            .upsert_companies(&[
                Company::new("A100", "Alpha", "info@alpha.com"),
                Company::new("B200", "Beta", "accounts@beta.com").with_alt_email("ap@beta.com"),
                Company::new("C300", "Colleague", "ops@firm.co.za"),
            ])
            .await
            .unwrap();
        let credential = self
            .vault
            .seal(&MailAccountCredential::new("imap.test", username, password))
            .unwrap();
        Tenant { store, credential }
    }

    fn request<'a>(&'a self, tenant: &'a Tenant, now: DateTime<Utc>) -> SyncRequest<'a> {
        self.request_with(tenant, now, CancellationToken::new())
    }

    fn request_with<'a>(
        &'a self,
        tenant: &'a Tenant,
        now: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> SyncRequest<'a> {
        SyncRequest {
            auditor: tenant.store.id(),
            store: &tenant.store,
            credential: &tenant.credential,
            vault: &self.vault,
            settings: &self.settings,
            now,
            cancel,
        }
    }
}

fn seed(mailbox: &Mailbox, now: DateTime<Utc>) {
    let sent = now - Duration::days(2);
    let reply = now - Duration::days(1);
    mailbox.deliver(
        "Sent",
        header("out-1", "me@firm.co.za", "info@alpha.com", sent),
        Some(sent),
    );
    mailbox.deliver(
        "INBOX",
        header("in-1", "info@alpha.com", "me@firm.co.za", reply),
        Some(reply),
    );
}

#[tokio::test]
async fn test_second_sync_without_new_mail_changes_nothing() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let first = now();
    seed(&mailbox, first);

    let report = engine.run(fixture.request(&tenant, first)).await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.inserted, 2);
    assert!(report.window.start_inclusive);
    assert_eq!(tenant.store.message_count().await.unwrap(), 2);

    let checkpoint = tenant.store.checkpoint().await.unwrap();
    assert_eq!(checkpoint.last_sync, Some(first));
    assert_eq!(checkpoint.cursors["INBOX"].last_uid, 1);
    assert_eq!(checkpoint.cursors["Sent"].uid_validity, 7);

    let second = first + Duration::minutes(5);
    let report = engine.run(fixture.request(&tenant, second)).await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.inserted, 0);
    assert!(!report.window.start_inclusive);
    assert_eq!(report.window.start, first);
    assert_eq!(tenant.store.message_count().await.unwrap(), 2);
    assert_eq!(
        tenant.store.last_sync_status().await.unwrap().unwrap().status,
        SyncStatus::Success
    );
}

#[tokio::test]
async fn test_same_message_in_two_folders_is_stored_once() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let now = now();
    let at = now - Duration::hours(3);

    // A message sent to the company with the auditor in Cc lands in both folders.
    let raw = header("shared", "info@alpha.com", "info@alpha.com", at);
    mailbox.deliver("Sent", raw.clone(), Some(at));
    mailbox.deliver("INBOX", raw, Some(at));

    let report = engine.run(fixture.request(&tenant, now)).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(tenant.store.message_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_internal_domain_never_stored() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let now = now();
    let at = now - Duration::hours(1);

    // ops@firm.co.za is also a company address, but the domain is internal.
    mailbox.deliver("INBOX", header("colleague", "ops@firm.co.za", "me@firm.co.za", at), Some(at));
    mailbox.deliver("Sent", header("memo", "me@firm.co.za", "boss@hq.firm.co.za", at), Some(at));
    mailbox.deliver("INBOX", header("spam", "promo@shop.com", "me@firm.co.za", at), Some(at));

    let report = engine.run(fixture.request(&tenant, now)).await.unwrap();
    assert_eq!(report.excluded, 2);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.inserted, 0);
    assert_eq!(tenant.store.message_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_outbound_attributed_by_alternate_recipient() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let now = now();
    let at = now - Duration::hours(1);
    mailbox.deliver("Sent", header("ask", "me@firm.co.za", "AP@Beta.com", at), Some(at));

    let report = engine.run(fixture.request(&tenant, now)).await.unwrap();
    assert_eq!(report.inserted, 1);

    let stored = tenant
        .store
        .list_messages(&MessageFilter::company("B200").direction(Direction::Outbound))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message_id, "<ask>");
    assert_eq!(stored[0].folder, "Sent");
}

#[tokio::test]
async fn test_unreadable_message_is_skipped() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let now = now();
    seed(&mailbox, now);
    let broken = mailbox.deliver("INBOX", "From: info@alpha.com\r\n\r\n".to_string(), None);

    let report = engine.run(fixture.request(&tenant, now)).await.unwrap();
    assert_eq!(report.partial_failures.len(), 1);
    assert_eq!(report.partial_failures[0].uid, broken);
    assert_eq!(report.inserted, 2);

    // The cursor moves past it; it is not retried.
    let checkpoint = tenant.store.checkpoint().await.unwrap();
    assert_eq!(checkpoint.cursors["INBOX"].last_uid, broken);
}

#[tokio::test]
async fn test_connection_failure_leaves_checkpoint() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let first = now();
    seed(&mailbox, first);
    engine.run(fixture.request(&tenant, first)).await.unwrap();
    let before = tenant.store.checkpoint().await.unwrap();

    mailbox.refuse_connections();
    let later = first + Duration::hours(1);
    let at = later - Duration::minutes(1);
    mailbox.deliver("INBOX", header("late", "info@alpha.com", "me@firm.co.za", at), Some(at));

    let err = engine.run(fixture.request(&tenant, later)).await.unwrap_err();
    assert!(matches!(err, SyncError::Connection { state: SyncState::Connecting, .. }));
    assert_eq!(err.reason(), FailureReason::Connection);
    assert_eq!(tenant.store.checkpoint().await.unwrap(), before);
    assert_eq!(tenant.store.message_count().await.unwrap(), 2);

    let status = tenant.store.last_sync_status().await.unwrap().unwrap();
    assert!(matches!(status.status, SyncStatus::Failed(reason) if reason.starts_with("connection")));
}

#[tokio::test]
async fn test_rejected_login_is_a_credential_failure() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", "wrong").await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    seed(&mailbox, now());

    let err = engine.run(fixture.request(&tenant, now())).await.unwrap_err();
    assert_eq!(err.reason(), FailureReason::Credential);
    assert_eq!(tenant.store.checkpoint().await.unwrap().last_sync, None);
}

#[tokio::test]
async fn test_wrong_vault_key_fails_before_connecting() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    seed(&mailbox, now());

    let other = CredentialVault::new(&VaultKey::from_bytes([8; 32]));
    let request = SyncRequest {
        vault: &other,
        ..fixture.request(&tenant, now())
    };
    let err = engine.run(request).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Vault {
            source: VaultError::Authentication,
            ..
        }
    ));
    assert_eq!(err.reason(), FailureReason::Credential);
    assert_eq!(mailbox.connects(), 0);
    assert_eq!(tenant.store.message_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_directory_fails_fast() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let store = TenantHandle::in_memory(AuditorId(9)).await.unwrap();
    let tenant = Tenant {
        store,
        credential: fixture
            .vault
            .seal(&MailAccountCredential::new("imap.test", "me@firm.co.za", PASSWORD))
            .unwrap(),
    };
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());

    let err = engine.run(fixture.request(&tenant, now())).await.unwrap_err();
    assert!(matches!(err, SyncError::EmptyDirectory(AuditorId(9))));
    assert_eq!(err.reason(), FailureReason::Precondition);
    assert_eq!(mailbox.connects(), 0);
}

#[tokio::test]
async fn test_second_trigger_for_same_tenant_is_rejected() {
    let (mailbox, gate) = Mailbox::default().gated("me@firm.co.za");
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let now = now();
    seed(&mailbox, now);

    let (first, second) = tokio::join!(engine.run(fixture.request(&tenant, now)), async {
        gate.entered.notified().await;
        assert!(engine.is_running(AuditorId(1)));
        let second = engine.run(fixture.request(&tenant, now)).await;
        gate.release.notify_one();
        second
    });

    assert_eq!(first.unwrap().inserted, 2);
    assert!(matches!(second, Err(SyncError::AlreadyRunning(AuditorId(1)))));
    assert!(!engine.is_running(AuditorId(1)));
    assert_eq!(mailbox.connects(), 1);
    // The rejected trigger did not overwrite the run's status.
    assert_eq!(
        tenant.store.last_sync_status().await.unwrap().unwrap().status,
        SyncStatus::Success
    );
}

#[tokio::test]
async fn test_other_tenant_syncs_while_one_is_blocked() {
    let (mailbox, gate) = Mailbox::default().gated("slow@firm.co.za");
    let fixture = Fixture::new();
    let slow = fixture.tenant(1, "slow@firm.co.za", PASSWORD).await;
    let fast = fixture.tenant(2, "fast@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let now = now();
    seed(&mailbox, now);

    let (slow_result, fast_result) = tokio::join!(engine.run(fixture.request(&slow, now)), async {
        gate.entered.notified().await;
        let result = engine.run(fixture.request(&fast, now)).await;
        // The slow tenant is still mid-run; its store is untouched.
        assert!(engine.is_running(AuditorId(1)));
        assert_eq!(slow.store.message_count().await.unwrap(), 0);
        gate.release.notify_one();
        result
    });

    assert_eq!(fast_result.unwrap().inserted, 2);
    assert_eq!(slow_result.unwrap().inserted, 2);
    assert_eq!(fast.store.message_count().await.unwrap(), 2);
    assert_eq!(slow.store.message_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_cancelled_run_commits_nothing() {
    let (mailbox, gate) = Mailbox::default().gated("me@firm.co.za");
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let now = now();
    seed(&mailbox, now);
    let cancel = CancellationToken::new();

    let (result, ()) = tokio::join!(
        engine.run(fixture.request_with(&tenant, now, cancel.clone())),
        async {
            gate.entered.notified().await;
            cancel.cancel();
        }
    );

    let err = result.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled { state: SyncState::Connecting }));
    assert_eq!(err.reason(), FailureReason::Cancelled);
    assert_eq!(tenant.store.checkpoint().await.unwrap().last_sync, None);
    assert_eq!(tenant.store.message_count().await.unwrap(), 0);
    assert!(!engine.is_running(AuditorId(1)));
}

#[tokio::test]
async fn test_late_dated_message_found_through_cursor() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let first = now();
    seed(&mailbox, first);
    engine.run(fixture.request(&tenant, first)).await.unwrap();

    // Delivered after the first run but dated before its checkpoint.
    let backdated = first - Duration::hours(6);
    let uid = mailbox.deliver(
        "INBOX",
        header("slow-relay", "ap@beta.com", "me@firm.co.za", backdated),
        Some(first + Duration::minutes(1)),
    );

    let second = first + Duration::minutes(10);
    let report = engine.run(fixture.request(&tenant, second)).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.out_of_window, 0);
    assert_eq!(report.inserted, 1);
    assert_eq!(
        tenant.store.checkpoint().await.unwrap().cursors["INBOX"].last_uid,
        uid
    );
}

#[tokio::test]
async fn test_first_run_drops_messages_before_lookback() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let options = SyncOptions {
        lookback_days: 5,
        ..SyncOptions::default()
    };
    let engine = SyncEngine::new(mailbox.clone(), options);
    let now = now();

    // Header date is old although the server filed it recently.
    let old = now - Duration::days(20);
    mailbox.deliver("INBOX", header("old", "info@alpha.com", "me@firm.co.za", old), Some(now));
    mailbox.deliver("Sent", header("new", "me@firm.co.za", "info@alpha.com", now), Some(now));

    let report = engine.run(fixture.request(&tenant, now)).await.unwrap();
    assert_eq!(report.out_of_window, 1);
    assert_eq!(report.inserted, 1);
}

#[tokio::test]
async fn test_future_dated_message_is_kept_for_next_run() {
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let tenant = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let first = now();

    // The sender's clock runs ahead of ours.
    let ahead = first + Duration::minutes(2);
    mailbox.deliver(
        "INBOX",
        header("fast-clock", "info@alpha.com", "me@firm.co.za", ahead),
        Some(first),
    );

    let report = engine.run(fixture.request(&tenant, first)).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.out_of_window, 1);
    assert_eq!(report.inserted, 0);
    assert_eq!(tenant.store.checkpoint().await.unwrap().cursors["INBOX"].last_uid, 0);

    let second = first + Duration::hours(1);
    let report = engine.run(fixture.request(&tenant, second)).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(tenant.store.message_count().await.unwrap(), 1);
    assert_eq!(tenant.store.checkpoint().await.unwrap().cursors["INBOX"].last_uid, 1);
}

#[tokio::test]
async fn test_failed_commit_keeps_messages_and_cursors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tenant-1.db");
    let mailbox = Mailbox::default();
    let fixture = Fixture::new();
    let seeded = fixture.tenant(1, "me@firm.co.za", PASSWORD).await;
    let store = TenantHandle::open(AuditorId(1), &path).await.unwrap();
    store
        .upsert_companies(&seeded.store.list_companies().await.unwrap())
        .await
        .unwrap();
    let tenant = Tenant {
        store,
        credential: seeded.credential,
    };
    let engine = SyncEngine::new(mailbox.clone(), SyncOptions::default());
    let first = now();
    seed(&mailbox, first);
    engine.run(fixture.request(&tenant, first)).await.unwrap();
    let before = tenant.store.checkpoint().await.unwrap();

    // The second insert of the next batch fails inside the transaction.
    let pool = sqlx::sqlite::SqlitePool::connect(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_insert BEFORE INSERT ON messages \
         WHEN NEW.message_id = '<in-3>' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let later = first + Duration::hours(1);
    let at = later - Duration::minutes(5);
    mailbox.deliver("INBOX", header("in-2", "info@alpha.com", "me@firm.co.za", at), Some(at));
    mailbox.deliver("INBOX", header("in-3", "ap@beta.com", "me@firm.co.za", at), Some(at));

    let err = engine.run(fixture.request(&tenant, later)).await.unwrap_err();
    assert!(matches!(err, SyncError::Store { state: SyncState::Committing, .. }));
    assert_eq!(err.reason(), FailureReason::Storage);
    assert_eq!(tenant.store.message_count().await.unwrap(), 2);
    assert_eq!(tenant.store.checkpoint().await.unwrap(), before);

    let status = tenant.store.last_sync_status().await.unwrap().unwrap();
    assert!(matches!(status.status, SyncStatus::Failed(reason) if reason.starts_with("storage")));
}
