//! Per-tenant storage handle.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteExecutor, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::error::{StoreResult, StoreTransactionError};
use super::model::{
    Direction, FolderCursor, InsertOutcome, MessageFilter, StoredMessage, SyncCheckpoint,
    SyncLogEntry, SyncStatus,
};
use crate::account::AuditorId;
use crate::directory::Company;

/// Isolated storage for one auditor.
///
/// Cloning is cheap; clones share the pool and the write lock.
#[derive(Clone)]
pub struct TenantHandle {
    id: AuditorId,
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for TenantHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl TenantHandle {
    /// Open (or create) the store file for a tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(id: AuditorId, path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let handle = Self::from_pool(id, pool);
        handle.initialize().await?;
        debug!(auditor = %id, path = %path.display(), "Opened tenant store");
        Ok(handle)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory(id: AuditorId) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let handle = Self::from_pool(id, pool);
        handle.initialize().await?;
        Ok(handle)
    }

    fn from_pool(id: AuditorId, pool: SqlitePool) -> Self {
        Self {
            id,
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Initialize database schema.
    async fn initialize(&self) -> StoreResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS companies (
                reference TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                alt_email TEXT,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Messages reference companies so an unattributed row can never land.
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                direction TEXT NOT NULL CHECK (direction IN ('outbound', 'inbound')),
                company_ref TEXT NOT NULL REFERENCES companies(reference),
                timestamp TEXT NOT NULL,
                folder TEXT NOT NULL,
                from_addr TEXT NOT NULL DEFAULT '',
                to_addrs TEXT NOT NULL DEFAULT '[]',
                subject TEXT NOT NULL DEFAULT '',
                stored_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_company
            ON messages(company_ref, direction, timestamp)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_checkpoint (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_sync TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folder_cursors (
                folder TEXT PRIMARY KEY,
                uid_validity INTEGER NOT NULL,
                last_uid INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_log (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                status TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Tenant this handle belongs to.
    #[must_use]
    pub const fn id(&self) -> AuditorId {
        self.id
    }

    /// Insert or update companies by reference code.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; no company is written then.
    pub async fn upsert_companies(&self, companies: &[Company]) -> StoreResult<usize> {
        let _guard = self.write_lock.lock().await;
        let now = encode_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;
        for company in companies {
            sqlx::query(
                r"
                INSERT INTO companies (reference, name, email, alt_email, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(reference) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    alt_email = excluded.alt_email,
                    updated_at = excluded.updated_at
                ",
            )
            .bind(&company.reference)
            .bind(&company.name)
            .bind(&company.email)
            .bind(&company.alt_email)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(auditor = %self.id, count = companies.len(), "Upserted companies");
        Ok(companies.len())
    }

    /// All companies, ordered by reference code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_companies(&self) -> StoreResult<Vec<Company>> {
        let rows = sqlx::query(
            r"
            SELECT reference, name, email, alt_email
            FROM companies
            ORDER BY reference ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<Company> {
                Ok(Company {
                    reference: row.try_get("reference")?,
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                    alt_email: row.try_get("alt_email")?,
                })
            })
            .collect()
    }

    /// Insert a message unless its identifier is already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn insert_message_if_absent(
        &self,
        message: &StoredMessage,
    ) -> StoreResult<InsertOutcome> {
        let _guard = self.write_lock.lock().await;
        insert_message(&self.pool, message).await
    }

    /// Messages matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list_messages(&self, filter: &MessageFilter) -> StoreResult<Vec<StoredMessage>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT message_id, direction, company_ref, timestamp, folder, from_addr, to_addrs, \
             subject FROM messages WHERE 1 = 1",
        );
        if let Some(company) = &filter.company {
            query.push(" AND company_ref = ").push_bind(company.clone());
        }
        if let Some(direction) = filter.direction {
            query.push(" AND direction = ").push_bind(direction.as_str());
        }
        if let Some(since) = filter.since {
            query.push(" AND timestamp >= ").push_bind(encode_timestamp(since));
        }
        if let Some(until) = filter.until {
            query.push(" AND timestamp <= ").push_bind(encode_timestamp(until));
        }
        query.push(" ORDER BY timestamp ASC, message_id ASC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_message).collect()
    }

    /// Number of stored messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn message_count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Current checkpoint and folder cursors.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a value cannot be decoded.
    pub async fn checkpoint(&self) -> StoreResult<SyncCheckpoint> {
        let last_sync = sqlx::query_scalar::<_, String>(
            "SELECT last_sync FROM sync_checkpoint WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .map(|value| decode_timestamp("last_sync", &value))
        .transpose()?;

        let rows = sqlx::query("SELECT folder, uid_validity, last_uid FROM folder_cursors")
            .fetch_all(&self.pool)
            .await?;
        let mut cursors = std::collections::BTreeMap::new();
        for row in &rows {
            let folder: String = row.try_get("folder")?;
            let cursor = FolderCursor {
                uid_validity: decode_u32("uid_validity", row.try_get("uid_validity")?)?,
                last_uid: decode_u32("last_uid", row.try_get("last_uid")?)?,
            };
            cursors.insert(folder, cursor);
        }

        Ok(SyncCheckpoint { last_sync, cursors })
    }

    /// Set the checkpoint timestamp on its own, leaving cursors alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn set_checkpoint(&self, last_sync: DateTime<Utc>) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        write_checkpoint_time(&self.pool, last_sync).await
    }

    /// Begin an atomic batch of inserts plus checkpoint advance.
    ///
    /// Holds the tenant's write lock until the batch is committed or
    /// dropped. Dropping without [`CommitBatch::commit`] rolls back.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    pub async fn begin_commit(&self) -> StoreResult<CommitBatch> {
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(CommitBatch {
            id: self.id,
            tx,
            _guard: guard,
            inserted: 0,
            duplicates: 0,
        })
    }

    /// Record the outcome of a sync run.
    ///
    /// Separate from the commit transaction; never touches the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn record_sync_status(
        &self,
        status: &SyncStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r"
            INSERT INTO sync_log (id, status, recorded_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                recorded_at = excluded.recorded_at
            ",
        )
        .bind(status.to_string())
        .bind(encode_timestamp(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Last recorded sync status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a value cannot be decoded.
    pub async fn last_sync_status(&self) -> StoreResult<Option<SyncLogEntry>> {
        let row = sqlx::query("SELECT status, recorded_at FROM sync_log WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> StoreResult<SyncLogEntry> {
            let status: String = row.try_get("status")?;
            let recorded_at: String = row.try_get("recorded_at")?;
            Ok(SyncLogEntry {
                status: SyncStatus::parse(&status),
                recorded_at: decode_timestamp("recorded_at", &recorded_at)?,
            })
        })
        .transpose()
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Whether [`close`](Self::close) has been called on this store.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// An open commit transaction holding the tenant's write lock.
pub struct CommitBatch {
    id: AuditorId,
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
    inserted: usize,
    duplicates: usize,
}

impl std::fmt::Debug for CommitBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitBatch")
            .field("id", &self.id)
            .field("inserted", &self.inserted)
            .field("duplicates", &self.duplicates)
            .finish_non_exhaustive()
    }
}

impl CommitBatch {
    /// Insert a message unless its identifier is already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the batch should then be dropped.
    pub async fn insert_message_if_absent(
        &mut self,
        message: &StoredMessage,
    ) -> StoreResult<InsertOutcome> {
        let outcome = insert_message(&mut *self.tx, message).await?;
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::Duplicate => self.duplicates += 1,
        }
        Ok(outcome)
    }

    /// Stage the checkpoint and cursors to be written with the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn set_checkpoint(&mut self, checkpoint: &SyncCheckpoint) -> StoreResult<()> {
        if let Some(last_sync) = checkpoint.last_sync {
            write_checkpoint_time(&mut *self.tx, last_sync).await?;
        }
        for (folder, cursor) in &checkpoint.cursors {
            sqlx::query(
                r"
                INSERT INTO folder_cursors (folder, uid_validity, last_uid) VALUES (?, ?, ?)
                ON CONFLICT(folder) DO UPDATE SET
                    uid_validity = excluded.uid_validity,
                    last_uid = excluded.last_uid
                ",
            )
            .bind(folder)
            .bind(i64::from(cursor.uid_validity))
            .bind(i64::from(cursor.last_uid))
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    /// Messages inserted so far in this batch.
    #[must_use]
    pub const fn inserted(&self) -> usize {
        self.inserted
    }

    /// Duplicates skipped so far in this batch.
    #[must_use]
    pub const fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Commit everything staged in this batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; nothing is persisted then.
    pub async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        info!(
            auditor = %self.id,
            inserted = self.inserted,
            duplicates = self.duplicates,
            "Committed sync batch"
        );
        Ok(())
    }
}

async fn insert_message<'e>(
    executor: impl SqliteExecutor<'e>,
    message: &StoredMessage,
) -> StoreResult<InsertOutcome> {
    let to_addrs = serde_json::to_string(&message.to_addrs).unwrap_or_else(|_| "[]".to_string());
    let result = sqlx::query(
        r"
        INSERT INTO messages
            (message_id, direction, company_ref, timestamp, folder, from_addr, to_addrs,
             subject, stored_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(message_id) DO NOTHING
        ",
    )
    .bind(&message.message_id)
    .bind(message.direction.as_str())
    .bind(&message.company_ref)
    .bind(encode_timestamp(message.timestamp))
    .bind(&message.folder)
    .bind(&message.from_addr)
    .bind(to_addrs)
    .bind(&message.subject)
    .bind(encode_timestamp(Utc::now()))
    .execute(executor)
    .await?;

    Ok(if result.rows_affected() == 0 {
        InsertOutcome::Duplicate
    } else {
        InsertOutcome::Inserted
    })
}

async fn write_checkpoint_time<'e>(
    executor: impl SqliteExecutor<'e>,
    last_sync: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO sync_checkpoint (id, last_sync) VALUES (1, ?)
        ON CONFLICT(id) DO UPDATE SET last_sync = excluded.last_sync
        ",
    )
    .bind(encode_timestamp(last_sync))
    .execute(executor)
    .await?;
    Ok(())
}

/// Fixed-width UTC timestamps so text order equals time order.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(column: &'static str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreTransactionError::Corrupt {
            column,
            value: value.to_string(),
        })
}

fn decode_u32(column: &'static str, value: i64) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreTransactionError::Corrupt {
        column,
        value: value.to_string(),
    })
}

/// Convert a database row to a `StoredMessage`.
fn row_to_message(row: &SqliteRow) -> StoreResult<StoredMessage> {
    let direction: String = row.try_get("direction")?;
    let timestamp: String = row.try_get("timestamp")?;
    let to_addrs: String = row.try_get("to_addrs")?;

    Ok(StoredMessage {
        message_id: row.try_get("message_id")?,
        direction: Direction::parse(&direction).ok_or_else(|| {
            StoreTransactionError::Corrupt {
                column: "direction",
                value: direction.clone(),
            }
        })?,
        company_ref: row.try_get("company_ref")?,
        timestamp: decode_timestamp("timestamp", &timestamp)?,
        folder: row.try_get("folder")?,
        from_addr: row.try_get("from_addr")?,
        to_addrs: serde_json::from_str(&to_addrs).map_err(|_| StoreTransactionError::Corrupt {
            column: "to_addrs",
            value: to_addrs.clone(),
        })?,
        subject: row.try_get("subject")?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
    }

    fn message(id: &str, company: &str, direction: Direction, at: DateTime<Utc>) -> StoredMessage {
        StoredMessage {
            message_id: id.to_string(),
            direction,
            company_ref: company.to_string(),
            timestamp: at,
            folder: "INBOX".to_string(),
            from_addr: "client@acme.com".to_string(),
            to_addrs: vec!["auditor@firm.com".to_string()],
            subject: "Re: documents".to_string(),
        }
    }

    async fn store_with_company() -> TenantHandle {
        let store = TenantHandle::in_memory(AuditorId(1)).await.unwrap();
        store
            .upsert_companies(&[Company::new("U1", "Acme", "client@acme.com")])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_companies_updates_existing() {
        let store = store_with_company().await;
        store
            .upsert_companies(&[
                Company::new("U1", "Acme Holdings", "client@acme.com"),
                Company::new("U2", "Beta", "hello@beta.com"),
            ])
            .await
            .unwrap();

        let companies = store.list_companies().await.unwrap();
        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].name, "Acme Holdings");
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = store_with_company().await;
        let msg = message("<a@x>", "U1", Direction::Inbound, ts(2, 9));

        assert_eq!(store.insert_message_if_absent(&msg).await.unwrap(), InsertOutcome::Inserted);
        let mut changed = msg.clone();
        changed.subject = "different".to_string();
        assert_eq!(
            store.insert_message_if_absent(&changed).await.unwrap(),
            InsertOutcome::Duplicate
        );

        let stored = store.list_messages(&MessageFilter::default()).await.unwrap();
        assert_eq!(stored, vec![msg]);
    }

    #[tokio::test]
    async fn test_list_messages_filter() {
        let store = store_with_company().await;
        for (id, direction, day) in [
            ("<1>", Direction::Outbound, 2),
            ("<2>", Direction::Inbound, 3),
            ("<3>", Direction::Outbound, 4),
        ] {
            store
                .insert_message_if_absent(&message(id, "U1", direction, ts(day, 9)))
                .await
                .unwrap();
        }

        let outbound = store
            .list_messages(&MessageFilter::company("U1").direction(Direction::Outbound))
            .await
            .unwrap();
        assert_eq!(outbound.len(), 2);
        assert_eq!(outbound[1].message_id, "<3>");

        let since = MessageFilter {
            since: Some(ts(3, 9)),
            ..MessageFilter::default()
        };
        assert_eq!(store.list_messages(&since).await.unwrap().len(), 2);
        assert_eq!(store.message_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_batch_commit_is_atomic() {
        let store = store_with_company().await;

        let checkpoint = SyncCheckpoint {
            last_sync: Some(ts(5, 12)),
            cursors: [("INBOX".to_string(), FolderCursor { uid_validity: 7, last_uid: 42 })]
                .into_iter()
                .collect(),
        };

        let mut batch = store.begin_commit().await.unwrap();
        batch
            .insert_message_if_absent(&message("<ok>", "U1", Direction::Inbound, ts(2, 9)))
            .await
            .unwrap();
        batch.set_checkpoint(&checkpoint).await.unwrap();
        // Unknown company violates the foreign key mid-batch.
        assert!(batch
            .insert_message_if_absent(&message("<bad>", "NOPE", Direction::Inbound, ts(2, 9)))
            .await
            .is_err());
        drop(batch);

        assert_eq!(store.message_count().await.unwrap(), 0);
        assert_eq!(store.checkpoint().await.unwrap(), SyncCheckpoint::default());

        let mut batch = store.begin_commit().await.unwrap();
        batch
            .insert_message_if_absent(&message("<ok>", "U1", Direction::Inbound, ts(2, 9)))
            .await
            .unwrap();
        batch.set_checkpoint(&checkpoint).await.unwrap();
        assert_eq!(batch.inserted(), 1);
        batch.commit().await.unwrap();

        assert_eq!(store.message_count().await.unwrap(), 1);
        assert_eq!(store.checkpoint().await.unwrap(), checkpoint);
    }

    #[tokio::test]
    async fn test_set_checkpoint_keeps_cursors() {
        let store = store_with_company().await;
        store.set_checkpoint(ts(1, 0)).await.unwrap();
        store.set_checkpoint(ts(2, 0)).await.unwrap();
        let checkpoint = store.checkpoint().await.unwrap();
        assert_eq!(checkpoint.last_sync, Some(ts(2, 0)));
        assert!(checkpoint.cursors.is_empty());
    }

    #[tokio::test]
    async fn test_sync_status_roundtrip() {
        let store = store_with_company().await;
        assert!(store.last_sync_status().await.unwrap().is_none());

        let status = SyncStatus::Failed("connection: timed out".to_string());
        store.record_sync_status(&status, ts(3, 8)).await.unwrap();
        let entry = store.last_sync_status().await.unwrap().unwrap();
        assert_eq!(entry.status, status);
        assert_eq!(entry.recorded_at, ts(3, 8));
        assert_eq!(store.checkpoint().await.unwrap().last_sync, None);
    }
}
