//! Admin storage: auditors and shared settings.
//!
//! This is the one store shared across tenants. It is written only by
//! administrative actions; sync runs only read from it.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::{debug, info};

use super::model::{Auditor, AuditorId};
use crate::settings::{DEFAULT_FOLLOWUP_DAYS, Settings};
use crate::vault::SealedCredential;
use crate::{Error, Result};

const FOLLOWUP_DAYS_KEY: &str = "followup_days";
const INTERNAL_DOMAINS_KEY: &str = "internal_domains";

/// Repository for auditors and admin settings.
#[derive(Debug, Clone)]
pub struct AdminRepository {
    pool: SqlitePool,
}

impl AdminRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS auditors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                full_name TEXT,
                email TEXT,
                credential TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(FOLLOWUP_DAYS_KEY)
            .bind(DEFAULT_FOLLOWUP_DAYS.to_string())
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, '[]')")
            .bind(INTERNAL_DOMAINS_KEY)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new auditor with an already sealed credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the username is taken or the query fails.
    pub async fn insert_auditor(
        &self,
        username: &str,
        full_name: Option<&str>,
        email: Option<&str>,
        credential: &SealedCredential,
    ) -> Result<Auditor> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO auditors (username, full_name, email, credential, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(username)
        .bind(full_name)
        .bind(email)
        .bind(credential.as_str())
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = AuditorId(result.last_insert_rowid());
        info!(auditor = %id, username, "Created auditor");

        Ok(Auditor {
            id,
            username: username.to_string(),
            full_name: full_name.map(str::to_string),
            email: email.map(str::to_string),
            credential: credential.clone(),
            created_at,
        })
    }

    /// Get auditor by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: AuditorId) -> Result<Option<Auditor>> {
        let row = sqlx::query(
            r"
            SELECT id, username, full_name, email, credential, created_at
            FROM auditors
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_auditor).transpose()
    }

    /// Get auditor by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<Auditor>> {
        let row = sqlx::query(
            r"
            SELECT id, username, full_name, email, credential, created_at
            FROM auditors
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_auditor).transpose()
    }

    /// Get all auditors.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Auditor>> {
        let rows = sqlx::query(
            r"
            SELECT id, username, full_name, email, credential, created_at
            FROM auditors
            ORDER BY username ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_auditor).collect()
    }

    /// Replace an auditor's sealed credential.
    ///
    /// # Errors
    ///
    /// Returns `AuditorNotFound` if no row was updated.
    pub async fn update_credential(&self, id: AuditorId, credential: &SealedCredential) -> Result<()> {
        let result = sqlx::query("UPDATE auditors SET credential = ? WHERE id = ?")
            .bind(credential.as_str())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AuditorNotFound(id));
        }
        debug!(auditor = %id, "Updated sealed credential");
        Ok(())
    }

    /// Delete an auditor row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, id: AuditorId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auditors WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Read the current settings snapshot.
    ///
    /// Unparsable stored values fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn settings(&self) -> Result<Settings> {
        let threshold = self
            .get_setting(FOLLOWUP_DAYS_KEY)
            .await?
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_FOLLOWUP_DAYS);

        let domains: Vec<String> = self
            .get_setting(INTERNAL_DOMAINS_KEY)
            .await?
            .and_then(|value| serde_json::from_str(&value).ok())
            .unwrap_or_default();

        // Stored domains may predate validation; drop the ones that no longer pass.
        let valid: Vec<&String> = domains
            .iter()
            .filter(|domain| Settings::new(threshold, [domain.as_str()]).is_ok())
            .collect();

        Ok(Settings::new(threshold, valid)?)
    }

    /// Persist new settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn update_settings(&self, settings: &Settings) -> Result<()> {
        let domains = serde_json::to_string(settings.internal_domains())?;
        let mut tx = self.pool.begin().await?;
        for (key, value) in [
            (FOLLOWUP_DAYS_KEY, settings.followup_threshold().to_string()),
            (INTERNAL_DOMAINS_KEY, domains),
        ] {
            sqlx::query(
                r"
                INSERT INTO settings (key, value, updated_at)
                VALUES (?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                ",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(
            threshold = settings.followup_threshold(),
            domains = settings.internal_domains().len(),
            "Updated follow-up settings"
        );
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("value")))
    }
}

/// Convert a database row to an Auditor.
fn row_to_auditor(row: &SqliteRow) -> Result<Auditor> {
    let created_at: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Config(format!("invalid created_at for auditor: {e}")))?
        .with_timezone(&Utc);

    Ok(Auditor {
        id: AuditorId(row.try_get("id")?),
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        credential: SealedCredential::from_stored(row.try_get("credential")?),
        created_at,
    })
}
