//! Idempotency ledger: which source messages have already been turned into a
//! digest. Keyed by Gmail message id; re-inserting a processed id is a no-op.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// Metadata recorded for a processed source message.
#[derive(Debug, Clone)]
pub struct ProcessedEmail {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub date: String,
}

pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub async fn open(path: &Path) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("failed to open ledger database")?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("failed to open in-memory ledger")?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_emails (
                message_id TEXT PRIMARY KEY,
                sender TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '',
                date TEXT NOT NULL DEFAULT '',
                processed_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(pool)
        .await
        .context("failed to initialize ledger schema")?;

        Ok(())
    }

    pub async fn is_processed(&self, message_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM processed_emails WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query ledger")?;
        Ok(row.is_some())
    }

    /// Record a message as processed. Returns `false` when the id was already
    /// present (INSERT OR IGNORE semantics).
    pub async fn mark_processed(&self, email: &ProcessedEmail) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO processed_emails (message_id, sender, subject, date, processed_at)
            VALUES (?, ?, ?, ?, datetime('now'))
            "#,
        )
        .bind(&email.message_id)
        .bind(&email.sender)
        .bind(&email.subject)
        .bind(&email.date)
        .execute(&self.pool)
        .await
        .context("failed to insert into ledger")?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of processed messages, for end-of-run logging.
    pub async fn processed_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM processed_emails")
            .fetch_one(&self.pool)
            .await
            .context("failed to count ledger rows")?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }
}
