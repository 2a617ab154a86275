//! Ledger database access
//!
//! One SQLite database holds the two ledger tables: mutable per-account
//! state and the append-only proof history. The schema is created on pool
//! init so a fresh volume works without a separate migration step.

pub mod ledger;

pub use ledger::Ledger;

use sqlx::SqlitePool;
use streamproof_common::Result;

/// Initialize the database connection pool and ensure the schema exists.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    tracing::debug!("connecting to ledger database: {}", database_url);
    let pool = SqlitePool::connect(database_url).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    // Mutable per-account state, one row per account
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contribution_state (
            account_id_hash TEXT PRIMARY KEY,
            event_count INTEGER NOT NULL,
            total_minutes INTEGER NOT NULL,
            activity_period_days INTEGER NOT NULL,
            unique_artists INTEGER NOT NULL,
            latest_score REAL NOT NULL,
            times_rewarded INTEGER NOT NULL DEFAULT 0,
            fetch_cursor_ms INTEGER,
            encrypted_refresh_token TEXT,
            first_contribution_at TEXT NOT NULL,
            latest_contribution_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only proof history, one row per positive-reward run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS proof_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id_hash TEXT NOT NULL,
            file_id INTEGER NOT NULL,
            file_url TEXT NOT NULL,
            job_id TEXT NOT NULL,
            owner_address TEXT NOT NULL,
            score REAL NOT NULL,
            authenticity REAL NOT NULL,
            ownership REAL NOT NULL,
            quality REAL NOT NULL,
            uniqueness REAL NOT NULL,
            encrypted_checksum TEXT NOT NULL,
            decrypted_checksum TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_proof_records_account ON proof_records(account_id_hash)",
    )
    .execute(pool)
    .await?;

    tracing::info!("ledger tables initialized (contribution_state, proof_records)");

    Ok(())
}
