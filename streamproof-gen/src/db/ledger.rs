//! Contribution ledger: per-account state plus append-only proof history
//!
//! `read_existing` derives the cumulative paid-out score from the proof
//! history, never from the mutable state row, so the payout sum stays
//! correct even if the state row lags. `commit_run` is the only write path
//! and runs as a single transaction: either the state upsert and the proof
//! append both land, or neither does.

use sqlx::{Row, SqlitePool};
use tracing::info;

use streamproof_common::{time, Result};

use crate::models::{ExistingContribution, FetchCursor, ListeningStats, ProofRecord};

pub struct Ledger<'a> {
    pool: &'a SqlitePool,
}

impl<'a> Ledger<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Ledger { pool }
    }

    /// Look up what has already been paid out for an account.
    ///
    /// Returns `None` for an account with no proof history.
    pub async fn read_existing(
        &self,
        account_id_hash: &str,
    ) -> Result<Option<ExistingContribution>> {
        let totals = sqlx::query(
            r#"
            SELECT COALESCE(SUM(score), 0.0) AS cumulative_score,
                   COUNT(*) AS proof_count,
                   COALESCE(SUM(CASE WHEN score > 0 THEN 1 ELSE 0 END), 0) AS times_rewarded
            FROM proof_records
            WHERE account_id_hash = ?
            "#,
        )
        .bind(account_id_hash)
        .fetch_one(self.pool)
        .await?;

        let proof_count: i64 = totals.get("proof_count");
        if proof_count == 0 {
            return Ok(None);
        }

        let state = sqlx::query(
            r#"
            SELECT event_count, total_minutes, activity_period_days,
                   unique_artists, fetch_cursor_ms
            FROM contribution_state
            WHERE account_id_hash = ?
            "#,
        )
        .bind(account_id_hash)
        .fetch_optional(self.pool)
        .await?;

        Ok(Some(ExistingContribution {
            cumulative_score: totals.get("cumulative_score"),
            times_rewarded: totals.get::<i64, _>("times_rewarded") as u32,
            event_count: state.as_ref().map(|r| r.get("event_count")).unwrap_or(0),
            total_minutes: state.as_ref().map(|r| r.get("total_minutes")).unwrap_or(0),
            activity_period_days: state
                .as_ref()
                .map(|r| r.get("activity_period_days"))
                .unwrap_or(0),
            unique_artists: state.as_ref().map(|r| r.get("unique_artists")).unwrap_or(0),
            fetch_cursor: state
                .as_ref()
                .and_then(|r| r.get::<Option<i64>, _>("fetch_cursor_ms"))
                .map(FetchCursor),
        }))
    }

    /// Record a positive-reward run: upsert the account state and append
    /// the proof row, atomically. Callers must not invoke this for a
    /// zero-reward run; the cursor is deliberately left untouched then.
    pub async fn commit_run(
        &self,
        stats: &ListeningStats,
        cursor: Option<FetchCursor>,
        proof: &ProofRecord,
        encrypted_refresh_token: Option<&str>,
    ) -> Result<()> {
        let now = time::now().to_rfc3339();
        let cursor_ms = cursor.map(|c| c.0);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO contribution_state (
                account_id_hash, event_count, total_minutes,
                activity_period_days, unique_artists, latest_score,
                times_rewarded, fetch_cursor_ms, encrypted_refresh_token,
                first_contribution_at, latest_contribution_at
            ) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?)
            ON CONFLICT(account_id_hash) DO UPDATE SET
                event_count = excluded.event_count,
                total_minutes = excluded.total_minutes,
                activity_period_days = excluded.activity_period_days,
                unique_artists = excluded.unique_artists,
                latest_score = excluded.latest_score,
                times_rewarded = contribution_state.times_rewarded + 1,
                fetch_cursor_ms = COALESCE(excluded.fetch_cursor_ms,
                                           contribution_state.fetch_cursor_ms),
                encrypted_refresh_token = COALESCE(excluded.encrypted_refresh_token,
                                                   contribution_state.encrypted_refresh_token),
                latest_contribution_at = excluded.latest_contribution_at
            "#,
        )
        .bind(&proof.account_id_hash)
        .bind(stats.event_count as i64)
        .bind(stats.total_minutes as i64)
        .bind(stats.activity_period_days)
        .bind(stats.unique_artists.len() as i64)
        .bind(proof.score)
        .bind(cursor_ms)
        .bind(encrypted_refresh_token)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO proof_records (
                account_id_hash, file_id, file_url, job_id, owner_address,
                score, authenticity, ownership, quality, uniqueness,
                encrypted_checksum, decrypted_checksum, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&proof.account_id_hash)
        .bind(proof.file_id)
        .bind(&proof.file_url)
        .bind(&proof.job_id)
        .bind(&proof.owner_address)
        .bind(proof.score)
        .bind(proof.authenticity)
        .bind(proof.ownership)
        .bind(proof.quality)
        .bind(proof.uniqueness)
        .bind(&proof.encrypted_checksum)
        .bind(&proof.decrypted_checksum)
        .bind(proof.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            account = %proof.account_id_hash,
            score = proof.score,
            "contribution committed to ledger"
        );

        Ok(())
    }
}
