//! Proof pipeline orchestration
//!
//! Sequences one run: profile → pseudonym → ledger read → collect →
//! score → differential reward → publish → conditional commit → result
//! assembly. The pipeline owns no policy beyond the sequencing and the
//! commit condition (reward > 0); scoring and reward math live in their
//! own modules.

use sqlx::SqlitePool;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use streamproof_common::config::Settings;
use streamproof_common::{ids, time};

use crate::db::Ledger;
use crate::error::ProofError;
use crate::models::proof::PROOF_VERSION;
use crate::models::{
    ContributionData, FileChecksums, FileInfo, ProofAttributes, ProofMetadata, ProofRecord,
    ProofResponse,
};
use crate::reward;
use crate::services::collector::{CollectorConfig, HistoryCollector};
use crate::services::history_api::HistoryApi;
use crate::services::publisher::{ArtifactPublisher, BlobStore};

// Sub-score policy. These are business inputs, not measurements: data is
// fetched live from the authenticated API (authenticity, ownership), an
// empty fetch halves quality, and repeat contributions are marked slightly
// less unique.
const AUTHENTICITY: f64 = 1.0;
const OWNERSHIP: f64 = 1.0;
const QUALITY_FULL: f64 = 1.0;
const QUALITY_EMPTY: f64 = 0.5;
const UNIQUENESS_FIRST: f64 = 1.0;
const UNIQUENESS_REPEAT: f64 = 0.99;

/// One proof run over one account.
pub struct ProofPipeline<'a, A: HistoryApi + ?Sized, B: BlobStore + ?Sized> {
    settings: &'a Settings,
    api: &'a A,
    blob: &'a B,
    pool: &'a SqlitePool,
}

impl<'a, A: HistoryApi + ?Sized, B: BlobStore + ?Sized> ProofPipeline<'a, A, B> {
    pub fn new(settings: &'a Settings, api: &'a A, blob: &'a B, pool: &'a SqlitePool) -> Self {
        ProofPipeline {
            settings,
            api,
            blob,
            pool,
        }
    }

    pub async fn run(&self) -> Result<ProofResponse, ProofError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "starting proof run");

        let collector = HistoryCollector::new(
            self.api,
            CollectorConfig {
                max_pages: self.settings.max_pages,
                page_size: self.settings.page_size,
                budget: Duration::from_secs(self.settings.fetch_budget_secs),
            },
        );

        let profile = collector.profile().await?.ok_or_else(|| {
            ProofError::Validation("fetch budget exhausted before the account profile completed".to_string())
        })?;
        let account_id_hash = ids::account_pseudonym(&profile.id);
        info!(account = %account_id_hash, "account resolved");

        let ledger = Ledger::new(self.pool);
        let existing = ledger.read_existing(&account_id_hash).await?;
        let previous_cumulative = existing.as_ref().map(|e| e.cumulative_score).unwrap_or(0.0);
        let resume_cursor = existing.as_ref().and_then(|e| e.fetch_cursor);

        let outcome = collector.fetch(resume_cursor).await?;
        let evaluation =
            reward::evaluate(&outcome.stats, previous_cumulative, self.settings.max_points);
        info!(
            potential = evaluation.potential_score,
            previously_paid = previous_cumulative,
            reward = evaluation.reward,
            "run evaluated"
        );

        let data = ContributionData {
            account_id_hash: account_id_hash.clone(),
            stats: outcome.stats.clone(),
            events: outcome.events,
            country: profile.country,
            product: profile.product,
        };

        let publisher = ArtifactPublisher::new(self.blob);
        let checksums = publisher
            .publish(
                &data.raw_view(),
                &self.settings.file_url,
                &self.settings.encryption_passphrase,
            )
            .await?;

        let previously_contributed = existing.is_some();
        let times_rewarded = existing.as_ref().map(|e| e.times_rewarded).unwrap_or(0);

        let response = ProofResponse {
            dlp_id: self.settings.dlp_id,
            valid: true,
            score: evaluation.reward,
            authenticity: AUTHENTICITY,
            ownership: OWNERSHIP,
            quality: if data.stats.event_count > 0 {
                QUALITY_FULL
            } else {
                QUALITY_EMPTY
            },
            uniqueness: if previously_contributed {
                UNIQUENESS_REPEAT
            } else {
                UNIQUENESS_FIRST
            },
            attributes: ProofAttributes {
                account_id_hash: account_id_hash.clone(),
                event_count: data.stats.event_count,
                total_minutes: data.stats.total_minutes,
                activity_period_days: data.stats.activity_period_days,
                unique_artists: data.stats.unique_artists.len(),
                previously_contributed,
                previously_rewarded: times_rewarded > 0,
                times_rewarded,
                total_points: evaluation.breakdown.total_points,
                differential_points: evaluation.differential_points,
                points_breakdown: evaluation.breakdown,
            },
            metadata: ProofMetadata {
                dlp_id: self.settings.dlp_id,
                version: PROOF_VERSION.to_string(),
                run_id,
                job_id: self.settings.job_id.clone(),
                owner_address: self.settings.owner_address.clone(),
                file: FileInfo {
                    id: self.settings.file_id,
                    source: "tee".to_string(),
                    url: self.settings.file_url.clone(),
                    checksums: FileChecksums {
                        encrypted: checksums.encrypted,
                        decrypted: checksums.decrypted,
                    },
                },
            },
        };

        if evaluation.reward > 0.0 {
            let proof_row = ProofRecord {
                account_id_hash,
                file_id: self.settings.file_id,
                file_url: self.settings.file_url.clone(),
                job_id: self.settings.job_id.clone(),
                owner_address: self.settings.owner_address.clone(),
                score: evaluation.reward,
                authenticity: response.authenticity,
                ownership: response.ownership,
                quality: response.quality,
                uniqueness: response.uniqueness,
                encrypted_checksum: response.metadata.file.checksums.encrypted.clone(),
                decrypted_checksum: response.metadata.file.checksums.decrypted.clone(),
                created_at: time::now(),
            };
            ledger
                .commit_run(
                    &data.stats,
                    outcome.cursor,
                    &proof_row,
                    self.settings.encrypted_refresh_token.as_deref(),
                )
                .await?;
        } else {
            // No score growth: nothing is written, and the resume cursor
            // stays where the last rewarded run left it.
            info!(account = %response.attributes.account_id_hash, "zero reward, ledger untouched");
        }

        Ok(response)
    }
}
