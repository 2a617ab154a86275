//! Proof result document and ledger row shapes
//!
//! Only `score` and `metadata` end up onchain; everything else is offchain
//! context for the reporting layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::PointsBreakdown;

/// Proof document version reported in metadata.
pub const PROOF_VERSION: &str = "1.0.0";

/// Result of one proof run, written to `results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofResponse {
    pub dlp_id: i64,
    pub valid: bool,
    /// Differential reward for this run, in [0, 1]
    pub score: f64,
    pub authenticity: f64,
    pub ownership: f64,
    pub quality: f64,
    pub uniqueness: f64,
    pub attributes: ProofAttributes,
    pub metadata: ProofMetadata,
}

/// Offchain context about the contribution behind the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofAttributes {
    pub account_id_hash: String,
    pub event_count: usize,
    pub total_minutes: u64,
    pub activity_period_days: i64,
    pub unique_artists: usize,
    pub previously_contributed: bool,
    pub previously_rewarded: bool,
    pub times_rewarded: u32,
    /// Points the full view seen this run would be worth on its own
    pub total_points: u32,
    /// Points actually paid out after subtracting prior rewards
    pub differential_points: u32,
    pub points_breakdown: PointsBreakdown,
}

/// Run identifiers and file provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofMetadata {
    pub dlp_id: i64,
    pub version: String,
    pub run_id: Uuid,
    pub job_id: String,
    pub owner_address: String,
    pub file: FileInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: i64,
    /// Always "tee" for this job
    pub source: String,
    pub url: String,
    pub checksums: FileChecksums,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChecksums {
    pub encrypted: String,
    pub decrypted: String,
}

/// Append-only ledger row recording one positive-reward run.
#[derive(Debug, Clone)]
pub struct ProofRecord {
    pub account_id_hash: String,
    pub file_id: i64,
    pub file_url: String,
    pub job_id: String,
    pub owner_address: String,
    pub score: f64,
    pub authenticity: f64,
    pub ownership: f64,
    pub quality: f64,
    pub uniqueness: f64,
    pub encrypted_checksum: String,
    pub decrypted_checksum: String,
    pub created_at: DateTime<Utc>,
}
