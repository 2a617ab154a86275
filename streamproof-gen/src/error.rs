//! Error type for the proof pipeline

use thiserror::Error;

use crate::services::history_api::FetchError;
use crate::services::publisher::PublishError;

/// Anything that can abort a proof run. No variant here corrupts ledger
/// state: fetch and publish failures happen before the commit, and a
/// persistence failure rolls the transaction back.
#[derive(Debug, Error)]
pub enum ProofError {
    /// History collection failed terminally (auth, scope, attempt cap)
    #[error("history fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Artifact serialization, encryption, or upload failed
    #[error("artifact publication failed: {0}")]
    Publish(#[from] PublishError),

    /// Ledger read or commit failed
    #[error("ledger error: {0}")]
    Ledger(#[from] streamproof_common::Error),

    /// Required input missing or unusable, rejected pre-flight
    #[error("invalid run input: {0}")]
    Validation(String),
}
