//! Data models for streamproof-gen
//!
//! - Contribution domain records (events, stats, cursors, raw-data view)
//! - Proof result document and ledger row shapes

pub mod contribution;
pub mod proof;

pub use contribution::{
    ContributionData, ExistingContribution, FetchCursor, ListeningEvent, ListeningStats,
    RawDataView,
};
pub use proof::{FileChecksums, FileInfo, ProofAttributes, ProofMetadata, ProofRecord, ProofResponse};
