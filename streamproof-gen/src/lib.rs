//! streamproof-gen library interface
//!
//! One-shot proof-of-contribution job for streaming listening history:
//! collects a user's play history under a wall-clock budget, scores it,
//! pays out the score growth over what was already rewarded, publishes the
//! encrypted raw data, and records the outcome in a transactional ledger.

pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reward;
pub mod scoring;
pub mod services;

pub use error::ProofError;
pub use pipeline::ProofPipeline;
