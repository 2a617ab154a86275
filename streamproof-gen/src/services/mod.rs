//! Collaborator services for the proof pipeline

pub mod cipher;
pub mod collector;
pub mod history_api;
pub mod publisher;

pub use collector::{CollectorConfig, FetchOutcome, HistoryCollector};
pub use history_api::{FetchError, HistoryApi, StreamingClient};
pub use publisher::{ArtifactPublisher, BlobStore, HttpBlobStore, PublishError};
