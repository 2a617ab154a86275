//! Artifact encryption and publication
//!
//! Serializes the run's raw-data view, checksums it, encrypts it, and
//! uploads the ciphertext. The destination address is validated before any
//! I/O happens. Nothing here is retried: a failed publish fails the run,
//! and intermediate buffers are dropped on every exit path.

use async_trait::async_trait;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::models::RawDataView;
use super::cipher::{self, CipherError};

const UPLOAD_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum PublishError {
    /// Destination address rejected before any I/O
    #[error("invalid destination address: {0}")]
    BadAddress(String),

    #[error("failed to serialize contribution data: {0}")]
    Serialize(String),

    #[error("encryption failed: {0}")]
    Encrypt(#[from] CipherError),

    #[error("upload failed: {0}")]
    Upload(String),
}

/// Checksums over the published artifact, reported in proof metadata.
#[derive(Debug, Clone)]
pub struct ArtifactChecksums {
    /// SHA-256 hex of the uploaded ciphertext
    pub encrypted: String,
    /// SHA-256 hex of the serialized plaintext
    pub decrypted: String,
}

/// Blob storage collaborator: bytes at an address, success or failure.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, destination: &Url, body: Vec<u8>) -> Result<(), PublishError>;
}

/// Production blob store: HTTP PUT to a pre-authorized destination URL.
pub struct HttpBlobStore {
    http_client: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new() -> Result<Self, PublishError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| PublishError::Upload(e.to_string()))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, destination: &Url, body: Vec<u8>) -> Result<(), PublishError> {
        let response = self
            .http_client
            .put(destination.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Upload(format!(
                "destination returned {}",
                status
            )));
        }
        Ok(())
    }
}

/// Publishes one run's encrypted raw-data artifact.
pub struct ArtifactPublisher<'a, B: BlobStore + ?Sized> {
    store: &'a B,
}

impl<'a, B: BlobStore + ?Sized> ArtifactPublisher<'a, B> {
    pub fn new(store: &'a B) -> Self {
        ArtifactPublisher { store }
    }

    /// Serialize → checksum → encrypt → checksum → upload.
    pub async fn publish(
        &self,
        view: &RawDataView,
        destination: &str,
        passphrase: &str,
    ) -> Result<ArtifactChecksums, PublishError> {
        let url = validate_destination(destination)?;

        let plaintext =
            serde_json::to_vec(view).map_err(|e| PublishError::Serialize(e.to_string()))?;
        let decrypted = sha256_hex(&plaintext);

        let ciphertext = cipher::encrypt(&plaintext, passphrase)?;
        let encrypted = sha256_hex(&ciphertext);

        let size = ciphertext.len();
        self.store.put(&url, ciphertext).await?;

        info!(
            destination = %url,
            bytes = size,
            "published encrypted contribution artifact"
        );

        Ok(ArtifactChecksums { encrypted, decrypted })
    }
}

/// Reject a malformed destination before serializing or encrypting anything.
fn validate_destination(raw: &str) -> Result<Url, PublishError> {
    let url =
        Url::parse(raw).map_err(|e| PublishError::BadAddress(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PublishError::BadAddress(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(PublishError::BadAddress("missing host".to_string()));
    }
    Ok(url)
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contribution::{RawStatsBlock, RawUserBlock};
    use std::sync::Mutex;

    fn sample_view() -> RawDataView {
        RawDataView {
            version: 1,
            user: RawUserBlock {
                id_hash: "deadbeef".to_string(),
                country: Some("SE".to_string()),
                product: Some("premium".to_string()),
            },
            stats: RawStatsBlock {
                total_minutes: 10,
                event_count: 2,
                unique_artist_count: 2,
                activity_period_days: 1,
                first_listen: None,
                last_listen: None,
            },
            events: Vec::new(),
        }
    }

    /// In-memory blob store recording every upload.
    #[derive(Default)]
    struct MemoryBlobStore {
        puts: Mutex<Vec<(Url, Vec<u8>)>>,
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn put(&self, destination: &Url, body: Vec<u8>) -> Result<(), PublishError> {
            self.puts.lock().unwrap().push((destination.clone(), body));
            Ok(())
        }
    }

    /// Blob store that always fails, for terminal-propagation checks.
    struct BrokenBlobStore;

    #[async_trait]
    impl BlobStore for BrokenBlobStore {
        async fn put(&self, _destination: &Url, _body: Vec<u8>) -> Result<(), PublishError> {
            Err(PublishError::Upload("bucket unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_publish_checksums_match_uploaded_bytes() {
        let store = MemoryBlobStore::default();
        let publisher = ArtifactPublisher::new(&store);
        let view = sample_view();

        let checksums = publisher
            .publish(&view, "https://exports.example.com/contrib.bin", "pass")
            .await
            .unwrap();

        let puts = store.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        let (url, body) = &puts[0];
        assert_eq!(url.as_str(), "https://exports.example.com/contrib.bin");

        // Cipher checksum covers exactly what was uploaded
        assert_eq!(checksums.encrypted, sha256_hex(body));

        // Plain checksum covers the canonical serialization, which the
        // uploaded payload decrypts back to
        let plaintext = cipher::decrypt(body, "pass").unwrap();
        assert_eq!(checksums.decrypted, sha256_hex(&plaintext));
        let recovered: RawDataView = serde_json::from_slice(&plaintext).unwrap();
        assert_eq!(recovered.user.id_hash, "deadbeef");
    }

    #[tokio::test]
    async fn test_bad_address_rejected_before_any_io() {
        let store = MemoryBlobStore::default();
        let publisher = ArtifactPublisher::new(&store);

        for bad in ["not a url", "ftp://exports.example.com/x", "file:///tmp/x", ""] {
            let err = publisher.publish(&sample_view(), bad, "pass").await.unwrap_err();
            assert!(matches!(err, PublishError::BadAddress(_)), "{bad}");
        }
        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_propagates() {
        let publisher = ArtifactPublisher::new(&BrokenBlobStore);
        let err = publisher
            .publish(&sample_view(), "https://exports.example.com/contrib.bin", "pass")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Upload(_)));
    }

    #[test]
    fn test_validate_destination_accepts_http_and_https() {
        assert!(validate_destination("https://bucket.example.com/key").is_ok());
        assert!(validate_destination("http://localhost:9000/bucket/key").is_ok());
    }
}
